//! Line-oriented edit scripts.
//!
//! One command per line, positions are 1-based as shown in the list:
//!
//! ```text
//! # comments and blank lines are ignored
//! attach notes.txt
//! attach-unowned ~/report.pdf
//! insert 2 1 hello.html
//! tag 2 3
//! group-alternatives
//! describe 1 Weekly summary
//! rename-file 1 notes-final.txt
//! check
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use super::draft::load_message;
use crate::compose::AttachmentContext;
use crate::content::check::CheckReport;
use crate::error::{ComposeError, Result};
use crate::model::message::MessageStore;
use crate::model::node::AttachmentNode;
use crate::prompt::Prompt;

/// A single edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attach(PathBuf),
    AttachUnowned(PathBuf),
    AttachMessage(PathBuf),
    Insert { position: usize, level: usize, path: PathBuf },
    Delete(usize),
    Swap(usize),
    MoveUp(usize),
    MoveDown(usize),
    Tag(Vec<usize>),
    UntagAll,
    Collapse(usize),
    GroupAlternatives,
    GroupMultilingual,
    Describe(usize, String),
    Language(usize, String),
    Encoding(usize, String),
    ContentType(usize, String),
    Disposition(usize),
    Unlink(usize),
    Rename(usize, String),
    RenameFile(usize, PathBuf),
    Recode(usize),
    Update(usize),
    UpdateTagged,
    Invalidate(usize),
    Check,
}

/// What a command produced, beyond its effect on the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The entry at this 0-based view position was selected.
    Selected(usize),
    Checked(CheckReport),
}

/// A parsed script: commands with their source line numbers.
#[derive(Debug, Clone, Default)]
pub struct Script {
    commands: Vec<(usize, Command)>,
}

impl Script {
    /// Read a script file. Relative paths inside are taken from its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ComposeError::io(path, e))?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::parse(&text, base)
    }

    pub fn parse(text: &str, base: &Path) -> Result<Self> {
        let mut commands = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cmd = parse_line(line, base).map_err(|reason| ComposeError::Script {
                line: i + 1,
                reason,
            })?;
            commands.push((i + 1, cmd));
        }
        Ok(Self { commands })
    }

    /// Commands with their 1-based line numbers.
    pub fn commands(&self) -> &[(usize, Command)] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn parse_line(line: &str, base: &Path) -> std::result::Result<Command, String> {
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let mut args = rest.split_whitespace();

    let mut position = || -> std::result::Result<usize, String> {
        let arg = args.next().ok_or("missing position")?;
        match arg.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n - 1),
            _ => Err(format!("invalid position '{arg}'")),
        }
    };

    let cmd = match word {
        "attach" => Command::Attach(path_arg(rest, base)?),
        "attach-unowned" => Command::AttachUnowned(path_arg(rest, base)?),
        "attach-message" => Command::AttachMessage(path_arg(rest, base)?),
        "insert" => {
            let position = position()?;
            let mut it = rest.splitn(3, char::is_whitespace).skip(1);
            let level = it
                .next()
                .and_then(|l| l.parse().ok())
                .ok_or("missing or invalid level")?;
            let path = path_arg(it.next().unwrap_or("").trim(), base)?;
            Command::Insert {
                position,
                level,
                path,
            }
        }
        "delete" => Command::Delete(position()?),
        "swap" => Command::Swap(position()?),
        "up" => Command::MoveUp(position()?),
        "down" => Command::MoveDown(position()?),
        "tag" => {
            let mut positions = Vec::new();
            while let Ok(p) = position() {
                positions.push(p);
            }
            if positions.is_empty() || positions.len() != rest.split_whitespace().count() {
                return Err("tag needs one or more valid positions".to_string());
            }
            Command::Tag(positions)
        }
        "untag-all" => Command::UntagAll,
        "collapse" => Command::Collapse(position()?),
        "group-alternatives" => Command::GroupAlternatives,
        "group-multilingual" => Command::GroupMultilingual,
        "describe" => {
            let p = position()?;
            Command::Describe(p, text_arg(rest))
        }
        "language" => {
            let p = position()?;
            Command::Language(p, text_arg(rest))
        }
        "encoding" => {
            let p = position()?;
            Command::Encoding(p, text_arg(rest))
        }
        "type" => {
            let p = position()?;
            Command::ContentType(p, text_arg(rest))
        }
        "disposition" => Command::Disposition(position()?),
        "unlink" => Command::Unlink(position()?),
        "rename" => {
            let p = position()?;
            Command::Rename(p, text_arg(rest))
        }
        "rename-file" => {
            let p = position()?;
            Command::RenameFile(p, path_arg(&text_arg(rest), base)?)
        }
        "recode" => Command::Recode(position()?),
        "update" => Command::Update(position()?),
        "update-tagged" => Command::UpdateTagged,
        "invalidate" => Command::Invalidate(position()?),
        "check" => Command::Check,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(cmd)
}

/// Everything after the first argument; `-` stands for an empty value.
fn text_arg(rest: &str) -> String {
    let text = rest
        .split_once(char::is_whitespace)
        .map_or("", |(_, t)| t.trim());
    if text == "-" {
        String::new()
    } else {
        text.to_string()
    }
}

fn path_arg(arg: &str, base: &Path) -> std::result::Result<PathBuf, String> {
    if arg.is_empty() {
        return Err("missing path".to_string());
    }
    let path = match arg.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().ok_or("no home directory")?.join(rest),
        None => PathBuf::from(arg),
    };
    Ok(if path.is_absolute() {
        path
    } else {
        base.join(path)
    })
}

/// Run one command against a session.
pub fn apply(
    ctx: &mut AttachmentContext,
    store: &mut MessageStore,
    cmd: &Command,
    prompt: &mut dyn Prompt,
) -> Result<Outcome> {
    debug!(?cmd, "Applying command");
    let selected = match cmd {
        Command::Attach(path) => ctx.attach(AttachmentNode::file(path)),
        Command::AttachUnowned(path) => ctx.attach_unowned(AttachmentNode::file(path)),
        Command::AttachMessage(path) => {
            let rc = store.add(load_message(path)?);
            let node = AttachmentNode::message(path, &rc);
            ctx.attach_unowned(node)
        }
        Command::Insert {
            position,
            level,
            path,
        } => ctx.insert_at(*position, AttachmentNode::file(path), *level)?,
        Command::Delete(p) => {
            ctx.delete(*p)?;
            return Ok(Outcome::Done);
        }
        Command::Swap(p) => {
            ctx.swap(*p)?;
            return Ok(Outcome::Done);
        }
        Command::MoveUp(p) => ctx.move_up(*p)?,
        Command::MoveDown(p) => ctx.move_down(*p)?,
        Command::Tag(positions) => {
            for &p in positions {
                ctx.resolve(p)?;
            }
            for &p in positions {
                ctx.toggle_tag(p)?;
            }
            return Ok(Outcome::Done);
        }
        Command::UntagAll => {
            ctx.untag_all();
            return Ok(Outcome::Done);
        }
        Command::Collapse(p) => {
            ctx.toggle_collapse(*p)?;
            *p
        }
        Command::GroupAlternatives => ctx.group_alternatives()?,
        Command::GroupMultilingual => ctx.group_multilingual(prompt)?,
        Command::Describe(p, text) => {
            ctx.set_description(*p, text)?;
            return Ok(Outcome::Done);
        }
        Command::Language(p, lang) => {
            ctx.set_language(*p, lang)?;
            return Ok(Outcome::Done);
        }
        Command::Encoding(p, enc) => {
            ctx.set_encoding(*p, enc)?;
            return Ok(Outcome::Done);
        }
        Command::ContentType(p, ct) => {
            ctx.set_content_type(*p, ct)?;
            return Ok(Outcome::Done);
        }
        Command::Disposition(p) => {
            ctx.toggle_disposition(*p)?;
            return Ok(Outcome::Done);
        }
        Command::Unlink(p) => {
            ctx.toggle_unlink(*p)?;
            return Ok(Outcome::Done);
        }
        Command::Rename(p, name) => {
            ctx.rename(*p, name)?;
            return Ok(Outcome::Done);
        }
        Command::RenameFile(p, path) => {
            ctx.rename_file(*p, path)?;
            return Ok(Outcome::Done);
        }
        Command::Recode(p) => {
            ctx.toggle_recode(*p)?;
            return Ok(Outcome::Done);
        }
        Command::Update(p) => {
            ctx.update_encoding_at(*p)?;
            return Ok(Outcome::Done);
        }
        Command::UpdateTagged => {
            ctx.update_tagged_encodings()?;
            return Ok(Outcome::Done);
        }
        Command::Invalidate(p) => {
            ctx.invalidate_content(*p)?;
            return Ok(Outcome::Done);
        }
        Command::Check => return Ok(Outcome::Checked(ctx.check_attachments(prompt)?)),
    };
    Ok(Outcome::Selected(selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComposeConfig;
    use crate::model::tree::MimeTree;
    use crate::prompt::{Answer, FixedAnswer};

    fn parse(text: &str) -> Result<Script> {
        Script::parse(text, Path::new("/base"))
    }

    #[test]
    fn test_parse_commands() {
        let script = parse(
            "# setup\n\
             attach notes.txt\n\
             \n\
             insert 2 1 sub dir/hello.html\n\
             tag 2 3\n\
             describe 1 Weekly   summary\n\
             language 2 -\n\
             group-alternatives\n",
        )
        .unwrap();
        let cmds: Vec<&Command> = script.commands().iter().map(|(_, c)| c).collect();
        assert_eq!(cmds[0], &Command::Attach(PathBuf::from("/base/notes.txt")));
        assert_eq!(
            cmds[1],
            &Command::Insert {
                position: 1,
                level: 1,
                path: PathBuf::from("/base/sub dir/hello.html")
            }
        );
        assert_eq!(cmds[2], &Command::Tag(vec![1, 2]));
        assert_eq!(cmds[3], &Command::Describe(0, "Weekly   summary".to_string()));
        assert_eq!(cmds[4], &Command::Language(1, String::new()));
        assert_eq!(cmds[5], &Command::GroupAlternatives);
        assert_eq!(script.commands()[0].0, 2);
        assert_eq!(script.len(), 6);
    }

    #[test]
    fn test_parse_errors_report_line() {
        for (text, line) in [
            ("attach a\nfrobnicate\n", 2),
            ("delete 0\n", 1),
            ("\n\nswap x\n", 3),
            ("tag\n", 1),
            ("tag 1 two\n", 1),
            ("attach\n", 1),
            ("insert 1 a b\n", 1),
        ] {
            match parse(text) {
                Err(ComposeError::Script { line: l, .. }) => assert_eq!(l, line, "{text:?}"),
                other => panic!("{text:?}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_apply_drives_context() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let mut tree = MimeTree::new();
        tree.push_top(AttachmentNode::file(dir.path().join("a.txt")));
        let mut ctx = AttachmentContext::new(tree, ComposeConfig::default());
        let mut store = MessageStore::new();
        let mut prompt = FixedAnswer(Answer::Yes);

        let script = Script::parse(
            "attach b.txt\nattach-unowned c.txt\ntag 2 3\ngroup-alternatives\ncheck\n",
            dir.path(),
        )
        .unwrap();
        let mut outcomes = Vec::new();
        for (_, cmd) in script.commands() {
            outcomes.push(apply(&mut ctx, &mut store, cmd, &mut prompt).unwrap());
        }
        assert_eq!(outcomes[3], Outcome::Selected(1));
        match &outcomes[4] {
            Outcome::Checked(report) => assert_eq!(report.checked, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ctx.len(), 4);
        assert!(ctx.entries()[3].unowned);
        ctx.verify().unwrap();

        let err = apply(&mut ctx, &mut store, &Command::Swap(0), &mut prompt).unwrap_err();
        assert!(matches!(err, ComposeError::FundamentalPart));
    }

    #[test]
    fn test_tag_with_bad_position_tags_nothing() {
        let (mut ctx, _) = crate::compose::tests::flat_ctx(&["a", "b", "c"]);
        let mut store = MessageStore::new();
        let mut prompt = FixedAnswer(Answer::Yes);
        let script = parse("tag 2 3 9\n").unwrap();
        let (_, cmd) = &script.commands()[0];
        let err = apply(&mut ctx, &mut store, cmd, &mut prompt).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidPosition { position: 8, len: 3 }));
        assert_eq!(ctx.tagged_count(), 0);
    }

    #[test]
    fn test_rename_file_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let mut tree = MimeTree::new();
        tree.push_top(AttachmentNode::file(dir.path().join("a.txt")));
        let mut ctx = AttachmentContext::new(tree, ComposeConfig::default());
        let mut store = MessageStore::new();

        let script = Script::parse("rename-file 1 renamed dir.txt\n", dir.path()).unwrap();
        let (_, cmd) = &script.commands()[0];
        assert_eq!(
            cmd,
            &Command::RenameFile(0, dir.path().join("renamed dir.txt"))
        );
        apply(&mut ctx, &mut store, cmd, &mut FixedAnswer(Answer::Yes)).unwrap();
        assert!(dir.path().join("renamed dir.txt").exists());
        assert!(!dir.path().join("a.txt").exists());
    }
}

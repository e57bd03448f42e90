//! Integration tests for the attachment context, session seeding, and scripts.

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use predicates::prelude::*;

use mimecompose::compose::AttachmentContext;
use mimecompose::config::ComposeConfig;
use mimecompose::error::{ComposeError, ErrorCategory};
use mimecompose::model::message::MessageStore;
use mimecompose::model::node::{AttachmentNode, Encoding};
use mimecompose::model::tree::MimeTree;
use mimecompose::parser::draft::load_draft;
use mimecompose::parser::manifest::Manifest;
use mimecompose::parser::script::{self, Outcome, Script};
use mimecompose::prompt::{Answer, FixedAnswer};

fn session(dir: &Path, names: &[&str]) -> AttachmentContext {
    let mut tree = MimeTree::new();
    for name in names {
        let path = dir.join(name);
        std::fs::write(&path, format!("{name}\n")).unwrap();
        tree.push_top(AttachmentNode::file(path));
    }
    AttachmentContext::new(tree, ComposeConfig::default())
}

fn shape(ctx: &AttachmentContext) -> Vec<(String, usize)> {
    ctx.view().into_iter().map(|r| (r.label, r.depth)).collect()
}

fn s(label: &str, depth: usize) -> (String, usize) {
    (label.to_string(), depth)
}

fn path_at(ctx: &AttachmentContext, view: usize) -> PathBuf {
    ctx.node(view).unwrap().path().unwrap().to_path_buf()
}

// ─── Scenario A: attach, then swap(0) is refused ───────────────────

#[test]
fn test_attach_then_swap_first_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path(), &["a.txt"]);
    std::fs::write(dir.path().join("b.txt"), "b\n").unwrap();

    let at = ctx.attach(AttachmentNode::file(dir.path().join("b.txt")));
    assert_eq!(at, 1);
    assert_eq!(shape(&ctx), vec![s("a.txt", 0), s("b.txt", 0)]);

    let err = ctx.swap(0).unwrap_err();
    assert!(matches!(err, ComposeError::FundamentalPart));
    assert_eq!(err.category(), ErrorCategory::PreconditionRejected);
    assert_eq!(shape(&ctx), vec![s("a.txt", 0), s("b.txt", 0)]);
    ctx.verify().unwrap();
}

// ─── Scenario B: group tagged parts as alternatives ─────────────────

#[test]
fn test_group_alternatives_of_tagged_parts() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path(), &["a.txt", "b.txt", "c.txt"]);
    ctx.toggle_tag(1).unwrap();
    ctx.toggle_tag(2).unwrap();
    assert_eq!(ctx.tagged_count(), 2);

    let at = ctx.group_alternatives().unwrap();
    assert_eq!(at, 1);
    assert_eq!(
        shape(&ctx),
        vec![
            s("a.txt", 0),
            s("Alternatives for \"b.txt\"", 0),
            s("b.txt", 1),
            s("c.txt", 1),
        ]
    );
    assert_eq!(ctx.node(1).unwrap().content_type(), "multipart/alternative");
    assert_eq!(ctx.tagged_count(), 0);
    ctx.verify().unwrap();
}

#[test]
fn test_group_alternatives_of_unnamed_parts() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = MimeTree::new();
    let body = dir.path().join("body.txt");
    std::fs::write(&body, "body\n").unwrap();
    tree.push_top(AttachmentNode::file(body));
    tree.push_top(AttachmentNode::multipart("encrypted"));
    tree.push_top(AttachmentNode::multipart("encrypted"));
    let mut ctx = AttachmentContext::new(tree, ComposeConfig::default());
    assert_eq!(ctx.len(), 3);
    ctx.set_tag(1, true).unwrap();
    ctx.set_tag(2, true).unwrap();

    assert_eq!(ctx.group_alternatives().unwrap(), 1);
    let rows = ctx.view();
    assert_eq!(rows[1].label, "unknown alternative group");
    assert_eq!(rows[1].content_type, "multipart/alternative");
    assert_eq!(rows[2].depth, 1);
    assert_eq!(rows[3].depth, 1);
    ctx.verify().unwrap();
}

// ─── Scenario C: a missing file fails the check ─────────────────────

#[test]
fn test_check_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path(), &["a.txt", "b.txt", "c.txt"]);
    std::fs::remove_file(dir.path().join("c.txt")).unwrap();

    let err = ctx
        .check_attachments(&mut FixedAnswer(Answer::Yes))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationFailed);
    match err {
        ComposeError::AttachmentMissing { number, .. } => assert_eq!(number, 3),
        other => panic!("unexpected error: {other}"),
    }
}

// ─── Scenario D: a modified file is reclassified on request ─────────

#[test]
fn test_check_refreshes_modified_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path(), &["a.txt", "data.txt"]);
    let before = ctx.attachments_size();
    assert_eq!(ctx.node(1).unwrap().encoding, Encoding::SevenBit);

    // Rewritten behind the session's back with 8-bit content
    let data = path_at(&ctx, 1);
    std::fs::write(&data, "caf\u{e9} cr\u{e8}me br\u{fb}l\u{e9}e\n".repeat(20)).unwrap();
    ctx.node_mut(1).unwrap().stamp = Some(chrono::Utc::now() - chrono::Duration::hours(1));

    let err = ctx
        .check_attachments(&mut FixedAnswer(Answer::Abort))
        .unwrap_err();
    assert!(matches!(err, ComposeError::Cancelled));
    assert_eq!(ctx.node(1).unwrap().encoding, Encoding::SevenBit);
    assert_eq!(ctx.attachments_size(), before);

    let mut questions = Vec::new();
    let mut prompt = |q: &str, _d: Answer| {
        questions.push(q.to_string());
        Answer::Yes
    };
    let report = ctx.check_attachments(&mut prompt).unwrap();
    drop(prompt);
    assert_eq!(report.updated, vec![2]);
    assert_eq!(questions.len(), 1);
    assert!(questions[0].starts_with("Attachment #2 modified."));
    assert_eq!(ctx.node(1).unwrap().encoding, Encoding::QuotedPrintable);
    assert!(ctx.attachments_size() > before);
}

// ─── Structural invariants ──────────────────────────────────────────

#[test]
fn test_edits_keep_index_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path(), &["a.txt", "b.txt", "c.txt", "d.txt"]);

    ctx.toggle_tag(2).unwrap();
    ctx.toggle_tag(3).unwrap();
    ctx.group_alternatives().unwrap();
    ctx.verify().unwrap();

    std::fs::write(dir.path().join("e.txt"), "e\n").unwrap();
    ctx.insert_at(3, AttachmentNode::file(dir.path().join("e.txt")), 1)
        .unwrap();
    ctx.verify().unwrap();

    ctx.move_down(1).unwrap();
    ctx.verify().unwrap();
    assert_eq!(
        shape(&ctx),
        vec![
            s("a.txt", 0),
            s("Alternatives for \"c.txt\"", 0),
            s("e.txt", 1),
            s("c.txt", 1),
            s("d.txt", 1),
            s("b.txt", 0),
        ]
    );

    ctx.delete(1).unwrap();
    ctx.verify().unwrap();
    assert_eq!(shape(&ctx), vec![s("a.txt", 0), s("b.txt", 0)]);
    assert_eq!(ctx.tree().len(), 2);
}

#[test]
fn test_delete_sole_attachment_keeps_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path(), &["only.txt"]);
    let err = ctx.delete(0).unwrap_err();
    assert!(matches!(err, ComposeError::DeleteSoleAttachment));
    assert_eq!(ctx.len(), 1);
    assert!(dir.path().join("only.txt").exists());
}

// ─── Temporary files ────────────────────────────────────────────────

#[test]
fn test_discard_unlinks_only_owned_files() {
    let temp = assert_fs::TempDir::new().unwrap();
    let owned = temp.child("owned.txt");
    owned.write_str("temporary\n").unwrap();
    let mine = temp.child("mine.txt");
    mine.write_str("keep me\n").unwrap();
    let body = temp.child("body.txt");
    body.write_str("body\n").unwrap();

    let mut ctx = AttachmentContext::with_body(
        AttachmentNode::file(body.path()),
        ComposeConfig::default(),
    );
    let mut node = AttachmentNode::file(owned.path());
    node.unlink = true;
    ctx.attach(node);
    let mut node = AttachmentNode::file(mine.path());
    node.unlink = true;
    ctx.attach_unowned(node);

    ctx.discard();
    owned.assert(predicate::path::missing());
    mine.assert(predicate::path::exists());
    body.assert(predicate::path::exists());
}

#[test]
fn test_delete_unlinks_flagged_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let a = temp.child("a.txt");
    a.write_str("a\n").unwrap();
    let b = temp.child("b.txt");
    b.write_str("b\n").unwrap();

    let mut ctx = AttachmentContext::with_body(
        AttachmentNode::file(a.path()),
        ComposeConfig::default(),
    );
    ctx.attach(AttachmentNode::file(b.path()));
    assert!(ctx.toggle_unlink(1).unwrap());
    ctx.delete(1).unwrap();
    b.assert(predicate::path::missing());
    a.assert(predicate::path::exists());
}

// ─── Drafts ─────────────────────────────────────────────────────────

const DRAFT: &str = "From: Bob <bob@example.com>\r\n\
To: Carol <carol@example.com>\r\n\
Subject: Quarterly numbers\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: text/plain; charset=us-ascii\r\n\
\r\n\
Numbers attached.\r\n\
--outer\r\n\
Content-Type: text/csv; name=\"q3.csv\"\r\n\
Content-Disposition: attachment; filename=\"q3.csv\"\r\n\
\r\n\
month,total\r\n\
jul,10\r\n\
--outer--\r\n";

#[test]
fn test_draft_session_cleans_spool_on_discard() {
    let temp = assert_fs::TempDir::new().unwrap();
    let draft = temp.child("draft.eml");
    draft.write_str(DRAFT).unwrap();
    let spool = temp.child("spool");

    let settings = ComposeConfig::default();
    let (tree, store) = load_draft(draft.path(), spool.path(), &settings).unwrap();
    assert!(store.is_empty());
    let ctx = AttachmentContext::new(tree, settings);

    // The mixed root is unwrapped into two top-level parts
    let rows = ctx.view();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].content_type, "text/plain");
    assert_eq!(rows[1].content_type, "text/csv");
    assert_eq!(rows[1].label, "q3.csv");
    assert!(rows.iter().all(|r| r.unlink && r.depth == 0));

    let spooled: Vec<PathBuf> = (0..2).map(|i| path_at(&ctx, i)).collect();
    for path in &spooled {
        assert!(path.starts_with(spool.path()));
        assert!(path.exists());
    }
    ctx.verify().unwrap();

    ctx.discard();
    for path in &spooled {
        assert!(!path.exists(), "{} was not removed", path.display());
    }
    draft.assert(predicate::path::exists());
}

#[test]
fn test_draft_with_forwarded_message_cleans_spool() {
    let temp = assert_fs::TempDir::new().unwrap();
    let draft = temp.child("forward.eml");
    draft
        .write_str(
            "From: Bob <bob@example.com>\r\n\
             Subject: Fwd: Minutes\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
             \r\n\
             --outer\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             See below.\r\n\
             --outer\r\n\
             Content-Type: message/rfc822\r\n\
             \r\n\
             From: Carol <carol@example.com>\r\n\
             Subject: Minutes\r\n\
             \r\n\
             Nothing decided.\r\n\
             --outer--\r\n",
        )
        .unwrap();
    let spool = temp.child("spool");

    let settings = ComposeConfig::default();
    let (tree, store) = load_draft(draft.path(), spool.path(), &settings).unwrap();
    let ctx = AttachmentContext::new(tree, settings);
    assert_eq!(ctx.view()[1].label, "Minutes");
    let forwarded = path_at(&ctx, 1);
    assert!(forwarded.exists());

    ctx.discard();
    assert!(!forwarded.exists());
    assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 0);
    // The parsed message outlives the session
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.iter().next().unwrap().subject.as_deref(),
        Some("Minutes")
    );
}

// ─── Manifests and scripts ──────────────────────────────────────────

#[test]
fn test_manifest_and_script_session() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("body.txt").write_str("Hello\n").unwrap();
    temp.child("en.txt").write_str("Hello\n").unwrap();
    temp.child("fr.txt").write_str("Bonjour\n").unwrap();
    temp.child("notes.txt").write_str("notes\n").unwrap();
    temp.child("session.toml")
        .write_str(
            "[[part]]\npath = \"body.txt\"\nunowned = true\n\n\
             [[part]]\npath = \"en.txt\"\nlanguage = \"en\"\n\n\
             [[part]]\npath = \"fr.txt\"\nlanguage = \"fr\"\n",
        )
        .unwrap();
    temp.child("edit.script")
        .write_str(
            "# regroup the translations\n\
             tag 2 3\n\
             group-multilingual\n\
             describe 2 Greeting\n\
             swap 3\n\
             attach notes.txt\n",
        )
        .unwrap();

    let settings = ComposeConfig::default();
    let manifest = Manifest::load(temp.child("session.toml").path(), &settings).unwrap();
    let (mut ctx, mut store): (AttachmentContext, MessageStore) =
        manifest.into_context(settings);
    let script = Script::load(temp.child("edit.script").path()).unwrap();
    assert_eq!(script.len(), 5);

    let mut never = |q: &str, _: Answer| -> Answer { panic!("unexpected question: {q}") };
    let mut outcomes = Vec::new();
    for (_line, cmd) in script.commands() {
        outcomes.push(script::apply(&mut ctx, &mut store, cmd, &mut never).unwrap());
    }
    assert_eq!(outcomes[1], Outcome::Selected(1));
    // Attaching lands at the depth of the last entry, inside the group
    assert_eq!(outcomes[4], Outcome::Selected(4));
    ctx.verify().unwrap();
    assert_eq!(
        shape(&ctx),
        vec![
            s("body.txt", 0),
            s("Greeting", 0),
            s("fr.txt", 1),
            s("en.txt", 1),
            s("notes.txt", 1),
        ]
    );
    assert_eq!(ctx.node(1).unwrap().content_type(), "multipart/multilingual");
    assert!(ctx.view()[0].unowned);
}

#[test]
fn test_script_error_names_line() {
    let err = Script::parse("attach a.txt\nfrobnicate 3\n", Path::new("/tmp")).unwrap_err();
    match err {
        ComposeError::Script { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

//! CLI entry point for `mimecompose`.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use unicode_width::UnicodeWidthChar;

use mimecompose::compose::{AttachmentContext, ViewRow};
use mimecompose::config::{self, Config};
use mimecompose::content::check::CheckReport;
use mimecompose::model::message::MessageStore;
use mimecompose::parser::draft::load_draft;
use mimecompose::parser::manifest::Manifest;
use mimecompose::parser::script::{self, Outcome, Script};
use mimecompose::prompt::{Answer, DefaultAnswer, FixedAnswer, Prompt};

#[derive(Parser)]
#[command(
    name = "mimecompose",
    version,
    about = "Inspect and rearrange the MIME parts of a message being composed"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the attachment list of a draft (.eml) or manifest (.toml)
    Show {
        session: PathBuf,
        #[arg(long)]
        json: bool,
        /// Classify every part to show encoded sizes
        #[arg(long)]
        sizes: bool,
    },
    /// Apply an edit script to a session and show the result
    Run {
        session: PathBuf,
        script: PathBuf,
        #[arg(long)]
        json: bool,
        /// Answer every question this way instead of asking
        #[arg(long, value_enum)]
        answer: Option<AnswerArg>,
        /// Report failing commands and carry on with the next one
        #[arg(long)]
        keep_going: bool,
    },
    /// Run the pre-send attachment check
    Check {
        session: PathBuf,
        #[arg(long)]
        json: bool,
        /// Answer every question this way instead of asking
        #[arg(long, value_enum)]
        answer: Option<AnswerArg>,
    },
    /// Show the configuration file location, optionally writing the defaults
    Config {
        #[arg(long)]
        write_default: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Clone, Copy, ValueEnum)]
enum AnswerArg {
    Yes,
    No,
    Abort,
}

impl From<AnswerArg> for Answer {
    fn from(a: AnswerArg) -> Self {
        match a {
            AnswerArg::Yes => Answer::Yes,
            AnswerArg::No => Answer::No,
            AnswerArg::Abort => Answer::Abort,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Show {
            session,
            json,
            sizes,
        } => cmd_show(&session, json, sizes, &config),
        Commands::Run {
            session,
            script,
            json,
            answer,
            keep_going,
        } => cmd_run(&session, &script, json, answer, keep_going, &config),
        Commands::Check {
            session,
            json,
            answer,
        } => cmd_check(&session, json, answer, &config),
        Commands::Config { write_default } => cmd_config(write_default),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().unwrap_or(Path::new("."));
    let log_name = log_path.file_name().unwrap_or("mimecompose.log".as_ref());
    if std::fs::create_dir_all(log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(log_dir, log_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Asks questions on the terminal.
struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str, default: Answer) -> Answer {
        let hint = match default {
            Answer::Yes => "[yes]/no/abort",
            Answer::No => "yes/[no]/abort",
            Answer::Abort => "yes/no/[abort]",
        };
        let stdin = std::io::stdin();
        loop {
            eprint!("{question} ({hint}): ");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return Answer::Abort,
                Ok(_) => {
                    if let Some(answer) = Answer::parse(&line, default) {
                        return answer;
                    }
                }
            }
        }
    }
}

/// Pick a prompt: the fixed `--answer`, the terminal, or each question's default.
fn make_prompt(answer: Option<AnswerArg>) -> Box<dyn Prompt> {
    match answer {
        Some(a) => Box::new(FixedAnswer(a.into())),
        None if std::io::stdin().is_terminal() => Box::new(StdinPrompt),
        None => Box::new(DefaultAnswer),
    }
}

/// Open a draft or manifest as a compose session.
fn open_session(path: &Path, config: &Config) -> anyhow::Result<(AttachmentContext, MessageStore)> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let is_manifest = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_manifest {
        let manifest = Manifest::load(path, &config.compose)?;
        Ok(manifest.into_context(config.compose.clone()))
    } else {
        let spool = config::spool_dir(config);
        let (tree, store) = load_draft(path, &spool, &config.compose)
            .with_context(|| format!("Failed to load draft {}", path.display()))?;
        Ok((AttachmentContext::new(tree, config.compose.clone()), store))
    }
}

/// Print the attachment list of a session.
fn cmd_show(path: &Path, json: bool, sizes: bool, config: &Config) -> anyhow::Result<()> {
    let (mut ctx, _store) = open_session(path, config)?;
    let total = (sizes || config.display.show_sizes).then(|| ctx.attachments_size());
    if json {
        print_view_json(&ctx.view(), total)?;
    } else {
        print_view_table(&ctx.view(), total, config);
    }
    ctx.discard();
    Ok(())
}

/// Apply a script to a session.
fn cmd_run(
    path: &Path,
    script_path: &Path,
    json: bool,
    answer: Option<AnswerArg>,
    keep_going: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let script = Script::load(script_path)?;
    let (mut ctx, mut store) = open_session(path, config)?;
    let mut prompt = make_prompt(answer);

    let mut failed = 0usize;
    for (line, cmd) in script.commands() {
        match script::apply(&mut ctx, &mut store, cmd, prompt.as_mut()) {
            Ok(Outcome::Checked(report)) if !json => print_check_table(&report),
            Ok(_) => {}
            Err(e) if keep_going => {
                failed += 1;
                eprintln!("  line {line}: {e}");
            }
            Err(e) => {
                ctx.discard();
                return Err(e).with_context(|| {
                    format!("{}:{line}", script_path.display())
                });
            }
        }
    }
    ctx.verify()?;

    let total = ctx.attachments_size();
    if json {
        print_view_json(&ctx.view(), Some(total))?;
    } else {
        print_view_table(&ctx.view(), Some(total), config);
        if failed > 0 {
            println!("  {failed} of {} command(s) failed", script.len());
        }
    }
    ctx.discard();
    Ok(())
}

/// Run the pre-send check on a session.
fn cmd_check(
    path: &Path,
    json: bool,
    answer: Option<AnswerArg>,
    config: &Config,
) -> anyhow::Result<()> {
    let (mut ctx, _store) = open_session(path, config)?;
    let mut prompt = make_prompt(answer);
    let result = ctx.check_attachments(prompt.as_mut());
    ctx.discard();
    let report = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_check_table(&report);
    }
    Ok(())
}

/// Show (and optionally create) the configuration file.
fn cmd_config(write_default: bool) -> anyhow::Result<()> {
    let path = config::config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    if write_default {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        config::save_config(&Config::default())?;
        println!("  Wrote default configuration to {}", path.display());
    } else {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mimecompose", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

/// Cut `s` to at most `width` terminal columns, marking the cut with `…`.
fn truncate_to_width(s: &str, width: usize) -> String {
    if width == 0 {
        return s.to_string();
    }
    let total: usize = s.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

/// Pad `s` with spaces to `width` terminal columns.
fn pad_to_width(s: &str, width: usize) -> String {
    let used: usize = s.chars().map(|c| c.width().unwrap_or(0)).sum();
    format!("{s}{}", " ".repeat(width.saturating_sub(used)))
}

/// Print the attachment list as a human-readable table.
fn print_view_table(rows: &[ViewRow], total: Option<u64>, config: &Config) {
    use humansize::{format_size, BINARY};

    println!();
    if rows.is_empty() {
        println!("  There are no attachments.");
        println!();
        return;
    }

    let label_width = match config.display.label_width {
        0 => rows.iter().map(|r| r.label.chars().count() + r.tree.len()).max().unwrap_or(0),
        w => w,
    };
    for row in rows {
        let flags = format!(
            "{}{}{}",
            if row.tagged { '*' } else { ' ' },
            if row.unlink { 'D' } else { ' ' },
            if row.collapsed { '+' } else { ' ' },
        );
        let tree = if config.display.tree_glyphs {
            row.tree.as_str()
        } else {
            ""
        };
        let label = truncate_to_width(&format!("{tree}{}", row.label), label_width);
        let size = match row.size {
            Some(s) if total.is_some() => format_size(s, BINARY),
            _ => String::new(),
        };
        println!(
            "  {:>3} {flags} {} [{}, {}, {}] {:>10}",
            row.number,
            pad_to_width(&label, label_width),
            row.content_type,
            row.encoding,
            row.disposition,
            size
        );
    }
    if let Some(total) = total {
        println!();
        println!("  {:<20} {}", "Attachments", rows.len());
        println!("  {:<20} {}", "Estimated size", format_size(total, BINARY));
    }
    println!();
}

/// Print the attachment list as JSON.
fn print_view_json(rows: &[ViewRow], total: Option<u64>) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "entries": rows,
        "total_size": total,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_check_table(report: &CheckReport) {
    let list = |nums: &[usize]| {
        nums.iter()
            .map(|n| format!("#{n}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!();
    println!("  {:<20} {}", "Parts checked", report.checked);
    if !report.updated.is_empty() {
        println!("  {:<20} {}", "Encoding updated", list(&report.updated));
    }
    if !report.stale_kept.is_empty() {
        println!("  {:<20} {}", "Modified, kept", list(&report.stale_kept));
    }
    println!();
}

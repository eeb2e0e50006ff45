//! CLI binary for handwrite.
//!
//! A thin shim over the library crate: parses arguments, sets up logging and
//! the progress bar, then hands off to [`handwrite::run_batch`] or the config
//! helpers.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use handwrite::{
    default_config_path, run_batch, setup_default_config, BatchPlan, BatchProgressCallback,
    Config, DocumentError, GeminiTranscriber, PageTranscriber, ProgressCallback, SetupOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar per document, one log line per page.
///
/// Pages finish out of order, so the bar only counts completions; the page
/// number is printed on each line.
struct CliProgressCallback {
    bar: ProgressBar,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.reset_elapsed();
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let head: String = msg.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        msg.to_string()
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_documents} document(s)…"))
        ));
    }

    fn on_document_start(&self, path: &Path, position: usize, total_documents: usize) {
        self.bar
            .set_prefix(format!("[{position}/{total_documents}] {}", display_name(path)));
        self.bar.set_message("extracting pages…");
    }

    fn on_pages_extracted(&self, _path: &Path, page_count: usize) {
        self.activate_bar(page_count);
    }

    fn on_page_complete(&self, page_num: usize, _completed: usize, total_pages: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}",
            green("✓"),
            page_num,
            total_pages
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, _completed: usize, total_pages: usize, error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&truncate(error, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, path: &Path, outcome: Result<&Path, &DocumentError>) {
        match outcome {
            Ok(output) => self.bar.println(format!(
                "{} {}  →  {}",
                green("✔"),
                display_name(path),
                bold(&output.display().to_string())
            )),
            Err(e) => self.bar.println(format!(
                "{} {}  {}",
                red("✘"),
                display_name(path),
                red(&truncate(&e.to_string(), 120))
            )),
        }
    }

    fn on_batch_complete(&self, _succeeded: usize, _failed: usize) {
        self.bar.finish_and_clear();
        let page_errors = self.page_errors.load(Ordering::SeqCst);
        if page_errors > 0 {
            eprintln!(
                "{} {} page(s) replaced by error placeholders",
                cyan("⚠"),
                page_errors
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Create ~/.config/handwrite/config.yaml and the default note template
  handwrite config --setup

  # Convert a single scan
  handwrite process lecture-03.pdf notes/

  # Convert a whole folder (recursively) with a project config
  handwrite process scans/ notes/ --config ./handwrite.yaml

  # Show the effective configuration
  handwrite config --show

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (also read from ./.env)
  HANDWRITE_CONFIG        Config file used by `process` and `config --show`
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override the log filter (e.g. handwrite=debug)
"#;

/// Convert handwritten notes (PDF, PNG, JPEG) to Markdown with Gemini.
#[derive(Parser, Debug)]
#[command(
    name = "handwrite",
    version,
    about = "Convert handwritten notes to Markdown using Gemini vision OCR",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "HANDWRITE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "HANDWRITE_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "HANDWRITE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a file or a directory of files to Markdown.
    Process(ProcessArgs),
    /// Create or inspect the configuration file.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// A PDF/PNG/JPEG file, or a directory searched recursively.
    input_path: PathBuf,

    /// Existing directory that receives one `.md` file per document.
    output_dir: PathBuf,

    /// Config file (default: ~/.config/handwrite/config.yaml).
    #[arg(long, env = "HANDWRITE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("action").multiple(false).args(["setup", "show"])))]
struct ConfigArgs {
    /// Write the default config file if it does not exist yet.
    #[arg(long)]
    setup: bool,

    /// Print the effective configuration as YAML.
    #[arg(long)]
    show: bool,

    /// Config file read by --show.
    #[arg(long, env = "HANDWRITE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would fight with the progress bar, so only errors
    // are shown while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Process(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Process(ref args) => run_process(args, show_progress, cli.quiet).await,
        Command::Config(ref args) => run_config(args, cli.quiet),
    }
}

async fn run_process(args: &ProcessArgs, show_progress: bool, quiet: bool) -> Result<ExitCode> {
    let plan = BatchPlan::prepare(&args.input_path, &args.output_dir)?;
    let config = Config::load_or_default(args.config.as_deref()).context("Invalid configuration")?;
    let transcriber: Arc<dyn PageTranscriber> =
        Arc::new(GeminiTranscriber::from_env(&config.gemini.model)?);

    let progress: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let summary = run_batch(&plan, &config, transcriber, progress).await;

    if !quiet {
        let mark = if summary.failure_count() == 0 {
            green("✔")
        } else if summary.success_count() == 0 {
            red("✘")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{} Processing complete: {} successful, {} failed",
            mark,
            bold(&summary.success_count().to_string()),
            summary.failure_count()
        );
        for (path, err) in &summary.failed {
            eprintln!("   {} {}", dim(&path.display().to_string()), red(&err.to_string()));
        }
    }

    Ok(ExitCode::from(summary.exit_code()))
}

fn run_config(args: &ConfigArgs, quiet: bool) -> Result<ExitCode> {
    if args.setup {
        let (path, outcome) = setup_default_config()?;
        if !quiet {
            match outcome {
                SetupOutcome::Created => eprintln!(
                    "{} Created default config at {}",
                    green("✔"),
                    bold(&path.display().to_string())
                ),
                SetupOutcome::AlreadyExists => eprintln!(
                    "{} Config already exists at {}",
                    cyan("◆"),
                    bold(&path.display().to_string())
                ),
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !args.show {
        return Ok(ExitCode::SUCCESS);
    }

    let path = match &args.config {
        Some(p) => p.clone(),
        None => default_config_path()?,
    };
    let config = Config::load(&path).context("Invalid configuration")?;
    let yaml = config.to_yaml()?;
    if !quiet {
        eprintln!("{}", dim(&format!("# {}", path.display())));
    }
    print!("{yaml}");
    Ok(ExitCode::SUCCESS)
}

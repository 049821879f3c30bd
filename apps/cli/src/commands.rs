//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use absorber_acquire::{BrowserFallback, Fetcher};
use absorber_core::{Orchestrator, ProgressReporter, render_text};
use absorber_extract::{Extractor, LegacyDocConverter, OcrAdapter};
use absorber_shared::{
    AppConfig, BrowserConfig, ConflictConfig, ExtractConfig, FetchConfig, InputOutcome, InputSpec,
    PipelineConfig, PipelineResult, browser_candidates, config_file_path, init_config, load_config,
    resolve_browser_executable,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// absorber: turn web pages and documents into one normalized text corpus.
#[derive(Parser)]
#[command(
    name = "absorber",
    version,
    about = "Ingest URLs and local documents into normalized text, with cross-source conflict hints.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest URLs and files, in order, into one text artifact.
    Ingest {
        /// URLs (scheme optional) or local paths.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Text artifact to write.
        #[arg(short, long, default_value = "raw_content.txt")]
        output: PathBuf,

        /// Also write the full result as JSON.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Concurrent inputs (0 = one per CPU).
        #[arg(long)]
        workers: Option<usize>,

        /// Browser executable for the fallback fetcher.
        #[arg(long, env = "ABSORBER_BROWSER")]
        browser_path: Option<PathBuf>,

        /// Size ceiling for files and downloads, in bytes.
        #[arg(long)]
        max_bytes: Option<u64>,

        /// Never escalate blocked fetches to a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Report which optional engines are usable.
    Probe,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so the spinner
/// and summary own stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "absorber=info",
        1 => "absorber=debug",
        _ => "absorber=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest {
            inputs,
            output,
            json,
            workers,
            browser_path,
            max_bytes,
            no_browser,
        } => {
            let overrides = Overrides {
                workers,
                browser_path,
                max_bytes,
                no_browser,
            };
            cmd_ingest(&inputs, &output, json.as_deref(), overrides).await
        }
        Command::Probe => cmd_probe().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Command-line values that take precedence over the config file.
struct Overrides {
    workers: Option<usize>,
    browser_path: Option<PathBuf>,
    max_bytes: Option<u64>,
    no_browser: bool,
}

impl Overrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(path) = &self.browser_path {
            config.browser.executable = Some(path.display().to_string());
        }
        if let Some(max) = self.max_bytes {
            config.extract.max_bytes = max;
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    inputs: &[String],
    output: &Path,
    json: Option<&Path>,
    overrides: Overrides,
) -> Result<()> {
    let mut config = load_config()?;
    overrides.apply(&mut config);

    let fetcher = Arc::new(Fetcher::new(FetchConfig::from(&config))?);
    let extractor = Extractor::new(ExtractConfig::from(&config), Arc::new(OcrAdapter::tesseract()))
        .with_loader(fetcher.clone());
    let mut orchestrator = Orchestrator::new(
        PipelineConfig::from(&config),
        fetcher,
        Arc::new(extractor),
        &ConflictConfig::from(&config),
    );

    if overrides.no_browser {
        info!("browser fallback disabled by flag");
    } else {
        let config_path = config_file_path().ok();
        let candidates = browser_candidates();
        match resolve_browser_executable(&mut config, config_path.as_deref(), &candidates) {
            Some(executable) => {
                info!(browser = %executable.display(), "browser fallback enabled");
                let mut browser = BrowserConfig::from(&config);
                browser.executable = Some(executable);
                orchestrator =
                    orchestrator.with_browser(Arc::new(BrowserFallback::chromium(browser)));
            }
            None => warn!("no browser executable found, blocked pages will not be retried"),
        }
    }

    let specs: Vec<InputSpec> = inputs.iter().map(|raw| InputSpec::new(raw.as_str())).collect();
    info!(inputs = specs.len(), output = %output.display(), "ingesting");

    let progress = Arc::new(CliProgress::new());
    let result = orchestrator.run(specs, progress).await;
    orchestrator.shutdown().await;

    std::fs::write(output, render_text(&result))
        .map_err(|e| eyre!("cannot write '{}': {e}", output.display()))?;
    if let Some(json_path) = json {
        let body = serde_json::to_string_pretty(&result)?;
        std::fs::write(json_path, body)
            .map_err(|e| eyre!("cannot write '{}': {e}", json_path.display()))?;
    }

    print_summary(&result, output);
    Ok(())
}

fn print_summary(result: &PipelineResult, output: &Path) {
    let failed = result
        .entries
        .iter()
        .filter(|e| matches!(e.outcome, InputOutcome::Failed { .. }))
        .count();

    println!();
    println!("  Ingestion finished.");
    println!("  Inputs:    {}", result.entries.len());
    println!("  Failed:    {failed}");
    println!("  Conflicts: {}", result.conflicts.len());
    println!("  Output:    {}", output.display());
    println!();
}

async fn cmd_probe() -> Result<()> {
    let mut config = load_config()?;

    let ocr = OcrAdapter::tesseract().probe().await;
    let legacy = LegacyDocConverter::new(config.extract.legacy_converter.clone()).probe().await;

    let config_path = config_file_path().ok();
    let candidates = browser_candidates();
    let browser = resolve_browser_executable(&mut config, config_path.as_deref(), &candidates);

    println!("OCR (tesseract):     {ocr}");
    println!("Legacy .doc convert: {legacy}");
    match browser {
        Some(path) => println!("Browser fallback:    {}", path.display()),
        None => println!("Browser fallback:    not found"),
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn input_done(
        &self,
        _index: usize,
        raw: &str,
        outcome: &InputOutcome,
        completed: usize,
        total: usize,
    ) {
        let status = match outcome {
            InputOutcome::Document(_) => "done",
            InputOutcome::Failed { .. } => "failed",
        };
        self.spinner.set_message(format!("[{completed}/{total}] {status}: {raw}"));
    }

    fn finished(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_flags_parse() {
        let cli = Cli::try_parse_from([
            "absorber",
            "-v",
            "ingest",
            "example.com",
            "./report.pdf",
            "--workers",
            "3",
            "--no-browser",
            "--json",
            "out.json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Ingest {
                inputs,
                output,
                json,
                workers,
                no_browser,
                ..
            } => {
                assert_eq!(inputs, vec!["example.com", "./report.pdf"]);
                assert_eq!(output, PathBuf::from("raw_content.txt"));
                assert_eq!(json, Some(PathBuf::from("out.json")));
                assert_eq!(workers, Some(3));
                assert!(no_browser);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn ingest_needs_an_input() {
        assert!(Cli::try_parse_from(["absorber", "ingest"]).is_err());
    }

    #[test]
    fn overrides_win_over_config() {
        let mut config = AppConfig::default();
        Overrides {
            workers: Some(2),
            browser_path: Some(PathBuf::from("/opt/chrome")),
            max_bytes: Some(1024),
            no_browser: false,
        }
        .apply(&mut config);

        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.browser.executable.as_deref(), Some("/opt/chrome"));
        assert_eq!(config.extract.max_bytes, 1024);
    }
}

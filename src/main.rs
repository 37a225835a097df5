// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use booktrans::app_config::{self, ChapterSelection, Config, Credentials};
use booktrans::app_controller::Controller;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "booktrans",
    version,
    about = "Translate books chapter by chapter with LLMs while keeping names and terms consistent",
    args_conflicts_with_subcommands = true,
    after_help = "\
Configuration is stored in conf.json by default. API keys are read from the
environment or a .env file: OPENROUTER_API_KEY, CUSTOM_ENDPOINT_KEY and
CUSTOM_ENDPOINT_URL."
)]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    translate: TranslateArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a directory of chapter files (default command)
    Translate(TranslateArgs),

    /// List the OpenRouter providers serving a model
    Providers {
        /// Model id, defaults to the configured model
        model: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate shell completions for booktrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: PathBuf,

    /// File with API keys as KEY=VALUE lines
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Args, Debug, Clone)]
struct TranslateArgs {
    /// Directory containing one file per chapter
    #[arg(value_name = "INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Output directory, defaults to `<INPUT_DIR>_translated`
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Re-translate chapters that already have output
    #[arg(short, long)]
    force: bool,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Token budget per chunk
    #[arg(long)]
    chunk_tokens: Option<usize>,

    /// Number of chapters translated concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// Comma separated OpenRouter providers in rotation order
    #[arg(long, value_delimiter = ',')]
    providers: Option<Vec<String>>,

    /// Chapters to translate, e.g. `1,3,5-7`
    #[arg(long)]
    chapters: Option<String>,

    /// Language to translate into
    #[arg(short, long)]
    target_language: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Glyph and ANSI color for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("✖", "1;31"),
            Level::Warn => ("▲", "1;33"),
            Level::Info => ("•", "1;32"),
            Level::Debug => ("›", "1;36"),
            Level::Trace => ("·", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with("booktrans")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (glyph, color) = Self::style_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, glyph, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set through log::set_max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "booktrans", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Providers { model, common }) => run_providers(model, common).await,
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => run_translate(cli.translate).await,
    }
}

/// Load the config file, or write a default one when it does not exist yet
fn load_config(common: &CommonArgs) -> Result<Config> {
    let config = if common.config_path.exists() {
        Config::load(&common.config_path)?
    } else {
        warn!("Config file not found at {:?}, creating default config.", common.config_path);
        let config = Config::default();
        config
            .save(&common.config_path)
            .with_context(|| format!("Failed to write default config to file: {:?}", common.config_path))?;
        config
    };
    Ok(config)
}

fn apply_log_level(config: &mut Config, cli_level: Option<CliLogLevel>) {
    if let Some(level) = cli_level {
        config.log_level = level.into();
    }
    log::set_max_level(config.log_level.to_level_filter());
}

fn default_output_dir(input_dir: &Path) -> PathBuf {
    let name = input_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "book".to_string());
    input_dir
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{}_translated", name))
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    let input_dir = options
        .input_dir
        .clone()
        .ok_or_else(|| anyhow!("INPUT_DIR is required when no subcommand is specified"))?;

    let mut config = load_config(&options.common)?;
    apply_log_level(&mut config, options.common.log_level);

    // Override config with CLI options if provided
    if let Some(model) = options.model {
        if config.use_custom_endpoint {
            config.custom_endpoint_model = model;
        } else {
            config.model = model;
        }
    }
    if let Some(chunk_tokens) = options.chunk_tokens {
        config.chunk_tokens = chunk_tokens;
    }
    if let Some(workers) = options.workers {
        config.concurrent_workers = workers;
    }
    if let Some(providers) = options.providers {
        config.selected_providers = providers.into_iter().map(|p| p.trim().to_string()).collect();
    }
    if let Some(chapters) = options.chapters {
        config.chapter_selection = ChapterSelection::csv(chapters);
    }
    if let Some(target_language) = options.target_language {
        config.target_language = target_language;
    }

    let credentials = Credentials::from_env_file(&options.common.env_file);
    let controller = Controller::with_config(config, credentials).context("Configuration validation failed")?;

    let output_dir = options
        .output_dir
        .unwrap_or_else(|| default_output_dir(&input_dir));
    info!("Translating {:?} into {:?}", input_dir, output_dir);

    let report = controller.run(&input_dir, &output_dir, options.force).await?;

    if !report.skipped.is_empty() {
        info!("Skipped (already translated): {:?}", report.skipped);
    }
    if !report.cancelled.is_empty() {
        warn!("Not translated because of the stop request: {:?}", report.cancelled);
    }
    if report.failed.is_empty() {
        info!("Translated {} chapters", report.completed.len());
    } else {
        error!("Failed chapters: {:?}", report.failed);
    }

    Ok(())
}

async fn run_providers(model: Option<String>, common: CommonArgs) -> Result<()> {
    let mut config = load_config(&common)?;
    apply_log_level(&mut config, common.log_level);
    let model = model.unwrap_or_else(|| config.model.clone());

    let credentials = Credentials::from_env_file(&common.env_file);
    let controller = Controller::for_listing(config, credentials).context("Configuration validation failed")?;

    let endpoints = controller.list_providers(&model).await?;
    if endpoints.is_empty() {
        warn!("No providers found for {}", model);
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{:<28} {:<20} {:<8} {:>9} {:>8}  pricing", "id", "provider", "quant", "context", "uptime")?;
    for endpoint in endpoints {
        writeln!(
            stdout,
            "{:<28} {:<20} {:<8} {:>9} {:>8}  {}",
            endpoint.provider_id,
            endpoint.provider_name,
            endpoint.quantization,
            endpoint.context_length.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            endpoint.uptime.map(|u| format!("{:.1}%", u)).unwrap_or_else(|| "-".to_string()),
            endpoint.pricing.as_deref().unwrap_or("-")
        )?;
    }
    Ok(())
}

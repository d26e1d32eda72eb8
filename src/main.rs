use clap::Parser;
use eyre::{Context, Result, eyre};
use obsidize::pipeline::{DEFAULT_VAULT_DIR, SyncConfig};
use obsidize::ConsoleReporter;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Sync a Claude data export into an Obsidian vault as Markdown files.
/// Safe to re-run: only new or changed items are written, and edits made in
/// the vault are kept.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Unpacked export directory, or a conversations/projects JSON file.
    #[arg(value_name = "EXPORT")]
    export: PathBuf,

    /// Vault directory to write into.
    /// Defaults to ./obsidized if not set in config.
    #[arg(value_name = "VAULT")]
    vault: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/obsidize/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show the plan without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Treat every synced item as changed and re-append missing messages.
    #[arg(short, long)]
    force: bool,

    /// Worker threads used for writing (1 = sequential).
    /// Defaults to the number of CPUs.
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// More output; repeat for debug logs.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress bars and summaries.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    vault_dir: Option<PathBuf>,
    jobs: Option<usize>,
    source: Option<String>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("obsidize/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // RUST_LOG wins over -v
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let file_cfg = load_file_config(cli.config.as_deref())?;

    // CLI > Config > Default
    let vault_dir = cli
        .vault
        .or(file_cfg.vault_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_VAULT_DIR));
    let jobs = cli.jobs.or(file_cfg.jobs).unwrap_or_else(default_jobs);

    if !cli.export.exists() {
        return Err(eyre!("Export not found at: {}", cli.export.display()));
    }

    let mut config = SyncConfig::new(vault_dir);
    config.dry_run = cli.dry_run;
    config.force = cli.force;
    config.jobs = jobs.max(1);
    if let Some(source) = file_cfg.source {
        config.source = source;
    }

    let reporter = ConsoleReporter::new(cli.verbose > 0, cli.quiet);
    let summary = obsidize::run_path(&cli.export, &config, &reporter)?;

    if summary.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

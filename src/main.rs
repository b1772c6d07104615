use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repoarchive::config::{LoggingConfig, Overrides};
use repoarchive::health::CheckResult;
use repoarchive::{BackupEngine, Config, HealthCheck, PushStatus, RunReport, TreeOutcome, Watcher};

#[derive(Parser)]
#[command(name = "repoarchive")]
#[command(about = "Auto-commit local git working trees and mirror them into an archive repository")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backup: commit trees, mirror them, commit the archive (default)
    Run(RunArgs),

    /// Run a backup now and then on a fixed interval until Ctrl+C
    Watch {
        #[command(flatten)]
        run: RunArgs,

        /// Interval between runs, e.g. "30m", "1h" (overrides watch.interval)
        #[arg(long)]
        interval: Option<String>,
    },

    /// Write a configuration file
    Init {
        /// Archive repository receiving the mirrors
        #[arg(long, default_value = "~/archive")]
        archive: String,

        /// Working tree to back up (repeatable)
        #[arg(long = "source", value_name = "PATH")]
        sources: Vec<String>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Check git and the configured trees
    Doctor,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Working tree to back up; replaces the configured list (repeatable)
    #[arg(long = "source", value_name = "PATH")]
    sources: Vec<String>,

    /// Archive repository (overrides the configured one)
    #[arg(long, value_name = "PATH")]
    archive: Option<String>,

    /// Push each source tree after committing
    #[arg(long)]
    push: bool,

    /// Push the archive after committing
    #[arg(long)]
    push_archive: bool,
}

impl RunArgs {
    fn into_overrides(self, interval: Option<String>) -> Overrides {
        Overrides {
            sources: self.sources,
            archive: self.archive,
            push: self.push,
            push_archive: self.push_archive,
            interval,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        // Init writes the config, so it must not go through load_or_default
        Commands::Init {
            archive,
            sources,
            force,
        } => cmd_init(cli.config, archive, sources, force),
        Commands::Run(args) => {
            let config = prepare(cli.config, cli.verbose, Some(args.into_overrides(None)))?;
            cmd_run(config).await
        }
        Commands::Watch { run, interval } => {
            let config = prepare(cli.config, cli.verbose, Some(run.into_overrides(interval)))?;
            cmd_watch(config).await
        }
        Commands::Doctor => {
            let config = prepare(cli.config, cli.verbose, None)?;
            cmd_doctor(&config).await
        }
    }
}

/// Load the configuration, start logging and layer any command-line values
fn prepare(
    config_path: Option<PathBuf>,
    verbose: bool,
    overrides: Option<Overrides>,
) -> Result<Config> {
    let mut config = load_config(config_path)?;
    init_logging(verbose, &config.logging);
    info!("Starting repoarchive v{}", env!("CARGO_PKG_VERSION"));

    if let Some(overrides) = overrides {
        config.apply_overrides(overrides)?;
    }
    Ok(config)
}

/// Initialize logging. Warnings and errors go to stderr, everything else to
/// stdout. `RUST_LOG` takes precedence over `-v` and the configured level.
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(logging.color))
        .with(filter)
        .init();
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

fn cmd_init(
    config_path: Option<PathBuf>,
    archive: String,
    sources: Vec<String>,
    force: bool,
) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if config_path.exists() && !force {
        println!("⚠️  Configuration already exists: {}", config_path.display());
        println!("   Use --force to overwrite it");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let config = Config {
        sources,
        archive,
        ..Default::default()
    };
    config.save(&config_path)?;

    println!("✅ Configuration written to {}", config_path.display());
    println!("   Archive: {}", config.archive);
    println!("   Sources: {}", config.sources.len());
    println!("   Next: run 'repoarchive doctor', then 'repoarchive run'");

    Ok(())
}

/// One backup run. Per-tree failures are reported but never change the
/// exit status.
async fn cmd_run(config: Config) -> Result<()> {
    let engine = BackupEngine::new(config);
    let report = engine.run().await;
    print_report(&report);
    Ok(())
}

async fn cmd_watch(config: Config) -> Result<()> {
    let mut watcher = Watcher::new(config)?;
    println!(
        "🔁 Backing up every {}s (Ctrl+C to stop)",
        watcher.period().as_secs()
    );

    watcher.run().await?;

    let stats = watcher.stats();
    println!(
        "🛑 Stopped after {} run(s): {} commit(s), {} run(s) with failures",
        stats.runs, stats.commits, stats.runs_with_failures
    );
    Ok(())
}

async fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config).await;
    print_health_report(&health);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("📦 Backup finished in {:.2}s", report.duration.as_secs_f64());
    println!("   📝 Commits: {}", report.committed());
    println!("   📁 Mirrors: {}", report.mirrored());
    println!("   ⏭️  Skipped: {}", report.skipped());
    println!("   ❌ Failed: {}", report.failed());

    let failures: Vec<_> = report
        .outcomes()
        .filter_map(|outcome| match outcome {
            TreeOutcome::Failed { path, error } => Some((path, error.as_str())),
            TreeOutcome::Committed {
                path,
                push: PushStatus::Failed(error),
                ..
            } => Some((path, error.as_str())),
            _ => None,
        })
        .collect();

    if !failures.is_empty() {
        println!("\n🔍 Problems:");
        for (path, error) in failures {
            println!("   ❌ {}: {}", path.display(), error);
        }
    }
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 repoarchive System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(&name, result);
        println!();
    }

    let errors = health.errors().len();
    let warnings = health.warnings().len();
    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed: {} error(s)", errors);
    }
    if warnings > 0 {
        println!("⚠️  {} warning(s); affected trees will be skipped", warnings);
    }
}

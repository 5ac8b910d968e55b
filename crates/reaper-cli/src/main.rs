mod cmd;
mod locate;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use settings::{PolicyArgs, SourceArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "reaper",
    about = "Retire stale container images without deleting anything still running",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest reaper.yaml walking up from cwd)
    #[arg(long, global = true, env = "REAPER_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and print the deletion plan without touching the registry
    Plan {
        #[command(flatten)]
        sources: SourceArgs,
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Plan, then delete (dry run unless --dry-run false)
    Run {
        #[command(flatten)]
        sources: SourceArgs,
        #[command(flatten)]
        policy: PolicyArgs,

        /// Only report what would be deleted; only the word `false` deletes
        #[arg(long, env = "DRYRUN", value_name = "BOOL", value_parser = settings::parse_dry_run)]
        dry_run: Option<bool>,
    },

    /// Print the merged set of images currently in use
    Active {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Inspect and validate reaper.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Run { .. } => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = locate::resolve_config(cli.config.as_deref());
    let config_path = config_path.as_deref();

    let result = match cli.command {
        Commands::Plan { sources, policy } => cmd::plan::run(config_path, &sources, &policy, cli.json),
        Commands::Run {
            sources,
            policy,
            dry_run,
        } => cmd::run::run(config_path, &sources, &policy, dry_run, cli.json),
        Commands::Active { sources } => cmd::active::run(config_path, &sources, cli.json),
        Commands::Config { subcommand } => {
            cmd::config::run(cli.config.as_deref(), config_path, subcommand, cli.json)
        }
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

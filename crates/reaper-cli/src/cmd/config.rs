use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use reaper_core::config::{Config, WarnLevel, CONFIG_FILE};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Validate,

    /// Show the effective configuration
    Show,

    /// Write a starter reaper.yaml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    explicit: Option<&Path>,
    found: Option<&Path>,
    subcmd: ConfigSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate => validate(found, json),
        ConfigSubcommand::Show => show(found, json),
        ConfigSubcommand::Init { force } => {
            let target = explicit
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            init(&target, force)
        }
    }
}

fn require(found: Option<&Path>) -> anyhow::Result<&Path> {
    found.ok_or_else(|| anyhow::anyhow!("no {CONFIG_FILE} found; run 'reaper config init'"))
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(found: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let path = require(found)?;
    let config = Config::load(path).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "path": path,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(found: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = match found {
        Some(path) => Config::load(path).context("failed to load config")?,
        None => Config::default(),
    };

    if json {
        return print_json(&config);
    }

    let source = found
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_string());
    println!("Config:     {source}");
    println!("Keep:       {}", config.keep);
    println!("Dry run:    {}", config.dry_run);
    println!(
        "Region:     {}",
        config.region.as_deref().unwrap_or("(none)")
    );
    println!(
        "Inventory:  {}",
        config
            .inventory_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    let scopes = config.active_scopes();
    if scopes.is_empty() {
        println!("Active:     (none)");
    } else {
        println!("Active:");
        for scope in &scopes {
            println!("  {:<16} {}", scope.name, scope.path.display());
        }
    }
    println!(
        "Registry:   {}",
        config
            .registry
            .endpoint
            .as_deref()
            .unwrap_or("(from repository URI)")
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(target: &Path, force: bool) -> anyhow::Result<()> {
    if target.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", target.display());
    }
    Config::default()
        .save(target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    println!("Wrote {}.", target.display());
    Ok(())
}

use anyhow::Context;
use clap::Args;
use reaper_core::active::{collect_all, ActiveSource, FileActiveSource};
use reaper_core::config::{ActiveScope, Config, RegistryConfig};
use reaper_core::inventory::InventorySnapshot;
use reaper_core::reference::ReferenceFilter;
use reaper_core::{ActiveImageSet, Repository, RetentionPolicy};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Flags shared by plan / run / active
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Registry inventory snapshot (.json/.yaml): repositories with their images
    #[arg(long, env = "REAPER_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Running-image export, as NAME=PATH or PATH; repeat per account/region.
    /// Replaces the scopes listed in the config file.
    #[arg(long = "active", value_name = "SCOPE", value_parser = parse_scope)]
    pub active: Vec<ActiveScope>,

    /// Region used to derive repository URIs missing from the inventory
    #[arg(long, env = "REGION")]
    pub region: Option<String>,

    /// Track running images from any registry, not just ECR hosts
    #[arg(long)]
    pub any_registry: bool,
}

#[derive(Args, Debug, Default)]
pub struct PolicyArgs {
    /// Number of newest images to keep per repository
    #[arg(long, env = "IMAGES_TO_KEEP", allow_negative_numbers = true)]
    pub keep: Option<i64>,
}

fn parse_scope(raw: &str) -> Result<ActiveScope, String> {
    let (name, path) = match raw.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            (name.to_string(), PathBuf::from(path))
        }
        Some(_) => return Err(format!("expected NAME=PATH, got '{raw}'")),
        None => {
            let path = PathBuf::from(raw);
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(raw)
                .to_string();
            (name, path)
        }
    };
    Ok(ActiveScope { name, path })
}

/// `DRYRUN` and `--dry-run` only switch to live mode on the word `false`
/// (any case). `0`, `no`, `off` and anything else stay dry.
pub fn parse_dry_run(raw: &str) -> Result<bool, String> {
    Ok(!raw.trim().eq_ignore_ascii_case("false"))
}

// ---------------------------------------------------------------------------
// Settings: config file merged with flags
// ---------------------------------------------------------------------------

pub struct Settings {
    pub inventory: Option<PathBuf>,
    pub scopes: Vec<ActiveScope>,
    pub region: Option<String>,
    pub keep: i64,
    pub dry_run: bool,
    pub filter: ReferenceFilter,
    pub registry: RegistryConfig,
}

impl Settings {
    /// Flags and their env vars win over the config file, which wins over
    /// built-in defaults.
    pub fn resolve(
        config_path: Option<&Path>,
        sources: &SourceArgs,
        policy: &PolicyArgs,
        dry_run: Option<bool>,
    ) -> anyhow::Result<Self> {
        let config = load_config(config_path)?;

        let scopes = if sources.active.is_empty() {
            config.active_scopes()
        } else {
            sources.active.clone()
        };
        let filter = if sources.any_registry {
            ReferenceFilter::default()
        } else {
            config.reference_filter.clone()
        };

        Ok(Self {
            inventory: sources.inventory.clone().or_else(|| config.inventory_path()),
            scopes,
            region: sources.region.clone().or_else(|| config.region.clone()),
            keep: policy.keep.unwrap_or(config.keep),
            dry_run: dry_run.unwrap_or(config.dry_run),
            filter,
            registry: config.registry.clone(),
        })
    }

    pub fn policy(&self) -> anyhow::Result<RetentionPolicy> {
        RetentionPolicy::from_signed(self.keep).context("invalid retention policy")
    }

    pub fn collect_active(&self) -> anyhow::Result<ActiveImageSet> {
        let sources: Vec<Box<dyn ActiveSource>> = self
            .scopes
            .iter()
            .map(|scope| {
                Box::new(FileActiveSource::new(
                    scope.name.clone(),
                    scope.path.clone(),
                    self.filter.clone(),
                )) as Box<dyn ActiveSource>
            })
            .collect();
        if sources.is_empty() {
            tracing::warn!("no active scopes: no image is protected by activity");
        }
        collect_all(&sources).context("failed to collect active images")
    }

    pub fn load_repositories(&self) -> anyhow::Result<Vec<Repository>> {
        let path = self
            .inventory
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no inventory: pass --inventory or set it in reaper.yaml"))?;
        let snapshot = InventorySnapshot::load(path)
            .with_context(|| format!("failed to load inventory {}", path.display()))?;
        snapshot
            .into_repositories(self.region.as_deref())
            .context("invalid inventory")
    }
}

pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            Config::load(path).context("failed to load config")
        }
        None => Ok(Config::default()),
    }
}

use crate::error::{ReaperError, Result};
use crate::executor::Credentials;
use crate::planner::{RetentionPolicy, DEFAULT_KEEP};
use crate::reference::ReferenceFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const CONFIG_FILE: &str = "reaper.yaml";

const CONFIG_HEADER: &str = "# reaper: keep the newest `keep` images per repository, never delete\n\
# images referenced by the `active` scopes. Set dry_run: false to delete.\n";

pub const DEFAULT_PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ActiveScope
// ---------------------------------------------------------------------------

/// One place running workloads are exported from (an account, a region, a
/// cluster). All scopes are merged before planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveScope {
    pub name: String,
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Override for the registry base URL; otherwise taken from the repository URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Basic-auth user. For ECR this is `AWS` with the password from
    /// `aws ecr get-login-password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Environment variable holding the password. Never stored in the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

impl RegistryConfig {
    fn password_var(&self) -> &str {
        self.password_env.as_deref().unwrap_or(DEFAULT_PASSWORD_ENV)
    }

    pub fn credentials(&self) -> Result<Option<Credentials>> {
        let Some(username) = &self.username else {
            return Ok(None);
        };
        let var = self.password_var();
        let password = std::env::var(var).map_err(|_| ReaperError::Registry {
            repository: "*".to_string(),
            message: format!("registry password variable {var} is not set"),
        })?;
        Ok(Some(Credentials {
            username: username.clone(),
            password,
        }))
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Retention window per repository. Signed so a bad value is reported,
    /// not silently wrapped.
    #[serde(default = "default_keep")]
    pub keep: i64,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active: Vec<ActiveScope>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default = "ReferenceFilter::ecr")]
    pub reference_filter: ReferenceFilter,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

fn default_keep() -> i64 {
    DEFAULT_KEEP as i64
}

fn default_dry_run() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            keep: default_keep(),
            dry_run: default_dry_run(),
            region: None,
            inventory: None,
            active: Vec::new(),
            registry: RegistryConfig::default(),
            reference_filter: ReferenceFilter::ecr(),
            base_dir: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReaperError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&data)?;
        cfg.base_dir = path.parent().map(Path::to_path_buf);
        Ok(cfg)
    }

    /// Write the config next to its final location first and rename it into
    /// place, so a scheduled run never reads a half-written file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = serde_yaml::to_string(self)?;
        let with_path = |e: std::io::Error| {
            std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(with_path)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(with_path)?;
        tmp.write_all(CONFIG_HEADER.as_bytes()).map_err(with_path)?;
        tmp.write_all(body.as_bytes()).map_err(with_path)?;
        tmp.persist(path).map_err(|e| with_path(e.error))?;
        Ok(())
    }

    pub fn policy(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::from_signed(self.keep)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn inventory_path(&self) -> Option<PathBuf> {
        self.inventory.as_deref().map(|p| self.resolve(p))
    }

    pub fn active_scopes(&self) -> Vec<ActiveScope> {
        self.active
            .iter()
            .map(|scope| ActiveScope {
                name: scope.name.clone(),
                path: self.resolve(&scope.path),
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Keep count must be usable as a retention window
        if self.keep < 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("keep must be zero or greater (got {})", self.keep),
            });
        } else if self.keep == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "keep is 0: every image not in use is eligible for deletion"
                    .to_string(),
            });
        }

        // 2. Something to plan against
        if self.inventory.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no inventory configured; pass --inventory".to_string(),
            });
        }

        // 3. Without active scopes nothing is protected by activity
        if self.active.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no active scopes configured: running images will not be protected"
                    .to_string(),
            });
        }

        let mut seen = HashSet::new();
        for scope in &self.active {
            if !seen.insert(scope.name.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("duplicate active scope name '{}'", scope.name),
                });
            }
            let path = self.resolve(&scope.path);
            if self.base_dir.is_some() && !path.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "active scope '{}' file not found: {}",
                        scope.name,
                        path.display()
                    ),
                });
            }
        }

        // 4. Registry credentials
        if self.registry.username.is_some() && std::env::var(self.registry.password_var()).is_err()
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "registry.username is set but {} is not; live runs will fail",
                    self.registry.password_var()
                ),
            });
        }
        if let Some(endpoint) = &self.registry.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("registry.endpoint '{endpoint}' must start with http:// or https://"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

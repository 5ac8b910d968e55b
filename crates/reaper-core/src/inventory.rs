use crate::error::{ReaperError, Result};
use crate::model::{ecr_repository_uri, Digest, ImageRecord, Repository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One image as the registry lists it (`describe-images` `imageDetails`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetail {
    #[serde(default)]
    pub registry_id: Option<String>,
    #[serde(default)]
    pub repository_name: Option<String>,
    pub image_digest: String,
    #[serde(default)]
    pub image_tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_pushed_at")]
    pub image_pushed_at: DateTime<Utc>,
}

impl ImageDetail {
    fn into_record(self) -> ImageRecord {
        ImageRecord {
            digest: Digest::new(self.image_digest),
            tags: self.image_tags,
            pushed_at: self.image_pushed_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryEntry {
    pub registry_id: String,
    pub repository_name: String,
    #[serde(default)]
    pub repository_uri: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageDetail>,
}

/// Registry CLIs emit push times either as RFC 3339 text or epoch seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum PushedAt {
    Text(DateTime<Utc>),
    Epoch(f64),
}

fn deserialize_pushed_at<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match PushedAt::deserialize(deserializer)? {
        PushedAt::Text(t) => Ok(t),
        PushedAt::Epoch(secs) => {
            // Millisecond precision is all registries report.
            let millis = (secs * 1000.0).round();
            if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
                return Err(serde::de::Error::custom(format!("timestamp out of range: {secs}")));
            }
            DateTime::from_timestamp_millis(millis as i64)
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {secs}")))
        }
    }
}

// ---------------------------------------------------------------------------
// InventorySnapshot
// ---------------------------------------------------------------------------

/// A point-in-time listing of every repository and its images.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InventorySnapshot {
    #[serde(rename_all = "camelCase")]
    Repositories { repositories: Vec<RepositoryEntry> },
    #[serde(rename_all = "camelCase")]
    ImageDetails { image_details: Vec<ImageDetail> },
}

impl InventorySnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(serde_json::from_str(&data)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&data)?),
            other => Err(ReaperError::UnsupportedFormat(format!(
                "{} (extension {:?}; expected .json, .yaml or .yml)",
                path.display(),
                other.unwrap_or("")
            ))),
        }
    }

    /// Flatten into planner input. Repositories without a URI get an ECR URI
    /// derived from `region`; without a region that is an error.
    pub fn into_repositories(self, region: Option<&str>) -> Result<Vec<Repository>> {
        match self {
            InventorySnapshot::Repositories { repositories } => repositories
                .into_iter()
                .map(|entry| {
                    let uri = resolve_uri(
                        entry.repository_uri,
                        &entry.registry_id,
                        &entry.repository_name,
                        region,
                    )?;
                    let images = entry.images.into_iter().map(ImageDetail::into_record).collect();
                    Ok(Repository::new(entry.registry_id, entry.repository_name, uri)
                        .with_images(images))
                })
                .collect(),
            InventorySnapshot::ImageDetails { image_details } => {
                group_details(image_details, region)
            }
        }
    }
}

fn group_details(details: Vec<ImageDetail>, region: Option<&str>) -> Result<Vec<Repository>> {
    let mut repos: Vec<Repository> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for detail in details {
        let (Some(registry_id), Some(name)) =
            (detail.registry_id.clone(), detail.repository_name.clone())
        else {
            return Err(ReaperError::MalformedRecord {
                repository: detail.repository_name.unwrap_or_default(),
                reason: format!(
                    "image {} is missing registryId or repositoryName",
                    detail.image_digest
                ),
            });
        };

        let key = (registry_id.clone(), name.clone());
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                let uri = resolve_uri(None, &registry_id, &name, region)?;
                repos.push(Repository::new(registry_id, name, uri));
                index.insert(key, repos.len() - 1);
                repos.len() - 1
            }
        };
        repos[slot].images.push(detail.into_record());
    }
    Ok(repos)
}

fn resolve_uri(
    uri: Option<String>,
    registry_id: &str,
    name: &str,
    region: Option<&str>,
) -> Result<String> {
    match (uri, region) {
        (Some(uri), _) => Ok(uri),
        (None, Some(region)) => Ok(ecr_repository_uri(registry_id, region, name)),
        (None, None) => Err(ReaperError::MalformedRecord {
            repository: name.to_string(),
            reason: "repositoryUri is missing and no region is configured to derive it"
                .to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use crate::error::{ReaperError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// Content-addressed identifier of a stored image, e.g. `sha256:4f1c...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// ImageRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub digest: Digest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub pushed_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(digest: impl Into<String>, tags: &[&str], pushed_at: DateTime<Utc>) -> Self {
        Self {
            digest: Digest::new(digest),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            pushed_at,
        }
    }

    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub registry_id: String,
    pub name: String,
    /// Prefix for image references, e.g. `123456789012.dkr.ecr.ap-southeast-2.amazonaws.com/web`.
    pub uri: String,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
}

impl Repository {
    pub fn new(
        registry_id: impl Into<String>,
        name: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            registry_id: registry_id.into(),
            name: name.into(),
            uri: uri.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageRecord>) -> Self {
        self.images = images;
        self
    }

    /// `{uri}:{tag}`, the form running workloads refer to.
    pub fn image_reference(&self, tag: &str) -> String {
        format!("{}:{}", self.uri, tag)
    }

    /// Reject inventories the planner cannot reason about: empty digests or
    /// tags, a digest listed twice, or one tag pointing at two digests.
    pub fn validate(&self) -> Result<()> {
        let mut digests: HashSet<&Digest> = HashSet::new();
        let mut tag_owner: HashMap<&str, &Digest> = HashMap::new();

        for image in &self.images {
            if image.digest.as_str().trim().is_empty() {
                return Err(ReaperError::MalformedRecord {
                    repository: self.name.clone(),
                    reason: "empty image digest".to_string(),
                });
            }
            if !digests.insert(&image.digest) {
                return Err(ReaperError::DuplicateDigest {
                    repository: self.name.clone(),
                    digest: image.digest.to_string(),
                });
            }
            for tag in &image.tags {
                if tag.trim().is_empty() {
                    return Err(ReaperError::MalformedRecord {
                        repository: self.name.clone(),
                        reason: format!("empty tag on {}", image.digest),
                    });
                }
                if let Some(previous) = tag_owner.insert(tag.as_str(), &image.digest) {
                    if previous != &image.digest {
                        return Err(ReaperError::ConflictingTag {
                            repository: self.name.clone(),
                            tag: tag.clone(),
                            first: previous.to_string(),
                            second: image.digest.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Repository URI for an ECR registry when the inventory does not carry one.
pub fn ecr_repository_uri(registry_id: &str, region: &str, name: &str) -> String {
    format!("{registry_id}.dkr.ecr.{region}.amazonaws.com/{name}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

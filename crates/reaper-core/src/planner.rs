use crate::active::ActiveImageSet;
use crate::error::{ReaperError, Result};
use crate::model::{Digest, ImageRecord, Repository};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tag that is never selected for deletion.
pub const LATEST_TAG: &str = "latest";

pub const DEFAULT_KEEP: usize = 100;

// ---------------------------------------------------------------------------
// RetentionPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Size of the retention window: the newest `keep` images per repository.
    pub keep: usize,
}

impl RetentionPolicy {
    pub fn new(keep: usize) -> Self {
        Self { keep }
    }

    pub fn from_signed(keep: i64) -> Result<Self> {
        usize::try_from(keep)
            .map(Self::new)
            .map_err(|_| ReaperError::InvalidKeepCount(keep))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP)
    }
}

// ---------------------------------------------------------------------------
// DeletionPlan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryPlan {
    pub repository: String,
    pub registry_id: String,
    pub uri: String,
    /// Digests to delete, newest first, each at most once.
    pub digests: Vec<Digest>,
    /// `uri:tag` references going away with those digests. Informational.
    pub tag_refs: Vec<String>,
}

impl RepositoryPlan {
    fn for_repository(repo: &Repository) -> Self {
        Self {
            repository: repo.name.clone(),
            registry_id: repo.registry_id.clone(),
            uri: repo.uri.clone(),
            digests: Vec::new(),
            tag_refs: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty() && self.tag_refs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionPlan {
    pub keep: usize,
    /// Only repositories with something to delete, in input order.
    pub repositories: Vec<RepositoryPlan>,
}

impl DeletionPlan {
    pub fn get(&self, repository: &str) -> Option<&RepositoryPlan> {
        self.repositories.iter().find(|r| r.repository == repository)
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn digest_count(&self) -> usize {
        self.repositories.iter().map(|r| r.digests.len()).sum()
    }

    pub fn tag_count(&self) -> usize {
        self.repositories.iter().map(|r| r.tag_refs.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Compute which images can go. Pure: the same input always yields the
/// same plan.
pub fn plan(
    repositories: &[Repository],
    active: &ActiveImageSet,
    policy: RetentionPolicy,
) -> Result<DeletionPlan> {
    let mut planned = Vec::new();
    for repo in repositories {
        let repo_plan = plan_repository(repo, active, policy)?;
        tracing::info!(
            repository = %repo.name,
            images = repo.images.len(),
            digests = repo_plan.digests.len(),
            tags = repo_plan.tag_refs.len(),
            "planned repository"
        );
        if !repo_plan.is_empty() {
            planned.push(repo_plan);
        }
    }
    Ok(DeletionPlan {
        keep: policy.keep,
        repositories: planned,
    })
}

pub fn plan_repository(
    repo: &Repository,
    active: &ActiveImageSet,
    policy: RetentionPolicy,
) -> Result<RepositoryPlan> {
    repo.validate()?;

    // sort_by is stable: equal push times keep inventory order.
    let mut ranked: Vec<&ImageRecord> = repo.images.iter().collect();
    ranked.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));

    let protected = protected_digests(repo, active);
    let mut out = RepositoryPlan::for_repository(repo);
    let mut seen_digests: HashSet<&Digest> = HashSet::new();
    let mut seen_tags: HashSet<String> = HashSet::new();

    for (rank, image) in ranked.into_iter().enumerate().skip(policy.keep) {
        if image.is_untagged() {
            tracing::debug!(repository = %repo.name, rank, digest = %image.digest, "untagged, deleting");
            if seen_digests.insert(&image.digest) {
                out.digests.push(image.digest.clone());
            }
            continue;
        }

        // An empty protected set vetoes nothing.
        if protected.contains(&image.digest) {
            tracing::debug!(repository = %repo.name, rank, digest = %image.digest, "in use, keeping");
            continue;
        }

        for tag in image.tags.iter().filter(|t| t.as_str() != LATEST_TAG) {
            if seen_digests.insert(&image.digest) {
                out.digests.push(image.digest.clone());
            }
            let reference = repo.image_reference(tag);
            if seen_tags.insert(reference.clone()) {
                tracing::debug!(repository = %repo.name, rank, reference = %reference, "stale tag");
                out.tag_refs.push(reference);
            }
        }
    }

    Ok(out)
}

/// Digests in `repo` that at least one running workload references by tag.
/// Scans every image, inside the retention window or not.
pub fn protected_digests<'a>(repo: &'a Repository, active: &ActiveImageSet) -> HashSet<&'a Digest> {
    if active.is_empty() {
        return HashSet::new();
    }
    repo.images
        .iter()
        .filter(|image| {
            image
                .tags
                .iter()
                .any(|tag| active.contains(&repo.image_reference(tag)))
        })
        .map(|image| &image.digest)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

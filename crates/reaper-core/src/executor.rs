use crate::error::{ReaperError, Result};
use crate::model::Digest;
use crate::planner::{DeletionPlan, RepositoryPlan};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Most image ids the registry accepts in a single batch delete.
pub const MAX_BATCH: usize = 100;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFailure {
    pub digest: Digest,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDeleteOutput {
    pub deleted: Vec<Digest>,
    pub failures: Vec<ImageFailure>,
    /// Set when the batch stopped early; `deleted` still lists what went.
    pub fatal: Option<String>,
}

/// Mutating side of a registry. Per-image problems go in
/// [`BatchDeleteOutput::failures`], a mid-batch stop in
/// [`BatchDeleteOutput::fatal`]; `Err` means nothing was attempted.
pub trait Registry {
    fn batch_delete(&self, target: &RepositoryPlan, digests: &[Digest]) -> Result<BatchDeleteOutput>;
}

// ---------------------------------------------------------------------------
// HttpRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Deletes manifests through the Registry HTTP API v2
/// (`DELETE /v2/<name>/manifests/<digest>`).
pub struct HttpRegistry {
    client: reqwest::blocking::Client,
    endpoint: Option<String>,
    credentials: Option<Credentials>,
    insecure: bool,
}

impl HttpRegistry {
    pub fn new(
        endpoint: Option<String>,
        credentials: Option<Credentials>,
        insecure: bool,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("reaper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            credentials,
            insecure,
        })
    }

    /// Base URL for a repository: the configured endpoint, or the host part
    /// of the repository URI.
    fn base_url(&self, target: &RepositoryPlan) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let host = target
            .uri
            .split_once('/')
            .map(|(host, _)| host)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ReaperError::Registry {
                repository: target.repository.clone(),
                message: format!("cannot derive registry host from '{}'", target.uri),
            })?;
        let scheme = if self.insecure { "http" } else { "https" };
        Ok(format!("{scheme}://{host}"))
    }
}

impl Registry for HttpRegistry {
    fn batch_delete(&self, target: &RepositoryPlan, digests: &[Digest]) -> Result<BatchDeleteOutput> {
        let base = self.base_url(target)?;
        let mut output = BatchDeleteOutput::default();

        for digest in digests {
            let url = format!("{base}/v2/{}/manifests/{digest}", target.repository);
            let mut request = self.client.delete(&url);
            if let Some(creds) = &self.credentials {
                request = request.basic_auth(&creds.username, Some(&creds.password));
            }
            let response = match request.send() {
                Ok(response) => response,
                Err(e) => {
                    output.fatal = Some(format!("request for {digest} failed: {e}"));
                    break;
                }
            };
            let status = response.status();

            if status.is_success() {
                output.deleted.push(digest.clone());
                continue;
            }

            let reason = match status {
                StatusCode::NOT_FOUND => "image not found".to_string(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    // Every remaining delete would be refused the same way.
                    output.fatal = Some(format!("access denied ({status})"));
                    break;
                }
                _ => {
                    let body = response.text().unwrap_or_default();
                    let body = body.trim();
                    if body.is_empty() {
                        status.to_string()
                    } else {
                        format!("{status}: {}", truncate(body, 200))
                    }
                }
            };
            output.failures.push(ImageFailure {
                digest: digest.clone(),
                reason,
            });
        }
        Ok(output)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// ExecutionReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryOutcome {
    pub repository: String,
    pub requested: Vec<Digest>,
    pub tag_refs: Vec<String>,
    pub deleted: Vec<Digest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ImageFailure>,
    /// Set when processing stopped before every requested digest was tried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepositoryOutcome {
    fn new(plan: &RepositoryPlan) -> Self {
        Self {
            repository: plan.repository.clone(),
            requested: plan.digests.clone(),
            tag_refs: plan.tag_refs.clone(),
            deleted: Vec::new(),
            failures: Vec::new(),
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some() || !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub dry_run: bool,
    pub repositories: Vec<RepositoryOutcome>,
}

impl ExecutionReport {
    pub fn has_failures(&self) -> bool {
        self.repositories.iter().any(RepositoryOutcome::is_failed)
    }

    pub fn deleted_count(&self) -> usize {
        self.repositories.iter().map(|r| r.deleted.len()).sum()
    }

    pub fn failed_repositories(&self) -> impl Iterator<Item = &RepositoryOutcome> {
        self.repositories.iter().filter(|r| r.is_failed())
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor<R: Registry> {
    registry: R,
}

impl<R: Registry> Executor<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// Carry out `plan`. Dry runs make no registry calls. A repository that
    /// fails is recorded in the report and the remaining ones still run.
    pub fn execute(&self, plan: &DeletionPlan, dry_run: bool) -> ExecutionReport {
        let repositories = plan
            .repositories
            .iter()
            .map(|repo_plan| {
                if dry_run {
                    tracing::info!(
                        repository = %repo_plan.repository,
                        digests = repo_plan.digests.len(),
                        "dry run, not deleting"
                    );
                    RepositoryOutcome::new(repo_plan)
                } else {
                    self.delete_repository(repo_plan)
                }
            })
            .collect();

        ExecutionReport {
            dry_run,
            repositories,
        }
    }

    fn delete_repository(&self, repo_plan: &RepositoryPlan) -> RepositoryOutcome {
        let mut outcome = RepositoryOutcome::new(repo_plan);

        for batch in repo_plan.digests.chunks(MAX_BATCH) {
            match self.registry.batch_delete(repo_plan, batch) {
                Ok(output) => {
                    for failure in &output.failures {
                        tracing::warn!(
                            repository = %repo_plan.repository,
                            digest = %failure.digest,
                            reason = %failure.reason,
                            "image delete failed"
                        );
                    }
                    outcome.deleted.extend(output.deleted);
                    outcome.failures.extend(output.failures);
                    if let Some(fatal) = output.fatal {
                        tracing::warn!(repository = %repo_plan.repository, error = %fatal, "batch stopped early");
                        outcome.error = Some(fatal);
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(repository = %repo_plan.repository, error = %e, "batch delete failed");
                    outcome.error = Some(e.to_string());
                    break;
                }
            }
        }

        tracing::info!(
            repository = %repo_plan.repository,
            deleted = outcome.deleted.len(),
            failed = outcome.failures.len(),
            "repository processed"
        );
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

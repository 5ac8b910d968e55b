use crate::output::{print_json, render_plan};
use crate::settings::{PolicyArgs, Settings, SourceArgs};
use anyhow::Context;
use reaper_core::DeletionPlan;
use std::path::Path;

pub fn run(
    config_path: Option<&Path>,
    sources: &SourceArgs,
    policy: &PolicyArgs,
    json: bool,
) -> anyhow::Result<()> {
    let settings = Settings::resolve(config_path, sources, policy, None)?;
    let plan = build_plan(&settings)?;

    if json {
        return print_json(&plan);
    }
    print!("{}", render_plan(&plan));
    Ok(())
}

/// Collection finishes completely before planning starts.
pub fn build_plan(settings: &Settings) -> anyhow::Result<DeletionPlan> {
    let policy = settings.policy()?;
    let active = settings.collect_active()?;
    let repositories = settings.load_repositories()?;
    tracing::info!(
        repositories = repositories.len(),
        active = active.len(),
        keep = policy.keep,
        "planning"
    );
    reaper_core::plan(&repositories, &active, policy).context("failed to plan deletions")
}

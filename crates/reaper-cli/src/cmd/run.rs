use crate::cmd::plan::build_plan;
use crate::output::{print_json, render_plan, render_report};
use crate::settings::{PolicyArgs, Settings, SourceArgs};
use anyhow::Context;
use reaper_core::{Executor, HttpRegistry};
use std::path::Path;

pub fn run(
    config_path: Option<&Path>,
    sources: &SourceArgs,
    policy: &PolicyArgs,
    dry_run: Option<bool>,
    json: bool,
) -> anyhow::Result<()> {
    let settings = Settings::resolve(config_path, sources, policy, dry_run)?;
    let plan = build_plan(&settings)?;

    // Credentials are only needed when something will actually be deleted.
    let credentials = if settings.dry_run || plan.is_empty() {
        None
    } else {
        settings
            .registry
            .credentials()
            .context("failed to read registry credentials")?
    };
    let registry = HttpRegistry::new(
        settings.registry.endpoint.clone(),
        credentials,
        settings.registry.insecure,
    )
    .context("failed to build registry client")?;

    let report = Executor::new(registry).execute(&plan, settings.dry_run);

    if json {
        print_json(&report)?;
    } else if report.dry_run {
        print!("{}", render_plan(&plan));
        println!("\nDry run: nothing was deleted. Re-run with --dry-run false to delete.");
    } else {
        print!("{}", render_report(&report));
    }

    let failed = report.failed_repositories().count();
    if failed > 0 {
        anyhow::bail!("{failed} repositor{} failed", if failed == 1 { "y" } else { "ies" });
    }
    Ok(())
}

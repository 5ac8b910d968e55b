use crate::output::print_json;
use crate::settings::{PolicyArgs, Settings, SourceArgs};
use std::path::Path;

pub fn run(config_path: Option<&Path>, sources: &SourceArgs, json: bool) -> anyhow::Result<()> {
    let settings = Settings::resolve(config_path, sources, &PolicyArgs::default(), None)?;
    let active = settings.collect_active()?;

    if json {
        return print_json(&active);
    }

    if active.is_empty() {
        println!("No active images found.");
        return Ok(());
    }
    for image in active.iter() {
        println!("{image}");
    }
    println!("\n{} active image(s) across {} scope(s)", active.len(), settings.scopes.len());
    Ok(())
}

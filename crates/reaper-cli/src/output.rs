use reaper_core::executor::{ExecutionReport, RepositoryOutcome};
use reaper_core::DeletionPlan;
use serde::Serialize;
use std::fmt::Write;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Summary table, then every digest and tag reference per repository.
pub fn render_plan(plan: &DeletionPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Keeping the newest {} image(s) per repository.", plan.keep);

    if plan.is_empty() {
        out.push_str("\nNothing to delete.\n");
        return out;
    }

    let mut table = Table::new(&["REPOSITORY", "DIGESTS", "TAGS"]);
    for repo in &plan.repositories {
        table.row(vec![
            repo.repository.clone(),
            repo.digests.len().to_string(),
            repo.tag_refs.len().to_string(),
        ]);
    }
    out.push('\n');
    out.push_str(&table.render());

    for repo in &plan.repositories {
        let _ = writeln!(out, "\n{}:", repo.repository);
        for digest in &repo.digests {
            let _ = writeln!(out, "  delete image {digest}");
        }
        for tag in &repo.tag_refs {
            let _ = writeln!(out, "  delete tag   {tag}");
        }
    }

    let _ = writeln!(
        out,
        "\nTotal: {} image(s), {} tag(s) in {}",
        plan.digest_count(),
        plan.tag_count(),
        repositories(plan.repositories.len())
    );
    out
}

// ---------------------------------------------------------------------------
// Execution report
// ---------------------------------------------------------------------------

fn status(outcome: &RepositoryOutcome) -> &'static str {
    match (&outcome.error, outcome.failures.is_empty()) {
        (Some(_), _) if outcome.deleted.is_empty() => "error",
        (Some(_), _) => "stopped",
        (None, false) => "partial",
        (None, true) => "ok",
    }
}

/// Per-repository counts, then the reason for every failed repository.
/// Deletions that happened before a repository stopped are still counted.
pub fn render_report(report: &ExecutionReport) -> String {
    if report.repositories.is_empty() {
        return "Nothing to delete.\n".to_string();
    }

    let mut table = Table::new(&["REPOSITORY", "REQUESTED", "DELETED", "FAILED", "STATUS"]);
    for outcome in &report.repositories {
        table.row(vec![
            outcome.repository.clone(),
            outcome.requested.len().to_string(),
            outcome.deleted.len().to_string(),
            outcome.failures.len().to_string(),
            status(outcome).to_string(),
        ]);
    }
    let mut out = table.render();

    for outcome in report.failed_repositories() {
        let _ = writeln!(out, "\n{}:", outcome.repository);
        if let Some(err) = &outcome.error {
            let _ = writeln!(out, "  error: {err}");
        }
        for failure in &outcome.failures {
            let _ = writeln!(out, "  {}: {}", failure.digest, failure.reason);
        }
    }

    let _ = writeln!(out, "\nDeleted {} image(s).", report.deleted_count());
    out
}

fn repositories(n: usize) -> String {
    if n == 1 {
        "1 repository".to_string()
    } else {
        format!("{n} repositories")
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Left-aligned columns; the first column is the repository name, the rest
/// are short counts or statuses.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(String::len).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let line = |cells: &[String]| -> String {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:w$}"))
                .collect();
            padded.join("  ").trim_end().to_string()
        };

        let mut out = String::new();
        let _ = writeln!(out, "{}", line(&self.headers));
        let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        let _ = writeln!(out, "{}", sep.join("  "));
        for row in &self.rows {
            let _ = writeln!(out, "{}", line(row));
        }
        out
    }
}

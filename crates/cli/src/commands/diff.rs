// `quire diff`: review a proposed replacement against the current text.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use quire_common::diff::lines::{line_hunks, render_unified, DiffHunk, DEFAULT_CONTEXT_LINES};
use serde::{Deserialize, Serialize};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Current document text.
    pub current: PathBuf,

    /// Proposed replacement.
    pub proposed: PathBuf,

    /// Unchanged lines shown around each change.
    #[arg(long, default_value_t = DEFAULT_CONTEXT_LINES)]
    pub context: usize,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffReport {
    pub current: String,
    pub proposed: String,
    pub added_lines: usize,
    pub removed_lines: usize,
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
}

pub fn run(args: DiffArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);

    match build_report(&args) {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn build_report(args: &DiffArgs) -> anyhow::Result<DiffReport> {
    let current = std::fs::read_to_string(&args.current)
        .with_context(|| format!("failed to read `{}`", args.current.display()))?;
    let proposed = std::fs::read_to_string(&args.proposed)
        .with_context(|| format!("failed to read `{}`", args.proposed.display()))?;

    Ok(compare(
        args.current.display().to_string(),
        args.proposed.display().to_string(),
        &current,
        &proposed,
        args.context,
    ))
}

fn compare(
    current_name: String,
    proposed_name: String,
    current: &str,
    proposed: &str,
    context: usize,
) -> DiffReport {
    let hunks = line_hunks(current, proposed, context);
    DiffReport {
        current: current_name,
        proposed: proposed_name,
        added_lines: hunks.iter().map(DiffHunk::added_lines).sum(),
        removed_lines: hunks.iter().map(DiffHunk::removed_lines).sum(),
        hunks,
    }
}

fn format_human(report: &DiffReport) -> String {
    if report.hunks.is_empty() {
        return "No changes.".into();
    }

    format!(
        "--- {}\n+++ {}\n{}{} insertion(s), {} deletion(s)",
        report.current,
        report.proposed,
        render_unified(&report.hunks),
        report.added_lines,
        report.removed_lines
    )
}

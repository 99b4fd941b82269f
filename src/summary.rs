//! Terminal rendering of launch reports and run results.
//!
//! Renderers are pure functions: structured data in, formatted [`String`]
//! out. Colors come from the `colored` crate and honor
//! `colored::control::set_override(false)` when `--no-color` is set or
//! stdout is piped.

use chrono::{DateTime, Local};
use colored::Colorize;

use crate::aggregate::{FairnessRunResults, PriorityRunResults, RunResults};
use crate::launcher::LaunchReport;
use crate::model::{StepCounts, STEP_COUNT};

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 24;

/// Width of the class column in result tables.
const CLASS_WIDTH: usize = 20;

/// Render the outcome of a launch.
///
/// # Layout
///
/// ```text
///   fairload launch
///
///   run_prefix..............: t
///   mode....................: fairness
///   engine..................: memory
///   window..................: 7s
///   submitted...............: 9
///   failed..................: 1
///
///   failures:
///     t-3...................: Failed to submit job 't-3': Request timed out
/// ```
pub fn render_launch(report: &LaunchReport, engine: &str) -> String {
    let mut lines = vec![
        String::new(),
        format!("  {}", "fairload launch".bold()),
        String::new(),
        format_metric_row("run_prefix", &report.run_prefix, PAD_WIDTH),
        format_metric_row("mode", &report.mode.to_string(), PAD_WIDTH),
        format_metric_row("engine", engine, PAD_WIDTH),
        format_metric_row("window", &format!("{}s", report.window.as_secs()), PAD_WIDTH),
        format_metric_row(
            "submitted",
            &report.submitted().to_string().green().to_string(),
            PAD_WIDTH,
        ),
    ];

    let failed = report.failed();
    let failed_str = if failed > 0 {
        failed.to_string().red().to_string()
    } else {
        failed.to_string()
    };
    lines.push(format_metric_row("failed", &failed_str, PAD_WIDTH));

    if report.is_partial() {
        lines.push(String::new());
        lines.push("  failures:".to_string());
        for outcome in report.failures() {
            let message = outcome
                .result
                .as_ref()
                .err()
                .map(ToString::to_string)
                .unwrap_or_default();
            lines.push(format_metric_row(
                &format!("  {}", outcome.job_id),
                &message.red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    lines.join("\n")
}

/// Render aggregated results as a per-class step table.
pub fn render_results(results: &RunResults, run_prefix: &str, at: DateTime<Local>) -> String {
    let (mode, rows) = match results {
        RunResults::Priority(r) => ("priority", priority_rows(r)),
        RunResults::Fairness(r) => ("fairness", fairness_rows(r)),
    };

    let mut lines = vec![
        String::new(),
        format!("  {}", "fairload status".bold()),
        String::new(),
        format_metric_row("run_prefix", run_prefix, PAD_WIDTH),
        format_metric_row("mode", mode, PAD_WIDTH),
        format_metric_row("total_jobs", &results.total_jobs().to_string(), PAD_WIDTH),
        format_metric_row("as_of", &at.format("%H:%M:%S").to_string(), PAD_WIDTH),
        String::new(),
    ];

    let step_headers: Vec<String> = (1..=STEP_COUNT).map(|s| format!("{:>7}", format!("step{s}"))).collect();
    lines.push(format!(
        "  {:<CLASS_WIDTH$} {:>6} {}",
        "class",
        "jobs",
        step_headers.join("")
    ));
    lines.push(format!("  {}", "\u{2500}".repeat(CLASS_WIDTH + 8 + 7 * STEP_COUNT)));

    for (class, jobs, steps) in rows {
        lines.push(format!(
            "  {:<CLASS_WIDTH$} {:>6} {}",
            truncate(&class, CLASS_WIDTH),
            jobs,
            render_steps(jobs, &steps)
        ));
    }

    if results.is_complete() {
        lines.push(String::new());
        lines.push(format!("  {}", "all jobs finished".green()));
    }

    lines.join("\n")
}

fn priority_rows(results: &PriorityRunResults) -> Vec<(String, u64, StepCounts)> {
    results
        .summaries
        .iter()
        .map(|s| (format!("priority {}", s.priority), s.job_count, s.steps))
        .collect()
}

fn fairness_rows(results: &FairnessRunResults) -> Vec<(String, u64, StepCounts)> {
    results
        .summaries
        .iter()
        .map(|s| (format!("{} (w={})", s.key, s.weight), s.job_count, s.steps))
        .collect()
}

/// Step counts, green where every job in the class has finished that step.
fn render_steps(jobs: u64, steps: &StepCounts) -> String {
    steps
        .as_array()
        .iter()
        .map(|&count| {
            let cell = format!("{count:>7}");
            if jobs > 0 && count == jobs {
                cell.green().to_string()
            } else if count > 0 {
                cell.yellow().to_string()
            } else {
                cell
            }
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 3).collect();
        format!("{kept}...")
    }
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  name..................: value"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}

//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Rewrite
//!
//! ```text
//! index.html (2 references)
//!     img[src]: sample-photo?w=200 → images/sample-photo.1k3m9x.200w.jpg (transformed)
//!     link[href]: favicon → icons/favicon.0q2b7z.180w.180h.png (cached)
//! Skipped drafts.html
//!     Unresolvable image reference "ghost" in img[src]
//!
//! Rewrote 2 references in 2 values on 1 page (1 skipped)
//! Cache: 1 cached, 1 transformed (2 total)
//! ```
//!
//! ## Check
//!
//! ```text
//! drafts.html
//!     Unresolvable image reference "ghost" in img[src]
//!
//! Checked 14 references on 3 pages: 1 problem
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and, where the CLI needs it, a `print_*` wrapper that writes
//! to stdout. Format functions are pure: no I/O, no side effects.

use crate::imaging::ArtifactStatus;
use crate::rewrite::{CheckReport, RewriteEvent, RewriteSummary};

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

fn status_label(status: ArtifactStatus) -> &'static str {
    match status {
        ArtifactStatus::Cached => "cached",
        ArtifactStatus::Transformed => "transformed",
        ArtifactStatus::Copied => "copied",
    }
}

// ============================================================================
// Rewrite
// ============================================================================

/// Format a single rewrite progress event as display lines.
pub fn format_rewrite_event(event: &RewriteEvent) -> Vec<String> {
    match event {
        RewriteEvent::PageRewritten { page, references } => {
            let mut lines = vec![format!("{} ({})", page, plural(references.len(), "reference"))];
            for r in references {
                lines.push(format!(
                    "    {}: {} → {} ({})",
                    r.location,
                    r.reference,
                    r.output,
                    status_label(r.status)
                ));
            }
            lines
        }
        RewriteEvent::PageSkipped { page, error } => {
            vec![format!("Skipped {page}"), format!("    {error}")]
        }
    }
}

/// Format the end-of-run summary.
pub fn format_summary(summary: &RewriteSummary) -> Vec<String> {
    let mut headline = format!(
        "Rewrote {} in {} on {}",
        plural(summary.references, "reference"),
        plural(summary.values, "value"),
        plural(summary.pages, "page")
    );
    if summary.pages_skipped > 0 {
        headline.push_str(&format!(" ({} skipped)", summary.pages_skipped));
    }
    vec![headline, format!("Cache: {}", summary.cache)]
}

pub fn print_summary(summary: &RewriteSummary) {
    println!();
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format a check report, grouping problems by page.
pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_page: Option<&str> = None;
    for problem in &report.problems {
        if current_page != Some(problem.page.as_str()) {
            lines.push(problem.page.clone());
            current_page = Some(problem.page.as_str());
        }
        lines.push(format!("    {}", problem.error));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }

    let verdict = if report.is_clean() {
        "ok".to_string()
    } else {
        plural(report.problems.len(), "problem")
    };
    lines.push(format!(
        "Checked {} on {}: {}",
        plural(report.references, "reference"),
        plural(report.pages, "page"),
        verdict
    ));
    lines
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

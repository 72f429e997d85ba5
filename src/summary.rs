//! Text summary builder for the end of a synchronous run.
//!
//! The JSON report on stdout is for machines; these lines go to stderr for
//! whoever is watching the progress view.

use crate::model::{FinalReport, OptimisationResponse};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

pub fn build_summary(report: &FinalReport) -> TextSummary {
    let mut lines = Vec::new();

    for done in &report.done {
        lines.push(describe_success(done));
    }
    for failed in &report.failed {
        lines.push(format!("{}: failed: {}", failed.for_item, failed.error));
    }
    if !report.pending.is_empty() {
        lines.push(format!("{} item(s) still in progress", report.pending.len()));
    }

    let old: u64 = report.done.iter().map(|d| d.old_bytes).sum();
    let new: u64 = report.done.iter().map(|d| d.new_bytes).sum();
    if old > 0 {
        lines.push(format!(
            "Total: {} -> {} ({})",
            human_bytes(old),
            human_bytes(new),
            percent_change(old, new)
        ));
    }

    TextSummary { lines }
}

fn describe_success(done: &OptimisationResponse) -> String {
    let mut line = format!("{}: ", done.for_item);
    if done.old_bytes > 0 {
        line.push_str(&format!(
            "{} -> {} ({})",
            human_bytes(done.old_bytes),
            human_bytes(done.new_bytes),
            percent_change(done.old_bytes, done.new_bytes)
        ));
    } else {
        line.push_str("optimised");
    }
    if let (Some(old), Some(new)) = (done.old_size, done.new_size) {
        if old != new {
            line.push_str(&format!(", {old} -> {new}"));
        }
    }
    if let Some(from) = done.converted_from.as_deref() {
        line.push_str(&format!(", converted from {from}"));
    }
    if done.path != done.for_item.as_str() {
        line.push_str(&format!(", saved to {}", done.path));
    }
    line
}

fn percent_change(old: u64, new: u64) -> String {
    let change = (new as f64 - old as f64) / old as f64 * 100.0;
    format!("{change:+.1}%")
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OptimisationResponseError, Size, WorkItem};

    #[test]
    fn successes_show_size_change_and_failures_their_error() {
        let report = FinalReport {
            done: vec![OptimisationResponse {
                for_item: WorkItem::file("/tmp/a.heic"),
                path: "/tmp/a.jpg".into(),
                converted_from: Some("heic".into()),
                old_bytes: 2_000_000,
                new_bytes: 500_000,
                old_size: Some(Size::new(4000, 3000)),
                new_size: Some(Size::new(2000, 1500)),
            }],
            failed: vec![OptimisationResponseError {
                for_item: WorkItem::file("/tmp/b.png"),
                error: "file is corrupt".into(),
            }],
            pending: Vec::new(),
        };

        let lines = build_summary(&report).lines;
        assert_eq!(
            lines[0],
            "/tmp/a.heic: 2.0 MB -> 500.0 KB (-75.0%), 4000x3000 -> 2000x1500, converted from heic, saved to /tmp/a.jpg"
        );
        assert_eq!(lines[1], "/tmp/b.png: failed: file is corrupt");
        assert_eq!(lines[2], "Total: 2.0 MB -> 500.0 KB (-75.0%)");
    }

    #[test]
    fn empty_report_has_no_total() {
        assert!(build_summary(&FinalReport::default()).lines.is_empty());
    }

    #[test]
    fn small_sizes_stay_in_bytes() {
        assert_eq!(human_bytes(999), "999 B");
        assert_eq!(human_bytes(1_500), "1.5 KB");
    }
}

//! Markdown trend report.
//!
//! Rendering is a pure function of the retained history and the target set.
//! Writing replaces only the managed region of an existing document.

use std::path::Path;

use crate::history::{replace_file, TimeSeries};
use crate::probe::Latency;
use crate::target::Target;

pub const REGION_BEGIN: &str = "<!-- vaporwatch:begin -->";
pub const REGION_END: &str = "<!-- vaporwatch:end -->";

/// Lower bound of the chart's y-axis, in ms.
const MIN_Y_AXIS_MS: u64 = 3000;

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub mask_addresses: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            mask_addresses: true,
        }
    }
}

/// Render the status table and latency chart.
pub fn render_report(series: &TimeSeries, targets: &[Target], options: &ReportOptions) -> String {
    let mut md = format!("# Latency monitor (last {} rounds)\n\n", series.len());

    let Some(latest) = series.latest() else {
        md.push_str("_No rounds recorded yet._\n");
        return md;
    };

    md.push_str("> ❌ / `null` mark a timeout or failure\n\n");

    md.push_str(&format!("## Latest round ({})\n\n", latest.key()));
    md.push_str("| Target | Latency (ms) | Status | Failure streak |\n|---|---|---|---|\n");

    for target in targets {
        let name = target.display_name(options.mask_addresses);
        let (latency, status) = match latest.latency_of(&target.label) {
            Some(Latency::Measured(ms)) => (ms.to_string(), "✅ up"),
            Some(Latency::Failed) => ("❌".to_string(), "❌ down"),
            Some(Latency::NotProbed) => ("–".to_string(), "⏭ skipped"),
            None => ("–".to_string(), "no data"),
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            name,
            latency,
            status,
            failure_streak(series, &target.label)
        ));
    }

    md.push_str("\n## Latency trend\n\n");
    md.push_str(&render_chart(series, targets, options));

    md
}

fn render_chart(series: &TimeSeries, targets: &[Target], options: &ReportOptions) -> String {
    let labels: Vec<String> = series
        .iter()
        .map(|r| format!("\"{}\"", r.timestamp.format("%H:%M:%S")))
        .collect();

    let observed_max = series
        .iter()
        .flat_map(|r| r.entries.iter())
        .filter_map(|e| match e.latency {
            Latency::Measured(ms) => Some(ms),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let y_max = observed_max.max(MIN_Y_AXIS_MS);

    let mut chart = String::from("```mermaid\nxychart-beta\n");
    chart.push_str("  title \"Latency (ms)\"\n");
    chart.push_str(&format!("  x-axis [{}]\n", labels.join(", ")));
    chart.push_str(&format!("  y-axis \"ms\" 0 --> {}\n", y_max));

    for target in targets {
        let points: Vec<String> = series
            .iter()
            .map(|r| match r.latency_of(&target.label) {
                Some(Latency::Measured(ms)) => ms.to_string(),
                _ => "null".to_string(),
            })
            .collect();
        let name = target.display_name(options.mask_addresses).replace('"', "'");
        chart.push_str(&format!("  line \"{}\" [{}]\n", name, points.join(", ")));
    }

    chart.push_str("```\n");
    chart
}

/// Failed rounds in a row for `label`, counting back from the latest round.
///
/// Rounds where the target was not probed or absent are skipped over.
pub fn failure_streak(series: &TimeSeries, label: &str) -> u32 {
    let mut streak = 0;
    for record in series.iter().rev() {
        match record.latency_of(label) {
            Some(Latency::Failed) => streak += 1,
            Some(Latency::Measured(_)) => break,
            Some(Latency::NotProbed) | None => continue,
        }
    }
    streak
}

/// Place `body` in the managed region of `existing`.
///
/// Without an existing document, or one lacking the markers, the result is a
/// fresh document holding only the region.
pub fn merge_managed_region(existing: Option<&str>, body: &str) -> String {
    let region = format!("{}\n{}{}\n", REGION_BEGIN, body, REGION_END);

    let Some(doc) = existing else {
        return region;
    };

    match (doc.find(REGION_BEGIN), doc.find(REGION_END)) {
        (Some(begin), Some(end)) if begin < end => {
            let after = &doc[end + REGION_END.len()..];
            let after = after.strip_prefix('\n').unwrap_or(after);
            format!("{}{}{}", &doc[..begin], region, after)
        }
        _ => region,
    }
}

/// Write the report, preserving content outside the managed region.
pub fn write_report(path: &Path, body: &str) -> std::io::Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(doc) => Some(doc),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let doc = merge_managed_region(existing.as_deref(), body);
    replace_file(path, doc.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{RoundEntry, RoundRecord};
    use chrono::{TimeZone, Utc};

    fn series(rounds: &[&[(&str, Latency)]]) -> TimeSeries {
        let mut series = TimeSeries::new();
        for (i, entries) in rounds.iter().enumerate() {
            series.push(RoundRecord {
                timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 8, i as u32, 30).unwrap(),
                entries: entries
                    .iter()
                    .map(|(label, latency)| RoundEntry {
                        label: label.to_string(),
                        latency: *latency,
                    })
                    .collect(),
            });
        }
        series
    }

    fn plain() -> ReportOptions {
        ReportOptions {
            mask_addresses: false,
        }
    }

    #[test]
    fn test_render_table_and_chart() {
        let targets = vec![
            Target::parse("a.example.com", 443).unwrap(),
            Target::parse("b.example.com", 443).unwrap(),
        ];
        let series = series(&[
            &[("a.example.com", Latency::Measured(120)), ("b.example.com", Latency::Failed)],
            &[("a.example.com", Latency::Measured(4500)), ("b.example.com", Latency::Failed)],
        ]);

        let md = render_report(&series, &targets, &plain());

        assert!(md.contains("# Latency monitor (last 2 rounds)"));
        assert!(md.contains("| a.example.com | 4500 | ✅ up | 0 |"), "{}", md);
        assert!(md.contains("| b.example.com | ❌ | ❌ down | 2 |"), "{}", md);
        assert!(md.contains("x-axis [\"08:00:30\", \"08:01:30\"]"));
        assert!(md.contains("y-axis \"ms\" 0 --> 4500"));
        assert!(md.contains("line \"a.example.com\" [120, 4500]"));
        assert!(md.contains("line \"b.example.com\" [null, null]"));
    }

    #[test]
    fn test_render_masks_and_handles_missing_targets() {
        let targets = vec![Target::parse("https://status.example.com", 443).unwrap()];
        let series = series(&[&[("https://old.example.com", Latency::Measured(5))]]);

        let md = render_report(&series, &targets, &ReportOptions::default());

        assert!(md.contains("| https://sta***com | – | no data | 0 |"), "{}", md);
        assert!(md.contains("line \"https://sta***com\" [null]"));
        assert!(md.contains("0 --> 3000"));
    }

    #[test]
    fn test_render_empty_series() {
        let md = render_report(&TimeSeries::new(), &[], &plain());
        assert!(md.contains("No rounds recorded yet"));
        assert!(!md.contains("mermaid"));
    }

    #[test]
    fn test_failure_streak_skips_unprobed_rounds() {
        let series = series(&[
            &[("a", Latency::Measured(1))],
            &[("a", Latency::Failed)],
            &[("a", Latency::NotProbed)],
            &[("a", Latency::Failed)],
        ]);
        assert_eq!(failure_streak(&series, "a"), 2);
        assert_eq!(failure_streak(&series, "b"), 0);
    }

    #[test]
    fn test_merge_managed_region() {
        let fresh = merge_managed_region(None, "body\n");
        assert_eq!(fresh, format!("{}\nbody\n{}\n", REGION_BEGIN, REGION_END));

        let existing = format!("# Intro\n\n{}\nold\n{}\n\nFooter\n", REGION_BEGIN, REGION_END);
        let merged = merge_managed_region(Some(&existing), "new\n");
        assert_eq!(
            merged,
            format!("# Intro\n\n{}\nnew\n{}\n\nFooter\n", REGION_BEGIN, REGION_END)
        );

        let unmanaged = merge_managed_region(Some("hand written"), "new\n");
        assert!(!unmanaged.contains("hand written"));
    }

    #[test]
    fn test_write_report_preserves_surroundings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("README.md");
        std::fs::write(&path, format!("Top\n{}\nx\n{}\nBottom\n", REGION_BEGIN, REGION_END)).unwrap();

        write_report(&path, "fresh\n").unwrap();

        let doc = std::fs::read_to_string(&path).unwrap();
        assert!(doc.starts_with("Top\n"));
        assert!(doc.contains("fresh\n"));
        assert!(doc.ends_with("Bottom\n"));
        assert!(!doc.contains("\nx\n"));
    }
}

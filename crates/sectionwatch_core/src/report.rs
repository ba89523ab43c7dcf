use std::cmp::Reverse;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::accumulator::ChangeRecord;
use crate::mediawiki::format_api_timestamp;
use crate::scanner::ScanSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportHeader {
    /// `None` when the report is rebuilt from a dump without a scan.
    pub examined: Option<usize>,
    pub changed: usize,
    pub generated_at: DateTime<Utc>,
}

impl ReportHeader {
    pub fn from_scan(summary: &ScanSummary, records: &[ChangeRecord]) -> Self {
        Self {
            examined: Some(summary.examined),
            changed: records.len(),
            generated_at: summary.finished_at,
        }
    }

    pub fn from_dump(records: &[ChangeRecord], generated_at: DateTime<Utc>) -> Self {
        Self {
            examined: None,
            changed: records.len(),
            generated_at,
        }
    }
}

/// Render the wikitext change report, highest priority first.
///
/// With a `wiki_url`, diff links are absolute `index.php` URLs so the local copy
/// is usable outside the wiki; without one they are `Special:Diff` links.
pub fn build(records: &[ChangeRecord], header: &ReportHeader, wiki_url: Option<&str>) -> String {
    let mut ordered: Vec<&ChangeRecord> = records.iter().collect();
    ordered.sort_by(|left, right| {
        Reverse(left.priority)
            .cmp(&Reverse(right.priority))
            .then_with(|| left.title.cmp(&right.title))
            .then_with(|| left.revision_id1.cmp(&right.revision_id1))
            .then_with(|| left.revision_id2.cmp(&right.revision_id2))
    });

    let mut out = String::new();
    let examined = header
        .examined
        .map(|count| count.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let _ = writeln!(
        out,
        "Generated at {}. Pages examined: {examined}. Pages changed: {}.",
        format_api_timestamp(header.generated_at),
        header.changed
    );

    if ordered.is_empty() {
        out.push_str("\nNo tracked section changes.\n");
        return out;
    }

    for record in ordered {
        let _ = writeln!(out, "\n== [[{}]] ==", record.title);
        let _ = writeln!(
            out,
            "Priority {}. {} ({} to {}).",
            record.priority,
            diff_link(record, wiki_url),
            format_api_timestamp(record.revision_time1),
            format_api_timestamp(record.revision_time2),
        );
        out.push_str(&record.narrative);
    }
    out
}

fn diff_link(record: &ChangeRecord, wiki_url: Option<&str>) -> String {
    if let Some(base) = wiki_url.map(|url| url.trim_end_matches('/')) {
        return if record.revision_id1 <= 0 {
            format!(
                "[{base}/index.php?oldid={} revision {}]",
                record.revision_id2, record.revision_id2
            )
        } else {
            format!(
                "[{base}/index.php?diff={}&oldid={} revisions {} to {}]",
                record.revision_id2, record.revision_id1, record.revision_id1, record.revision_id2
            )
        };
    }
    if record.revision_id1 <= 0 {
        format!(
            "[[Special:Diff/{}|revision {}]]",
            record.revision_id2, record.revision_id2
        )
    } else {
        format!(
            "[[Special:Diff/{}/{}|revisions {} to {}]]",
            record.revision_id1, record.revision_id2, record.revision_id1, record.revision_id2
        )
    }
}

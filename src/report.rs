//! The run summary (§3.1), grounded on `original_source/glacier.py`'s
//! `generate_summary`: a tabular report of per-branch leaf/bag counts and
//! per-run upload/skip totals, printed at the end of every mirror run. This
//! module only renders text — it collaborates with, but doesn't replace,
//! the out-of-scope restore/reporting pipeline named in §1.

use std::fmt::Write as _;

use crate::catalog::Catalog;

#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub uploaded_count: u64,
    pub uploaded_bytes: u64,
    pub skipped_count: u64,
    pub skipped_bytes: u64,
}

impl RunStats {
    pub fn record_upload(&mut self, bytes: u64) {
        self.uploaded_count += 1;
        self.uploaded_bytes += bytes;
    }

    pub fn record_skip(&mut self, bytes: u64) {
        self.skipped_count += 1;
        self.skipped_bytes += bytes;
    }
}

fn human_bytes(bytes: u64) -> String {
    byte_unit::Byte::from_u64(bytes)
        .get_appropriate_unit(byte_unit::UnitType::Binary)
        .to_string()
}

/// Renders the catalog-state table: one row per branch, leaf/bag counts and
/// total size, plus a totals row.
pub fn render_catalog_state(catalog: &Catalog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:>8} {:>8} {:>12}", "BRANCH", "LEAVES", "BAGS", "SIZE");

    let mut total_leaves = 0usize;
    let mut total_bags = std::collections::BTreeSet::new();
    let mut total_size = 0u64;

    for (branch, data) in &catalog.branches {
        let leaves = data.leaves.len();
        let bags: std::collections::BTreeSet<_> =
            data.leaves.values().filter_map(|l| l.bag_id).collect();
        let size: u64 = data.leaves.values().map(|l| l.size_bytes).sum();

        let _ = writeln!(
            out,
            "{:<40} {:>8} {:>8} {:>12}",
            branch,
            leaves,
            bags.len(),
            human_bytes(size)
        );

        total_leaves += leaves;
        total_bags.extend(bags);
        total_size += size;
    }

    let _ = writeln!(
        out,
        "{:<40} {:>8} {:>8} {:>12}",
        "TOTAL",
        total_leaves,
        total_bags.len(),
        human_bytes(total_size)
    );

    out
}

/// Renders the per-run execution report: how much was uploaded versus
/// skipped (because it was already committed and unchanged) per branch.
pub fn render_run_report(per_branch: &[(&str, RunStats)], dry_run: bool) -> String {
    let mode = if dry_run { "Dry Run" } else { "Real Run" };
    let mut out = String::new();
    let _ = writeln!(out, "Execution report ({mode})");
    let _ = writeln!(out, "{:<40} {:<20} {:<20}", "BRANCH", "UPLOADED", "SKIPPED");

    let mut totals = RunStats::default();
    for (branch, stats) in per_branch {
        let _ = writeln!(
            out,
            "{:<40} {:<20} {:<20}",
            branch,
            format!("{} ({})", stats.uploaded_count, human_bytes(stats.uploaded_bytes)),
            format!("{} ({})", stats.skipped_count, human_bytes(stats.skipped_bytes)),
        );
        totals.uploaded_count += stats.uploaded_count;
        totals.uploaded_bytes += stats.uploaded_bytes;
        totals.skipped_count += stats.skipped_count;
        totals.skipped_bytes += stats.skipped_bytes;
    }

    let _ = writeln!(
        out,
        "{:<40} {:<20} {:<20}",
        "TOTAL",
        format!("{} ({})", totals.uploaded_count, human_bytes(totals.uploaded_bytes)),
        format!("{} ({})", totals.skipped_count, human_bytes(totals.skipped_bytes)),
    );

    out
}

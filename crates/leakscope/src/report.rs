//! Report generation over a read-only view of ledger state.
//!
//! Every renderer consumes a [`Snapshot`], never the ledger itself, so the
//! console and HTML outputs always describe the same moment and rendering is
//! repeatable byte-for-byte.

pub mod console;
pub mod html;

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::ledger::AllocationRecord;

/// Total leaked bytes beyond which the report alert escalates.
pub const CRITICAL_LEAK_BYTES: usize = 10 * 1024;

/// How many ranked call sites the reports display.
pub const TOP_SITES_LIMIT: usize = 10;

/// Aggregate frequency of one allocation call site.
#[derive(Debug, Clone, Serialize)]
pub struct SiteStat {
    /// `file:line` key.
    pub site: String,
    pub count: u64,
    /// Share of all allocations, in percent.
    pub percent: f64,
}

/// Read-only view of ledger state consumed by every renderer.
///
/// The generation timestamp is part of the snapshot, not of the renderers,
/// so rendering one snapshot twice produces byte-identical output.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub generated_at: String,
    pub total_allocations: u64,
    pub total_deallocations: u64,
    /// Releases that matched no live record; non-zero values are surfaced
    /// as a warning in both reports.
    pub unmatched_releases: u64,
    pub active_allocations: u64,
    pub current_usage: usize,
    pub peak_usage: usize,
    pub leaked_bytes: usize,
    /// Ranked hottest call sites; empty when nothing was allocated.
    pub top_sites: Vec<SiteStat>,
    /// Unreleased records in address order.
    pub leaks: Vec<AllocationRecord>,
}

impl Snapshot {
    /// Whether the leak alert should use the elevated styling.
    pub fn critical(&self) -> bool {
        self.leaked_bytes > CRITICAL_LEAK_BYTES
    }
}

/// Ranks call sites by descending count, ties broken by the site key's
/// lexicographic order, truncated to [`TOP_SITES_LIMIT`].
///
/// Returns an empty ranking when nothing was allocated, so the percentage
/// math never divides by zero and the renderers omit the section entirely.
pub(crate) fn rank_sites(sites: &BTreeMap<String, u64>, total_allocations: u64) -> Vec<SiteStat> {
    if total_allocations == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(&str, u64)> = sites
        .iter()
        .map(|(site, &count)| (site.as_str(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    ranked
        .into_iter()
        .take(TOP_SITES_LIMIT)
        .map(|(site, count)| SiteStat {
            site: site.to_string(),
            count,
            percent: count as f64 * 100.0 / total_allocations as f64,
        })
        .collect()
}

/// Writes `snapshot` as pretty-printed JSON, the machine-readable artifact.
pub fn write_json_report(snapshot: &Snapshot, path: impl AsRef<Path>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)
}

//! Allocation bookkeeping: one record per observed allocation, plus the
//! aggregate counters and call-site frequencies derived from them.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use serde::Serialize;

use crate::report::{rank_sites, Snapshot};

/// Thread identity recorded on every allocation.
///
/// The ledger assumes a single logical thread of execution; tracking across
/// threads would replace this with the originating thread id.
pub const THREAD_ID_PLACEHOLDER: u64 = 1;

/// Allocations larger than this many bytes are labeled `Major` leaks.
pub const MAJOR_LEAK_BYTES: usize = 1024;

/// File and line an allocation was requested from, captured at the call
/// rather than inside the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
}

impl CallSite {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Captures the caller's location. Every function between here and the
    /// allocation call must be `#[track_caller]` for the attribution to
    /// reach the true call site.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }

    /// Site recorded when no location information is available.
    pub fn unknown() -> Self {
        Self {
            file: "unknown".to_string(),
            line: 0,
        }
    }

    /// `file:line` key used by the site frequency table.
    pub fn key(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One live-or-historical heap allocation.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationRecord {
    pub address: usize,
    pub size: usize,
    pub site: CallSite,
    pub timestamp: String,
    pub thread_id: u64,
    pub freed: bool,
}

impl AllocationRecord {
    /// Severity label used by the report renderers.
    pub fn severity(&self) -> &'static str {
        if self.size > MAJOR_LEAK_BYTES {
            "Major"
        } else {
            "Minor"
        }
    }
}

#[derive(Debug, Default)]
struct LedgerInner {
    allocations: BTreeMap<usize, AllocationRecord>,
    sites: BTreeMap<String, u64>,
    total_allocations: u64,
    total_deallocations: u64,
    unmatched_releases: u64,
    current_usage: usize,
    peak_usage: usize,
}

/// The allocation ledger: every allocate/free observation keyed by address,
/// with running and peak usage.
///
/// Methods lock internally, so a shared reference is all callers need. The
/// process-wide instance lives behind [`crate::global`]; tests construct
/// their own isolated ledgers with [`Ledger::new`].
///
/// Freed records are retained (marked `freed`) rather than erased, so they
/// stay visible in total counts while being excluded from the leak set.
#[derive(Debug, Default)]
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one allocation. An address seen before is overwritten, never
    /// merged: the underlying allocator reuses addresses after a release.
    pub fn record_allocation(&self, address: usize, size: usize, site: CallSite) {
        let timestamp = current_timestamp();
        let mut guard = self.lock();
        let inner = &mut *guard;

        *inner.sites.entry(site.key()).or_insert(0) += 1;

        let record = AllocationRecord {
            address,
            size,
            site,
            timestamp,
            thread_id: THREAD_ID_PLACEHOLDER,
            freed: false,
        };
        if let Some(stale) = inner.allocations.insert(address, record) {
            // A reused address whose previous release went unobserved would
            // otherwise keep inflating the running total forever.
            if !stale.freed {
                inner.current_usage = inner.current_usage.saturating_sub(stale.size);
            }
        }

        inner.total_allocations += 1;
        inner.current_usage += size;
        if inner.current_usage > inner.peak_usage {
            inner.peak_usage = inner.current_usage;
        }
    }

    /// Records one release. Unknown addresses and repeated releases of the
    /// same address are not errors: they are counted as unmatched and leave
    /// the running total untouched.
    pub fn record_deallocation(&self, address: usize) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.allocations.get_mut(&address) {
            Some(record) if !record.freed => {
                record.freed = true;
                inner.current_usage = inner.current_usage.saturating_sub(record.size);
                inner.total_deallocations += 1;
            }
            _ => inner.unmatched_releases += 1,
        }
    }

    /// Every record never matched by a release, in address order.
    ///
    /// The ordering is not semantically meaningful but the report renderers
    /// depend on it being stable. Idempotent: no ledger state changes.
    pub fn detect_leaks(&self) -> Vec<AllocationRecord> {
        self.lock()
            .allocations
            .values()
            .filter(|record| !record.freed)
            .cloned()
            .collect()
    }

    /// Read-only view of the current ledger state for report rendering.
    ///
    /// The generation timestamp is captured here, so rendering one snapshot
    /// twice produces byte-identical output.
    pub fn snapshot(&self) -> Snapshot {
        let generated_at = current_timestamp();
        let inner = self.lock();

        let leaks: Vec<AllocationRecord> = inner
            .allocations
            .values()
            .filter(|record| !record.freed)
            .cloned()
            .collect();
        let leaked_bytes = leaks.iter().map(|record| record.size).sum();

        Snapshot {
            generated_at,
            total_allocations: inner.total_allocations,
            total_deallocations: inner.total_deallocations,
            unmatched_releases: inner.unmatched_releases,
            active_allocations: inner.total_allocations - inner.total_deallocations,
            current_usage: inner.current_usage,
            peak_usage: inner.peak_usage,
            leaked_bytes,
            top_sites: rank_sites(&inner.sites, inner.total_allocations),
            leaks,
        }
    }

    pub fn total_allocations(&self) -> u64 {
        self.lock().total_allocations
    }

    pub fn total_deallocations(&self) -> u64 {
        self.lock().total_deallocations
    }

    /// Releases that matched no live record (including repeated releases of
    /// an already-freed address).
    pub fn unmatched_releases(&self) -> u64 {
        self.lock().unmatched_releases
    }

    /// Sum of sizes over records not yet matched by a release.
    pub fn current_usage(&self) -> usize {
        self.lock().current_usage
    }

    /// High-water mark of [`Ledger::current_usage`]; monotone.
    pub fn peak_usage(&self) -> usize {
        self.lock().peak_usage
    }

    pub fn active_allocations(&self) -> u64 {
        let inner = self.lock();
        inner.total_allocations - inner.total_deallocations
    }

    /// How many allocations were observed at `site` (a `file:line` key),
    /// regardless of whether they were later freed.
    pub fn site_occurrences(&self, site: &str) -> u64 {
        self.lock().sites.get(site).copied().unwrap_or(0)
    }

    /// Clears all records and counters. Test support.
    pub fn reset(&self) {
        *self.lock() = LedgerInner::default();
    }
}

fn current_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(line: u32) -> CallSite {
        CallSite::new("a.rs", line)
    }

    #[test]
    fn usage_tracks_unmatched_allocations() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x1000, 100, site(10));
        ledger.record_allocation(0x2000, 50, site(10));
        ledger.record_deallocation(0x1000);

        assert_eq!(ledger.current_usage(), 50);
        assert_eq!(ledger.peak_usage(), 150);
        assert_eq!(ledger.site_occurrences("a.rs:10"), 2);

        let leaks = ledger.detect_leaks();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].address, 0x2000);
        assert_eq!(leaks[0].size, 50);
    }

    #[test]
    fn peak_is_monotone_and_bounds_current() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x1, 400, site(1));
        assert_eq!(ledger.peak_usage(), 400);
        ledger.record_deallocation(0x1);
        assert_eq!(ledger.peak_usage(), 400);
        ledger.record_allocation(0x2, 100, site(2));
        assert_eq!(ledger.peak_usage(), 400);
        assert!(ledger.peak_usage() >= ledger.current_usage());
    }

    #[test]
    fn double_free_decrements_usage_exactly_once() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x10, 64, site(3));
        ledger.record_deallocation(0x10);
        ledger.record_deallocation(0x10);

        assert_eq!(ledger.current_usage(), 0);
        assert_eq!(ledger.total_deallocations(), 1);
        assert_eq!(ledger.unmatched_releases(), 1);
    }

    #[test]
    fn unknown_address_release_is_a_counted_noop() {
        let ledger = Ledger::new();
        ledger.record_deallocation(0xdead);
        assert_eq!(ledger.total_deallocations(), 0);
        assert_eq!(ledger.unmatched_releases(), 1);
        assert_eq!(ledger.current_usage(), 0);
    }

    #[test]
    fn active_count_cross_check() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x1, 10, site(1));
        ledger.record_allocation(0x2, 20, site(2));
        ledger.record_allocation(0x3, 30, site(3));
        ledger.record_deallocation(0x2);

        let unfreed = ledger.detect_leaks().len() as u64;
        assert_eq!(
            ledger.total_allocations() - ledger.total_deallocations(),
            unfreed
        );
        assert_eq!(ledger.active_allocations(), 2);
    }

    #[test]
    fn leak_detection_is_idempotent_and_address_ordered() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x30, 1, site(1));
        ledger.record_allocation(0x10, 2, site(2));
        ledger.record_allocation(0x20, 3, site(3));

        let first = ledger.detect_leaks();
        let second = ledger.detect_leaks();
        let addresses: Vec<usize> = first.iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![0x10, 0x20, 0x30]);
        assert_eq!(
            addresses,
            second.iter().map(|r| r.address).collect::<Vec<_>>()
        );
    }

    #[test]
    fn reused_address_overwrites_prior_record() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x40, 100, site(5));
        ledger.record_deallocation(0x40);
        ledger.record_allocation(0x40, 8, site(6));

        assert_eq!(ledger.current_usage(), 8);
        assert_eq!(ledger.total_allocations(), 2);
        let leaks = ledger.detect_leaks();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].size, 8);
        assert_eq!(leaks[0].site.line, 6);
    }

    #[test]
    fn reused_address_without_observed_release_keeps_usage_consistent() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x50, 100, site(7));
        // Release happened outside the hooks; the allocator handed the same
        // address out again.
        ledger.record_allocation(0x50, 40, site(8));

        assert_eq!(ledger.current_usage(), 40);
        assert_eq!(ledger.detect_leaks().len(), 1);
    }

    #[test]
    fn zero_size_allocation_is_recorded_as_is() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x60, 0, site(9));
        assert_eq!(ledger.total_allocations(), 1);
        assert_eq!(ledger.current_usage(), 0);
        assert_eq!(ledger.detect_leaks().len(), 1);
    }

    #[test]
    fn site_table_is_never_decremented() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x70, 16, site(11));
        ledger.record_deallocation(0x70);
        assert_eq!(ledger.site_occurrences("a.rs:11"), 1);
    }

    #[test]
    fn severity_threshold() {
        let ledger = Ledger::new();
        ledger.record_allocation(0x1, 1024, site(1));
        ledger.record_allocation(0x2, 1025, site(2));
        let leaks = ledger.detect_leaks();
        assert_eq!(leaks[0].severity(), "Minor");
        assert_eq!(leaks[1].severity(), "Major");
    }
}

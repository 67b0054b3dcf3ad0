//! A lightweight heap profiler: records every allocation a program makes,
//! classifies unreleased allocations as leaks, and renders the results as a
//! console summary and a self-contained HTML report.
//!
//! The crate has two halves. The runtime half is the allocation ledger and
//! its hooks ([`TracingAllocator`] for transparent whole-heap tracking,
//! [`traced_alloc`]/[`TracedBox`] for precise call-site attribution). The
//! static half is the source injector ([`inject::instrument_source`]), which
//! rewrites a target program so the report routines run just before its
//! normal exit; the `leakscope` binary drives the full instrument → compile
//! → run pipeline.
//!
//! ```rust
//! use leakscope::{Ledger, CallSite};
//!
//! let ledger = Ledger::new();
//! ledger.record_allocation(0x1000, 256, CallSite::new("demo.rs", 12));
//! assert_eq!(ledger.detect_leaks().len(), 1);
//! ```

pub mod error;
pub mod hooks;
pub mod inject;
pub mod ledger;
pub(crate) mod output;
pub mod report;

pub use error::InjectError;
pub use hooks::{traced_alloc, traced_dealloc, TracedBox, TracingAllocator};
pub use inject::{instrument_source, InjectOutcome, INSTRUMENTATION_MARKER};
pub use ledger::{AllocationRecord, CallSite, Ledger};
pub use output::{format_bytes, format_kb};
pub use report::{Snapshot, CRITICAL_LEAK_BYTES, TOP_SITES_LIMIT};

use std::sync::OnceLock;

/// Default file name for the HTML report artifact, overwritten on each run.
pub const HTML_REPORT_FILENAME: &str = "memory_report.html";

/// Default file name for the JSON report artifact.
pub const JSON_REPORT_FILENAME: &str = "memory_report.json";

/// When this environment variable is set, [`generate_html_report`] also
/// writes the JSON artifact. The CLI sets it for `--json` runs.
pub const JSON_REPORT_ENV: &str = "LEAKSCOPE_JSON";

static GLOBAL_LEDGER: OnceLock<Ledger> = OnceLock::new();

/// The process-wide ledger used by [`TracingAllocator`] and by the report
/// calls the source injector emits.
///
/// Created lazily on first use and never torn down; reports are generated
/// before process exit. Tests needing isolation construct their own
/// [`Ledger`] instead.
pub fn global() -> &'static Ledger {
    GLOBAL_LEDGER.get_or_init(Ledger::new)
}

/// Scans the global ledger and returns the number of unreleased
/// allocations. First of the three injected report calls.
pub fn detect_leaks() -> usize {
    global().detect_leaks().len()
}

/// Prints the console summary for the global ledger.
pub fn print_summary() {
    report::console::print_summary(&global().snapshot());
}

/// Writes the HTML report (and, when [`JSON_REPORT_ENV`] is set, the JSON
/// report) for the global ledger. IO failures are reported to stderr rather
/// than unwinding through the instrumented program's exit path.
pub fn generate_html_report() {
    let snapshot = global().snapshot();

    match report::html::write_report(&snapshot, HTML_REPORT_FILENAME) {
        Ok(()) => println!("HTML report generated: {HTML_REPORT_FILENAME}"),
        Err(err) => eprintln!("leakscope: failed to write {HTML_REPORT_FILENAME}: {err}"),
    }

    if std::env::var_os(JSON_REPORT_ENV).is_some() {
        match report::write_json_report(&snapshot, JSON_REPORT_FILENAME) {
            Ok(()) => println!("JSON report generated: {JSON_REPORT_FILENAME}"),
            Err(err) => eprintln!("leakscope: failed to write {JSON_REPORT_FILENAME}: {err}"),
        }
    }
}

//! Console summary: a fixed-format statistics block plus a leak table.

use colored::Colorize;
use prettytable::{color, Attr, Cell, Row, Table};

use super::Snapshot;
use crate::output::{format_bytes, format_kb};

/// Prints the summary block and, when leaks exist, the leak table.
pub fn print_summary(snapshot: &Snapshot) {
    print!("{}", summary_block(snapshot));

    if !snapshot.leaks.is_empty() {
        println!(
            "{} {} unreleased allocation(s) totaling {}:",
            "[leakscope]".blue().bold(),
            snapshot.leaks.len(),
            format_bytes(snapshot.leaked_bytes as u64)
        );
        leak_table(snapshot).printstd();
        println!();
    }
}

/// The fixed-format statistics block. Kept as a pure function of the
/// snapshot so tests can assert the exact bytes.
pub fn summary_block(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    out.push_str("\n========================================\n");
    out.push_str("       LEAKSCOPE MEMORY SUMMARY\n");
    out.push_str("========================================\n\n");
    out.push_str(&format!(
        "Total Allocations:   {}\n",
        snapshot.total_allocations
    ));
    out.push_str(&format!(
        "Total Deallocations: {}\n",
        snapshot.total_deallocations
    ));
    out.push_str(&format!(
        "Current Usage:       {}\n",
        format_kb(snapshot.current_usage)
    ));
    out.push_str(&format!(
        "Peak Usage:          {}\n",
        format_kb(snapshot.peak_usage)
    ));
    out.push_str(&format!("Memory Leaks:        {}\n", snapshot.leaks.len()));
    if snapshot.unmatched_releases > 0 {
        out.push_str(&format!(
            "Unmatched Releases:  {}\n",
            snapshot.unmatched_releases
        ));
    }
    out.push_str("========================================\n\n");
    out
}

fn leak_table(snapshot: &Snapshot) -> Table {
    let use_colors = std::env::var("NO_COLOR").is_err();

    let mut table = Table::new();
    let header_cells: Vec<Cell> = ["Address", "Size", "Location", "Severity"]
        .iter()
        .map(|header| {
            if use_colors {
                Cell::new(header)
                    .with_style(Attr::Bold)
                    .with_style(Attr::ForegroundColor(color::CYAN))
            } else {
                Cell::new(header).with_style(Attr::Bold)
            }
        })
        .collect();
    table.add_row(Row::new(header_cells));

    for leak in &snapshot.leaks {
        table.add_row(Row::new(vec![
            Cell::new(&format!("0x{:x}", leak.address)),
            Cell::new(&format!("{} bytes", leak.size)),
            Cell::new(&leak.site.to_string()),
            Cell::new(leak.severity()),
        ]));
    }

    table
}

//! Self-contained HTML report: inline styles, no external assets.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use super::Snapshot;
use crate::output::format_kb;

const STYLE: &str = "\
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
               background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
               padding: 20px; min-height: 100vh; }
        .container { max-width: 1400px; margin: 0 auto; }
        .header { background: white; padding: 30px; border-radius: 15px;
                  box-shadow: 0 10px 30px rgba(0,0,0,0.2); margin-bottom: 20px; text-align: center; }
        .header h1 { color: #667eea; font-size: 2.5em; margin-bottom: 10px; }
        .header .subtitle { color: #666; font-size: 1.1em; }
        .stats-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(250px, 1fr));
                      gap: 20px; margin-bottom: 20px; }
        .stat-card { background: white; padding: 25px; border-radius: 15px;
                     box-shadow: 0 5px 15px rgba(0,0,0,0.1); transition: transform 0.3s; }
        .stat-card:hover { transform: translateY(-5px); box-shadow: 0 10px 25px rgba(0,0,0,0.2); }
        .stat-card .icon { font-size: 2em; margin-bottom: 10px; }
        .stat-card .label { color: #666; font-size: 0.9em; margin-bottom: 5px; }
        .stat-card .value { font-size: 2em; font-weight: bold; color: #333; }
        .leak-alert { background: #fff3cd; border-left: 5px solid #ffc107;
                      padding: 20px; border-radius: 10px; margin-bottom: 20px; }
        .leak-critical { background: #f8d7da; border-left: 5px solid #dc3545; }
        .leak-clean { background: #d4edda; border-left: 5px solid #28a745; }
        .section { background: white; padding: 30px; border-radius: 15px;
                   box-shadow: 0 5px 15px rgba(0,0,0,0.1); margin-bottom: 20px; }
        .section h2 { color: #667eea; margin-bottom: 20px; padding-bottom: 10px;
                      border-bottom: 3px solid #667eea; }
        table { width: 100%; border-collapse: collapse; margin-top: 15px; }
        th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }
        th { background: #667eea; color: white; font-weight: 600; }
        tr:hover { background: #f5f5f5; }
        .progress-bar { width: 100%; height: 20px; background: #e0e0e0;
                        border-radius: 15px; overflow: hidden; margin: 10px 0; }
        .progress-fill { height: 100%; background: linear-gradient(90deg, #667eea, #764ba2);
                         display: flex; align-items: center; justify-content: center;
                         color: white; font-weight: bold; font-size: 0.8em; transition: width 0.3s; }
        .badge { display: inline-block; padding: 5px 10px; border-radius: 20px;
                 font-size: 0.85em; font-weight: 600; }
        .badge-danger { background: #dc3545; color: white; }
        .badge-warning { background: #ffc107; color: #333; }
";

static OPTIMIZATION_TIPS: &[&str] = &[
    "Review allocation sites with high frequency for optimization opportunities",
    "Consider object pools for frequently allocated and released values",
    "Prefer owning wrappers that release automatically over raw pointers",
    "Profile your application regularly during development",
    "Enable compiler warnings for memory-related issues",
];

/// Renders the complete document for `snapshot`.
pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::with_capacity(16 * 1024);

    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("    <meta charset=\"UTF-8\">\n");
    out.push_str("    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    out.push_str("    <title>Leakscope Memory Report</title>\n");
    out.push_str("    <style>\n");
    out.push_str(STYLE);
    out.push_str("    </style>\n</head>\n<body>\n    <div class=\"container\">\n");

    header(snapshot, &mut out);
    stat_cards(snapshot, &mut out);
    leak_alert(snapshot, &mut out);
    leak_section(snapshot, &mut out);
    sites_section(snapshot, &mut out);
    tips_section(&mut out);

    out.push_str("    </div>\n</body>\n</html>\n");
    out
}

/// Writes the rendered document to `path`. The file handle closes on scope
/// exit; a failure mid-write leaves a truncated file.
pub fn write_report(snapshot: &Snapshot, path: impl AsRef<Path>) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(render(snapshot).as_bytes())
}

fn header(snapshot: &Snapshot, out: &mut String) {
    out.push_str("        <div class=\"header\">\n");
    out.push_str("            <h1>Leakscope Memory Report</h1>\n");
    out.push_str("            <p class=\"subtitle\">Memory Usage Analysis &amp; Leak Detection</p>\n");
    out.push_str(&format!(
        "            <p class=\"subtitle\">Generated: {}</p>\n",
        escape(&snapshot.generated_at)
    ));
    out.push_str("        </div>\n");
}

fn stat_cards(snapshot: &Snapshot, out: &mut String) {
    let cards = [
        ("Total Allocations", snapshot.total_allocations.to_string()),
        ("Total Deallocations", snapshot.total_deallocations.to_string()),
        ("Current Usage", format_kb(snapshot.current_usage)),
        ("Peak Usage", format_kb(snapshot.peak_usage)),
        ("Memory Leaks", snapshot.leaks.len().to_string()),
        ("Active Allocations", snapshot.active_allocations.to_string()),
    ];

    out.push_str("        <div class=\"stats-grid\">\n");
    for (label, value) in cards {
        out.push_str(&format!(
            "            <div class=\"stat-card\">\n                <div class=\"label\">{label}</div>\n                <div class=\"value\">{value}</div>\n            </div>\n"
        ));
    }
    out.push_str("        </div>\n");
}

fn leak_alert(snapshot: &Snapshot, out: &mut String) {
    if snapshot.leaks.is_empty() {
        out.push_str("        <div class=\"leak-alert leak-clean\">\n");
        out.push_str("            <h3>No Memory Leaks Detected</h3>\n");
        out.push_str("            <p>All tracked allocations have been released.</p>\n");
    } else {
        let alert_class = if snapshot.critical() {
            "leak-alert leak-critical"
        } else {
            "leak-alert"
        };
        out.push_str(&format!("        <div class=\"{alert_class}\">\n"));
        out.push_str("            <h3>Memory Leaks Detected</h3>\n");
        out.push_str(&format!(
            "            <p><strong>{}</strong> allocations were not freed, totaling <strong>{}</strong> of leaked memory.</p>\n",
            snapshot.leaks.len(),
            format_kb(snapshot.leaked_bytes)
        ));
    }
    if snapshot.unmatched_releases > 0 {
        out.push_str(&format!(
            "            <p><strong>{}</strong> release(s) matched no tracked allocation (possible double free or untracked memory).</p>\n",
            snapshot.unmatched_releases
        ));
    }
    out.push_str("        </div>\n");
}

fn leak_section(snapshot: &Snapshot, out: &mut String) {
    if snapshot.leaks.is_empty() {
        return;
    }

    out.push_str("        <div class=\"section\">\n");
    out.push_str("            <h2>Detected Memory Leaks</h2>\n");
    out.push_str("            <table><thead><tr><th>Address</th><th>Size</th><th>Location</th>\n");
    out.push_str("                <th>Timestamp</th><th>Thread ID</th><th>Severity</th></tr></thead><tbody>\n");

    for leak in &snapshot.leaks {
        let badge_class = if leak.severity() == "Major" {
            "badge-danger"
        } else {
            "badge-warning"
        };
        out.push_str(&format!(
            "                <tr><td><code>0x{:x}</code></td>\n                    <td>{} bytes</td>\n                    <td>{}</td>\n                    <td>{}</td><td>{}</td>\n                    <td><span class=\"badge {}\">{}</span></td></tr>\n",
            leak.address,
            leak.size,
            escape(&leak.site.to_string()),
            escape(&leak.timestamp),
            leak.thread_id,
            badge_class,
            leak.severity()
        ));
    }

    out.push_str("            </tbody></table>\n        </div>\n");
}

fn sites_section(snapshot: &Snapshot, out: &mut String) {
    // Omitted entirely when nothing was allocated; the ranking is empty and
    // no percentage is ever computed against a zero total.
    if snapshot.top_sites.is_empty() {
        return;
    }

    out.push_str("        <div class=\"section\">\n");
    out.push_str("            <h2>Top Allocation Sites</h2>\n");
    out.push_str("            <table><thead><tr><th>Location</th><th>Allocation Count</th>\n");
    out.push_str("                <th>Frequency</th></tr></thead><tbody>\n");

    for site in &snapshot.top_sites {
        out.push_str(&format!(
            "                <tr><td><code>{}</code></td>\n                    <td>{}</td>\n                    <td><div class=\"progress-bar\">\n                        <div class=\"progress-fill\" style=\"width: {:.1}%;\">{:.1}%</div>\n                    </div></td></tr>\n",
            escape(&site.site),
            site.count,
            site.percent,
            site.percent
        ));
    }

    out.push_str("            </tbody></table>\n        </div>\n");
}

fn tips_section(out: &mut String) {
    out.push_str("        <div class=\"section\">\n");
    out.push_str("            <h2>Optimization Tips</h2>\n");
    out.push_str("            <ul style=\"line-height: 2;\">\n");
    for tip in OPTIMIZATION_TIPS {
        out.push_str(&format!("                <li>{tip}</li>\n"));
    }
    out.push_str("            </ul>\n        </div>\n");
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

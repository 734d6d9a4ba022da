//! Terminal output for keyfleet
//!
//! Colored one-line status messages and the tables and summaries printed
//! after each host.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use kf_keys::KeyChange;
use kf_orchestrator::{KeySummary, RunSummary};

/// Format the keys of one host as a table
pub fn format_keys(keys: &[KeySummary]) -> String {
    if keys.is_empty() {
        return "No keys".to_string();
    }

    #[derive(Tabled)]
    struct KeyRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "FINGERPRINT")]
        fingerprint: String,
        #[tabled(rename = "TYPE")]
        algorithm: String,
        #[tabled(rename = "COMMENT")]
        comment: String,
    }

    let rows: Vec<KeyRow> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| KeyRow {
            index: i + 1,
            fingerprint: key.fingerprint.clone().unwrap_or_else(|| "-".to_string()),
            algorithm: key.algorithm.clone(),
            comment: if key.comment.is_empty() {
                "-".to_string()
            } else {
                key.comment.clone()
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One line per key change, indented under the keyfile name
pub fn format_changes(source: &str, changes: &[KeyChange]) -> String {
    let mut out = format!("{}:", source);
    if changes.is_empty() {
        out.push_str(" no keys");
    }
    for change in changes {
        out.push_str("\n  ");
        out.push_str(&change.to_string());
    }
    out
}

/// Closing line of a run
pub fn format_summary(summary: &RunSummary) -> String {
    let mut parts = vec![format!("{} succeeded", summary.succeeded())];
    if summary.skipped() > 0 {
        parts.push(format!("{} skipped", summary.skipped()));
    }
    if summary.failed() > 0 {
        parts.push(format!("{} failed", summary.failed()));
    }
    if !summary.gateway_failures.is_empty() {
        parts.push(format!(
            "{} gateway(s) unreachable",
            summary.gateway_failures.len()
        ));
    }

    let mut line = format!("{} host(s): {}", summary.hosts.len(), parts.join(", "));
    if summary.quit {
        line.push_str(" (stopped by user)");
    }
    line
}

fn print_tagged(out: &mut impl Write, color: Color, tag: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(tag),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_tagged(&mut std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message to stderr in red with an X prefix
pub fn print_error(msg: &str) {
    print_tagged(&mut std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning to stderr in yellow
pub fn print_warning(msg: &str) {
    print_tagged(&mut std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_tagged(&mut std::io::stdout(), Color::Cyan, "ℹ ", msg);
}

/// Print a section header (host or gateway name) in blue
pub fn print_header(msg: &str) {
    print_tagged(&mut std::io::stdout(), Color::Blue, "» ", msg);
}

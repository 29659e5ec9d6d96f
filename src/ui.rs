//! Terminal output for the CLI.

use crate::ledger::ChecksumRecord;
use crate::sweep::SweepReport;

/// Width of section separators.
const SEPARATOR_WIDTH: usize = 60;

/// Print a ledger record as aligned `label: value` lines.
pub fn print_record(record: &ChecksumRecord) {
    let status = if record.is_ok() { "ok" } else { "FAILED" };
    println!("Object:        {}", record.object());
    println!("Status:        {status}");
    println!(
        "Checksum:      {}",
        if record.checksum.is_empty() {
            "(none)"
        } else {
            &record.checksum
        }
    );
    println!("Last checked:  {}", record.last_checksum_date.to_rfc3339());
    println!("Next due:      {}", record.next_checksum_date.to_rfc3339());
    if !record.is_ok() {
        println!("Message:       {}", record.message());
    }
}

/// Print the totals of a sweep.
pub fn print_report(report: &SweepReport) {
    println!("{}", "-".repeat(SEPARATOR_WIDTH));
    println!("Pages read:    {}", report.pages);
    println!("Scanned:       {}", report.scanned);
    println!("Selected:      {}", report.selected);
    println!("Passed:        {}", report.passed);
    println!("Failed:        {}", report.failed);
    println!("Re-deposited:  {}", report.redeposited);
    println!("Errors:        {}", report.errors);
    println!("{}", "-".repeat(SEPARATOR_WIDTH));
}

/// Print a titled block of warnings to stderr.
///
/// Outputs:
/// ```text
/// ============================================================
/// Configuration warnings
/// ============================================================
///
///   - <warning>
/// ```
pub fn print_warning_box(title: &str, warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("\n{}", "=".repeat(SEPARATOR_WIDTH));
    eprintln!("{title}");
    eprintln!("{}\n", "=".repeat(SEPARATOR_WIDTH));
    for warning in warnings {
        eprintln!("  - {warning}");
    }
}

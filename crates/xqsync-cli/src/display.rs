//! Terminal and JSON rendering for the xqsync CLI

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;
use xqsync_engine::{SyncReport, TimerSnapshot};

/// Spinner showing live counts, or `None` in quiet mode
pub fn create_spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    let spinner = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner);
    pb.set_message("Listing documents...");
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// One-line spinner message for the current totals
pub fn spinner_message(snapshot: &TimerSnapshot) -> String {
    format!(
        "{} documents, {} errors, {}",
        snapshot.events,
        snapshot.errors,
        format_bytes(snapshot.bytes)
    )
}

/// Print the end-of-run statistics
pub fn print_report(report: &SyncReport) {
    let snapshot = &report.snapshot;
    println!();
    println!("{}", style("Sync Statistics:").bold().underlined());
    println!("  Documents written: {}", style(report.outcome.written).green());
    println!("  Documents skipped: {}", style(report.outcome.skipped).yellow());
    println!(
        "  Errors: {}",
        if snapshot.errors > 0 {
            style(snapshot.errors).red()
        } else {
            style(snapshot.errors).green()
        }
    );
    println!("  Bytes written: {}", style(format_bytes(snapshot.bytes)).green());
    println!("  Duration: {}", style(format_duration(snapshot.elapsed)).blue());
    println!("  Throughput: {}", style(snapshot.rate_line()).blue());

    if report.cancelled {
        println!(
            "{} Cancelled with {} batches not started",
            style("!").yellow().bold(),
            report.undispatched
        );
    }
    if let Some(tolerance) = report.error_tolerance {
        if report.exceeds_tolerance() {
            println!(
                "{} {} errors exceed the tolerance of {}",
                style("✗").red().bold(),
                snapshot.errors,
                tolerance
            );
        }
    }
}

/// Machine-readable run report
#[derive(Debug, Serialize)]
pub struct ReportJson {
    /// xqsync version
    pub version: String,
    /// When the report was produced
    pub timestamp: String,
    /// Documents written
    pub written: u64,
    /// Documents skipped because the destination had them
    pub skipped: u64,
    /// Counted events
    pub events: u64,
    /// Failed documents
    pub errors: u64,
    /// Bytes written
    pub bytes: u64,
    /// Run time in seconds
    pub elapsed_seconds: f64,
    /// Batches scheduled
    pub batches: usize,
    /// Whether the run was cancelled
    pub cancelled: bool,
    /// Configured error tolerance
    pub error_tolerance: Option<u64>,
    /// Whether the tolerance was exceeded
    pub tolerance_exceeded: bool,
}

impl From<&SyncReport> for ReportJson {
    fn from(report: &SyncReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            written: report.outcome.written,
            skipped: report.outcome.skipped,
            events: report.snapshot.events,
            errors: report.snapshot.errors,
            bytes: report.snapshot.bytes,
            elapsed_seconds: report.snapshot.elapsed.as_secs_f64(),
            batches: report.batches,
            cancelled: report.cancelled,
            error_tolerance: report.error_tolerance,
            tolerance_exceeded: report.exceeds_tolerance(),
        }
    }
}

/// Human-readable byte count
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Human-readable duration
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use xqsync_engine::TaskOutcome;

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1024, "1.00 KB")]
    #[case(1536, "1.50 KB")]
    #[case(5 * 1024 * 1024, "5.00 MB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[rstest]
    #[case(Duration::from_millis(1500), "1.50s")]
    #[case(Duration::from_secs(125), "2m 5s")]
    #[case(Duration::from_secs(3725), "1h 2m 5s")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[test]
    fn test_report_json() {
        let report = SyncReport {
            snapshot: TimerSnapshot {
                events: 5,
                errors: 2,
                bytes: 100,
                busy: Duration::from_millis(5),
                elapsed: Duration::from_secs(1),
            },
            outcome: TaskOutcome {
                written: 3,
                skipped: 1,
                failed: 2,
                bytes: 100,
            },
            batches: 5,
            undispatched: 0,
            cancelled: false,
            error_tolerance: Some(1),
        };

        let value = serde_json::to_value(ReportJson::from(&report)).unwrap();
        assert_eq!(value["written"], 3);
        assert_eq!(value["errors"], 2);
        assert_eq!(value["tolerance_exceeded"], true);
        assert_eq!(value["error_tolerance"], 1);
    }

    #[test]
    fn test_spinner_message() {
        let snapshot = TimerSnapshot {
            events: 4,
            errors: 1,
            bytes: 2048,
            ..TimerSnapshot::default()
        };
        assert_eq!(spinner_message(&snapshot), "4 documents, 1 errors, 2.00 KB");
    }
}

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use flowkit::ExecutionStatus;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Status Formatting
// ============================================================================

/// Colored status label
pub fn status(status: ExecutionStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        ExecutionStatus::Finished => label.green(),
        ExecutionStatus::Failed | ExecutionStatus::CancellationFailed => label.red().bold(),
        ExecutionStatus::Cancelled => label.yellow(),
        ExecutionStatus::Skipped => label.dimmed(),
        ExecutionStatus::InProgress => label.cyan(),
        ExecutionStatus::Queued => label.normal(),
    }
}

/// Status symbol for compact listings
pub fn status_icon(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Finished => "✓".green(),
        ExecutionStatus::Failed | ExecutionStatus::CancellationFailed => "✗".red(),
        ExecutionStatus::Cancelled => "↺".yellow(),
        ExecutionStatus::Skipped => "-".dimmed(),
        ExecutionStatus::InProgress => "→".cyan(),
        ExecutionStatus::Queued => "·".normal(),
    }
}

/// Elapsed time between two timestamps, e.g. `1.2s` or `3m 05s`
pub fn format_duration(started: Option<DateTime<Utc>>, finished: Option<DateTime<Utc>>) -> String {
    let (Some(started), Some(finished)) = (started, finished) else {
        return "-".to_string();
    };
    let millis = (finished - started).num_milliseconds().max(0);
    if millis < 60_000 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else {
        let secs = millis / 1000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Format an optional timestamp for listings
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Truncate a stage path for display, keeping the end
pub fn truncate_path(path: &str, max_len: usize) -> String {
    let len = path.chars().count();
    if len <= max_len {
        path.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = path.chars().skip(len - max_len + 3).collect();
        format!("...{tail}")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, millis: u32) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(secs, millis * 1_000_000).single()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(at(0, 0), at(1, 200)), "1.2s");
        assert_eq!(format_duration(at(0, 0), at(185, 0)), "3m 05s");
        assert_eq!(format_duration(at(0, 0), None), "-");
        assert_eq!(format_duration(at(5, 0), at(1, 0)), "0.0s");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(at(0, 0)), "1970-01-01 00:00:00");
        assert_eq!(format_time(None), "-");
    }

    #[test]
    fn test_truncate_path_long() {
        assert_eq!(
            truncate_path("flow/appi-l0/af-1/EntitlementSaver", 20),
            ".../EntitlementSaver"
        );
    }

    #[test]
    fn test_truncate_path_edge_cases() {
        assert_eq!(truncate_path("short", 20), "short");
        assert_eq!(truncate_path("test", 3), "...");
        assert_eq!(truncate_path("", 10), "");
    }

    #[test]
    fn test_status_labels() {
        assert!(status(ExecutionStatus::Failed).to_string().contains("FAILED"));
        assert!(status_icon(ExecutionStatus::Skipped).to_string().contains('-'));
    }
}

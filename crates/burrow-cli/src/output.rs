//! Formatted output helpers for CLI commands.
//!
//! Human-readable byte and CPU-time formatting for the run summary.

use burrow_common::constants::APP_NAME;
use burrow_common::types::ResourceStats;

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats CPU time given in microseconds.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_cpu_time(usec: u64) -> String {
    if usec >= 1_000_000 {
        format!("{:.2}s", usec as f64 / 1_000_000.0)
    } else {
        format!("{:.1}ms", usec as f64 / 1_000.0)
    }
}

/// One-line summary of a finished container.
#[must_use]
pub fn summary_line(exit_code: i32, stats: &ResourceStats) -> String {
    format!(
        "exit {exit_code} | cpu {} | memory {} | pids {}",
        format_cpu_time(stats.cpu_usage_usec),
        format_bytes(stats.memory_bytes),
        stats.pids
    )
}

/// Prints the run summary to stderr, leaving stdout to the container.
#[allow(clippy::print_stderr)]
pub fn print_summary(exit_code: i32, stats: &ResourceStats) {
    eprintln!("{}", summary_line(exit_code, stats));
}

/// Prints the version line.
#[allow(clippy::print_stdout)]
pub fn print_version() {
    println!("{APP_NAME} {}", env!("CARGO_PKG_VERSION"));
}

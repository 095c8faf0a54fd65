//! Utility functions for crcscan
//!
//! Worker-count defaults derived from the machine's parallelism and
//! human-readable formatting helpers shared by the library and the CLI.

/// Fewest reader workers a default configuration uses
///
/// Reading is I/O bound, so even a single-core machine benefits from several
/// reads in flight against slow or remote-backed disks.
pub const MIN_READER_WORKERS: usize = 4;

/// Fewest checksum workers a default configuration uses
pub const MIN_CHECKSUM_WORKERS: usize = 2;

/// Default reader worker count: twice the core count, at least [`MIN_READER_WORKERS`]
pub fn default_reader_workers() -> usize {
    (num_cpus::get() * 2).max(MIN_READER_WORKERS)
}

/// Default checksum worker count: one per core, at least [`MIN_CHECKSUM_WORKERS`]
pub fn default_checksum_workers() -> usize {
    num_cpus::get().max(MIN_CHECKSUM_WORKERS)
}

/// Format bytes in human-readable form
///
/// Values below 1024 are whole bytes; larger values use binary units with two
/// decimal places.
///
/// ```rust
/// use crcscan::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Parse a byte size such as `4096`, `64K`, `64KiB` or `2M`
///
/// Suffixes are binary (`K` = 1024) and case-insensitive.
pub fn parse_size(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let shift = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        _ => return None,
    };
    value.checked_mul(1u64 << shift)
}

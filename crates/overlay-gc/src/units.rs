//! Byte count formatting and parsing.
//!
//! The container runtime reports sizes as short human-readable strings
//! (`"1.2GB"`, `"512kB"`, `"0B"`). These are parsed with binary (1024)
//! multipliers, and the same multipliers are used when rendering sizes for
//! the audit log and the usage report.

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;
const TB: u64 = 1024 * GB;

/// Format a byte count in the compact form used by the audit log.
///
/// One decimal place, dropped when it is zero, unit suffix without a space.
///
/// # Examples
///
/// ```
/// use overlay_gc::units::human_size;
///
/// assert_eq!(human_size(512), "512B");
/// assert_eq!(human_size(100 * 1024 * 1024), "100MB");
/// assert_eq!(human_size(1536 * 1024 * 1024), "1.5GB");
/// ```
pub fn human_size(bytes: u64) -> String {
    const STEPS: [(u64, &str); 4] = [(KB, "KB"), (MB, "MB"), (GB, "GB"), (TB, "TB")];
    if bytes < KB {
        return format!("{}B", bytes);
    }

    let tenths_in = |step: usize| (bytes as f64 / STEPS[step].0 as f64 * 10.0).round() as u64;
    let mut step = STEPS.iter().rposition(|(size, _)| bytes >= *size).unwrap_or(0);
    let mut tenths = tenths_in(step);
    // 1023.96KB rounds to 1024.0KB, which is 1MB
    if tenths >= 10240 && step + 1 < STEPS.len() {
        step += 1;
        tenths = tenths_in(step);
    }

    let unit = STEPS[step].1;
    match tenths % 10 {
        0 => format!("{}{}", tenths / 10, unit),
        frac => format!("{}.{}{}", tenths / 10, frac, unit),
    }
}

/// Parse a runtime-reported size such as `"1.2GB"`, `"12.5kB"` or `"0B"`.
///
/// Whitespace between number and unit is allowed. A bare number is taken as
/// bytes. Returns `None` for anything else.
pub fn parse_human_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return None;
    }
    let value: f64 = number.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "B" => 1,
        "k" | "kB" | "K" | "KB" | "KiB" => KB,
        "M" | "MB" | "MiB" => MB,
        "G" | "GB" | "GiB" => GB,
        "T" | "TB" | "TiB" => TB,
        _ => return None,
    };

    Some((value * multiplier as f64).round() as u64)
}

/// Bytes as fractional mebibytes, for report columns.
pub fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / MB as f64
}

/// Bytes as fractional gibibytes, for report totals.
pub fn to_gb(bytes: u64) -> f64 {
    bytes as f64 / GB as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(human_size(1023), "1023B");
        assert_eq!(human_size(1024), "1KB");
        assert_eq!(human_size(1536), "1.5KB");
        assert_eq!(human_size(100 * MB), "100MB");
        assert_eq!(human_size(GB), "1GB");
        assert_eq!(human_size(2 * TB + TB / 2), "2.5TB");
    }

    #[test]
    fn test_human_size_promotes_after_rounding() {
        assert_eq!(human_size(MB - 1), "1MB");
        assert_eq!(human_size(GB - 1), "1GB");
        assert_eq!(human_size(TB - 1), "1TB");
        assert_eq!(human_size(MB - 60), "1023.9KB");
        assert_eq!(human_size(1024 * TB), "1024TB");
    }

    #[test]
    fn test_parse_human_size() {
        assert_eq!(parse_human_size("0B"), Some(0));
        assert_eq!(parse_human_size("512"), Some(512));
        assert_eq!(parse_human_size("1.5kB"), Some(1536));
        assert_eq!(parse_human_size("100MB"), Some(100 * MB));
        assert_eq!(parse_human_size("2 GB"), Some(2 * GB));
        assert_eq!(parse_human_size(" 1TB "), Some(TB));
    }

    #[test]
    fn test_parse_human_size_rejects_garbage() {
        assert_eq!(parse_human_size(""), None);
        assert_eq!(parse_human_size("MB"), None);
        assert_eq!(parse_human_size("12 parsecs"), None);
        assert_eq!(parse_human_size("1.2.3GB"), None);
    }

    #[test]
    fn test_to_mb_gb() {
        assert_eq!(to_mb(3 * MB), 3.0);
        assert_eq!(to_gb(GB / 2), 0.5);
    }
}

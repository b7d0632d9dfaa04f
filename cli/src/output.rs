//! Formatting helpers for CLI output.

const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

/// Format a byte count in binary units, one decimal place above bytes.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(700 * 1024 * 1024), "700.0 MiB");
        assert_eq!(format_bytes(3 << 30), "3.0 GiB");
    }

    #[test]
    fn test_format_bytes_caps_at_largest_unit() {
        assert_eq!(format_bytes(2048 << 40), "2048.0 TiB");
    }
}

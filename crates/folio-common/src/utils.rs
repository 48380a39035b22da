//! Folio Utils - Utility Functions
//!
//! Checksums for blob integrity and formatting helpers for reports.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

// =============================================================================
// Checksum Functions
// =============================================================================

/// Compute CRC32 checksum for data integrity verification.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verify data against expected CRC32 checksum.
#[inline]
pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

// =============================================================================
// Formatting
// =============================================================================

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// Format a byte size as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    match unit {
        0 => format!("{} {}", bytes, SIZE_UNITS[0]),
        _ => format!("{:.2} {}", size, SIZE_UNITS[unit]),
    }
}

/// Shorten a long string by keeping its head and tail around an ellipsis.
///
/// Used when printing inline data URIs, whose payloads drown the report.
pub fn abbreviate(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars || max_chars < 5 {
        return text.to_string();
    }

    let keep = max_chars - 3;
    let head: String = text.chars().take(keep - keep / 3).collect();
    let tail: String = text.chars().skip(count - keep / 3).collect();
    format!("{}...{}", head, tail)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32() {
        let data = b"\x89PNG\r\n\x1a\n";
        let checksum = crc32(data);
        assert!(verify_crc32(data, checksum));
        assert!(!verify_crc32(b"\x89PNG\r\n\x1a\x0b", checksum));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(70), "70 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(16 * 1024 * 1024), "16.00 MB");
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 20), "short");

        let long = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAAB";
        let short = abbreviate(long, 24);
        assert_eq!(short.chars().count(), 24);
        assert!(short.starts_with("data:image/png"));
        assert!(short.contains("..."));
        assert!(short.ends_with("AAAAB"));
    }
}

//! Relative time windows (`15m`, `24h`, `7d`) and chart bucket widths.

use chrono::Duration;

/// Fallback when a window spec cannot be parsed.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Parse `<integer><unit>` with unit `s`, `m`, `h` or `d`.
pub fn parse_window_strict(spec: &str) -> Option<Duration> {
    let spec = spec.trim();
    let unit = spec.chars().last()?;
    let digits = &spec[..spec.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let n: i64 = digits.parse().ok()?;
    let unit_seconds = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return None,
    };
    Duration::try_seconds(n.checked_mul(unit_seconds)?)
}

/// Parse a window, falling back to 24 hours for anything malformed.
pub fn parse_window(spec: &str) -> Duration {
    parse_window_strict(spec).unwrap_or_else(|| Duration::hours(DEFAULT_WINDOW_HOURS))
}

/// Bucket width in seconds for a window: 5 minutes up to 6 hours,
/// 30 minutes up to 48 hours, 2 hours beyond.
pub fn bucket_seconds(window: Duration) -> i64 {
    let secs = window.num_seconds();
    if secs <= 6 * 3_600 {
        5 * 60
    } else if secs <= 48 * 3_600 {
        30 * 60
    } else {
        2 * 3_600
    }
}

use chrono::{FixedOffset, TimeZone, Utc};
use regex::Regex;

/// Seconds east of UTC for KST. The contest clock runs on Seoul time; the
/// offset is fixed since KST has no daylight saving.
pub const KST_OFFSET_SECS: i64 = 9 * 60 * 60;

const DAY_SECS: i64 = 24 * 60 * 60;

/// Current time as unix epoch seconds. Computed once per request and passed
/// into the contest operations explicitly.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Start (inclusive) and end (exclusive) of the KST calendar day containing
/// `at`, as epoch seconds.
pub fn kst_day_bounds(at: i64) -> (i64, i64) {
    let local = at + KST_OFFSET_SECS;
    let start = local - local.rem_euclid(DAY_SECS) - KST_OFFSET_SECS;

    (start, start + DAY_SECS)
}

/// Epoch seconds rendered as an RFC 3339 timestamp in KST.
pub fn format_kst(at: i64) -> String {
    FixedOffset::east_opt(KST_OFFSET_SECS as i32)
        .and_then(|tz| tz.timestamp_opt(at, 0).single())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Normalizes a user-supplied title: control characters stripped, whitespace
/// collapsed, length capped.
pub fn sanitize_title(input: &str) -> String {
    let control = Regex::new(r"[\x00-\x1F\x7F]").unwrap();
    let s = control.replace_all(input, " ").into_owned();

    let collapse = Regex::new(r"\s+").unwrap();
    let s = collapse.replace_all(s.trim(), " ").into_owned();

    s.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-09-06T00:00:00Z, which is 09:00 in KST.
    const T0: i64 = 1_757_116_800;

    #[test]
    fn test_day_bounds_midday() {
        let (start, end) = kst_day_bounds(T0);

        // Midnight KST on 2025-09-06 is 15:00 UTC the day before.
        assert_eq!(start, T0 - 9 * 60 * 60);
        assert_eq!(end, start + DAY_SECS);
    }

    #[test]
    fn test_day_bounds_at_midnight() {
        let midnight = T0 - 9 * 60 * 60;

        let (start, _) = kst_day_bounds(midnight);
        assert_eq!(start, midnight);

        let (prev_start, prev_end) = kst_day_bounds(midnight - 1);
        assert_eq!(prev_end, midnight);
        assert_eq!(prev_start, midnight - DAY_SECS);
    }

    #[test]
    fn test_format_kst() {
        assert_eq!(format_kst(T0), "2025-09-06T09:00:00+09:00");
    }

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_title("Summer  Look"), "Summer Look");
        assert_eq!(sanitize_title("  padded  "), "padded");
        assert_eq!(sanitize_title("line\nbreak\ttab"), "line break tab");
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_title(""), "");
        assert_eq!(sanitize_title("   "), "");
        assert_eq!(sanitize_title("\x00\x1f"), "");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_title(&long).chars().count(), 120);
    }
}

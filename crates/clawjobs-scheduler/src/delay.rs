//! Delay calculator — how long until a daily or weekly slot next comes up.
//!
//! Pure functions of `(schedule, now)`: no clock reads, so tests pass a
//! fixed `now`. Times are wall-clock in `now`'s time zone. A slot exactly
//! equal to `now` counts as already passed and rolls forward.

use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone};

/// Longest local-time gap searched past (no real zone skips more than a day).
const MAX_GAP_MINUTES: u32 = 24 * 60;

/// Time until the next `hour:minute:00.000` strictly after `now`.
pub fn daily_delay<Tz: TimeZone>(hour: u32, minute: u32, now: &DateTime<Tz>) -> Duration {
    let today = now.date_naive();
    let mut target = slot(&now.timezone(), today, hour, minute);
    if target <= *now {
        target = slot(&now.timezone(), add_days(today, 1), hour, minute);
    }
    until(now, &target)
}

/// Time until the next ISO weekday (1 = Monday … 7 = Sunday) at
/// `hour:minute:00.000` strictly after `now`.
pub fn weekly_delay<Tz: TimeZone>(
    iso_day_of_week: u32,
    hour: u32,
    minute: u32,
    now: &DateTime<Tz>,
) -> Duration {
    let target_dow = iso_day_of_week.clamp(1, 7);
    let current_dow = now.weekday().number_from_monday();
    let mut days_to_add = (target_dow + 7 - current_dow) % 7;

    let today = now.date_naive();
    if days_to_add == 0 && slot(&now.timezone(), today, hour, minute) <= *now {
        days_to_add = 7;
    }

    let target = slot(&now.timezone(), add_days(today, days_to_add), hour, minute);
    until(now, &target)
}

/// `date` at `hour:minute:00` local time. Out-of-range fields are clamped.
/// A wall time skipped by a DST jump resolves to the first valid minute
/// after the gap.
fn slot<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32, minute: u32) -> DateTime<Tz> {
    let mut naive: NaiveDateTime = date
        .and_hms_opt(hour.min(23), minute.min(59), 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
    for _ in 0..MAX_GAP_MINUTES {
        if let Some(resolved) = tz.from_local_datetime(&naive).earliest() {
            return resolved;
        }
        naive += chrono::Duration::minutes(1);
    }
    tz.from_utc_datetime(&naive)
}

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(date)
}

fn until<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>) -> Duration {
    (target.clone() - now.clone()).to_std().unwrap_or_default()
}

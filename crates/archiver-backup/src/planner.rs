//! Splits a calendar day into query windows.

use chrono::{NaiveDate, NaiveTime, TimeDelta};

use archiver_types::TimeWindow;

use crate::BackupError;

pub const MAX_INTERVAL_HOURS: u32 = 24;

/// Reject interval sizes outside `1..=24` hours.
pub fn validate_interval(interval_hours: u32) -> Result<(), BackupError> {
    if interval_hours == 0 || interval_hours > MAX_INTERVAL_HOURS {
        return Err(BackupError::InvalidInterval(interval_hours));
    }
    Ok(())
}

/// Plan `ceil(24 / interval_hours)` windows covering `day` in UTC.
///
/// Window `i` starts at `i * interval_hours`. Every window but the last ends
/// one millisecond before the next one starts; the last always ends at
/// `23:59:59.999`, so a remainder interval (e.g. 5) still covers the day.
///
/// Callers validate the interval first; out-of-range values are clamped.
pub fn plan_windows(day: NaiveDate, interval_hours: u32) -> Vec<TimeWindow> {
    let interval = interval_hours.clamp(1, MAX_INTERVAL_HOURS);
    let count = MAX_INTERVAL_HOURS.div_ceil(interval);

    let day_start = day.and_time(NaiveTime::MIN).and_utc();
    let day_end = day_start + TimeDelta::days(1) - TimeDelta::milliseconds(1);
    let step = TimeDelta::hours(i64::from(interval));

    (0..count)
        .map(|i| {
            let start = day_start + step * i as i32;
            let end = if i + 1 == count {
                day_end
            } else {
                start + step - TimeDelta::milliseconds(1)
            };
            TimeWindow::new(i as usize + 1, start, end)
        })
        .collect()
}

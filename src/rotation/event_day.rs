use chrono::{DateTime, TimeZone, Timelike};

use crate::calendar::{add_days, at_time_on};

/// Instants before this local hour still belong to the previous night's event.
pub const EVENT_DAY_CUTOFF_HOUR: u32 = 2;
pub const CALL_TIME: (u32, u32) = (18, 0);
pub const SHOW_START: (u32, u32) = (19, 0);
pub const CLOSE_HOUR: u32 = 1;
pub const ROLLOVER_HOUR: u32 = 2;
pub const RESET_HOUR: u32 = 3;

/// The logical event day: midnight through 1:59 AM maps to the previous day.
pub fn event_day<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    if now.hour() < EVENT_DAY_CUTOFF_HOUR {
        add_days(now, -1)
    } else {
        Some(now.clone())
    }
}

pub fn event_day_at<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Tz>> {
    let base = event_day(now)?;
    at_time_on(&base, hour, minute)
}

pub fn call_time<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    event_day_at(now, CALL_TIME.0, CALL_TIME.1)
}

pub fn show_start<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    event_day_at(now, SHOW_START.0, SHOW_START.1)
}

/// 1:00 AM cutoff computed from `now`'s own date, not the event day.
///
/// From 2 AM onward the cutoff is the next morning's 1 AM; before 2 AM it is today's.
/// This intentionally differs from [`call_time`] and [`show_start`].
pub fn close_time<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let today = at_time_on(now, CLOSE_HOUR, 0)?;
    if now.hour() >= EVENT_DAY_CUTOFF_HOUR {
        add_days(&today, 1)
    } else {
        Some(today)
    }
}

/// Next 03:00 local strictly after `after`.
pub fn next_reset_at<Tz: TimeZone>(after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let today = at_time_on(after, RESET_HOUR, 0)?;
    if *after < today {
        Some(today)
    } else {
        add_days(&today, 1)
    }
}

pub fn is_rollover_minute<Tz: TimeZone>(now: &DateTime<Tz>) -> bool {
    now.hour() == ROLLOVER_HOUR && now.minute() == 0
}

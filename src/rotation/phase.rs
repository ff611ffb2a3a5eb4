use chrono::{DateTime, TimeZone, Timelike};

use crate::rotation::event_day::{call_time, close_time, show_start};
use crate::rotation::locator::{active_slot, next_boundary};
use crate::rotation::model::Slot;

/// What the host should be showing at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPhase<Tz: TimeZone> {
    BeforeCall {
        call_time: DateTime<Tz>,
        remaining_secs: i64,
    },
    BeforeShow {
        show_start: DateTime<Tz>,
        remaining_secs: i64,
    },
    Running {
        active: Option<Slot<Tz>>,
        next: Option<Slot<Tz>>,
        /// Seconds until the active slot ends.
        remaining_secs: Option<i64>,
    },
    Closed,
    Unresolved,
}

impl<Tz: TimeZone> EventPhase<Tz> {
    pub fn name(&self) -> &'static str {
        match self {
            EventPhase::BeforeCall { .. } => "before_call",
            EventPhase::BeforeShow { .. } => "before_show",
            EventPhase::Running { .. } => "running",
            EventPhase::Closed => "closed",
            EventPhase::Unresolved => "unresolved",
        }
    }
}

pub fn event_phase<Tz: TimeZone>(now: &DateTime<Tz>, slots: &[Slot<Tz>]) -> EventPhase<Tz> {
    let (Some(call), Some(start), Some(close)) = (call_time(now), show_start(now), close_time(now))
    else {
        return EventPhase::Unresolved;
    };

    if *now > close {
        return EventPhase::Closed;
    }
    if *now < start {
        if *now < call {
            let remaining_secs = (call.clone() - now.clone()).num_seconds();
            return EventPhase::BeforeCall {
                call_time: call,
                remaining_secs,
            };
        }
        let remaining_secs = (start.clone() - now.clone()).num_seconds();
        return EventPhase::BeforeShow {
            show_start: start,
            remaining_secs,
        };
    }

    let active = active_slot(now, slots).cloned();
    let remaining_secs = active
        .as_ref()
        .map(|slot| (slot.end.clone() - now.clone()).num_seconds());
    EventPhase::Running {
        active,
        next: next_boundary(now, slots).cloned(),
        remaining_secs,
    }
}

/// Countdown text: `HH:MM:SS` from one hour up, otherwise `MM:SS`. Negative clamps to zero.
pub fn pretty_clock(seconds: i64) -> String {
    let total = seconds.max(0);
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimeDisplayMode {
    Hour24,
    Hour12,
}

pub fn format_clock<Tz: TimeZone>(dt: &DateTime<Tz>, mode: TimeDisplayMode) -> String {
    match mode {
        TimeDisplayMode::Hour24 => format!("{:02}:{:02}", dt.hour(), dt.minute()),
        TimeDisplayMode::Hour12 => {
            let (is_pm, hour12) = dt.hour12();
            let meridiem = if is_pm { "PM" } else { "AM" };
            format!("{hour12}:{:02} {meridiem}", dt.minute())
        }
    }
}

use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike,
};

/// Local wall-clock decomposition of an instant.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DateParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl DateParts {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    pub fn with_time(self, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
            ..self
        }
    }
}

pub fn components_of<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateParts {
    DateParts {
        year: instant.year(),
        month: instant.month(),
        day: instant.day(),
        hour: instant.hour(),
        minute: instant.minute(),
        second: instant.second(),
    }
}

/// Builds an instant from local components in `timezone`.
///
/// Ambiguous local times resolve to the earlier instant. Local times that fall inside a
/// forward gap are shifted forward by the gap length, the same way a wall clock skips ahead.
pub fn date_from<Tz: TimeZone>(timezone: &Tz, parts: DateParts) -> Option<DateTime<Tz>> {
    let naive = parts.date()?.and_hms_opt(parts.hour, parts.minute, parts.second)?;
    resolve_local_datetime(timezone, naive)
}

/// Adds whole calendar days, keeping the local wall-clock time.
pub fn add_days<Tz: TimeZone>(instant: &DateTime<Tz>, days: i64) -> Option<DateTime<Tz>> {
    let naive = instant.naive_local();
    let shifted = if days >= 0 {
        naive.checked_add_days(Days::new(days.unsigned_abs()))?
    } else {
        naive.checked_sub_days(Days::new(days.unsigned_abs()))?
    };
    resolve_local_datetime(&instant.timezone(), shifted)
}

/// The instant at `hour:minute:00` on the local calendar date of `instant`.
pub fn at_time_on<Tz: TimeZone>(
    instant: &DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Tz>> {
    let parts = components_of(instant).with_time(hour, minute, 0);
    date_from(&instant.timezone(), parts)
}

fn resolve_local_datetime<Tz: TimeZone>(
    timezone: &Tz,
    naive: NaiveDateTime,
) -> Option<DateTime<Tz>> {
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => {
            let probe = naive.checked_sub_days(Days::new(1))?;
            let before_gap = timezone.from_local_datetime(&probe).earliest()?;
            let offset = before_gap.offset().fix();
            let utc = naive - offset;
            Some(timezone.from_utc_datetime(&utc))
        }
    }
}

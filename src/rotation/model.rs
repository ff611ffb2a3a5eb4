use chrono::{DateTime, TimeZone};

use crate::calendar::at_time_on;

pub const SLOT_MINUTES: i64 = 20;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Status {
    OnSet,
    Meal,
    OffSet,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Participant {
    A,
    B,
    C,
}

impl Participant {
    pub const ALL: [Participant; 3] = [Participant::A, Participant::B, Participant::C];

    pub fn label(self) -> &'static str {
        match self {
            Participant::A => "A",
            Participant::B => "B",
            Participant::C => "C",
        }
    }

    fn index(self) -> usize {
        match self {
            Participant::A => 0,
            Participant::B => 1,
            Participant::C => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Meridiem {
    Am,
    Pm,
}

/// One hand-authored row of the nightly rotation, keyed by 12-hour clock time.
#[derive(Debug, Clone, Copy)]
pub struct RotationRow {
    pub hour12: u32,
    pub minute: u32,
    pub meridiem: Meridiem,
    pub statuses: [Status; 3],
}

impl RotationRow {
    pub fn hour24(&self) -> u32 {
        let base = self.hour12 % 12;
        match self.meridiem {
            Meridiem::Am => base,
            Meridiem::Pm => base + 12,
        }
    }
}

const fn row(hour12: u32, minute: u32, meridiem: Meridiem, statuses: [Status; 3]) -> RotationRow {
    RotationRow {
        hour12,
        minute,
        meridiem,
        statuses,
    }
}

use Meridiem::{Am, Pm};
use Status::{Meal, OffSet, OnSet};

/// Tonight's duty rotation for (A, B, C). The gaps and repeats are intentional.
pub static ROTATION_TABLE: [RotationRow; 19] = [
    row(7, 0, Pm, [OnSet, OnSet, OffSet]),
    row(7, 20, Pm, [OnSet, OffSet, OnSet]),
    row(7, 40, Pm, [Meal, OnSet, OnSet]),
    row(8, 0, Pm, [Meal, OnSet, OnSet]),
    row(8, 20, Pm, [OnSet, OnSet, OffSet]),
    row(8, 40, Pm, [OnSet, Meal, OnSet]),
    row(9, 0, Pm, [OnSet, Meal, OnSet]),
    row(9, 20, Pm, [OffSet, OnSet, OnSet]),
    row(9, 40, Pm, [OnSet, OnSet, Meal]),
    row(10, 0, Pm, [OnSet, OnSet, Meal]),
    row(10, 20, Pm, [OnSet, OffSet, OnSet]),
    row(10, 40, Pm, [OffSet, OnSet, OnSet]),
    row(11, 0, Pm, [OnSet, OnSet, OffSet]),
    row(11, 20, Pm, [OnSet, OffSet, OnSet]),
    row(11, 40, Pm, [OffSet, OnSet, OnSet]),
    row(12, 0, Am, [OnSet, OnSet, OffSet]),
    row(12, 20, Am, [OnSet, OffSet, OnSet]),
    row(12, 40, Am, [OffSet, OnSet, OnSet]),
    row(1, 0, Am, [OffSet, OffSet, OffSet]),
];

#[derive(Debug, Clone)]
pub struct Slot<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub statuses: [Status; 3],
}

impl<Tz: TimeZone> Slot<Tz> {
    pub fn new(start: DateTime<Tz>, statuses: [Status; 3]) -> Self {
        let end = start.clone() + chrono::Duration::minutes(SLOT_MINUTES);
        Self {
            start,
            end,
            statuses,
        }
    }

    pub fn status_of(&self, participant: Participant) -> Status {
        self.statuses[participant.index()]
    }

    pub fn contains(&self, now: &DateTime<Tz>) -> bool {
        self.start <= *now && *now < self.end
    }
}

// `Local` has no `PartialEq`, so compare the instants and statuses directly.
impl<Tz: TimeZone> PartialEq for Slot<Tz> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end && self.statuses == other.statuses
    }
}

impl<Tz: TimeZone> Eq for Slot<Tz> {}

/// Builds tonight's slots on `now`'s local calendar date.
///
/// Every row, including the after-midnight ones, is dated on the same calendar day as
/// `now`, so the 12 AM and 1 AM rows land before the evening rows on the timeline.
/// Rows whose local time cannot be resolved are skipped.
pub fn build_slots<Tz: TimeZone>(now: &DateTime<Tz>) -> Vec<Slot<Tz>> {
    ROTATION_TABLE
        .iter()
        .filter_map(|row| {
            let start = at_time_on(now, row.hour24(), row.minute)?;
            Some(Slot::new(start, row.statuses))
        })
        .collect()
}

pub fn names<Tz: TimeZone>(status: Status, slot: &Slot<Tz>) -> String {
    Participant::ALL
        .iter()
        .filter(|participant| slot.status_of(**participant) == status)
        .map(|participant| participant.label())
        .collect::<Vec<_>>()
        .join(" & ")
}

/// Notification text for a slot, e.g. `A ON SET · B on Meal · C Off Set`.
pub fn line_for_slot<Tz: TimeZone>(slot: &Slot<Tz>) -> String {
    let segments = [
        (names(Status::OnSet, slot), "ON SET"),
        (names(Status::Meal, slot), "on Meal"),
        (names(Status::OffSet, slot), "Off Set"),
    ];
    segments
        .iter()
        .filter(|(who, _)| !who.is_empty())
        .map(|(who, label)| format!("{who} {label}"))
        .collect::<Vec<_>>()
        .join(" · ")
}

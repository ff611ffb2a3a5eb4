use chrono::{DateTime, NaiveDate, TimeZone};
use tracing::{debug, info, warn};

use crate::arming::store::{ARMED_KEY, RESET_AT_KEY, StateStore};
use crate::notify::{NotificationSink, ScheduleOutcome, schedule_all};
use crate::rotation::event_day::{is_rollover_minute, next_reset_at};
use crate::rotation::locator::{active_slot, next_boundary};
use crate::rotation::model::{Slot, build_slots};
use crate::rotation::phase::{EventPhase, event_phase};

/// How long the manual-reset acknowledgment stays up.
pub const RESET_NOTICE_SECS: i64 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArmingStatus {
    Disarmed,
    Armed,
}

#[derive(Debug, Clone)]
pub struct ArmingState<Tz: TimeZone> {
    pub armed: bool,
    pub reset_at: Option<DateTime<Tz>>,
}

impl<Tz: TimeZone> ArmingState<Tz> {
    pub fn disarmed() -> Self {
        Self {
            armed: false,
            reset_at: None,
        }
    }

    pub fn status(&self) -> ArmingStatus {
        if self.armed {
            ArmingStatus::Armed
        } else {
            ArmingStatus::Disarmed
        }
    }

    /// Reads the persisted flags. An armed flag with no usable reset moment loads as
    /// disarmed with nothing scheduled.
    pub fn load(store: &dyn StateStore, timezone: &Tz) -> Self {
        let armed = store.get_bool(ARMED_KEY).unwrap_or(false);
        let reset_at = store
            .get_number(RESET_AT_KEY)
            .filter(|secs| *secs > 0)
            .and_then(|secs| timezone.timestamp_opt(secs, 0).single());
        match (armed, reset_at) {
            (true, None) => Self::disarmed(),
            (armed, reset_at) => Self { armed, reset_at },
        }
    }

    fn persist(&self, store: &mut dyn StateStore) {
        if let Err(err) = store.set_bool(ARMED_KEY, self.armed) {
            warn!(error = %err, "failed to persist armed flag");
        }
        let secs = self.reset_at.as_ref().map_or(0, DateTime::timestamp);
        if let Err(err) = store.set_number(RESET_AT_KEY, secs) {
            warn!(error = %err, "failed to persist reset time");
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TickOutcome {
    pub slot_changed: bool,
    pub daily_reset: bool,
    pub schedule_rebuilt: bool,
}

/// Single owner of tonight's schedule and the arming state. Every transition goes
/// through `&mut self`, so hosts with several timers must share one engine behind a lock.
pub struct RotationEngine<Tz: TimeZone, S, P> {
    slots: Vec<Slot<Tz>>,
    built_for: NaiveDate,
    state: ArmingState<Tz>,
    last_active: Option<Slot<Tz>>,
    reset_notice_until: Option<DateTime<Tz>>,
    sink: S,
    store: P,
}

impl<Tz, S, P> RotationEngine<Tz, S, P>
where
    Tz: TimeZone,
    S: NotificationSink<Tz>,
    P: StateStore,
{
    pub fn new(now: &DateTime<Tz>, sink: S, store: P) -> Self {
        let state = ArmingState::load(&store, &now.timezone());
        if state.armed {
            info!(
                reset_at = ?state.reset_at.as_ref().map(DateTime::timestamp),
                "restored armed state"
            );
        }
        Self {
            slots: build_slots(now),
            built_for: now.date_naive(),
            state,
            last_active: None,
            reset_notice_until: None,
            sink,
            store,
        }
    }

    pub fn slots(&self) -> &[Slot<Tz>] {
        &self.slots
    }

    #[cfg(test)]
    pub fn state(&self) -> &ArmingState<Tz> {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state.armed
    }

    pub fn reset_at(&self) -> Option<&DateTime<Tz>> {
        self.state.reset_at.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[cfg(test)]
    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn active_slot(&self, now: &DateTime<Tz>) -> Option<&Slot<Tz>> {
        active_slot(now, &self.slots)
    }

    pub fn next_boundary(&self, now: &DateTime<Tz>) -> Option<&Slot<Tz>> {
        next_boundary(now, &self.slots)
    }

    pub fn phase(&self, now: &DateTime<Tz>) -> EventPhase<Tz> {
        event_phase(now, &self.slots)
    }

    /// Schedules tonight's notifications and arms until the next 03:00. The state is
    /// armed even when the sink rejects some requests.
    pub fn arm(&mut self, now: &DateTime<Tz>) -> ScheduleOutcome {
        let outcome = schedule_all(&mut self.sink, &self.slots, now);
        self.state.armed = true;
        self.state.reset_at = next_reset_at(now);
        self.state.persist(&mut self.store);
        info!(
            scheduled = outcome.scheduled,
            failed = outcome.failed,
            reset_at = ?self.state.reset_at.as_ref().map(DateTime::timestamp),
            "notifications armed"
        );
        outcome
    }

    pub fn tick(&mut self, now: &DateTime<Tz>) -> TickOutcome {
        let mut outcome = TickOutcome {
            daily_reset: self.check_daily_reset(now),
            ..TickOutcome::default()
        };

        let active = active_slot(now, &self.slots).cloned();
        if active != self.last_active {
            debug!(
                from = ?self.last_active.as_ref().map(|slot| slot.start.timestamp()),
                to = ?active.as_ref().map(|slot| slot.start.timestamp()),
                "active slot changed"
            );
            self.last_active = active;
            outcome.slot_changed = true;
        }

        if is_rollover_minute(now) && self.built_for != now.date_naive() {
            self.rebuild(now);
            info!(date = %self.built_for, "schedule rolled over to new event day");
            outcome.schedule_rebuilt = true;
        }

        if self
            .reset_notice_until
            .as_ref()
            .is_some_and(|until| *now >= *until)
        {
            self.reset_notice_until = None;
        }

        outcome
    }

    /// Runs the daily-reset check right away, for a host coming back to the foreground.
    pub fn on_foreground(&mut self, now: &DateTime<Tz>) -> bool {
        self.check_daily_reset(now)
    }

    /// Disarms, clears every notification record, and rebuilds the schedule from `now`.
    pub fn manual_reset(&mut self, now: &DateTime<Tz>) {
        self.rebuild(now);
        self.clear_all_notifications();
        self.state = ArmingState::disarmed();
        self.state.persist(&mut self.store);
        self.reset_notice_until =
            Some(now.clone() + chrono::Duration::seconds(RESET_NOTICE_SECS));
        info!(date = %self.built_for, "schedule reset, notifications disarmed");
    }

    pub fn reset_notice_active(&self, now: &DateTime<Tz>) -> bool {
        self.reset_notice_until
            .as_ref()
            .is_some_and(|until| *now < *until)
    }

    fn check_daily_reset(&mut self, now: &DateTime<Tz>) -> bool {
        if !self.state.armed {
            return false;
        }
        let due = match &self.state.reset_at {
            Some(reset_at) => *now >= *reset_at,
            None => true,
        };
        if !due {
            return false;
        }

        self.clear_all_notifications();
        self.state.armed = false;
        self.state.reset_at = next_reset_at(now);
        self.state.persist(&mut self.store);
        info!(
            next_reset_at = ?self.state.reset_at.as_ref().map(DateTime::timestamp),
            "daily reset disarmed notifications"
        );
        true
    }

    fn rebuild(&mut self, now: &DateTime<Tz>) {
        self.slots = build_slots(now);
        self.built_for = now.date_naive();
    }

    fn clear_all_notifications(&mut self) {
        if let Err(err) = self.sink.clear_pending() {
            warn!(error = %err, "failed to clear pending notifications");
        }
        if let Err(err) = self.sink.clear_delivered() {
            warn!(error = %err, "failed to clear delivered notifications");
        }
    }
}

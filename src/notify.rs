use chrono::{DateTime, TimeZone};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rotation::event_day::{close_time, show_start};
use crate::rotation::model::{Slot, line_for_slot};

pub const EVENT_START_ID: &str = "event-start";
pub const EVENT_CLOSED_ID: &str = "event-closed";

const EVENT_START_TITLE: &str = "Event starting";
const EVENT_START_BODY: &str = "The show is kicking off. Get ready!";
const ROTATION_TITLE: &str = "Rotation";
const EVENT_CLOSED_TITLE: &str = "Event closed";
const EVENT_CLOSED_BODY: &str = "Great job everyone! FEED THE FEAR!! NOURISH THE TERROR!!";

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest<Tz: TimeZone> {
    pub id: String,
    pub fire_at: DateTime<Tz>,
    pub title: String,
    pub body: String,
}

/// Most pending requests a notification center will hold at once.
pub const PENDING_LIMIT: usize = 64;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("failed to schedule notification '{id}': {reason}")]
    ScheduleFailed { id: String, reason: String },
}

/// The platform notification queue. The planner assumes it is the only writer.
pub trait NotificationSink<Tz: TimeZone> {
    fn clear_pending(&mut self) -> Result<(), NotifyError>;
    fn clear_delivered(&mut self) -> Result<(), NotifyError>;
    fn schedule(&mut self, request: NotificationRequest<Tz>) -> Result<(), NotifyError>;
}

pub fn rotation_id<Tz: TimeZone>(slot: &Slot<Tz>) -> String {
    format!("rotation-{}", slot.start.timestamp())
}

/// Every request still in the future of `now`: show start, one per upcoming slot, close.
pub fn plan<Tz: TimeZone>(slots: &[Slot<Tz>], now: &DateTime<Tz>) -> Vec<NotificationRequest<Tz>> {
    let mut requests = Vec::with_capacity(slots.len() + 2);

    if let Some(start) = show_start(now).filter(|start| start > now) {
        requests.push(NotificationRequest {
            id: EVENT_START_ID.to_string(),
            fire_at: start,
            title: EVENT_START_TITLE.to_string(),
            body: EVENT_START_BODY.to_string(),
        });
    }

    for slot in slots.iter().filter(|slot| slot.start > *now) {
        requests.push(NotificationRequest {
            id: rotation_id(slot),
            fire_at: slot.start.clone(),
            title: ROTATION_TITLE.to_string(),
            body: line_for_slot(slot),
        });
    }

    if let Some(close) = close_time(now).filter(|close| close > now) {
        requests.push(NotificationRequest {
            id: EVENT_CLOSED_ID.to_string(),
            fire_at: close,
            title: EVENT_CLOSED_TITLE.to_string(),
            body: EVENT_CLOSED_BODY.to_string(),
        });
    }

    requests
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ScheduleOutcome {
    pub scheduled: usize,
    pub failed: usize,
}

/// Replaces the sink's pending queue with [`plan`]'s output. Failures are logged and
/// counted, never propagated.
pub fn schedule_all<Tz: TimeZone>(
    sink: &mut dyn NotificationSink<Tz>,
    slots: &[Slot<Tz>],
    now: &DateTime<Tz>,
) -> ScheduleOutcome {
    if let Err(err) = sink.clear_pending() {
        warn!(error = %err, "failed to clear pending notifications");
    }

    let mut outcome = ScheduleOutcome::default();
    for request in plan(slots, now) {
        let id = request.id.clone();
        match sink.schedule(request) {
            Ok(()) => outcome.scheduled += 1,
            Err(err) => {
                warn!(id = %id, error = %err, "notification was not scheduled");
                outcome.failed += 1;
            }
        }
    }
    debug!(
        scheduled = outcome.scheduled,
        failed = outcome.failed,
        "notification plan handed to sink"
    );
    outcome
}

/// In-process notification center: keeps the pending queue and moves requests to the
/// delivered list once their fire time passes.
#[derive(Debug, Clone)]
pub struct MemorySink<Tz: TimeZone> {
    permission_granted: bool,
    pending: Vec<NotificationRequest<Tz>>,
    delivered: Vec<NotificationRequest<Tz>>,
}

impl<Tz: TimeZone> Default for MemorySink<Tz> {
    fn default() -> Self {
        Self::with_permission(true)
    }
}

impl<Tz: TimeZone> MemorySink<Tz> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose user has granted (or declined) notification permission. Without it
    /// every `schedule` fails; clearing still succeeds.
    pub fn with_permission(permission_granted: bool) -> Self {
        Self {
            permission_granted,
            pending: Vec::new(),
            delivered: Vec::new(),
        }
    }

    pub fn pending(&self) -> &[NotificationRequest<Tz>] {
        &self.pending
    }

    pub fn delivered(&self) -> &[NotificationRequest<Tz>] {
        &self.delivered
    }

    pub fn deliver_due(&mut self, now: &DateTime<Tz>) -> Vec<NotificationRequest<Tz>> {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|request| request.fire_at <= *now);
        self.pending = waiting;
        self.delivered.extend(due.iter().cloned());
        due
    }
}

impl<Tz: TimeZone> NotificationSink<Tz> for MemorySink<Tz> {
    fn clear_pending(&mut self) -> Result<(), NotifyError> {
        self.pending.clear();
        Ok(())
    }

    fn clear_delivered(&mut self) -> Result<(), NotifyError> {
        self.delivered.clear();
        Ok(())
    }

    fn schedule(&mut self, request: NotificationRequest<Tz>) -> Result<(), NotifyError> {
        if !self.permission_granted {
            return Err(NotifyError::PermissionDenied);
        }
        self.pending.retain(|existing| existing.id != request.id);
        if self.pending.len() >= PENDING_LIMIT {
            return Err(NotifyError::ScheduleFailed {
                id: request.id,
                reason: format!("pending queue is full ({PENDING_LIMIT})"),
            });
        }
        self.pending.push(request);
        Ok(())
    }
}

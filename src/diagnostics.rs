use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, TimeZone};

use crate::arming::engine::{ArmingState, ArmingStatus};
use crate::arming::store::StateStore;
use crate::notify::plan;
use crate::rotation::event_day::{call_time, close_time, event_day, next_reset_at, show_start};
use crate::rotation::model::{Slot, build_slots, line_for_slot};
use crate::rotation::phase::{EventPhase, TimeDisplayMode, event_phase, format_clock, pretty_clock};
use crate::time_provider::SelectedTimeProvider;

pub fn run_diagnostics(
    selected: &SelectedTimeProvider,
    store: &dyn StateStore,
    mode: TimeDisplayMode,
) -> Result<()> {
    let now = selected.provider.now();
    let state = ArmingState::load(store, &now.timezone());
    let slots = build_slots(&now);
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "Rotaclock diagnostics")?;
    writeln!(stdout, "Selected time source: {}", selected.label)?;
    writeln!(stdout, "Simulated: {}", selected.provider.is_simulated())?;
    if let Some(note) = selected.note.as_deref() {
        writeln!(stdout, "Note: {note}")?;
    }
    match (state.status(), state.reset_at.as_ref()) {
        (ArmingStatus::Armed, Some(reset_at)) => writeln!(
            stdout,
            "Notifications: armed until {}",
            reset_at.format("%Y-%m-%d %H:%M")
        )?,
        _ => writeln!(stdout, "Notifications: disarmed")?,
    }
    write_report(&mut stdout, &now, &slots, mode)
}

pub fn write_report<W: Write, Tz: TimeZone>(
    out: &mut W,
    now: &DateTime<Tz>,
    slots: &[Slot<Tz>],
    mode: TimeDisplayMode,
) -> Result<()>
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = |value: Option<DateTime<Tz>>| match value {
        Some(dt) => format!("{} ({})", dt.format("%Y-%m-%d"), format_clock(&dt, mode)),
        None => "-".to_string(),
    };

    writeln!(out, "Now: {}", now.format("%Y-%m-%d %H:%M:%S %Z"))?;
    match event_day(now) {
        Some(day) => writeln!(out, "Event day: {}", day.format("%Y-%m-%d"))?,
        None => writeln!(out, "Event day: -")?,
    }
    writeln!(out, "Call time: {}", stamp(call_time(now)))?;
    writeln!(out, "Show start: {}", stamp(show_start(now)))?;
    writeln!(out, "Close cutoff: {}", stamp(close_time(now)))?;
    writeln!(out, "Next daily reset: {}", stamp(next_reset_at(now)))?;

    let phase = event_phase(now, slots);
    writeln!(out, "Phase: {}", phase.name())?;
    match &phase {
        EventPhase::BeforeCall { remaining_secs, .. } => {
            writeln!(out, "Be at venue in {}", pretty_clock(*remaining_secs))?
        }
        EventPhase::BeforeShow { remaining_secs, .. } => {
            writeln!(out, "Event starts in {}", pretty_clock(*remaining_secs))?
        }
        EventPhase::Running {
            active: Some(slot),
            remaining_secs,
            ..
        } => {
            writeln!(out, "On now: {}", line_for_slot(slot))?;
            writeln!(
                out,
                "Next rotation in {}",
                pretty_clock(remaining_secs.unwrap_or(0))
            )?;
        }
        EventPhase::Running { active: None, .. } => writeln!(out, "No active slot right now")?,
        EventPhase::Closed => writeln!(out, "Event closed! Great job everyone!")?,
        EventPhase::Unresolved => {}
    }

    writeln!(out, "Tonight's rotation ({} slots):", slots.len())?;
    for slot in slots {
        writeln!(
            out,
            "  {:>8} - {:<8}  {}",
            format_clock(&slot.start, mode),
            format_clock(&slot.end, mode),
            line_for_slot(slot)
        )?;
    }
    writeln!(
        out,
        "Notifications if armed now: {}",
        plan(slots, now).len()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    use super::*;

    fn report_at(hour: u32, minute: u32) -> String {
        let now = New_York
            .with_ymd_and_hms(2026, 10, 30, hour, minute, 0)
            .single()
            .expect("valid");
        let slots = build_slots(&now);
        let mut buffer = Vec::new();
        write_report(&mut buffer, &now, &slots, TimeDisplayMode::Hour12).expect("report");
        String::from_utf8(buffer).expect("utf8")
    }

    #[test]
    fn afternoon_report_lists_anchors_and_table() {
        let report = report_at(16, 0);
        assert!(report.contains("Event day: 2026-10-30"));
        assert!(report.contains("Call time: 2026-10-30 (6:00 PM)"));
        assert!(report.contains("Close cutoff: 2026-10-31 (1:00 AM)"));
        assert!(report.contains("Phase: before_call"));
        assert!(report.contains("Be at venue in 02:00:00"));
        assert!(report.contains("Tonight's rotation (19 slots):"));
        assert!(report.contains("7:00 PM - 7:20 PM   A & B ON SET · C Off Set"));
        assert!(report.contains("Notifications if armed now: 17"));
    }

    #[test]
    fn running_report_shows_current_line() {
        let report = report_at(20, 45);
        assert!(report.contains("Phase: running"));
        assert!(report.contains("On now: A & C ON SET · B on Meal"));
        assert!(report.contains("Next rotation in 15:00"));
    }
}

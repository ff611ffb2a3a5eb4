use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeDelta, Timelike};

use crate::calendar::{DateParts, date_from};

#[derive(Clone, Debug, PartialEq)]
pub enum TimingSourceKind {
    System,
    Simulated { start: NaiveDateTime, speed: f64 },
}

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Local>;
    fn is_simulated(&self) -> bool;
}

pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Local clock that starts at a fixed wall-clock time and advances `speed` times faster
/// than real time.
#[derive(Debug)]
pub struct SimulatedTimeProvider {
    start: DateTime<Local>,
    speed: f64,
    anchor: Instant,
}

/// Fastest simulated clock accepted; a night of rotations replays in a few seconds.
pub const MAX_SIMULATION_SPEED: f64 = 10_000.0;

impl SimulatedTimeProvider {
    pub fn new(start: DateTime<Local>, speed: f64) -> Result<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            bail!("simulation speed must be a positive number, got {speed}");
        }
        if speed > MAX_SIMULATION_SPEED {
            bail!("simulation speed {speed} exceeds the maximum of {MAX_SIMULATION_SPEED}");
        }
        Ok(Self {
            start,
            speed,
            anchor: Instant::now(),
        })
    }

    /// Simulated time after `real_elapsed` of wall time. Holds at the start instant if the
    /// scaled offset leaves chrono's range.
    fn at_elapsed(&self, real_elapsed: std::time::Duration) -> DateTime<Local> {
        let scaled_ms = real_elapsed.as_secs_f64() * self.speed * 1_000.0;
        TimeDelta::try_milliseconds(scaled_ms as i64)
            .and_then(|elapsed| self.start.checked_add_signed(elapsed))
            .unwrap_or(self.start)
    }
}

impl TimeProvider for SimulatedTimeProvider {
    fn now(&self) -> DateTime<Local> {
        self.at_elapsed(self.anchor.elapsed())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

pub struct SelectedTimeProvider {
    pub provider: Box<dyn TimeProvider>,
    pub label: &'static str,
    pub note: Option<String>,
}

pub fn select_provider(kind: TimingSourceKind) -> Result<SelectedTimeProvider> {
    match kind {
        TimingSourceKind::System => Ok(SelectedTimeProvider {
            provider: Box::new(SystemTimeProvider),
            label: "SYSTEM_LOCAL",
            note: None,
        }),
        TimingSourceKind::Simulated { start, speed } => {
            let start_local = resolve_start(start)?;
            Ok(SelectedTimeProvider {
                provider: Box::new(SimulatedTimeProvider::new(start_local, speed)?),
                label: "SIMULATED_LOCAL",
                note: Some(format!(
                    "Simulating from {} at {speed}x",
                    start.format("%Y-%m-%d %H:%M:%S")
                )),
            })
        }
    }
}

pub fn parse_simulation_start(input: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S"))
        .with_context(|| {
            format!("invalid simulation start '{input}', expected YYYY-MM-DDTHH:MM[:SS]")
        })
}

fn resolve_start(start: NaiveDateTime) -> Result<DateTime<Local>> {
    let parts = DateParts {
        year: start.year(),
        month: start.month(),
        day: start.day(),
        hour: start.hour(),
        minute: start.minute(),
        second: start.second(),
    };
    date_from(&Local, parts)
        .ok_or_else(|| anyhow!("simulation start {start} is not a valid local time"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn simulated_provider_starts_at_requested_time() {
        let start = parse_simulation_start("2026-10-31T18:59:30").expect("parse");
        let selected = select_provider(TimingSourceKind::Simulated { start, speed: 1.0 })
            .expect("provider");
        let now = selected.provider.now();
        assert!(selected.provider.is_simulated());
        assert_eq!(selected.label, "SIMULATED_LOCAL");
        assert_eq!(now.hour(), 18);
        assert_eq!(now.minute(), 59);
    }

    #[test]
    fn simulated_elapsed_scales_with_speed() {
        let provider = SimulatedTimeProvider::new(Local::now(), 60.0).expect("valid speed");
        let later = provider.at_elapsed(Duration::from_secs(2));
        assert_eq!((later - provider.start).num_seconds(), 120);
    }

    #[test]
    fn rejects_speed_above_maximum() {
        let err = SimulatedTimeProvider::new(Local::now(), 1e300).expect_err("too fast");
        assert!(err.to_string().contains("exceeds the maximum"));
        assert!(SimulatedTimeProvider::new(Local::now(), MAX_SIMULATION_SPEED).is_ok());
    }

    #[test]
    fn out_of_range_elapsed_holds_at_start() {
        let provider =
            SimulatedTimeProvider::new(Local::now(), MAX_SIMULATION_SPEED).expect("valid speed");
        let held = provider.at_elapsed(Duration::from_secs(u64::MAX / 4));
        assert_eq!(held, provider.start);
    }

    #[test]
    fn rejects_non_positive_speed() {
        assert!(SimulatedTimeProvider::new(Local::now(), 0.0).is_err());
        assert!(SimulatedTimeProvider::new(Local::now(), -2.0).is_err());
        assert!(SimulatedTimeProvider::new(Local::now(), f64::NAN).is_err());
    }

    #[test]
    fn rejects_malformed_simulation_start() {
        let err = parse_simulation_start("tomorrow evening").expect_err("should fail");
        assert!(err.to_string().contains("invalid simulation start"));
    }

    #[test]
    fn system_provider_is_not_simulated() {
        let selected = select_provider(TimingSourceKind::System).expect("provider");
        assert!(!selected.provider.is_simulated());
        assert!(selected.note.is_none());
    }
}

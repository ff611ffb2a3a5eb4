mod api;
mod arming;
mod calendar;
mod diagnostics;
mod haptics;
mod notify;
mod rotation;
mod time_provider;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::Local;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiServer, ApiServerConfig, SharedEngine};
use crate::arming::engine::RotationEngine;
use crate::arming::store::JsonStateStore;
use crate::haptics::{HapticTrigger, TerminalHaptics};
use crate::notify::MemorySink;
use crate::rotation::phase::TimeDisplayMode;
use crate::time_provider::{TimeProvider, TimingSourceKind, parse_simulation_start, select_provider};

#[derive(Parser, Debug)]
#[command(
    name = "rotaclock",
    version,
    about = "Overnight duty rotation clock with armed rotation reminders"
)]
struct Cli {
    /// JSON file holding the armed flag and the next daily reset moment.
    #[arg(long, default_value = "rotation_state.json")]
    state: PathBuf,

    /// Start a simulated local clock at YYYY-MM-DDTHH:MM[:SS].
    #[arg(long)]
    simulate_from: Option<String>,

    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    #[arg(long)]
    arm: bool,

    #[arg(long)]
    reset: bool,

    #[arg(long)]
    diagnostics: bool,

    #[arg(long)]
    hour24: bool,

    #[arg(long)]
    bell: bool,

    /// Behave as if notification permission was declined: arming still arms, but every
    /// request is rejected.
    #[arg(long)]
    deny_notifications: bool,

    #[arg(long, default_value_t = 1_000)]
    tick_ms: u64,

    /// Stop after this many ticks instead of running until killed.
    #[arg(long)]
    ticks: Option<u64>,

    #[arg(long, default_value = "127.0.0.1")]
    api_bind: String,

    #[arg(long, default_value_t = 8099)]
    api_port: u16,

    #[arg(long)]
    no_api: bool,
}

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.tick_ms == 0 || cli.tick_ms > 1_000 {
        bail!("--tick-ms must be between 1 and 1000");
    }

    let kind = match cli.simulate_from.as_deref() {
        Some(start) => TimingSourceKind::Simulated {
            start: parse_simulation_start(start)?,
            speed: cli.speed,
        },
        None => TimingSourceKind::System,
    };
    let selected = select_provider(kind)?;
    let mode = if cli.hour24 {
        TimeDisplayMode::Hour24
    } else {
        TimeDisplayMode::Hour12
    };

    let store = JsonStateStore::open(&cli.state)?;
    if cli.diagnostics {
        return diagnostics::run_diagnostics(&selected, &store, mode);
    }

    if let Some(note) = selected.note.as_deref() {
        info!("{note}");
    }
    let clock: Arc<dyn TimeProvider> = Arc::from(selected.provider);
    info!(path = %store.path().display(), source = selected.label, "state loaded");

    let now = clock.now();
    let engine: SharedEngine<JsonStateStore> = Arc::new(Mutex::new(RotationEngine::new(
        &now,
        MemorySink::with_permission(!cli.deny_notifications),
        store,
    )));
    {
        let mut guard = lock_engine(&engine)?;
        guard.on_foreground(&now);
        if cli.reset {
            guard.manual_reset(&now);
        }
        if cli.arm {
            guard.arm(&now);
        }
    }

    let _api_server = if cli.no_api {
        None
    } else {
        let server = ApiServer::start(
            ApiServerConfig {
                bind_addr: cli.api_bind.clone(),
                port: cli.api_port,
            },
            Arc::clone(&engine),
            Arc::clone(&clock),
        )?;
        info!(bind = %cli.api_bind, port = cli.api_port, "local API listening");
        Some(server)
    };

    let mut haptics = TerminalHaptics::new(cli.bell);
    run_tick_loop(
        &engine,
        clock.as_ref(),
        &mut haptics,
        Duration::from_millis(cli.tick_ms),
        cli.ticks,
    )?;
    info!(pulses = haptics.pulses(), "tick loop finished");
    Ok(())
}

type LocalEngine = RotationEngine<Local, MemorySink<Local>, JsonStateStore>;

fn lock_engine(engine: &SharedEngine<JsonStateStore>) -> Result<MutexGuard<'_, LocalEngine>> {
    engine
        .lock()
        .map_err(|_| anyhow!("failed to lock rotation engine"))
}

fn run_tick_loop(
    engine: &SharedEngine<JsonStateStore>,
    clock: &dyn TimeProvider,
    haptics: &mut dyn HapticTrigger,
    interval: Duration,
    max_ticks: Option<u64>,
) -> Result<()> {
    let mut ticks = 0_u64;
    loop {
        let now = clock.now();
        {
            let mut guard = lock_engine(engine)?;
            let outcome = guard.tick(&now);
            if outcome.slot_changed {
                haptics.pulse();
            }
            if outcome.daily_reset || outcome.schedule_rebuilt {
                debug!(
                    daily_reset = outcome.daily_reset,
                    rebuilt = outcome.schedule_rebuilt,
                    slots = guard.slots().len(),
                    "engine state refreshed"
                );
            }
            for delivered in guard.sink_mut().deliver_due(&now) {
                info!(
                    id = %delivered.id,
                    title = %delivered.title,
                    body = %delivered.body,
                    "notification"
                );
            }
        }

        ticks += 1;
        if max_ticks.is_some_and(|limit| ticks >= limit) {
            return Ok(());
        }
        std::thread::sleep(interval);
    }
}

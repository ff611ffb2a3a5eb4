use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, warn};

use crate::arming::engine::RotationEngine;
use crate::arming::store::StateStore;
use crate::notify::{MemorySink, NotificationRequest};
use crate::rotation::event_day::{call_time, close_time, event_day, show_start};
use crate::rotation::model::{Participant, Slot, Status, line_for_slot};
use crate::rotation::phase::{EventPhase, TimeDisplayMode, format_clock, pretty_clock};
use crate::time_provider::TimeProvider;

pub type SharedEngine<P> = Arc<Mutex<RotationEngine<Local, MemorySink<Local>, P>>>;

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start<P>(
        config: ApiServerConfig,
        engine: SharedEngine<P>,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self>
    where
        P: StateStore + Send + 'static,
    {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let http_join =
            thread::spawn(move || run_server_loop(server, engine, clock, stop_for_thread));
        Ok(Self {
            stop,
            http_join: Some(http_join),
        })
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop<P: StateStore>(
    server: Server,
    engine: SharedEngine<P>,
    clock: Arc<dyn TimeProvider>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &engine, clock.as_ref()),
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub start: String,
    pub end: String,
    pub label: String,
    pub statuses: BTreeMap<&'static str, &'static str>,
    pub line: String,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub now: String,
    pub phase: &'static str,
    pub event_day: Option<String>,
    pub call_time: Option<String>,
    pub show_start: Option<String>,
    pub close_time: Option<String>,
    pub countdown: Option<String>,
    pub active: Option<SlotView>,
    pub next: Option<SlotView>,
    pub armed: bool,
    pub reset_at: Option<String>,
    pub reset_notice: bool,
    pub pending_count: usize,
    pub delivered_count: usize,
}

#[derive(Debug, Serialize)]
pub struct NotificationView {
    pub id: String,
    pub fire_at: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub pending: Vec<NotificationView>,
    pub delivered: Vec<NotificationView>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub action: &'static str,
    pub armed: bool,
    pub reset_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_reset: Option<bool>,
}

fn status_token(status: Status) -> &'static str {
    match status {
        Status::OnSet => "on_set",
        Status::Meal => "meal",
        Status::OffSet => "off_set",
    }
}

fn rfc3339<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.to_rfc3339()
}

pub fn slot_view<Tz: TimeZone>(slot: &Slot<Tz>) -> SlotView
where
    Tz::Offset: Display,
{
    let statuses = Participant::ALL
        .iter()
        .map(|participant| (participant.label(), status_token(slot.status_of(*participant))))
        .collect();
    SlotView {
        start: rfc3339(&slot.start),
        end: rfc3339(&slot.end),
        label: format!(
            "{} – {}",
            format_clock(&slot.start, TimeDisplayMode::Hour12),
            format_clock(&slot.end, TimeDisplayMode::Hour12)
        ),
        statuses,
        line: line_for_slot(slot),
    }
}

fn notification_view<Tz: TimeZone>(request: &NotificationRequest<Tz>) -> NotificationView
where
    Tz::Offset: Display,
{
    NotificationView {
        id: request.id.clone(),
        fire_at: rfc3339(&request.fire_at),
        title: request.title.clone(),
        body: request.body.clone(),
    }
}

pub fn state_payload<Tz, P>(
    engine: &RotationEngine<Tz, MemorySink<Tz>, P>,
    now: &DateTime<Tz>,
) -> StateResponse
where
    Tz: TimeZone,
    Tz::Offset: Display,
    P: StateStore,
{
    let phase = engine.phase(now);
    let countdown = match &phase {
        EventPhase::BeforeCall { remaining_secs, .. }
        | EventPhase::BeforeShow { remaining_secs, .. } => Some(pretty_clock(*remaining_secs)),
        EventPhase::Running { remaining_secs, .. } => remaining_secs.map(pretty_clock),
        EventPhase::Closed | EventPhase::Unresolved => None,
    };
    StateResponse {
        now: rfc3339(now),
        phase: phase.name(),
        event_day: event_day(now).map(|day| day.format("%Y-%m-%d").to_string()),
        call_time: call_time(now).as_ref().map(rfc3339),
        show_start: show_start(now).as_ref().map(rfc3339),
        close_time: close_time(now).as_ref().map(rfc3339),
        countdown,
        active: engine.active_slot(now).map(slot_view),
        next: engine.next_boundary(now).map(slot_view),
        armed: engine.is_armed(),
        reset_at: engine.reset_at().map(rfc3339),
        reset_notice: engine.reset_notice_active(now),
        pending_count: engine.sink().pending().len(),
        delivered_count: engine.sink().delivered().len(),
    }
}

pub fn notifications_payload<Tz, P>(
    engine: &RotationEngine<Tz, MemorySink<Tz>, P>,
) -> NotificationsResponse
where
    Tz: TimeZone,
    Tz::Offset: Display,
    P: StateStore,
{
    NotificationsResponse {
        pending: engine.sink().pending().iter().map(notification_view).collect(),
        delivered: engine
            .sink()
            .delivered()
            .iter()
            .map(notification_view)
            .collect(),
    }
}

fn action_payload<Tz, P>(
    action: &'static str,
    engine: &RotationEngine<Tz, MemorySink<Tz>, P>,
) -> ActionResponse
where
    Tz: TimeZone,
    Tz::Offset: Display,
    P: StateStore,
{
    ActionResponse {
        action,
        armed: engine.is_armed(),
        reset_at: engine.reset_at().map(rfc3339),
        scheduled: None,
        failed: None,
        daily_reset: None,
    }
}

/// A fully built response. Building one needs the engine; sending it does not.
#[derive(Debug)]
enum Reply {
    Json { status: StatusCode, body: Vec<u8> },
    Text { status: StatusCode, body: &'static str },
}

impl Reply {
    fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(body) => Self::Json { status, body },
            Err(err) => {
                warn!(error = %err, "failed to encode api response");
                Self::Text {
                    status: StatusCode(500),
                    body: "failed to encode response",
                }
            }
        }
    }

    fn text(status: u16, body: &'static str) -> Self {
        Self::Text {
            status: StatusCode(status),
            body,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Json { status, .. } | Self::Text { status, .. } => *status,
        }
    }
}

fn handle_request<P: StateStore>(
    request: tiny_http::Request,
    engine: &SharedEngine<P>,
    clock: &dyn TimeProvider,
) {
    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_reply(request, Reply::text(400, "missing remote address"));
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        let _ = send_reply(request, Reply::text(403, "forbidden: local network only"));
        return;
    }

    let url = request.url().to_string();
    let path = split_path(&url).to_string();
    let method = request.method().clone();
    debug!(method = %method, path = %path, "api request");

    let reply = dispatch(&method, &path, engine, clock);
    debug!(path = %path, status = reply.status().0, "api response ready");
    if let Err(err) = send_reply(request, reply) {
        warn!(path = %path, error = %err, "failed to send api response");
    }
}

/// Locks the engine only while the reply is built. The guard is gone before any socket
/// write, so a slow client never holds up the tick loop.
fn dispatch<P: StateStore>(
    method: &Method,
    path: &str,
    engine: &SharedEngine<P>,
    clock: &dyn TimeProvider,
) -> Reply {
    let Ok(mut guard) = engine.lock() else {
        return Reply::text(500, "internal state lock error");
    };
    let now = clock.now();
    route(method, path, &mut *guard, &now)
}

fn route<Tz, P>(
    method: &Method,
    path: &str,
    engine: &mut RotationEngine<Tz, MemorySink<Tz>, P>,
    now: &DateTime<Tz>,
) -> Reply
where
    Tz: TimeZone,
    Tz::Offset: Display,
    P: StateStore,
{
    match (method, path) {
        (Method::Get, "/v1") => {
            #[derive(Serialize)]
            struct ApiIndexResponse {
                state_url: &'static str,
                schedule_url: &'static str,
                notifications_url: &'static str,
                health_url: &'static str,
                arm_url: &'static str,
                reset_url: &'static str,
                foreground_url: &'static str,
            }

            Reply::json(
                StatusCode(200),
                &ApiIndexResponse {
                    state_url: "/v1/state",
                    schedule_url: "/v1/schedule",
                    notifications_url: "/v1/notifications",
                    health_url: "/healthz",
                    arm_url: "/v1/arm",
                    reset_url: "/v1/reset",
                    foreground_url: "/v1/foreground",
                },
            )
        }
        (Method::Get, "/healthz") => Reply::text(200, "ok"),
        (Method::Get, "/" | "/v1/state") => {
            Reply::json(StatusCode(200), &state_payload(engine, now))
        }
        (Method::Get, "/v1/schedule") => {
            let slots = engine.slots().iter().map(slot_view).collect::<Vec<_>>();
            Reply::json(StatusCode(200), &slots)
        }
        (Method::Get, "/v1/notifications") => {
            Reply::json(StatusCode(200), &notifications_payload(engine))
        }
        (Method::Post, "/v1/arm") => {
            let outcome = engine.arm(now);
            let mut payload = action_payload("arm", engine);
            payload.scheduled = Some(outcome.scheduled);
            payload.failed = Some(outcome.failed);
            Reply::json(StatusCode(200), &payload)
        }
        (Method::Post, "/v1/reset") => {
            engine.manual_reset(now);
            Reply::json(StatusCode(200), &action_payload("reset", engine))
        }
        (Method::Post, "/v1/foreground") => {
            let daily_reset = engine.on_foreground(now);
            let mut payload = action_payload("foreground", engine);
            payload.daily_reset = Some(daily_reset);
            Reply::json(StatusCode(200), &payload)
        }
        (_, "/v1" | "/healthz" | "/" | "/v1/state" | "/v1/schedule" | "/v1/notifications")
        | (_, "/v1/arm" | "/v1/reset" | "/v1/foreground") => {
            Reply::text(405, "method not allowed")
        }
        _ => Reply::text(404, "not found"),
    }
}

fn send_reply(request: tiny_http::Request, reply: Reply) -> Result<()> {
    match reply {
        Reply::Json { status, body } => {
            let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
                .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
            request.respond(
                Response::from_data(body)
                    .with_status_code(status)
                    .with_header(content_type),
            )?;
        }
        Reply::Text { status, body } => {
            let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
                .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
            request.respond(
                Response::from_string(body)
                    .with_status_code(status)
                    .with_header(content_type),
            )?;
        }
    }
    Ok(())
}

fn split_path(url: &str) -> &str {
    match url.split_once('?') {
        Some((path, _query)) => path,
        None => url,
    }
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}

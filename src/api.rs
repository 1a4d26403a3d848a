use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::alarm::list::AlarmRow;

pub const REFRESH_ROUTE: &str = "/v1/refresh";
pub const ALARMS_ROUTE: &str = "/v1/alarms";
pub const HEALTH_ROUTE: &str = "/healthz";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmSnapshot {
    pub cookie: i64,
    pub enabled: bool,
    pub snoozed: bool,
    pub trigger_time: i64,
    pub time: String,
    pub repeat: String,
    pub message: String,
}

impl AlarmSnapshot {
    pub fn from_row(row: &AlarmRow) -> Self {
        Self {
            cookie: row.cookie.get(),
            enabled: row.is_enabled(),
            snoozed: row.record.snoozed_minutes > 0,
            trigger_time: row.record.trigger_time(),
            time: row.time_text(),
            repeat: row.repeat_text().to_string(),
            message: row.record.message.clone(),
        }
    }
}

/// State shared between the HTTP thread and the UI thread. The HTTP side only
/// raises the refresh flag; the UI side consumes it and publishes rows.
#[derive(Debug, Default)]
pub struct ApiSharedState {
    alarms: Vec<AlarmSnapshot>,
    published_unix_ms: i64,
    refresh_requested: bool,
    signals_received: u64,
    total_requests: u64,
}

impl ApiSharedState {
    pub fn publish(&mut self, rows: &[AlarmRow], now_unix_ms: i64) {
        self.alarms = rows.iter().map(AlarmSnapshot::from_row).collect();
        self.published_unix_ms = now_unix_ms;
    }

    pub fn request_refresh(&mut self) {
        self.refresh_requested = true;
    }

    /// Returns and clears the pending refresh request.
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Path on which fired alarms are delivered, e.g. `/org/pocketalarm/alarm_triggered`.
    pub delivery_route: String,
}

pub struct ApiServer {
    pub state: Arc<Mutex<ApiSharedState>>,
    local_addr: Option<SocketAddr>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        let local_addr = server.server_addr().to_ip();
        let state = Arc::new(Mutex::new(ApiSharedState::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let delivery_route = config.delivery_route;
        let http_join = thread::spawn(move || {
            run_server_loop(server, state_for_thread, stop_for_thread, delivery_route)
        });
        tracing::info!(bind = %bind, "api_server_started");

        Ok(Self {
            state,
            local_addr,
            stop,
            http_join: Some(http_join),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
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

fn run_server_loop(
    server: Server,
    state: Arc<Mutex<ApiSharedState>>,
    stop: Arc<AtomicBool>,
    delivery_route: String,
) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state, &delivery_route),
            Ok(None) => continue,
            Err(err) => tracing::debug!(error = %err, "api_receive_failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Text(u16, &'static str),
    Json(u16, serde_json::Value),
}

fn handle_request(request: tiny_http::Request, state: &Arc<Mutex<ApiSharedState>>, delivery_route: &str) {
    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        tracing::warn!(remote = %remote_addr, "api_request_rejected");
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let url = request.url().to_string();
    let (path, _query) = split_path_query(&url);
    let reply = {
        let mut guard = match state.lock() {
            Ok(guard) => guard,
            Err(_) => {
                let _ = send_text(request, StatusCode(500), "internal state lock error");
                return;
            }
        };
        route(request.method(), path, delivery_route, &mut guard)
    };

    let sent = match reply {
        Reply::Text(status, body) => send_text(request, StatusCode(status), body),
        Reply::Json(status, body) => send_json(request, StatusCode(status), &body),
    };
    if let Err(err) = sent {
        tracing::debug!(error = %err, "api_response_failed");
    }
}

fn route(method: &Method, path: &str, delivery_route: &str, state: &mut ApiSharedState) -> Reply {
    state.total_requests += 1;
    let is_signal = path == REFRESH_ROUTE || path == delivery_route;
    match (method, path) {
        (Method::Get, HEALTH_ROUTE) => Reply::Text(200, "ok"),
        (Method::Get, ALARMS_ROUTE) => {
            #[derive(Serialize)]
            struct AlarmsResponse<'a> {
                published_unix_ms: i64,
                signals_received: u64,
                total_requests: u64,
                alarms: &'a [AlarmSnapshot],
            }

            let payload = AlarmsResponse {
                published_unix_ms: state.published_unix_ms,
                signals_received: state.signals_received,
                total_requests: state.total_requests,
                alarms: &state.alarms,
            };
            match serde_json::to_value(&payload) {
                Ok(value) => Reply::Json(200, value),
                Err(_) => Reply::Text(500, "failed to encode alarms"),
            }
        }
        (Method::Post, _) if is_signal => {
            state.request_refresh();
            state.signals_received += 1;
            tracing::info!(route = path, "refresh_signal_received");
            Reply::Json(202, serde_json::json!({ "refresh_requested": true }))
        }
        (_, HEALTH_ROUTE | ALARMS_ROUTE) => Reply::Text(405, "method not allowed"),
        (_, _) if is_signal => Reply::Text(405, "method not allowed"),
        _ => Reply::Text(404, "not found"),
    }
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
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

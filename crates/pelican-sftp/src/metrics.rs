//! Server metrics with a Prometheus text-format scrape endpoint.
//!
//! The registry is hand-rolled: atomics for scalar series, mutex-guarded
//! maps for labeled series. Label sets stay low-cardinality (`op`,
//! `result`, `type`); the `user` label is opt-in via
//! `METRICS_INCLUDE_USER` and off by default.
//!
//! The hook functions at the bottom are no-ops until [`install`] runs, so
//! library code can record unconditionally.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::config::parse_bool;

const NAMESPACE: &str = "sftp_server";

const AUTH_BUCKETS: &[f64] = &[0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];
const OP_BUCKETS: &[f64] = &[
    0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0,
];
const VAULT_BUCKETS: &[f64] = &[0.005, 0.01, 0.02, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Metrics listener configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Listen address; empty disables the endpoint.
    pub addr: String,
    pub path: String,
    /// Attach a `user` label to per-user series. High-cardinality; keep
    /// off unless the tenant population is small.
    pub include_user: bool,
}

impl MetricsConfig {
    pub fn from_env() -> Self {
        Self {
            addr: std::env::var("METRICS_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".into()),
            path: std::env::var("METRICS_PATH").unwrap_or_else(|_| "/metrics".into()),
            include_user: parse_bool(std::env::var("METRICS_INCLUDE_USER").ok(), false),
        }
    }
}

struct CounterVec {
    name: &'static str,
    help: &'static str,
    labels: Vec<&'static str>,
    series: Mutex<HashMap<Vec<String>, f64>>,
}

impl CounterVec {
    fn new(name: &'static str, help: &'static str, labels: Vec<&'static str>) -> Self {
        Self {
            name,
            help,
            labels,
            series: Mutex::new(HashMap::new()),
        }
    }

    fn add(&self, values: Vec<String>, delta: f64) {
        let mut series = self.series.lock().expect("metrics poisoned");
        *series.entry(values).or_insert(0.0) += delta;
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {NAMESPACE}_{} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {NAMESPACE}_{} counter", self.name);
        let series = self.series.lock().expect("metrics poisoned");
        for (values, count) in series.iter() {
            let _ = writeln!(
                out,
                "{NAMESPACE}_{}{} {}",
                self.name,
                render_labels(&self.labels, values),
                count
            );
        }
    }
}

struct HistogramSeries {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

struct HistogramVec {
    name: &'static str,
    help: &'static str,
    labels: Vec<&'static str>,
    buckets: &'static [f64],
    series: Mutex<HashMap<Vec<String>, HistogramSeries>>,
}

impl HistogramVec {
    fn new(
        name: &'static str,
        help: &'static str,
        labels: Vec<&'static str>,
        buckets: &'static [f64],
    ) -> Self {
        Self {
            name,
            help,
            labels,
            buckets,
            series: Mutex::new(HashMap::new()),
        }
    }

    fn observe(&self, values: Vec<String>, seconds: f64) {
        let mut series = self.series.lock().expect("metrics poisoned");
        let entry = series.entry(values).or_insert_with(|| HistogramSeries {
            bucket_counts: vec![0; self.buckets.len()],
            sum: 0.0,
            count: 0,
        });
        for (i, bound) in self.buckets.iter().enumerate() {
            if seconds <= *bound {
                entry.bucket_counts[i] += 1;
            }
        }
        entry.sum += seconds;
        entry.count += 1;
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {NAMESPACE}_{} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {NAMESPACE}_{} histogram", self.name);
        let series = self.series.lock().expect("metrics poisoned");
        for (values, data) in series.iter() {
            for (i, bound) in self.buckets.iter().enumerate() {
                let mut with_le = self.labels.clone();
                with_le.push("le");
                let mut label_values = values.clone();
                label_values.push(format!("{bound}"));
                let _ = writeln!(
                    out,
                    "{NAMESPACE}_{}_bucket{} {}",
                    self.name,
                    render_labels(&with_le, &label_values),
                    data.bucket_counts[i]
                );
            }
            let mut with_le = self.labels.clone();
            with_le.push("le");
            let mut label_values = values.clone();
            label_values.push("+Inf".to_string());
            let _ = writeln!(
                out,
                "{NAMESPACE}_{}_bucket{} {}",
                self.name,
                render_labels(&with_le, &label_values),
                data.count
            );
            let plain = render_labels(&self.labels, values);
            let _ = writeln!(out, "{NAMESPACE}_{}_sum{} {}", self.name, plain, data.sum);
            let _ = writeln!(out, "{NAMESPACE}_{}_count{} {}", self.name, plain, data.count);
        }
    }
}

fn render_labels(names: &[&'static str], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", value.replace('"', "'")))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

/// The server-wide metrics registry.
pub struct Metrics {
    include_user: bool,

    sessions_active: AtomicI64,
    sessions_total: CounterVec,

    auth_attempts: CounterVec,
    auth_duration: HistogramVec,

    ops_total: CounterVec,
    op_duration: HistogramVec,

    bytes_in: CounterVec,
    bytes_out: CounterVec,

    quota_exceeded: CounterVec,

    vault_requests: CounterVec,
    vault_duration: HistogramVec,
    vault_last_success: AtomicU64,

    storage_io_errors: CounterVec,
}

impl Metrics {
    fn new(include_user: bool) -> Self {
        let with_user = |mut labels: Vec<&'static str>| {
            if include_user {
                labels.push("user");
            }
            labels
        };

        Self {
            include_user,
            sessions_active: AtomicI64::new(0),
            sessions_total: CounterVec::new(
                "sessions_total",
                "Total number of SFTP sessions started.",
                vec!["result"],
            ),
            auth_attempts: CounterVec::new(
                "auth_attempts_total",
                "Total authentication attempts.",
                with_user(vec!["result"]),
            ),
            auth_duration: HistogramVec::new(
                "auth_duration_seconds",
                "Authentication decision latency.",
                with_user(vec!["result"]),
                AUTH_BUCKETS,
            ),
            ops_total: CounterVec::new(
                "ops_total",
                "Total SFTP operations.",
                with_user(vec!["op", "result"]),
            ),
            op_duration: HistogramVec::new(
                "op_duration_seconds",
                "SFTP operation latency.",
                with_user(vec!["op", "result"]),
                OP_BUCKETS,
            ),
            bytes_in: CounterVec::new(
                "bytes_in_total",
                "Total bytes uploaded to the server.",
                with_user(vec!["result"]),
            ),
            bytes_out: CounterVec::new(
                "bytes_out_total",
                "Total bytes downloaded from the server.",
                with_user(vec!["result"]),
            ),
            quota_exceeded: CounterVec::new(
                "quota_exceeded_total",
                "Total quota exceed events.",
                with_user(vec!["type"]),
            ),
            vault_requests: CounterVec::new(
                "vault_requests_total",
                "Total secret store requests.",
                vec!["op", "result"],
            ),
            vault_duration: HistogramVec::new(
                "vault_request_duration_seconds",
                "Secret store request latency.",
                vec!["op", "result"],
                VAULT_BUCKETS,
            ),
            vault_last_success: AtomicU64::new(0),
            storage_io_errors: CounterVec::new(
                "storage_io_errors_total",
                "Storage IO error count (application-level).",
                vec!["op"],
            ),
        }
    }

    fn user_label(&self, values: &mut Vec<String>, user: &str) {
        if self.include_user {
            values.push(safe_user_label(user));
        }
    }

    /// Render the whole registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_sessions_active Current number of active SFTP sessions."
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_sessions_active gauge");
        let _ = writeln!(
            out,
            "{NAMESPACE}_sessions_active {}",
            self.sessions_active.load(Ordering::Relaxed)
        );

        self.sessions_total.render(&mut out);
        self.auth_attempts.render(&mut out);
        self.auth_duration.render(&mut out);
        self.ops_total.render(&mut out);
        self.op_duration.render(&mut out);
        self.bytes_in.render(&mut out);
        self.bytes_out.render(&mut out);
        self.quota_exceeded.render(&mut out);
        self.vault_requests.render(&mut out);
        self.vault_duration.render(&mut out);

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_vault_last_success_timestamp_seconds Unix timestamp of last successful store request."
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_vault_last_success_timestamp_seconds gauge");
        let _ = writeln!(
            out,
            "{NAMESPACE}_vault_last_success_timestamp_seconds {}",
            self.vault_last_success.load(Ordering::Relaxed)
        );

        self.storage_io_errors.render(&mut out);
        out
    }
}

static GLOBAL: OnceCell<Metrics> = OnceCell::new();

/// Install the global registry. Later calls are ignored.
pub fn install(include_user: bool) {
    let _ = GLOBAL.set(Metrics::new(include_user));
}

fn global() -> Option<&'static Metrics> {
    GLOBAL.get()
}

// Auth result classes, low-cardinality by construction.
pub const AUTH_OK: &str = "ok";
pub const AUTH_FAIL_KEY: &str = "fail_key";
pub const AUTH_FAIL_DISABLED: &str = "fail_disabled";
pub const AUTH_FAIL_USER_LOAD: &str = "fail_user_load";

/// Record an auth attempt and its latency.
pub fn observe_auth(user: &str, result: &str, duration: Duration) {
    let Some(m) = global() else { return };
    let mut values = vec![result.to_string()];
    m.user_label(&mut values, user);
    m.auth_attempts.add(values.clone(), 1.0);
    m.auth_duration.observe(values, duration.as_secs_f64());
}

/// Adjust the active-session gauge: +1 on accept, -1 on teardown.
pub fn inc_session_active(delta: i64) {
    if let Some(m) = global() {
        m.sessions_active.fetch_add(delta, Ordering::Relaxed);
    }
}

pub fn inc_session_total(result: &str) {
    if let Some(m) = global() {
        m.sessions_total.add(vec![result.to_string()], 1.0);
    }
}

/// Record an SFTP operation outcome and latency.
pub fn observe_op(user: &str, op: &str, result: &str, duration: Duration) {
    let Some(m) = global() else { return };
    let mut values = vec![normalize_op(op), result.to_string()];
    m.user_label(&mut values, user);
    m.ops_total.add(values.clone(), 1.0);
    m.op_duration.observe(values, duration.as_secs_f64());
}

pub fn add_bytes_in(user: &str, result: &str, n: u64) {
    let Some(m) = global() else { return };
    if n == 0 {
        return;
    }
    let mut values = vec![result.to_string()];
    m.user_label(&mut values, user);
    m.bytes_in.add(values, n as f64);
}

pub fn add_bytes_out(user: &str, result: &str, n: u64) {
    let Some(m) = global() else { return };
    if n == 0 {
        return;
    }
    let mut values = vec![result.to_string()];
    m.user_label(&mut values, user);
    m.bytes_out.add(values, n as f64);
}

pub fn inc_quota_exceeded(user: &str, quota_type: &str) {
    let Some(m) = global() else { return };
    let mut values = vec![quota_type.to_string()];
    m.user_label(&mut values, user);
    m.quota_exceeded.add(values, 1.0);
}

/// Record a secret store request.
pub fn observe_vault(op: &str, result: &str, duration: Duration) {
    let Some(m) = global() else { return };
    let values = vec![op.to_string(), result.to_string()];
    m.vault_requests.add(values.clone(), 1.0);
    m.vault_duration.observe(values, duration.as_secs_f64());
    if result == "success" {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        m.vault_last_success.store(now, Ordering::Relaxed);
    }
}

pub fn inc_storage_io_error(op: &str) {
    if let Some(m) = global() {
        m.storage_io_errors.add(vec![normalize_op(op)], 1.0);
    }
}

fn normalize_op(op: &str) -> String {
    match op.trim().to_ascii_lowercase().as_str() {
        "list" | "readdir" => "ls".to_string(),
        "read" | "get" => "get".to_string(),
        "write" | "put" => "put".to_string(),
        other => other.to_string(),
    }
}

fn safe_user_label(user: &str) -> String {
    let user = user.trim();
    if user.is_empty() {
        return "unknown".to_string();
    }
    user.chars().take(64).collect()
}

async fn scrape() -> impl IntoResponse {
    let body = global().map(Metrics::render).unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Run the metrics listener until `shutdown` resolves. An empty address
/// disables the endpoint entirely.
pub async fn run_server(
    config: MetricsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    if config.addr.is_empty() {
        info!("metrics disabled (METRICS_ADDR empty)");
        return;
    }
    let path = if config.path.is_empty() {
        "/metrics".to_string()
    } else {
        config.path.clone()
    };

    let app = Router::new()
        .route(&path, get(scrape))
        .route("/healthz", get(healthz));

    let listener = match tokio::net::TcpListener::bind(&config.addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %config.addr, error = %e, "metrics listener bind failed");
            return;
        }
    };
    info!(addr = %config.addr, path = %path, "metrics listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %e, "metrics server error");
    }
}

use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use sr700_common::{
    ConnectionState, CoolStep, HeatSetting, RoastState, RuntimeConfig, TEMP_MAX_F, TEMP_MIN_F,
};
use sr700_controller::{CompletionCallback, Roaster, RoasterObserver};

const DEFAULT_CONFIG_PATH: &str = "./sr700.json";

#[derive(Clone)]
struct AppState {
    roaster: Arc<Roaster>,
    auto_cool: Option<CoolStep>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct LogObserver;

impl RoasterObserver for LogObserver {
    fn temperature_changed(&self, temperature: u16, time_remaining: u32) {
        debug!(temperature, time_remaining, "roaster telemetry");
    }

    fn step_completed(&self, state: RoastState) {
        info!("{} step completed", state.as_str());
    }

    fn connected(&self, state: ConnectionState) {
        info!("roaster connection: {}", state.as_str());
    }

    fn disconnected(&self) {
        info!("roaster disconnected");
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("SR700_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut runtime = load_runtime_config(&config_path)
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load runtime config: {err:#}");
            RuntimeConfig::default()
        });
    apply_env_overrides(&mut runtime);
    runtime.sanitize();

    let roaster = Arc::new(
        Roaster::new(runtime.roaster.clone(), Some(Arc::new(LogObserver)))
            .context("failed to start roaster control thread")?,
    );

    if runtime.auto_connect {
        let handle = roaster.clone();
        let accepted = tokio::task::spawn_blocking(move || handle.auto_connect()).await?;
        info!(
            "auto-connect to {} {}",
            runtime.roaster.device_path,
            if accepted { "started" } else { "rejected" }
        );
    }

    let app_state = AppState {
        roaster: roaster.clone(),
        auto_cool: runtime.auto_cool,
    };

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/connect", post(handle_connect))
        .route("/api/roast", post(handle_roast))
        .route("/api/cool", post(handle_cool))
        .route("/api/idle", post(handle_idle))
        .route("/api/sleep", post(handle_sleep))
        .route("/api/disconnect", post(handle_disconnect))
        .route("/api/heater", post(handle_heater))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down roaster");
    roaster.terminate();
    tokio::task::spawn_blocking(move || drop(roaster)).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("invalid config in {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            Ok(RuntimeConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(device) = std::env::var("SR700_DEVICE") {
        runtime.roaster.device_path = device;
    }
    if let Some(port) = std::env::var("SR700_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.http_port = port;
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.roaster.status())
}

async fn handle_connect(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let auto = params
        .get("auto")
        .is_some_and(|value| matches!(value.as_str(), "1" | "true"));

    if auto {
        let roaster = state.roaster.clone();
        let accepted = tokio::task::spawn_blocking(move || roaster.auto_connect())
            .await
            .unwrap_or(false);
        if !accepted {
            return error_response(StatusCode::CONFLICT, "Roaster is already connecting or connected");
        }
    } else {
        if state.roaster.connection_state() != ConnectionState::NotConnected.as_str() {
            return error_response(StatusCode::CONFLICT, "Roaster is already connecting or connected");
        }
        state
            .roaster
            .connect(|result| info!("connect finished: {}", result.as_str()));
    }

    accepted(&state)
}

async fn handle_roast(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let (fan, seconds) = match parse_step(&params) {
        Ok(step) => step,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    match (params.get("temp"), params.get("level")) {
        (Some(temp), None) => {
            let Some(temp) = parse_temperature(temp) else {
                return error_response(StatusCode::BAD_REQUEST, "Invalid temp value (150-550)");
            };
            state
                .roaster
                .roast_to_temperature(temp, fan, seconds, auto_cool_after_roast(&state));
        }
        (None, Some(level)) => {
            let Some(level) = HeatSetting::parse(level) else {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Invalid level. Use NONE, LOW, MEDIUM or HIGH",
                );
            };
            state
                .roaster
                .roast_at_level(level, fan, seconds, auto_cool_after_roast(&state));
        }
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Provide exactly one of 'temp' or 'level'",
            )
        }
    }

    accepted(&state)
}

async fn handle_cool(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let (fan, seconds) = match parse_step(&params) {
        Ok(step) => step,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    state.roaster.cool(fan, seconds, None);
    accepted(&state)
}

async fn handle_idle(State(state): State<AppState>) -> impl IntoResponse {
    state.roaster.idle();
    accepted(&state)
}

async fn handle_sleep(State(state): State<AppState>) -> impl IntoResponse {
    state.roaster.sleep();
    accepted(&state)
}

async fn handle_disconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.roaster.disconnect();
    accepted(&state)
}

async fn handle_heater(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let external = match params.get("external").map(|value| value.as_str()) {
        None => None,
        Some("1" | "true") => Some(true),
        Some("0" | "false") => Some(false),
        Some(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid 'external' value"),
    };
    let level = match params.get("level").map(|value| value.parse::<i64>()) {
        None => None,
        Some(Ok(level)) if level >= 0 => Some(level),
        Some(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid heater level"),
    };
    if external.is_none() && level.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'level' parameter");
    }

    if let Some(enabled) = external {
        state.roaster.set_external_drive(enabled);
    }
    if let Some(level) = level {
        state.roaster.set_heater_level(level);
    }
    accepted(&state)
}

/// Queues the configured cool step once a roast finishes.
fn auto_cool_after_roast(state: &AppState) -> Option<CompletionCallback> {
    let step = state.auto_cool?;
    let roaster = Arc::downgrade(&state.roaster);
    Some(Box::new(move || {
        if let Some(roaster) = roaster.upgrade() {
            info!("roast finished, cooling at fan {} for {}s", step.fan, step.seconds);
            roaster.cool(step.fan, step.seconds, None);
        }
    }))
}

fn parse_step(params: &HashMap<String, String>) -> Result<(u8, u32), &'static str> {
    let Some(fan) = params.get("fan") else {
        return Err("Missing 'fan' parameter");
    };
    let fan = match fan.parse::<u8>() {
        Ok(fan) if (1..=9).contains(&fan) => fan,
        _ => return Err("Invalid fan value (1-9)"),
    };

    let Some(seconds) = params.get("seconds") else {
        return Err("Missing 'seconds' parameter");
    };
    let Ok(seconds) = seconds.parse::<u32>() else {
        return Err("Invalid seconds value");
    };
    Ok((fan, seconds))
}

fn parse_temperature(value: &str) -> Option<u16> {
    value
        .parse::<u16>()
        .ok()
        .filter(|temp| (TEMP_MIN_F..=TEMP_MAX_F).contains(temp))
}

// Commands land on the next control cycle, so this snapshot may lag by one.
fn accepted(state: &AppState) -> axum::response::Response {
    (StatusCode::ACCEPTED, Json(state.roaster.status())).into_response()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

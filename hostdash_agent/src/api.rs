//! HTTP routes: login/logout, HTML pages, and the JSON API.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::action::{Action, Scope};
use crate::auth::{require_auth, session_cookie, LoginError, SESSION_COOKIE};
use crate::docker;
use crate::error::AdapterError;
use crate::metrics::{collect_containers, collect_host_metrics, collect_pm2, collect_processes};
use crate::procs;
use crate::state::AppState;
use crate::upstream::Forward;
use crate::views;
use crate::ws::ws_handler;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/dashboard", get(dashboard))
        .route("/api/metrics", get(metrics))
        .route("/api/processes", get(processes))
        .route("/api/processes/:pid", get(process_detail))
        .route("/api/processes/:pid/logs", get(process_logs))
        .route("/api/processes/:pid/:action", post(process_action))
        .route("/api/pm2", get(pm2_list))
        .route("/api/pm2/:id/stats", get(pm2_stats))
        .route("/api/pm2/:id/:action", post(pm2_action))
        .route("/api/docker", get(docker_list))
        .route("/api/docker/:id/stats", get(docker_stats))
        .route("/api/docker/:id/:action", post(docker_action))
        .route("/api/remote/*path", get(remote_get).post(remote_post))
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .merge(protected)
        .with_state(state)
}

// ---------- Public ----------

async fn health() -> Json<serde_json::Value> {
    let time = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    Json(json!({ "ok": true, "time": time }))
}

async fn login_form() -> Html<String> {
    Html(views::login_page(None))
}

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

fn cookie_header(value: &str, max_age_secs: u64, secure: bool) -> Option<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{secure}"
    ))
    .ok()
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let now = Instant::now();
    match state
        .limiter
        .attempt(&state.credentials, &form.username, &form.password, now)
    {
        Ok(()) => {
            let token = state.sessions.create(&form.username, now);
            info!(user = %form.username, "login");
            let mut resp = Redirect::to("/dashboard").into_response();
            if let Some(v) = cookie_header(
                &token,
                state.sessions.ttl().as_secs(),
                state.secure_cookies,
            ) {
                resp.headers_mut().insert(header::SET_COOKIE, v);
            }
            resp
        }
        Err(LoginError::BadCredentials { .. }) => {
            warn!(user = %form.username, "login failed");
            (
                StatusCode::UNAUTHORIZED,
                Html(views::login_page(Some("Invalid credentials"))),
            )
                .into_response()
        }
        Err(LoginError::Locked { retry_after }) => {
            let mins = retry_after.as_secs().div_ceil(60).max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                Html(views::login_page(Some(&format!(
                    "Too many failed attempts. Try again in {mins} minute(s)."
                )))),
            )
                .into_response()
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_cookie(&headers) {
        state.sessions.remove(&token);
    }
    let mut resp = Redirect::to("/login").into_response();
    if let Some(v) = cookie_header("", 0, state.secure_cookies) {
        resp.headers_mut().insert(header::SET_COOKIE, v);
    }
    resp
}

// ---------- Pages ----------

async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let user = session_cookie(&headers)
        .and_then(|t| state.sessions.get(&t, Instant::now()))
        .map(|s| s.username)
        .unwrap_or_else(|| "api".to_string());
    Html(views::dashboard_page(&user, &state.hostname))
}

// ---------- Metrics + processes ----------

type ApiResult<T> = Result<Json<T>, AdapterError>;

async fn metrics(State(state): State<AppState>) -> Json<crate::types::HostMetrics> {
    Json(collect_host_metrics(&state).await)
}

async fn processes(State(state): State<AppState>) -> ApiResult<Vec<crate::types::ProcessRecord>> {
    Ok(Json(collect_processes(&state).await?))
}

fn parse_pid(raw: &str) -> Result<i32, AdapterError> {
    raw.parse::<i32>()
        .map_err(|_| AdapterError::BadRequest(format!("pid '{raw}' is not a number")))
}

fn procs_enabled(state: &AppState) -> Result<(), AdapterError> {
    if state.procs_enabled {
        Ok(())
    } else {
        Err(AdapterError::Disabled("process"))
    }
}

async fn process_detail(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> ApiResult<crate::types::ProcessDetail> {
    let pid = parse_pid(&pid)?;
    procs_enabled(&state)?;
    Ok(Json(procs::process_detail(state.runner.as_ref(), pid).await?))
}

async fn process_logs(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> ApiResult<crate::types::ProcessLogs> {
    let pid = parse_pid(&pid)?;
    procs_enabled(&state)?;
    let detail = procs::process_detail(state.runner.as_ref(), pid).await?;
    Ok(Json(
        procs::process_logs(state.runner.as_ref(), pid, &detail.process.command).await,
    ))
}

async fn process_action(
    State(state): State<AppState>,
    Path((pid, action)): Path<(String, String)>,
) -> ApiResult<crate::types::ActionOutcome> {
    let action = Action::parse(Scope::Os, &action)?;
    let pid = parse_pid(&pid)?;
    procs_enabled(&state)?;
    Ok(Json(
        procs::kill_process(state.runner.as_ref(), pid, action).await?,
    ))
}

// ---------- PM2 ----------

async fn pm2_list(State(state): State<AppState>) -> ApiResult<Vec<crate::types::Pm2ProcessRecord>> {
    Ok(Json(collect_pm2(&state).await?))
}

async fn pm2_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<crate::types::Pm2ProcessRecord> {
    let pm2 = state.pm2.as_ref().ok_or(AdapterError::Disabled("pm2"))?;
    Ok(Json(pm2.describe(state.runner.as_ref(), &id).await?))
}

async fn pm2_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> ApiResult<crate::types::ActionOutcome> {
    let action = Action::parse(Scope::Pm2, &action)?;
    let pm2 = state.pm2.as_ref().ok_or(AdapterError::Disabled("pm2"))?;
    Ok(Json(pm2.action(state.runner.as_ref(), &id, action).await?))
}

// ---------- Docker ----------

async fn docker_list(State(state): State<AppState>) -> ApiResult<Vec<crate::types::ContainerRecord>> {
    Ok(Json(collect_containers(&state).await?))
}

async fn docker_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<crate::types::ContainerStats> {
    let engine = state.docker.as_ref().ok_or(AdapterError::Disabled("docker"))?;
    Ok(Json(engine.container_stats(&id).await?))
}

async fn docker_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> ApiResult<crate::types::ActionOutcome> {
    let action = Action::parse(Scope::Docker, &action)?;
    if state.docker.is_none() {
        return Err(AdapterError::Disabled("docker"));
    }
    Ok(Json(
        docker::container_action(state.runner.as_ref(), &id, action).await?,
    ))
}

// ---------- Upstream proxy ----------

async fn remote(state: &AppState, call: Forward<'_>) -> ApiResult<serde_json::Value> {
    let api = state
        .upstream
        .as_ref()
        .ok_or(AdapterError::Disabled("upstream"))?;
    Ok(Json(api.forward(call).await?))
}

async fn remote_get(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<serde_json::Value> {
    let call = Forward {
        query: query.as_deref(),
        ..Forward::get(&path)
    };
    remote(&state, call).await
}

async fn remote_post(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<serde_json::Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    remote(
        &state,
        Forward {
            method: Method::POST,
            path: &path,
            query: query.as_deref(),
            content_type,
            body,
        },
    )
    .await
}

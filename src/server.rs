use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::bot::Bot;
use crate::models::Severity;

pub fn router(bot: Arc<Bot>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/webhook", post(webhook).fallback(webhook_wrong_method))
        .route("/logs", get(logs))
        .route("/status", get(status))
        .route("/upload-progress", get(upload_progress))
        .route("/check-webhook", get(check_webhook))
        .route("/control/clearlogs", post(clear_logs))
        .with_state(bot)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Always answers 200 so Telegram does not redeliver bad input.
async fn webhook(State(bot): State<Arc<Bot>>, body: Bytes) -> (StatusCode, String) {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(err) => {
            bot.state().record(
                Severity::Warn,
                format!("Webhook body is not JSON: {err}"),
                None,
            );
            return (StatusCode::OK, "Malformed update".to_string());
        }
    };
    (StatusCode::OK, bot.handle_update(raw).await)
}

async fn webhook_wrong_method() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Only POST allowed")
}

async fn logs(State(bot): State<Arc<Bot>>) -> impl IntoResponse {
    let state = bot.state();
    Json(state.logs.recent(state.config.log_tail))
}

async fn status(State(bot): State<Arc<Bot>>) -> impl IntoResponse {
    let state = bot.state();
    let uptime = Utc::now() - state.started_at;
    Json(json!({
        "active": true,
        "version": env!("CARGO_PKG_VERSION"),
        "pid": std::process::id(),
        "uptime_secs": uptime.num_seconds(),
        "pending_batches": state.queue.len(),
        "playlist": state.config.playlist_raw_url(),
    }))
}

async fn upload_progress(State(bot): State<Arc<Bot>>) -> impl IntoResponse {
    Json(bot.state().progress.snapshot())
}

async fn check_webhook(State(bot): State<Arc<Bot>>) -> impl IntoResponse {
    let Some(expected) = bot.state().config.webhook_url.clone() else {
        return Json(json!({ "success": false, "error": "WEBHOOK_URL is not set" }));
    };
    match bot.telegram().get_webhook_info().await {
        Ok(info) if info.url == expected => Json(json!({
            "success": true,
            "error": null,
            "pending_update_count": info.pending_update_count,
        })),
        Ok(info) => Json(json!({
            "success": false,
            "error": "Webhook URL mismatch",
            "url": info.url,
            "last_error_message": info.last_error_message,
        })),
        Err(err) => Json(json!({ "success": false, "error": err.to_string() })),
    }
}

async fn clear_logs(State(bot): State<Arc<Bot>>) -> impl IntoResponse {
    bot.state().logs.clear();
    (StatusCode::ACCEPTED, Json(json!({ "ok": true })))
}

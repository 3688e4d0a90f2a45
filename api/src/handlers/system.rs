use crate::auth::CurrentUser;
use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Map, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Configuration presence report. Secret values are never returned.
pub async fn env_check(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Json<Value> {
    let variables: Map<String, Value> = state
        .settings
        .presence_report()
        .into_iter()
        .map(|(name, status)| (name.to_string(), Value::String(status)))
        .collect();

    Json(json!({
        "status": "success",
        "environment": state.settings.app_env,
        "variables": variables,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

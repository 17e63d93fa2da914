// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory, read-only diagnostic endpoints: `/vite-status` and `/debug/*`.
//! Neither is part of the health contract in §4.6 — they exist purely to
//! give an operator a quick look without shelling into the machine.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn vite_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "lifecycle": format!("{:?}", state.lifecycle.current()),
        "devServerPort": state.lifecycle.current_port(),
        "isHealthy": state.health.lock().is_healthy,
        "restartAttempts": state.health.lock().restart_attempts,
    }))
}

pub async fn debug(State(state): State<AppState>, path: Option<Path<String>>) -> Json<Value> {
    Json(json!({
        "path": path.map(|Path(p)| p).unwrap_or_default(),
        "projectId": state.config.project_id.as_str(),
        "machineId": state.config.machine_id.as_str(),
        "lifecycle": format!("{:?}", state.lifecycle.current()),
        "subscription": format!("{:?}", state.subscription.status()),
    }))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /health` responder: assembles the JSON status body and maps the
//! lifecycle state to an HTTP status per §4.6 of the health design.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use previewd_adapters::broadcast::{SubscriptionStatus, MAX_RECONNECT_ATTEMPTS};
use previewd_core::LifecycleState;
use serde_json::json;

use crate::state::AppState;

pub fn status_code_for(state: LifecycleState) -> StatusCode {
    match state {
        LifecycleState::Ready => StatusCode::OK,
        LifecycleState::Error => StatusCode::INTERNAL_SERVER_ERROR,
        LifecycleState::Starting
        | LifecycleState::Hydrating
        | LifecycleState::Installing
        | LifecycleState::Launching
        | LifecycleState::Degraded
        | LifecycleState::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let lifecycle_state = state.lifecycle.current();
    let snapshot = state.health.lock().clone();
    let database_ok = state
        .session_store
        .lookup_active(&previewd_core::SessionId::new("__health_probe__"))
        .await
        .is_ok();
    let ws_connected = matches!(state.subscription.status(), SubscriptionStatus::Subscribed);

    let body = json!({
        "status": lifecycle_status_label(lifecycle_state),
        "projectId": state.config.project_id.as_str(),
        "devServerPort": state.lifecycle.current_port(),
        "uptime": state.start_time.elapsed().as_secs(),
        "checks": {
            "devServer": snapshot.is_healthy,
            "database": database_ok,
        },
        "websocket": {
            "connected": ws_connected,
            "retryCount": state.subscription.reconnect_attempts(),
            "maxRetryAttempts": MAX_RECONNECT_ATTEMPTS,
        }
    });

    (status_code_for(lifecycle_state), Json(body))
}

fn lifecycle_status_label(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Starting => "starting",
        LifecycleState::Hydrating => "hydrating",
        LifecycleState::Installing => "installing",
        LifecycleState::Launching => "launching",
        LifecycleState::Ready => "ready",
        LifecycleState::Degraded => "degraded",
        LifecycleState::Error => "error",
        LifecycleState::ShuttingDown => "shutting_down",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_maps_to_200() {
        assert_eq!(status_code_for(LifecycleState::Ready), StatusCode::OK);
    }

    #[test]
    fn error_maps_to_500() {
        assert_eq!(status_code_for(LifecycleState::Error), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn starting_degraded_and_shutting_down_map_to_503() {
        for state in [
            LifecycleState::Starting,
            LifecycleState::Degraded,
            LifecycleState::ShuttingDown,
        ] {
            assert_eq!(status_code_for(state), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}

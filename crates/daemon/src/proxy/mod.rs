// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reverse-proxy / session-router HTTP surface. `build_router` is the
//! single entry point the binary calls; everything else in this module is
//! routing detail.

pub mod diagnostics;
pub mod direct;
pub mod rewrite;
pub mod session_router;
pub mod upstream;

use axum::routing::{any, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::health_endpoint::health;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/vite-status", get(diagnostics::vite_status))
        .route("/debug", get(diagnostics::debug))
        .route("/debug/*rest", get(diagnostics::debug))
        .route(
            "/session/:session_id",
            any(session_router::session_proxy_root),
        )
        .route(
            "/session/:session_id/*rest",
            any(session_router::session_proxy_rest),
        )
        .fallback(direct::direct_proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

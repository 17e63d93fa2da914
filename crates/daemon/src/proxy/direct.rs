// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct (non-session) proxying: anything that isn't `/health`,
//! `/vite-status`, `/debug/*`, or `/session/{id}/...` goes straight to the
//! dev server with no prefix strip and no HTML rewriting.

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;

use crate::proxy::upstream::{
    accepts_html, bad_gateway_response, forward_http, is_websocket_upgrade, not_ready_response,
    tunnel_websocket,
};
use crate::state::AppState;

pub async fn direct_proxy(
    State(state): State<AppState>,
    original_uri: OriginalUri,
    method: Method,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
    body: Bytes,
) -> Response {
    let wants_html = accepts_html(&headers);

    if !state.lifecycle.current().is_serving() {
        return not_ready_response(wants_html);
    }
    let Some(port) = state.lifecycle.current_port() else {
        return not_ready_response(wants_html);
    };

    let upstream_path = original_uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    if let Some(ws) = ws {
        if is_websocket_upgrade(&headers) {
            return ws.on_upgrade(move |socket| tunnel_websocket(socket, port, upstream_path));
        }
    }

    match forward_http(
        &state.http_client,
        port,
        method,
        &upstream_path,
        &headers,
        body,
        None,
        &state.config.public_host,
    )
    .await
    {
        Ok(response) => response,
        Err(err) => bad_gateway_response(wants_html, &err),
    }
}

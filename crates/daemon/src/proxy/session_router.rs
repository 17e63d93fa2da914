// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session routing: looks the session id up in the shared store, decides
//! whether it belongs on this machine, and either proxies it to the local
//! dev server (stripping the `/session/{id}` prefix and rewriting HTML) or
//! hands back a replay hint for the external edge to retry elsewhere.

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use previewd_adapters::session_store::poll_for_active_session;
use previewd_core::SessionId;

use crate::proxy::upstream::{
    accepts_html, bad_gateway_response, forward_http, is_websocket_upgrade, not_ready_response,
    tunnel_websocket,
};
use crate::state::AppState;

const REPLAY_HEADER: &str = "fly-replay";

pub async fn session_proxy_root(
    state: State<AppState>,
    Path(session_id): Path<String>,
    original_uri: OriginalUri,
    method: Method,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
    body: Bytes,
) -> Response {
    let rest = query_suffix(&original_uri, "/");
    handle_session_request(state, session_id, rest, method, headers, ws, body).await
}

pub async fn session_proxy_rest(
    state: State<AppState>,
    Path((session_id, rest)): Path<(String, String)>,
    original_uri: OriginalUri,
    method: Method,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
    body: Bytes,
) -> Response {
    let rest = query_suffix(&original_uri, &format!("/{rest}"));
    handle_session_request(state, session_id, rest, method, headers, ws, body).await
}

fn query_suffix(original_uri: &OriginalUri, path: &str) -> String {
    match original_uri.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

async fn handle_session_request(
    State(state): State<AppState>,
    session_id: String,
    upstream_path: String,
    method: Method,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
    body: Bytes,
) -> Response {
    let wants_html = accepts_html(&headers);

    let lookup = poll_for_active_session(&*state.session_store, &SessionId::new(session_id.clone())).await;
    let (record, attempts) = match lookup {
        Ok(outcome) => outcome,
        Err(_err) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Database connection failed" })),
            )
                .into_response();
        }
    };

    let record = match record {
        Some(record) => record,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "session not found",
                    "sessionId": session_id,
                    "attempts": attempts,
                })),
            )
                .into_response();
        }
    };

    if record.machine_id != state.config.machine_id {
        return replay_response(&record.machine_id.to_string(), &session_id);
    }

    if !state.lifecycle.current().is_serving() {
        return not_ready_response(wants_html);
    }

    let Some(port) = state.lifecycle.current_port() else {
        return not_ready_response(wants_html);
    };

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
        Some(&session_id),
        &state.config.public_host,
    )
    .await
    {
        Ok(response) => response,
        Err(err) => bad_gateway_response(wants_html, &err),
    }
}

fn replay_response(target_machine: &str, session_id: &str) -> Response {
    let mut response = (
        StatusCode::TEMPORARY_REDIRECT,
        Json(json!({ "targetMachine": target_machine, "sessionId": session_id })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("instance={target_machine}")) {
        response.headers_mut().insert(REPLAY_HEADER, value);
    }
    response
}

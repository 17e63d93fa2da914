// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The loopback hop from the edge-facing router to the dev server: plain
//! HTTP forwarding plus a WebSocket frame bridge for the HMR channel.
//! Mirrors the shape of the teacher's `attach_proxy::bridge_ws` bidirectional
//! bridge, generalized from a raw byte stream to HTTP request/response and
//! from a TCP socket to a loopback dev-server port.

use axum::body::{Body, Bytes};
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use crate::proxy::rewrite::rewrite_html;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Headers that are connection-scoped and must not be replayed across hops,
/// per RFC 7230 §6.1. `host` is rebuilt for the upstream request separately.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Forwards a single HTTP request to the dev server on loopback. `session_id`
/// is `Some` only for session-scoped requests, which gates HTML rewriting.
pub async fn forward_http(
    client: &reqwest::Client,
    port: u16,
    method: Method,
    upstream_path_and_query: &str,
    headers: &HeaderMap,
    body: Bytes,
    session_id: Option<&str>,
    public_host: &str,
) -> Result<Response, ProxyError> {
    let url = format!("http://127.0.0.1:{port}{upstream_path_and_query}");
    let mut builder = client.request(method, url);
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        builder = builder.header(name.clone(), value.clone());
    }
    let upstream_response = builder.body(body).send().await?;

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();
    let is_html = response_headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/html"))
        .unwrap_or(false);

    if is_html {
        if let Some(session_id) = session_id {
            let bytes = upstream_response.bytes().await?;
            let original = String::from_utf8_lossy(&bytes);
            let rewritten = rewrite_html(&original, session_id, public_host);
            response_headers.remove(reqwest::header::CONTENT_LENGTH);
            let mut response = Response::builder().status(status);
            for (name, value) in response_headers.iter() {
                response = response.header(name, value);
            }
            let response = response
                .header(axum::http::header::CONTENT_LENGTH, rewritten.len())
                .body(Body::from(rewritten))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
            return Ok(response);
        }
    }

    let stream = upstream_response.bytes_stream();
    let mut response = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        response = response.header(name, value);
    }
    Ok(response
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

/// A 503 shown to a session-scoped browser navigation before the dev server
/// is ready. Self-refreshing so the client polls until the proxy starts
/// forwarding for real; non-HTML callers in this window get plain JSON.
pub fn not_ready_response(wants_html: bool) -> Response {
    if wants_html {
        let body = "<!doctype html><html><head><meta http-equiv=\"refresh\" content=\"1\"></head>\
                     <body>Starting preview…</body></html>";
        (
            StatusCode::SERVICE_UNAVAILABLE,
            [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({ "error": "dev server not ready" })),
        )
            .into_response()
    }
}

/// A 502 shown when the upstream proxy call itself failed mid-request.
pub fn bad_gateway_response(wants_html: bool, err: &ProxyError) -> Response {
    tracing::warn!(error = %err, "upstream proxy call failed");
    if wants_html {
        let body = "<!doctype html><html><body><h1>502 Bad Gateway</h1></body></html>";
        (
            StatusCode::BAD_GATEWAY,
            [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response()
    } else {
        (
            StatusCode::BAD_GATEWAY,
            axum::Json(serde_json::json!({ "error": "upstream proxy failed" })),
        )
            .into_response()
    }
}

pub fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

/// Bridges WebSocket frames bidirectionally between the already-upgraded
/// client socket and a fresh client connection to the dev server's HMR
/// endpoint. Frame contents are never inspected or rewritten. Socket errors
/// are logged; the outer HTTP response (the 101 switch) has already
/// succeeded by the time this runs, so there is nothing left to fail.
pub async fn tunnel_websocket(socket: WebSocket, port: u16, upstream_path_and_query: String) {
    let url = format!("ws://127.0.0.1:{port}{upstream_path_and_query}");
    let upstream = match tokio_tungstenite::connect_async(&url).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            tracing::warn!(error = %err, url, "failed to connect to upstream dev server websocket");
            return;
        }
    };

    let (mut client_tx, mut client_rx) = socket.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(frame) = client_rx.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(err) => {
                    tracing::debug!(error = %err, "client websocket read failed");
                    break;
                }
            };
            let forwarded = match message {
                AxumMessage::Text(text) => TungsteniteMessage::Text(text.to_string().into()),
                AxumMessage::Binary(data) => TungsteniteMessage::Binary(data.to_vec().into()),
                AxumMessage::Ping(data) => TungsteniteMessage::Ping(data.to_vec().into()),
                AxumMessage::Pong(data) => TungsteniteMessage::Pong(data.to_vec().into()),
                AxumMessage::Close(_) => break,
            };
            if upstream_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(frame) = upstream_rx.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(err) => {
                    tracing::debug!(error = %err, "upstream websocket read failed");
                    break;
                }
            };
            let forwarded = match message {
                TungsteniteMessage::Text(text) => AxumMessage::Text(text.to_string().into()),
                TungsteniteMessage::Binary(data) => AxumMessage::Binary(data.to_vec().into()),
                TungsteniteMessage::Ping(data) => AxumMessage::Ping(data.to_vec().into()),
                TungsteniteMessage::Pong(data) => AxumMessage::Pong(data.to_vec().into()),
                TungsteniteMessage::Close(_) => break,
                TungsteniteMessage::Frame(_) => continue,
            };
            if client_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
}

pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let is_upgrade = headers
        .get(axum::http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    let is_websocket = headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    is_upgrade && is_websocket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_websocket_upgrade_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::CONNECTION, "Upgrade".parse().unwrap());
        headers.insert(axum::http::header::UPGRADE, "websocket".parse().unwrap());
        assert!(is_websocket_upgrade(&headers));
    }

    #[test]
    fn plain_request_is_not_a_websocket_upgrade() {
        let headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn accepts_html_reads_the_accept_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ACCEPT, "text/html,*/*".parse().unwrap());
        assert!(accepts_html(&headers));
        assert!(!accepts_html(&HeaderMap::new()));
    }
}

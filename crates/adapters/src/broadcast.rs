// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast Subscriber: a reconnecting Redis pub/sub client that applies
//! `file:update`/`file:delete`/`file:bulk-update` events to the workspace
//! filesystem, serialized per channel so same-path applies stay ordered.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use previewd_core::{
    normalize_relative, BulkApplyOutcome, BulkFileOp, FileErrorEvent, FileEvent,
};
use redis::AsyncCommands;
use thiserror::Error;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Idle,
    Connecting,
    Subscribed,
    Errored,
    Closed,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("redis connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("reconnect budget of {MAX_RECONNECT_ATTEMPTS} exhausted")]
    ReconnectBudgetExhausted,
}

/// Backoff schedule between reconnect attempts: `min(1000 * 2^attempt, 30000)` ms.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    let millis = 1000u64.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(millis.min(30_000))
}

/// Paths whose mutation deserves a log-level rebuild notice. Advisory only —
/// the dev server's own watcher drives actual rebuilds.
fn is_rebuild_hint_path(path: &str) -> bool {
    const HINTS: &[&str] = &[
        "package.json",
        "package-lock.json",
        "pnpm-lock.yaml",
        "yarn.lock",
        "vite.config",
        "tsconfig.json",
        ".env",
    ];
    HINTS.iter().any(|hint| path.contains(hint))
}

/// Reports `(status, consecutive reconnect attempts)` as the subscription
/// moves through its lifecycle, so a caller (the daemon's health endpoint)
/// can republish it without polling the subscriber directly.
pub type StatusSink = std::sync::Arc<dyn Fn(SubscriptionStatus, u32) + Send + Sync>;

pub struct BroadcastSubscriber {
    redis_url: String,
    channel: String,
    workspace_root: PathBuf,
    machine_id: String,
    on_status: Option<StatusSink>,
}

impl BroadcastSubscriber {
    pub fn new(redis_url: String, project_id: &str, workspace_root: PathBuf, machine_id: String) -> Self {
        BroadcastSubscriber {
            redis_url,
            channel: format!("realtime:project:{project_id}"),
            workspace_root,
            machine_id,
            on_status: None,
        }
    }

    pub fn with_status_sink(mut self, sink: StatusSink) -> Self {
        self.on_status = Some(sink);
        self
    }

    fn report_status(&self, status: SubscriptionStatus, attempt: u32) {
        if let Some(sink) = &self.on_status {
            sink(status, attempt);
        }
    }

    /// Runs the subscribe-apply-reconnect loop until `cancel` fires or the
    /// reconnect budget is exhausted. Returns `Err` only on budget exhaustion
    /// (the caller transitions the lifecycle to `error`); cancellation is a
    /// clean `Ok(())`.
    pub async fn run(&self, cancel: tokio_util::sync::CancellationToken) -> Result<(), BroadcastError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.report_status(SubscriptionStatus::Connecting, attempt);
            match self.subscribe_and_apply(&cancel).await {
                Ok(()) => {
                    self.report_status(SubscriptionStatus::Closed, 0);
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt, "broadcast subscription failed");
                    attempt += 1;
                    self.report_status(SubscriptionStatus::Errored, attempt);
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        return Err(BroadcastError::ReconnectBudgetExhausted);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(reconnect_backoff(attempt - 1)) => {}
                        _ = cancel.cancelled() => return Ok(()),
                    }
                }
            }
        }
    }

    async fn subscribe_and_apply(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<(), BroadcastError> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, "broadcast subscription established");
        self.report_status(SubscriptionStatus::Subscribed, 0);

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                message = stream.next() => {
                    match message {
                        Some(msg) => {
                            let payload: String = msg.get_payload().unwrap_or_default();
                            self.apply_raw(&payload).await;
                        }
                        None => return Ok(()), // peer-initiated close, reconnect
                    }
                }
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    async fn apply_raw(&self, payload: &str) {
        let event: FileEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed broadcast payload");
                return;
            }
        };
        match event {
            FileEvent::Update { file_path, content, .. } => {
                if let Err(err) = self.apply_update(&file_path, &content).await {
                    self.publish_error(&file_path, &err).await;
                }
                self.log_rebuild_hint(&file_path);
            }
            FileEvent::Delete { file_path, .. } => {
                if let Err(err) = self.apply_delete(&file_path).await {
                    self.publish_error(&file_path, &err).await;
                }
                self.log_rebuild_hint(&file_path);
            }
            FileEvent::BulkUpdate { files, .. } => {
                let mut outcome = BulkApplyOutcome::default();
                for entry in files {
                    let result = match entry.action {
                        BulkFileOp::Update => {
                            let content = entry.content.unwrap_or_default();
                            self.apply_update(&entry.file_path, &content).await
                        }
                        BulkFileOp::Delete => self.apply_delete(&entry.file_path).await,
                    };
                    match result {
                        Ok(()) => outcome.record_success(),
                        Err(err) => {
                            outcome.record_failure();
                            self.publish_error(&entry.file_path, &err).await;
                        }
                    }
                    self.log_rebuild_hint(&entry.file_path);
                }
                tracing::info!(
                    applied = outcome.applied,
                    failed = outcome.failed,
                    "bulk update applied"
                );
            }
        }
    }

    fn log_rebuild_hint(&self, path: &str) {
        if is_rebuild_hint_path(path) {
            tracing::info!(path, "rebuild-relevant file changed");
        }
    }

    async fn apply_update(&self, raw_path: &str, content: &str) -> Result<(), ApplyError> {
        let dest = resolve(&self.workspace_root, raw_path)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, content).await?;
        Ok(())
    }

    async fn apply_delete(&self, raw_path: &str) -> Result<(), ApplyError> {
        let dest = resolve(&self.workspace_root, raw_path)?;
        match tokio::fs::remove_file(&dest).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ApplyError::Io(err)),
        }
    }

    async fn publish_error(&self, path: &str, err: &ApplyError) {
        let event = FileErrorEvent {
            file_path: path.to_string(),
            error: err.to_string(),
            machine_id: self.machine_id.clone(),
            timestamp: chrono::Utc::now(),
        };
        tracing::warn!(path, machine_id = %self.machine_id, error = %err, "file apply failed");
        if let Ok(client) = redis::Client::open(self.redis_url.as_str()) {
            if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
                if let Ok(mut payload) = serde_json::to_value(&event) {
                    payload["type"] = serde_json::Value::String("file:error".to_string());
                    let _: Result<(), _> = conn.publish(&self.channel, payload.to_string()).await;
                }
            }
        }
    }
}

fn resolve(workspace_root: &Path, raw_path: &str) -> Result<PathBuf, ApplyError> {
    normalize_relative(workspace_root, raw_path).map_err(ApplyError::Traversal)
}

#[derive(Debug, Error)]
enum ApplyError {
    #[error("path traversal: {0}")]
    Traversal(#[from] previewd_core::PathTraversal),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

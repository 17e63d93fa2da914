// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `previewd` binary's library half: environment parsing, shared
//! request state, the reverse-proxy HTTP surface, and the `run` entry point
//! that wires boot, the health loop, the broadcast subscriber, and the
//! listener together. `main.rs` is a thin shell around `run`.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod env;
pub mod health_endpoint;
pub mod proxy;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;

use previewd_adapters::broadcast::BroadcastSubscriber;
use previewd_adapters::session_store::{PgSessionStore, SessionStore, SessionStoreError};
use previewd_core::{LifecycleEvent, MachineConfig};
use previewd_engine::health::HealthSnapshot;
use previewd_engine::{boot, BootError, Lifecycle};

use crate::state::{AppState, SubscriptionHandle};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("boot sequence failed: {0}")]
    Boot(#[from] BootError),
    #[error("session store unreachable at boot: {0}")]
    SessionStore(#[from] SessionStoreError),
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("http server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Runs the machine end to end. The health/proxy listener is bound and
/// serving *before* `boot()` (hydrate -> install -> launch -> probe, which
/// can run for the full readiness window) is even called, so `/health` is
/// reachable — reporting `starting`/`hydrating`/`installing`/`launching` off
/// the lifecycle guard — for the whole boot window rather than refusing
/// connections until boot finishes. Matches the transition table's
/// `starting | config validated, health listener bound | hydrating` row.
pub async fn run(config: MachineConfig, workspace_root: PathBuf) -> Result<(), RunError> {
    let lifecycle = Lifecycle::new();
    let health_snapshot = Arc::new(Mutex::new(HealthSnapshot::default()));
    let subscription = Arc::new(SubscriptionHandle::default());

    let session_store: Arc<dyn SessionStore> =
        Arc::new(PgSessionStore::connect(&config.session_store_url).await?);

    let app_state = AppState {
        config: Arc::new(config.clone()),
        lifecycle: lifecycle.clone(),
        health: health_snapshot.clone(),
        subscription: subscription.clone(),
        session_store,
        http_client: reqwest::Client::new(),
        start_time: Instant::now(),
    };
    let router = proxy::build_router(app_state);

    let listener = TcpListener::bind(("0.0.0.0", config.listen_port))
        .await
        .map_err(|source| RunError::Bind { port: config.listen_port, source })?;
    tracing::info!(port = config.listen_port, "previewd listening");

    spawn_shutdown_signal_listener(lifecycle.clone());

    let cancel = lifecycle.cancellation_token();
    let serve_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    });

    let boot_result = boot(&config, workspace_root.clone(), lifecycle.clone()).await;
    let boot_outcome = match boot_result {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(error = %err, "boot sequence failed, shutting down");
            lifecycle.request_shutdown();
            let _ = serve_task.await;
            return Err(RunError::Boot(err));
        }
    };

    {
        let mut snapshot = health_snapshot.lock();
        snapshot.is_healthy = boot_outcome.became_ready;
    }

    tokio::spawn(previewd_engine::health::run(
        lifecycle.clone(),
        boot_outcome.supervisor,
        boot_outcome.handle,
        health_snapshot,
    ));

    spawn_broadcast_subscriber(&config, workspace_root, lifecycle, subscription);

    match serve_task.await {
        Ok(result) => result.map_err(RunError::Serve),
        Err(join_err) => Err(RunError::Serve(std::io::Error::other(join_err))),
    }
}

/// Installs the OS-signal shutdown path: SIGINT (or its Windows equivalent,
/// Ctrl-C) always, plus SIGTERM on Unix, since that's what a fleet allocator
/// sends to ask a machine to wind down. Either one drives
/// `Lifecycle::request_shutdown`, which cancels the broadcast subscription,
/// the health loop, and the listener's graceful-shutdown future together.
fn spawn_shutdown_signal_listener(lifecycle: Arc<Lifecycle>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::error!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("shutdown signal received");
        lifecycle.request_shutdown();
    });
}

/// Spawns the broadcast-subscribe loop as a detached task. Its status is
/// mirrored into `subscription` so the health endpoint can report it
/// without holding a reference to the subscriber task itself. Reconnect
/// budget exhaustion is a fatal, lifecycle-wide condition per the error
/// taxonomy, so it is reported through `LifecycleEvent::FatalError` rather
/// than a restart-specific event.
fn spawn_broadcast_subscriber(
    config: &MachineConfig,
    workspace_root: PathBuf,
    lifecycle: Arc<Lifecycle>,
    subscription: Arc<SubscriptionHandle>,
) {
    let subscriber = BroadcastSubscriber::new(
        config.broadcast_redis_url.clone(),
        config.project_id.as_str(),
        workspace_root,
        config.machine_id.to_string(),
    )
    .with_status_sink(Arc::new(move |status, attempts| {
        subscription.set_status(status);
        subscription.set_reconnect_attempts(attempts);
    }));

    let cancel = lifecycle.cancellation_token();
    tokio::spawn(async move {
        if let Err(err) = subscriber.run(cancel).await {
            tracing::error!(error = %err, "broadcast reconnect budget exhausted, machine entering error state");
            lifecycle.transition(LifecycleEvent::FatalError);
        }
    });
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health & Self-Heal loop. Every 30 s, probes the dev server; on repeated
//! failure it requests a bounded number of restarts before giving up and
//! transitioning the lifecycle to `error`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use previewd_adapters::devserver::{self, DevServerHandle, DevServerSupervisor, MAX_RESTART_ATTEMPTS};
use previewd_core::LifecycleEvent;

use crate::lifecycle::Lifecycle;

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub is_healthy: bool,
    pub last_checked: Instant,
    pub restart_attempts: u32,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        HealthSnapshot {
            is_healthy: false,
            last_checked: Instant::now(),
            restart_attempts: 0,
        }
    }
}

pub type SharedHealthSnapshot = Arc<Mutex<HealthSnapshot>>;

/// Runs the periodic probe/restart loop until `lifecycle`'s cancellation
/// token fires. `handle` is the currently-running dev-server child, shared
/// with whoever spawned it so a restart swaps it in place.
pub async fn run(
    lifecycle: Arc<Lifecycle>,
    supervisor: Arc<DevServerSupervisor>,
    handle: Arc<tokio::sync::Mutex<DevServerHandle>>,
    snapshot: SharedHealthSnapshot,
) {
    let cancel = lifecycle.cancellation_token();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(HEALTH_INTERVAL) => {}
            _ = cancel.cancelled() => return,
        }

        let port = { handle.lock().await.port };
        let healthy = devserver::probe(port).await;

        let mut guard = snapshot.lock();
        guard.last_checked = Instant::now();

        if healthy {
            guard.is_healthy = true;
            guard.restart_attempts = 0;
            drop(guard);
            handle.lock().await.reset_restart_attempts();
            lifecycle.transition(LifecycleEvent::ProbeSucceeded);
            continue;
        }

        guard.is_healthy = false;
        if guard.restart_attempts >= MAX_RESTART_ATTEMPTS {
            lifecycle.transition(LifecycleEvent::RestartBudgetExhausted);
            tracing::error!("dev server unhealthy and restart budget exhausted");
            continue;
        }

        guard.restart_attempts += 1;
        let attempt = guard.restart_attempts;
        drop(guard);

        tracing::warn!(attempt, "dev server unhealthy, restarting");
        lifecycle.transition(LifecycleEvent::ProbeFailed);
        let mut handle_guard = handle.lock().await;
        if let Err(err) = handle_guard.restart(&supervisor).await {
            tracing::error!(error = %err, "dev server restart failed");
        }
        drop(handle_guard);

        let port = { handle.lock().await.port };
        if devserver::probe(port).await {
            lifecycle.transition(LifecycleEvent::ProbeSucceeded);
            snapshot.lock().is_healthy = true;
            handle.lock().await.reset_restart_attempts();
        }
    }
}

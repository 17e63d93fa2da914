// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Lifecycle` is the single guard over the machine's state. Single writer
//! (this module's transition methods), many readers (health responder,
//! router) — mirrors the teacher's `DaemonState` split between owned state
//! and a read-only view.

use std::sync::Arc;

use parking_lot::Mutex;
use previewd_core::{LifecycleEvent, LifecycleState};
use tokio_util::sync::CancellationToken;

/// The dev-server port is republished on every restart; readers must fetch
/// it per-request rather than cache it, per the concurrency model.
#[derive(Debug, Default)]
struct PublishedPort(Mutex<Option<u16>>);

pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    port: PublishedPort,
    cancel: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Lifecycle {
            state: Mutex::new(LifecycleState::Starting),
            port: PublishedPort::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn current(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn publish_port(&self, port: u16) {
        *self.port.0.lock() = Some(port);
    }

    pub fn current_port(&self) -> Option<u16> {
        *self.port.0.lock()
    }

    /// Applies `event`, logging and discarding illegal transitions rather
    /// than panicking — a stray event from a racing task should never bring
    /// the process down.
    pub fn transition(&self, event: LifecycleEvent) -> LifecycleState {
        let mut state = self.state.lock();
        match state.apply(event) {
            Some(next) => {
                tracing::info!(from = ?*state, to = ?next, "lifecycle transition");
                *state = next;
            }
            None => {
                tracing::warn!(from = ?*state, event = ?event, "ignoring illegal lifecycle transition");
            }
        }
        *state
    }

    pub fn request_shutdown(&self) {
        self.transition(LifecycleEvent::ShutdownRequested);
        self.cancel.cancel();
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state handed to every axum handler: a read-only view
//! over the lifecycle, the health snapshot, the broadcast subscription
//! status, and the adapters the router needs per request.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use previewd_adapters::broadcast::SubscriptionStatus;
use previewd_adapters::session_store::SessionStore;
use previewd_core::MachineConfig;
use previewd_engine::health::SharedHealthSnapshot;
use previewd_engine::Lifecycle;

pub struct SubscriptionHandle {
    status: Mutex<SubscriptionStatus>,
    reconnect_attempts: AtomicU32,
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        SubscriptionHandle {
            status: Mutex::new(SubscriptionStatus::Idle),
            reconnect_attempts: AtomicU32::new(0),
        }
    }
}

impl SubscriptionHandle {
    pub fn set_status(&self, status: SubscriptionStatus) {
        *self.status.lock() = status;
    }

    pub fn status(&self) -> SubscriptionStatus {
        *self.status.lock()
    }

    pub fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::SeqCst);
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MachineConfig>,
    pub lifecycle: Arc<Lifecycle>,
    pub health: SharedHealthSnapshot,
    pub subscription: Arc<SubscriptionHandle>,
    pub session_store: Arc<dyn SessionStore>,
    pub http_client: reqwest::Client,
    pub start_time: Instant,
}

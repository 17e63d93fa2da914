// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory doubles for the adapter traits, gated behind `test-support` so
//! the daemon crate's integration tests can exercise the router without a
//! real Postgres/S3/Redis endpoint. Mirrors the teacher's `FakeAgentAdapter`
//! pattern used by `daemon`'s listener tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use previewd_core::{SessionId, SessionRecord, SessionStatus};

use crate::session_store::{SessionStore, SessionStoreError};

/// A session store backed by an in-memory map. `unreachable` flips the
/// lookup to always return the "store unreachable" error, for exercising
/// the router's 503 path.
#[derive(Default)]
pub struct FakeSessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
    unreachable: std::sync::atomic::AtomicBool,
}

impl FakeSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SessionRecord) {
        self.records
            .lock()
            .expect("fake session store mutex poisoned")
            .insert(record.session_id.as_str().to_string(), record);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable
            .store(unreachable, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn lookup_active(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError> {
        if self.unreachable.load(std::sync::atomic::Ordering::SeqCst) {
            // sqlx::Error has no public constructor suitable for a fake; the
            // router only inspects the `Err` variant, never its payload.
            return Err(SessionStoreError::Unreachable(sqlx::Error::PoolClosed));
        }
        Ok(self
            .records
            .lock()
            .expect("fake session store mutex poisoned")
            .get(session_id.as_str())
            .filter(|record| record.status == SessionStatus::Active)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use previewd_core::{MachineId, ProjectId};

    #[tokio::test]
    async fn returns_none_for_unknown_session() {
        let store = FakeSessionStore::new();
        let result = store.lookup_active(&SessionId::new("s1")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn returns_inactive_records_as_none() {
        let store = FakeSessionStore::new();
        store.insert(SessionRecord {
            session_id: SessionId::new("s1"),
            project_id: ProjectId::new("p1"),
            machine_id: MachineId::new("m1"),
            status: SessionStatus::Closed,
            created_at: chrono::Utc::now(),
        });
        let result = store.lookup_active(&SessionId::new("s1")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unreachable_flag_surfaces_as_error() {
        let store = FakeSessionStore::new();
        store.set_unreachable(true);
        let err = store.lookup_active(&SessionId::new("s1")).await.unwrap_err();
        assert!(matches!(err, SessionStoreError::Unreachable(_)));
    }
}

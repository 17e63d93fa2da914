// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-store transport. Read-only from the core's perspective: the
//! external allocator owns writes, the router only looks a session id up.

use std::time::Duration;

use async_trait::async_trait;
use previewd_core::{MachineId, ProjectId, SessionId, SessionRecord, SessionStatus};
use thiserror::Error;

pub const SESSION_POLL_ATTEMPTS: u32 = 5;
const SESSION_POLL_BASE_DELAY: Duration = Duration::from_millis(200);
const SESSION_POLL_MAX_DELAY: Duration = Duration::from_millis(1600);

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store unreachable: {0}")]
    Unreachable(#[from] sqlx::Error),
}

/// Backoff between session-lookup polls: `200ms * 2^attempt`, capped at 1600ms.
pub fn session_poll_backoff(attempt: u32) -> Duration {
    let millis = (SESSION_POLL_BASE_DELAY.as_millis() as u64).saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(millis.min(SESSION_POLL_MAX_DELAY.as_millis() as u64))
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn lookup_active(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError>;
}

pub struct PgSessionStore {
    pool: sqlx::PgPool,
}

impl PgSessionStore {
    pub async fn connect(database_url: &str) -> Result<Self, SessionStoreError> {
        let pool = sqlx::PgPool::connect(database_url).await?;
        Ok(PgSessionStore { pool })
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn lookup_active(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, container_id, project_id, status FROM sessions WHERE id = $1 AND status = 'active'",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRow::into_record))
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    container_id: String,
    project_id: String,
    status: String,
}

impl SessionRow {
    fn into_record(self) -> SessionRecord {
        SessionRecord {
            session_id: SessionId::new(self.id),
            project_id: ProjectId::new(self.project_id),
            machine_id: MachineId::new(self.container_id),
            status: if self.status == "active" {
                SessionStatus::Active
            } else {
                SessionStatus::Closed
            },
            created_at: chrono::Utc::now(),
        }
    }
}

/// Polls `store` for an active record with bounded exponential backoff.
/// Returns the number of attempts made alongside the result so the router
/// can report it in the 404 body.
pub async fn poll_for_active_session(
    store: &dyn SessionStore,
    session_id: &SessionId,
) -> Result<(Option<SessionRecord>, u32), SessionStoreError> {
    for attempt in 0..SESSION_POLL_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(session_poll_backoff(attempt - 1)).await;
        }
        if let Some(record) = store.lookup_active(session_id).await? {
            return Ok((Some(record), attempt + 1));
        }
    }
    Ok((None, SESSION_POLL_ATTEMPTS))
}

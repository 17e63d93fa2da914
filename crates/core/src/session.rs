// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-store DTO. The router reads these rows to decide whether an
//! incoming request's session id belongs to this machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{MachineId, ProjectId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub project_id: ProjectId,
    pub machine_id: MachineId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

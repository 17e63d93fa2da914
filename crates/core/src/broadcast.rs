// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payloads carried on the `realtime:project:<projectId>` broadcast channel.
//! These are the wire types; `previewd-adapters::broadcast` owns the Redis
//! transport and the apply loop that consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FileEvent {
    #[serde(rename = "file:update")]
    Update {
        #[serde(rename = "filePath")]
        file_path: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "file:delete")]
    Delete {
        #[serde(rename = "filePath")]
        file_path: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "file:bulk-update")]
    BulkUpdate {
        files: Vec<BulkFileEntry>,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkFileOp {
    Update,
    Delete,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkFileEntry {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub action: BulkFileOp,
    #[serde(default)]
    pub content: Option<String>,
}

/// Aggregate result of applying a `file:bulk-update` event. Per-entry
/// failures (path traversal, unreadable content) do not abort the batch —
/// the remaining entries still apply, and failures are reported back on
/// `file:error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkApplyOutcome {
    pub applied: usize,
    pub failed: usize,
}

impl BulkApplyOutcome {
    pub fn record_success(&mut self) {
        self.applied += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn is_fully_applied(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileErrorEvent {
    pub file_path: String,
    pub error: String,
    pub machine_id: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_update_event_deserializes() {
        let json = r#"{"type":"file:update","filePath":"src/App.tsx","content":"export default 1;","timestamp":"2026-01-01T00:00:00Z"}"#;
        let event: FileEvent = serde_json::from_str(json).unwrap();
        match event {
            FileEvent::Update { file_path, content, .. } => {
                assert_eq!(file_path, "src/App.tsx");
                assert_eq!(content, "export default 1;");
            }
            _ => panic!("expected Update"),
        }
    }

    #[test]
    fn bulk_apply_outcome_tracks_partial_failure() {
        let mut outcome = BulkApplyOutcome::default();
        outcome.record_success();
        outcome.record_success();
        outcome.record_failure();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.is_fully_applied());
    }
}

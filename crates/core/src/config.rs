// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot-time configuration: the immutable record every long-lived task is
//! spawned with. Built once in `previewd-daemon::env` and passed down by
//! reference — nothing below this module touches an environment variable.

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::id::{MachineId, ProjectId};

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub machine_id: MachineId,
    pub project_id: ProjectId,
    pub object_store_base_url: String,
    pub credential: Credential,
    pub snapshot_archive_url: Option<String>,
    pub broadcast_redis_url: String,
    pub broadcast_token: ScopedToken,
    pub session_store_url: String,
    pub public_host: String,
    pub listen_port: u16,
}

#[derive(Debug, Clone)]
pub enum Credential {
    AccessKey { access_key_id: String, secret_access_key: String },
    BearerToken(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopedToken {
    pub token: String,
    pub scope: String,
}

impl ScopedToken {
    /// Decodes a base64-encoded `{token, scope}` JSON payload and checks the
    /// scope matches `realtime:project:<project_id>`. A token scoped to the
    /// wrong channel is a boot-time misconfiguration, not a runtime error.
    pub fn decode(encoded: &str, project_id: &ProjectId) -> Result<Self, ConfigError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ConfigError::InvalidBroadcastToken)?;
        let decoded: ScopedToken =
            serde_json::from_slice(&raw).map_err(|_| ConfigError::InvalidBroadcastToken)?;
        let expected = format!("realtime:project:{project_id}");
        if decoded.scope != expected {
            return Err(ConfigError::TokenScopeMismatch {
                expected,
                actual: decoded.scope,
            });
        }
        Ok(decoded)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("no usable credential configured (need access-key pair or bearer token)")]
    MissingCredential,
    #[error("broadcast token is not valid base64 JSON")]
    InvalidBroadcastToken,
    #[error("broadcast token scope mismatch: expected `{expected}`, got `{actual}`")]
    TokenScopeMismatch { expected: String, actual: String },
    #[error("listen port {0} is not a valid TCP port")]
    InvalidPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_token_accepts_matching_scope() {
        let project_id = ProjectId::new("proj-1");
        let payload = serde_json::json!({ "token": "abc", "scope": "realtime:project:proj-1" });
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(payload.to_string());
        let token = ScopedToken::decode(&encoded, &project_id).unwrap();
        assert_eq!(token.token, "abc");
    }

    #[test]
    fn scoped_token_rejects_mismatched_scope() {
        let project_id = ProjectId::new("proj-1");
        let payload = serde_json::json!({ "token": "abc", "scope": "realtime:project:other" });
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(payload.to_string());
        let err = ScopedToken::decode(&encoded, &project_id).unwrap_err();
        assert!(matches!(err, ConfigError::TokenScopeMismatch { .. }));
    }

    #[test]
    fn scoped_token_rejects_invalid_base64() {
        let project_id = ProjectId::new("proj-1");
        let err = ScopedToken::decode("not-base64!!", &project_id).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBroadcastToken));
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access. Every boot-time input is read
//! exactly once, here, and folded into a `MachineConfig`; nothing else in
//! the daemon touches `std::env` directly.

use previewd_core::{Credential, MachineConfig, MachineId, ProjectId, ScopedToken};
use thiserror::Error;

const DEFAULT_LISTEN_PORT: u16 = 8080;
const DEFAULT_ENVIRONMENT_LABEL: &str = "development";

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("no usable credential configured (need access-key pair or bearer token)")]
    MissingCredential,
    #[error("{0}")]
    InvalidBroadcastToken(#[from] previewd_core::ConfigError),
    #[error("listen port `{0}` is not a valid TCP port")]
    InvalidPort(String),
}

/// Reads and validates all boot-time configuration. Fails fast on a missing
/// invariant (project id, object-store URL, at least one credential) per the
/// data-model invariant in the spec's §3.
pub fn load_machine_config() -> Result<MachineConfig, EnvError> {
    let project_id = ProjectId::new(require_var("PROJECT_ID")?);
    let machine_id = MachineId::new(require_var("MACHINE_ID").unwrap_or_else(|_| "local".to_string()));
    let object_store_base_url = require_var("OBJECT_STORE_BASE_URL")?;
    let credential = load_credential()?;
    let snapshot_archive_url = std::env::var("SNAPSHOT_ARCHIVE_URL")
        .ok()
        .filter(|v| !v.is_empty());
    let broadcast_redis_url = require_var("BROADCAST_REDIS_URL")?;
    let broadcast_token = load_broadcast_token(&project_id, &credential)?;
    let session_store_url = require_var("SESSION_STORE_URL")?;
    let public_host = std::env::var("PUBLIC_HOST").unwrap_or_else(|_| "localhost".to_string());
    let listen_port = listen_port()?;

    Ok(MachineConfig {
        machine_id,
        project_id,
        object_store_base_url,
        credential,
        snapshot_archive_url,
        broadcast_redis_url,
        broadcast_token,
        session_store_url,
        public_host,
        listen_port,
    })
}

pub fn environment_label() -> String {
    std::env::var("ENVIRONMENT_LABEL").unwrap_or_else(|_| DEFAULT_ENVIRONMENT_LABEL.to_string())
}

fn require_var(name: &'static str) -> Result<String, EnvError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(EnvError::Missing(name))
}

fn load_credential() -> Result<Credential, EnvError> {
    if let (Ok(key_id), Ok(secret)) = (
        std::env::var("OBJECT_STORE_SCOPED_KEY_ID"),
        std::env::var("OBJECT_STORE_SCOPED_SECRET"),
    ) {
        if !key_id.is_empty() && !secret.is_empty() {
            return Ok(Credential::AccessKey {
                access_key_id: key_id,
                secret_access_key: secret,
            });
        }
    }
    if let Ok(general_key) = std::env::var("OBJECT_STORE_GENERAL_KEY") {
        if !general_key.is_empty() {
            return Ok(Credential::BearerToken(general_key));
        }
    }
    Err(EnvError::MissingCredential)
}

/// Decodes the scoped broadcast token when present. Per the open-question
/// resolution in the design notes: when absent, fall back to the general
/// credential and log the fallback rather than failing boot.
fn load_broadcast_token(project_id: &ProjectId, credential: &Credential) -> Result<ScopedToken, EnvError> {
    if let Ok(encoded) = std::env::var("BROADCAST_SCOPED_TOKEN") {
        if !encoded.is_empty() {
            return Ok(ScopedToken::decode(&encoded, project_id)?);
        }
    }
    tracing::warn!("no scoped broadcast token configured, falling back to the general credential");
    let fallback = match credential {
        Credential::AccessKey { secret_access_key, .. } => secret_access_key.clone(),
        Credential::BearerToken(token) => token.clone(),
    };
    Ok(ScopedToken {
        token: fallback,
        scope: format!("realtime:project:{project_id}"),
    })
}

fn listen_port() -> Result<u16, EnvError> {
    match std::env::var("LISTEN_PORT") {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<u16>()
            .map_err(|_| EnvError::InvalidPort(raw)),
        _ => Ok(DEFAULT_LISTEN_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "PROJECT_ID",
            "MACHINE_ID",
            "OBJECT_STORE_BASE_URL",
            "OBJECT_STORE_SCOPED_KEY_ID",
            "OBJECT_STORE_SCOPED_SECRET",
            "OBJECT_STORE_GENERAL_KEY",
            "SNAPSHOT_ARCHIVE_URL",
            "BROADCAST_REDIS_URL",
            "BROADCAST_SCOPED_TOKEN",
            "SESSION_STORE_URL",
            "PUBLIC_HOST",
            "LISTEN_PORT",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn missing_project_id_fails_load() {
        clear_env();
        let err = load_machine_config().unwrap_err();
        assert!(matches!(err, EnvError::Missing("PROJECT_ID")));
    }

    #[test]
    #[serial]
    fn missing_credential_fails_load() {
        clear_env();
        std::env::set_var("PROJECT_ID", "p1");
        std::env::set_var("OBJECT_STORE_BASE_URL", "https://example.invalid");
        std::env::set_var("BROADCAST_REDIS_URL", "redis://127.0.0.1");
        std::env::set_var("SESSION_STORE_URL", "postgres://localhost/db");
        let err = load_machine_config().unwrap_err();
        assert!(matches!(err, EnvError::MissingCredential));
        clear_env();
    }

    #[test]
    #[serial]
    fn falls_back_to_default_listen_port() {
        clear_env();
        assert_eq!(listen_port().unwrap(), DEFAULT_LISTEN_PORT);
    }

    #[test]
    #[serial]
    fn general_key_satisfies_the_credential_invariant() {
        clear_env();
        std::env::set_var("PROJECT_ID", "p1");
        std::env::set_var("OBJECT_STORE_BASE_URL", "https://example.invalid");
        std::env::set_var("OBJECT_STORE_GENERAL_KEY", "general-key");
        std::env::set_var("BROADCAST_REDIS_URL", "redis://127.0.0.1");
        std::env::set_var("SESSION_STORE_URL", "postgres://localhost/db");
        let config = load_machine_config().unwrap();
        assert!(matches!(config.credential, Credential::BearerToken(_)));
        assert_eq!(config.broadcast_token.scope, "realtime:project:p1");
        clear_env();
    }
}

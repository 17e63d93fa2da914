// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot sequencing: validate → hydrate → install → launch → ready|degraded.
//! Mirrors the teacher's staged `startup_inner` + cleanup-on-failure shape,
//! minus the WAL/orphan-recovery concerns this system has no use for.

use std::path::PathBuf;
use std::sync::Arc;

use previewd_adapters::devserver::{DevServerError, DevServerHandle, DevServerSupervisor};
use previewd_adapters::hydrate::{ArchiveHydrator, S3ObjectStore};
use previewd_core::{Credential, LifecycleEvent, MachineConfig};
use thiserror::Error;

use crate::lifecycle::Lifecycle;

#[derive(Debug, Error)]
pub enum BootError {
    #[error("dev-server install failed: {0}")]
    Install(#[source] DevServerError),
    #[error("dev-server launch failed: {0}")]
    Launch(#[source] DevServerError),
}

pub struct BootOutcome {
    pub supervisor: Arc<DevServerSupervisor>,
    pub handle: Arc<tokio::sync::Mutex<DevServerHandle>>,
    pub became_ready: bool,
}

/// Runs the full boot sequence against `workspace_root`, driving `lifecycle`
/// through its states. Hydration failures are swallowed internally (the
/// hydrator itself falls back to a default workspace); everything from
/// install onward is fatal on failure, matching the error taxonomy in the
/// error-handling design.
pub async fn boot(
    config: &MachineConfig,
    workspace_root: PathBuf,
    lifecycle: Arc<Lifecycle>,
) -> Result<BootOutcome, BootError> {
    lifecycle.transition(LifecycleEvent::HydrationStarted);
    hydrate(config, &workspace_root).await;
    lifecycle.transition(LifecycleEvent::HydrationComplete);

    let supervisor = Arc::new(DevServerSupervisor::new(
        workspace_root.clone(),
        config.listen_port,
    ));

    if let Err(err) = supervisor.install().await {
        lifecycle.transition(LifecycleEvent::FatalError);
        return Err(BootError::Install(err));
    }
    lifecycle.transition(LifecycleEvent::InstallComplete);

    let dev_server = match supervisor.start() {
        Ok(handle) => handle,
        Err(err) => {
            lifecycle.transition(LifecycleEvent::FatalError);
            return Err(BootError::Launch(err));
        }
    };
    lifecycle.publish_port(dev_server.port);

    let became_ready = previewd_adapters::devserver::wait_for_ready(dev_server.port).await;
    if became_ready {
        lifecycle.transition(LifecycleEvent::ProbeSucceeded);
    } else {
        lifecycle.transition(LifecycleEvent::ProbeFailed);
    }

    Ok(BootOutcome {
        supervisor,
        handle: Arc::new(tokio::sync::Mutex::new(dev_server)),
        became_ready,
    })
}

async fn hydrate(config: &MachineConfig, workspace_root: &std::path::Path) {
    let bucket = config.project_id.to_string();
    let store =
        S3ObjectStore::from_base_url(&config.object_store_base_url, bucket, &config.credential)
            .await;
    let hydrator = ArchiveHydrator::new(store);
    if let Err(err) = hydrator
        .populate(
            workspace_root,
            config.snapshot_archive_url.as_deref(),
            config.project_id.as_str(),
        )
        .await
    {
        tracing::warn!(error = %err, "workspace hydration failed entirely, proceeding with whatever exists");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `boot()` shells out to npm/vite and a real S3 endpoint, so it has no
    // unit coverage here; the workspace root integration tests exercise the
    // router and lifecycle against fakes instead of a live dev server.

    fn sample_config(snapshot_archive_url: Option<&str>) -> MachineConfig {
        MachineConfig {
            machine_id: previewd_core::MachineId::new("m1"),
            project_id: previewd_core::ProjectId::new("p1"),
            object_store_base_url: "https://example.invalid".to_string(),
            credential: Credential::BearerToken("token".to_string()),
            snapshot_archive_url: snapshot_archive_url.map(str::to_string),
            broadcast_redis_url: "redis://127.0.0.1".to_string(),
            broadcast_token: previewd_core::ScopedToken {
                token: "t".to_string(),
                scope: "realtime:project:p1".to_string(),
            },
            session_store_url: "postgres://localhost/db".to_string(),
            public_host: "example.invalid".to_string(),
            listen_port: 8080,
        }
    }

    #[test]
    fn snapshot_archive_url_is_carried_from_config_not_env() {
        let config = sample_config(Some("https://example.invalid/archive.tar.gz"));
        assert_eq!(
            config.snapshot_archive_url.as_deref(),
            Some("https://example.invalid/archive.tar.gz")
        );
    }
}

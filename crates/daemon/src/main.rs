// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `previewd` entry point: init tracing, load boot-time config, hydrate a
//! workspace directory, and hand off to `previewd_daemon::run`.

use std::path::PathBuf;

const DEFAULT_WORKSPACE_ROOT: &str = "/workspace";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match previewd_daemon::env::load_machine_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "boot-time configuration invalid, exiting");
            std::process::exit(1);
        }
    };

    tracing::info!(
        machine_id = %config.machine_id,
        project_id = %config.project_id,
        environment = %previewd_daemon::env::environment_label(),
        "previewd starting"
    );

    let workspace_root = std::env::var("WORKSPACE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_WORKSPACE_ROOT));

    if let Err(err) = previewd_daemon::run(config, workspace_root).await {
        tracing::error!(error = %err, "previewd exited with an error");
        std::process::exit(1);
    }
}

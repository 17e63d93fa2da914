// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dev-Server Supervisor: project-kind detection, dependency install, child
//! process spawn and port binding, readiness probing, and bounded restart.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use previewd_core::ProjectKind;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

pub const MAX_RESTART_ATTEMPTS: u32 = 3;
const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READINESS_WINDOW: Duration = Duration::from_secs(45);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);
const PREFERRED_PORT_START: u16 = 5173;
const PROBE_PATH: &str = "/@vite/client";

#[derive(Debug, Error)]
pub enum DevServerError {
    #[error("no free loopback port found starting at {0}")]
    NoFreePort(u16),
    #[error("install command failed with status {0}")]
    InstallFailed(std::process::ExitStatus),
    #[error("failed to spawn dev server: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("dev server exited before becoming ready")]
    ExitedBeforeReady,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detects a `ProjectKind` by inspecting the workspace root. A single
/// web-build-tool family is recognized; its absence still resolves to the
/// same family per the supervisor's minimal-core contract.
pub fn detect_project_kind(workspace_root: &Path) -> ProjectKind {
    let use_pnpm = workspace_root.join("pnpm-lock.yaml").exists();
    ProjectKind::vite(use_pnpm)
}

/// Finds a free loopback TCP port starting at `preferred`, skipping `avoid`
/// (the machine's external listening port, which must differ).
pub fn select_free_port(preferred: u16, avoid: u16) -> Result<u16, DevServerError> {
    for candidate in preferred..preferred.saturating_add(200) {
        if candidate == avoid {
            continue;
        }
        if TcpListener::bind(("127.0.0.1", candidate)).is_ok() {
            return Ok(candidate);
        }
    }
    Err(DevServerError::NoFreePort(preferred))
}

pub struct DevServerHandle {
    pub port: u16,
    child: Child,
    restart_attempts: u32,
}

pub struct DevServerSupervisor {
    workspace_root: PathBuf,
    external_port: u16,
    kind: ProjectKind,
}

impl DevServerSupervisor {
    pub fn new(workspace_root: PathBuf, external_port: u16) -> Self {
        let kind = detect_project_kind(&workspace_root);
        DevServerSupervisor {
            workspace_root,
            external_port,
            kind,
        }
    }

    /// Runs the install command to completion, if one is declared. Non-zero
    /// exit is fatal for this boot.
    pub async fn install(&self) -> Result<(), DevServerError> {
        if self.kind.install_command.is_empty() {
            return Ok(());
        }
        let (program, args) = self
            .kind
            .install_command
            .split_first()
            .expect("install command has at least one element");
        let status = Command::new(program)
            .args(args)
            .current_dir(&self.workspace_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .status()
            .await
            .map_err(DevServerError::Spawn)?;
        if !status.success() {
            return Err(DevServerError::InstallFailed(status));
        }
        Ok(())
    }

    /// Spawns the run command on a freshly selected port. Stdout/stderr are
    /// scanned for readiness markers, which are advisory only — the lifecycle
    /// only transitions to `ready` on a successful probe.
    pub fn start(&self) -> Result<DevServerHandle, DevServerError> {
        let port = select_free_port(PREFERRED_PORT_START, self.external_port)?;
        let (program, args) = self
            .kind
            .run_command
            .split_first()
            .expect("run command has at least one element");
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.replace("$PORT", &port.to_string()))
            .collect();

        let mut child = Command::new(program)
            .args(&args)
            .current_dir(&self.workspace_root)
            .env("PORT", port.to_string())
            .env("HOST", "0.0.0.0")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(DevServerError::Spawn)?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_output_for_readiness(stdout));
        }

        Ok(DevServerHandle {
            port,
            child,
            restart_attempts: 0,
        })
    }
}

async fn scan_output_for_readiness(stdout: tokio::process::ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.contains("ready in") || line.contains("Local:") || line.contains("Network:") {
            tracing::info!(line = %line, "dev server readiness marker observed");
        }
    }
}

impl DevServerHandle {
    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts
    }

    pub fn reset_restart_attempts(&mut self) {
        self.restart_attempts = 0;
    }

    /// Stops the child gracefully, escalating to a forced kill after the
    /// grace period.
    pub async fn stop(&mut self) -> Result<(), DevServerError> {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
            }
        }
        match tokio::time::timeout(KILL_GRACE_PERIOD, self.child.wait()).await {
            Ok(_) => Ok(()),
            Err(_elapsed) => {
                self.child.start_kill()?;
                self.child.wait().await?;
                Ok(())
            }
        }
    }

    /// Restarts the child in place, incrementing the restart counter.
    /// Callers are expected to check `restart_attempts` against
    /// `MAX_RESTART_ATTEMPTS` before calling this.
    pub async fn restart(&mut self, supervisor: &DevServerSupervisor) -> Result<(), DevServerError> {
        self.stop().await?;
        let fresh = supervisor.start()?;
        self.child = fresh.child;
        self.port = fresh.port;
        self.restart_attempts += 1;
        Ok(())
    }
}

/// Issues a loopback HTTP GET to the dev server's client bootstrap module.
/// Healthy iff the response is 200 with a JavaScript media-type; any
/// transport failure or timeout is unhealthy.
pub async fn probe(port: u16) -> bool {
    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => return false,
    };
    let url = format!("http://127.0.0.1:{port}{PROBE_PATH}");
    match client.get(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("javascript"))
            .unwrap_or(false),
        _ => false,
    }
}

/// Polls `probe` at `READINESS_POLL_INTERVAL` for up to `READINESS_WINDOW`.
/// Returns `true` on the first healthy probe.
pub async fn wait_for_ready(port: u16) -> bool {
    let deadline = tokio::time::Instant::now() + READINESS_WINDOW;
    loop {
        if probe(port).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(READINESS_POLL_INTERVAL).await;
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project-family detection result. A single web-build-tool family is
//! sufficient for the core: `package.json` plus a `vite` dependency (or a
//! `vite.config.*` file) selects `Vite`; anything else still resolves to
//! `Vite` as the sole recognized family.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectFamily {
    Vite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectKind {
    pub family: ProjectFamily,
    pub install_command: Vec<String>,
    pub run_command: Vec<String>,
}

impl ProjectKind {
    pub fn vite(use_pnpm: bool) -> Self {
        let install_command = if use_pnpm {
            vec!["pnpm".to_string(), "install".to_string()]
        } else {
            vec!["npm".to_string(), "install".to_string()]
        };
        let run_command = vec![
            "npm".to_string(),
            "run".to_string(),
            "dev".to_string(),
            "--".to_string(),
            "--host".to_string(),
            "0.0.0.0".to_string(),
            "--port".to_string(),
            "$PORT".to_string(),
        ];
        ProjectKind {
            family: ProjectFamily::Vite,
            install_command,
            run_command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnpm_lockfile_selects_pnpm_install() {
        let kind = ProjectKind::vite(true);
        assert_eq!(kind.install_command, vec!["pnpm", "install"]);
    }

    #[test]
    fn default_selects_npm_install() {
        let kind = ProjectKind::vite(false);
        assert_eq!(kind.install_command, vec!["npm", "install"]);
        assert_eq!(kind.family, ProjectFamily::Vite);
    }
}

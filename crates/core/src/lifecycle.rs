// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The machine lifecycle state machine. `previewd-engine::lifecycle::Lifecycle`
//! owns the mutable state; this module only defines the states, the events
//! that move between them, and which transitions are legal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Starting,
    Hydrating,
    Installing,
    Launching,
    Ready,
    Degraded,
    Error,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    HydrationStarted,
    HydrationComplete,
    InstallComplete,
    ProbeSucceeded,
    ProbeFailed,
    RestartBudgetExhausted,
    FatalError,
    ShutdownRequested,
}

impl LifecycleState {
    /// Applies `event`, returning the next state or `None` if the event is
    /// not legal from the current state. `ShutdownRequested` is legal from
    /// every state except `ShuttingDown` itself; `FatalError` is legal from
    /// every non-terminal state (the "any -> fatal init failure -> error"
    /// row of the transition table), covering budget exhaustion reported
    /// from a task that does not track fine-grained lifecycle state itself
    /// (e.g. the broadcast subscriber's reconnect budget).
    pub fn apply(self, event: LifecycleEvent) -> Option<LifecycleState> {
        use LifecycleEvent::*;
        use LifecycleState::*;

        if event == ShutdownRequested {
            return if self == ShuttingDown { None } else { Some(ShuttingDown) };
        }
        if event == FatalError {
            return if self.is_terminal() { None } else { Some(Error) };
        }

        match (self, event) {
            (Starting, HydrationStarted) => Some(Hydrating),
            (Hydrating, HydrationComplete) => Some(Installing),
            (Installing, InstallComplete) => Some(Launching),
            (Launching, ProbeSucceeded) => Some(Ready),
            (Launching, ProbeFailed) => Some(Degraded),
            (Ready, ProbeFailed) => Some(Degraded),
            (Degraded, ProbeSucceeded) => Some(Ready),
            (Degraded, RestartBudgetExhausted) => Some(Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Error | LifecycleState::ShuttingDown)
    }

    pub fn is_serving(self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleEvent::*;
    use LifecycleState::*;

    #[test]
    fn happy_path_reaches_ready() {
        let state = Starting
            .apply(HydrationStarted)
            .and_then(|s| s.apply(HydrationComplete))
            .and_then(|s| s.apply(InstallComplete))
            .and_then(|s| s.apply(ProbeSucceeded))
            .expect("every step is a legal transition");
        assert_eq!(state, Ready);
    }

    #[test]
    fn probe_failure_degrades_then_recovers() {
        let degraded = Ready.apply(ProbeFailed).unwrap();
        assert_eq!(degraded, Degraded);
        let recovered = degraded.apply(ProbeSucceeded).unwrap();
        assert_eq!(recovered, Ready);
    }

    #[test]
    fn exhausted_restart_budget_is_terminal() {
        let error = Degraded.apply(RestartBudgetExhausted).unwrap();
        assert_eq!(error, Error);
        assert!(error.is_terminal());
    }

    #[test]
    fn shutdown_requested_is_legal_from_any_non_terminal_state() {
        for state in [Starting, Hydrating, Installing, Launching, Ready, Degraded, Error] {
            assert_eq!(state.apply(ShutdownRequested), Some(ShuttingDown));
        }
        assert_eq!(ShuttingDown.apply(ShutdownRequested), None);
    }

    #[test]
    fn illegal_transition_returns_none() {
        assert_eq!(Starting.apply(ProbeSucceeded), None);
    }

    #[test]
    fn fatal_error_is_legal_from_any_non_terminal_state() {
        for state in [Starting, Hydrating, Installing, Launching, Ready, Degraded, ShuttingDown] {
            assert_eq!(state.apply(FatalError), Some(Error));
        }
        assert_eq!(Error.apply(FatalError), None);
    }
}

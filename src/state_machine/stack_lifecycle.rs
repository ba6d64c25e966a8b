// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Operation State Machine
//!
//! Interprets stack statuses observed while polling a create, update or
//! delete.
//!
//! # States
//!
//! - Submitted: accepted by the backend, not yet observed
//! - InProgress: `<ACTION>_IN_PROGRESS` observed within the time budget
//! - Complete: `<ACTION>_COMPLETE` observed (terminal)
//! - Gone: stack vanished during a delete (terminal)
//! - Failed: `<ACTION>_FAILED` or an unexpected status (terminal)
//! - TimedOut: still in progress past the budget (terminal)

use std::fmt;
use std::time::Duration;

use super::{StateMachine, TransitionError, TransitionResult};
use crate::errors::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    Submitted,
    InProgress,
    Complete,
    Gone,
    Failed,
    TimedOut,
}

impl StackState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StackState::Submitted | StackState::InProgress)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What one poll saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackObservation {
    Status {
        status: String,
        reason: Option<String>,
        elapsed: Duration,
    },
    /// Backend reports no such stack
    NotFound,
}

/// Instruction for the poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Wait,
    Succeeded,
    Failed { reason: String },
    Unexpected { status: String },
    TimedOut { elapsed: Duration },
}

/// Progress of one stack operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLifecycle {
    pub action: Action,
    pub state: StackState,
    /// In-progress budget
    pub timeout: Duration,
}

impl StackLifecycle {
    pub fn submitted(action: Action, timeout: Duration) -> Self {
        Self {
            action,
            state: StackState::Submitted,
            timeout,
        }
    }

    fn to(&self, state: StackState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

impl StateMachine for StackLifecycle {
    type Input = StackObservation;
    type Output = PollOutcome;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        if self.state.is_terminal() {
            return Err(TransitionError::InvalidTransition {
                from: self.state.to_string(),
                to: format!("{:?}", input),
            });
        }

        let (status, reason, elapsed) = match input {
            StackObservation::NotFound if self.action == Action::Delete => {
                return Ok((self.to(StackState::Gone), PollOutcome::Succeeded));
            }
            StackObservation::NotFound => {
                return Ok((
                    self.to(StackState::Failed),
                    PollOutcome::Unexpected {
                        status: "Stack not found".to_string(),
                    },
                ));
            }
            StackObservation::Status {
                status,
                reason,
                elapsed,
            } => (status, reason, *elapsed),
        };

        let prefix = self.action.status_prefix();
        let phase = status
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'));

        let next = match phase {
            Some("COMPLETE") => (self.to(StackState::Complete), PollOutcome::Succeeded),
            Some("IN_PROGRESS") if elapsed >= self.timeout => (
                self.to(StackState::TimedOut),
                PollOutcome::TimedOut { elapsed },
            ),
            Some("IN_PROGRESS") => (self.to(StackState::InProgress), PollOutcome::Wait),
            Some("FAILED") => (
                self.to(StackState::Failed),
                PollOutcome::Failed {
                    reason: reason.clone().unwrap_or_default(),
                },
            ),
            _ => (
                self.to(StackState::Failed),
                PollOutcome::Unexpected {
                    status: status.clone(),
                },
            ),
        };
        Ok(next)
    }
}

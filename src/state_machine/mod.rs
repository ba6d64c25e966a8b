// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Backend operations run for minutes and are observed by polling. Their
//! progress is modelled as pure Mealy machines:
//!
//! ```text
//! (State, Observation) → (State, Outcome)
//! ```
//!
//! The async poll loop owns no decision logic; it feeds each observation
//! into the machine and acts on the outcome. See
//! [`stack_lifecycle::StackLifecycle`].

pub mod stack_lifecycle;

pub use stack_lifecycle::{PollOutcome, StackLifecycle, StackObservation, StackState};

use chrono::{DateTime, Utc};

pub type TransitionResult<S> = Result<S, TransitionError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Input arrived after the machine reached a terminal state
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Pure state machine over typed inputs and outputs
pub trait StateMachine: Sized + Clone {
    type Input;
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Whether `input` would be accepted in the current state
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}

/// One accepted input and the state it led to
#[derive(Debug, Clone)]
pub struct Step<M, I> {
    pub input: I,
    pub reached: M,
    pub at: DateTime<Utc>,
}

/// State machine that records every accepted input
#[derive(Debug, Clone)]
pub struct TrackedMachine<M: StateMachine> {
    state: M,
    steps: Vec<Step<M, M::Input>>,
}

impl<M: StateMachine> TrackedMachine<M> {
    pub fn new(initial: M) -> Self {
        Self {
            state: initial,
            steps: Vec::new(),
        }
    }

    /// Feed `input`; a rejected input leaves state and history untouched
    pub fn apply(&mut self, input: M::Input, at: DateTime<Utc>) -> TransitionResult<M::Output> {
        let (next, output) = self.state.transition(&input)?;
        self.steps.push(Step {
            input,
            reached: next.clone(),
            at,
        });
        self.state = next;
        Ok(output)
    }

    pub fn state(&self) -> &M {
        &self.state
    }

    pub fn steps(&self) -> &[Step<M, M::Input>] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Action;
    use std::time::Duration;

    fn status(status: &str, secs: u64) -> StackObservation {
        StackObservation::Status {
            status: status.to_string(),
            reason: None,
            elapsed: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_tracked_machine_records_steps() {
        let mut machine = TrackedMachine::new(StackLifecycle::submitted(
            Action::Create,
            Duration::from_secs(1200),
        ));

        let first = machine.apply(status("CREATE_IN_PROGRESS", 0), Utc::now()).unwrap();
        assert_eq!(first, PollOutcome::Wait);
        let second = machine.apply(status("CREATE_COMPLETE", 10), Utc::now()).unwrap();
        assert_eq!(second, PollOutcome::Succeeded);

        assert_eq!(machine.state().state, StackState::Complete);
        assert_eq!(machine.steps().len(), 2);
        assert_eq!(machine.steps()[0].reached.state, StackState::InProgress);
    }

    #[test]
    fn test_rejected_input_is_not_recorded() {
        let mut machine = TrackedMachine::new(StackLifecycle::submitted(
            Action::Delete,
            Duration::from_secs(1200),
        ));
        machine.apply(StackObservation::NotFound, Utc::now()).unwrap();

        let err = machine.apply(StackObservation::NotFound, Utc::now());
        assert!(matches!(err, Err(TransitionError::InvalidTransition { .. })));
        assert_eq!(machine.steps().len(), 1);
        assert_eq!(machine.state().state, StackState::Gone);
    }
}

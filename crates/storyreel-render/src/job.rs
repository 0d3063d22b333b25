use std::time::{Duration, Instant};

use storyreel_core::{JobState, RenderStrategy};
use uuid::Uuid;

/// Execution context of one render: id, strategy, and lifecycle state.
#[derive(Debug)]
pub struct RenderJob {
    id: Uuid,
    strategy: RenderStrategy,
    state: JobState,
    started: Instant,
}

impl RenderJob {
    pub fn new(strategy: RenderStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy,
            state: JobState::Created,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn strategy(&self) -> RenderStrategy {
        self.strategy
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `to`. Illegal transitions are logged and ignored; returns
    /// whether the transition happened.
    pub fn transition(&mut self, to: JobState) -> bool {
        if !self.state.can_transition_to(&to) {
            tracing::warn!(from = %self.state, to = %to, "rejected job state transition");
            return false;
        }
        tracing::debug!(from = %self.state, to = %to, "job state");
        self.state = to;
        true
    }

    /// Advance along the success path.
    pub fn advance(&mut self) -> bool {
        match self.state.next() {
            Some(next) => self.transition(next),
            None => {
                tracing::warn!(state = %self.state, "job cannot advance from a terminal state");
                false
            }
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.transition(JobState::Failed(reason.into()))
    }
}

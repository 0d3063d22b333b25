//! Render job lifecycle states.

use std::fmt;

/// Where a render job is in its lifecycle.
///
/// `Created -> SurfaceReady -> Captured -> Encoded -> Completed`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Created,
    SurfaceReady,
    Captured,
    Encoded,
    Completed,
    Failed(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }

    /// The state a successful step advances to, if any.
    pub fn next(&self) -> Option<JobState> {
        match self {
            JobState::Created => Some(JobState::SurfaceReady),
            JobState::SurfaceReady => Some(JobState::Captured),
            JobState::Captured => Some(JobState::Encoded),
            JobState::Encoded => Some(JobState::Completed),
            JobState::Completed | JobState::Failed(_) => None,
        }
    }

    /// Whether `to` is a legal transition from this state.
    pub fn can_transition_to(&self, to: &JobState) -> bool {
        match to {
            JobState::Failed(_) => !self.is_terminal(),
            _ => self.next().as_ref() == Some(to),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::SurfaceReady => "surface_ready",
            JobState::Captured => "captured",
            JobState::Encoded => "encoded",
            JobState::Completed => "completed",
            JobState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed(reason) => write!(f, "failed({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = JobState::Created;
        let mut seen = vec![state.name()];
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(&next));
            state = next;
            seen.push(state.name());
        }
        assert_eq!(
            seen,
            vec!["created", "surface_ready", "captured", "encoded", "completed"]
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        let failed = JobState::Failed("boom".into());
        for state in [
            JobState::Created,
            JobState::SurfaceReady,
            JobState::Captured,
            JobState::Encoded,
        ] {
            assert!(state.can_transition_to(&failed));
        }
        assert!(!JobState::Completed.can_transition_to(&failed));
        assert!(!failed.can_transition_to(&JobState::Failed("again".into())));
    }

    #[test]
    fn test_no_skipping() {
        assert!(!JobState::Created.can_transition_to(&JobState::Captured));
        assert!(!JobState::Captured.can_transition_to(&JobState::SurfaceReady));
    }

    #[test]
    fn test_display() {
        assert_eq!(JobState::Failed("timeout".into()).to_string(), "failed(timeout)");
        assert_eq!(JobState::SurfaceReady.to_string(), "surface_ready");
    }
}

//! Stage and run states

use std::fmt;

/// Per-stage lifecycle: `Pending → Running → Completed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "PENDING",
            StageState::Running => "RUNNING",
            StageState::Completed => "COMPLETED",
            StageState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall run status
///
/// Terminal: everything except `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Running,
    Completed,
    /// Best-effort run where at least one stage failed
    CompletedWithWarnings,
    Failed,
    /// Escalate: the engine session is suspect
    Fatal,
}

impl RunStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::CompletedWithWarnings)
    }

    #[inline]
    pub fn requires_escalation(&self) -> bool {
        matches!(self, RunStatus::Fatal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::CompletedWithWarnings => "COMPLETED_WITH_WARNINGS",
            RunStatus::Failed => "FAILED",
            RunStatus::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::CompletedWithWarnings.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Fatal.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_only_fatal_escalates() {
        assert!(RunStatus::Fatal.requires_escalation());
        assert!(!RunStatus::Failed.requires_escalation());
        assert!(!RunStatus::CompletedWithWarnings.requires_escalation());
    }

    #[test]
    fn test_display() {
        assert_eq!(RunStatus::CompletedWithWarnings.to_string(), "COMPLETED_WITH_WARNINGS");
        assert_eq!(StageState::Running.to_string(), "RUNNING");
    }
}

//! Workflow run record

use chrono::{DateTime, Utc};
use std::time::Duration;
use ulid::Ulid;

use super::stage::StageError;
use super::state::{RunStatus, StageState};
use crate::core_types::WalletId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub name: &'static str,
    pub state: StageState,
    /// Wall-clock time of the attempt; `None` while pending
    pub duration: Option<Duration>,
    pub error: Option<StageError>,
}

/// Failure recorded by a best-effort run instead of halting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWarning {
    pub stage: &'static str,
    pub error: StageError,
}

#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub run_id: Ulid,
    pub workflow: &'static str,
    pub wallet_id: WalletId,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
    pub status: RunStatus,
    pub warnings: Vec<StageWarning>,
    pub elapsed: Duration,
}

impl WorkflowRun {
    pub(crate) fn start(workflow: &'static str, wallet_id: WalletId, names: Vec<&'static str>) -> Self {
        Self {
            run_id: Ulid::new(),
            workflow,
            wallet_id,
            started_at: Utc::now(),
            stages: names
                .into_iter()
                .map(|name| StageRecord {
                    name,
                    state: StageState::Pending,
                    duration: None,
                    error: None,
                })
                .collect(),
            status: RunStatus::Running,
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Stages that reached `Running` or beyond
    pub fn attempted(&self) -> impl Iterator<Item = &StageRecord> {
        self.stages.iter().filter(|s| s.state != StageState::Pending)
    }

    /// The stage that halted the run, if any
    pub fn halted_at(&self) -> Option<&StageRecord> {
        match self.status {
            RunStatus::Failed | RunStatus::Fatal => {
                self.stages.iter().rev().find(|s| s.state == StageState::Failed)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StageError> {
        self.halted_at().and_then(|s| s.error.as_ref())
    }

    pub fn requires_escalation(&self) -> bool {
        self.status.requires_escalation()
    }
}

//! Workflow Stage Executor
//!
//! Runs an ordered list of stages against one context:
//!
//! ```text
//! for stage in stages:
//!     cancelled?          -> Strict: halt Failed   | BestEffort: warn Cancelled, next
//!     Success(output)     -> ctx.merge(output), next
//!     Failure(e)          -> Strict: halt Failed   | BestEffort: warn, next
//!     Fatal(e)            -> Strict: halt Fatal    | BestEffort: warn, next
//! ```
//!
//! The executor never retries; retry belongs to the stage.

use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::run::{StageWarning, WorkflowRun};
use super::stage::{Stage, StageContext, StageError, StageResult};
use super::state::{RunStatus, StageState};
use crate::core_types::WalletId;

/// Shared list of stages for one workflow
pub type StageList<C> = Vec<Arc<dyn Stage<C>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPolicy {
    /// Halt on the first non-success
    Strict,
    /// Attempt every stage; failures become warnings
    BestEffort,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowExecutor {
    policy: RunPolicy,
}

impl WorkflowExecutor {
    pub fn new(policy: RunPolicy) -> Self {
        Self { policy }
    }

    pub fn strict() -> Self {
        Self::new(RunPolicy::Strict)
    }

    pub fn best_effort() -> Self {
        Self::new(RunPolicy::BestEffort)
    }

    pub fn policy(&self) -> RunPolicy {
        self.policy
    }

    pub async fn run<C: StageContext>(
        &self,
        workflow: &'static str,
        wallet_id: &WalletId,
        stages: &[Arc<dyn Stage<C>>],
        mut ctx: C,
        cancel: &CancellationToken,
    ) -> (WorkflowRun, C) {
        let names = stages.iter().map(|s| s.name()).collect();
        let mut run = WorkflowRun::start(workflow, wallet_id.clone(), names);
        let run_started = Instant::now();

        info!(
            run_id = %run.run_id,
            workflow,
            wallet_id = %wallet_id,
            stages = stages.len(),
            policy = ?self.policy,
            "Workflow started"
        );

        let mut halted: Option<RunStatus> = None;

        for (index, stage) in stages.iter().enumerate() {
            let name = stage.name();

            if cancel.is_cancelled() {
                let error = StageError::cancelled("cancelled before stage start");
                let record = &mut run.stages[index];
                record.state = StageState::Failed;
                record.duration = Some(std::time::Duration::ZERO);
                record.error = Some(error.clone());

                match self.policy {
                    RunPolicy::Strict => {
                        warn!(run_id = %run.run_id, workflow, stage = name, "Workflow cancelled");
                        halted = Some(RunStatus::Failed);
                        break;
                    }
                    RunPolicy::BestEffort => {
                        warn!(
                            run_id = %run.run_id,
                            workflow,
                            stage = name,
                            "Stage skipped, workflow cancelled"
                        );
                        run.warnings.push(StageWarning { stage: name, error });
                        continue;
                    }
                }
            }

            run.stages[index].state = StageState::Running;
            debug!(run_id = %run.run_id, workflow, stage = name, "Stage started");

            let stage_started = Instant::now();
            let result = stage.execute(&ctx, cancel).await;
            let elapsed = stage_started.elapsed();
            run.stages[index].duration = Some(elapsed);

            let (error, fatal) = match result {
                StageResult::Success(output) => {
                    ctx.merge(output);
                    run.stages[index].state = StageState::Completed;
                    info!(
                        run_id = %run.run_id,
                        workflow,
                        stage = name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Stage completed"
                    );
                    continue;
                }
                StageResult::Failure(e) => (e, false),
                StageResult::Fatal(e) => (e, true),
            };

            let record = &mut run.stages[index];
            record.state = StageState::Failed;
            record.error = Some(error.clone());

            match self.policy {
                RunPolicy::Strict => {
                    if fatal {
                        error!(
                            run_id = %run.run_id,
                            workflow,
                            stage = name,
                            code = error.code(),
                            error = %error.detail,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Stage fatal, escalation required"
                        );
                        halted = Some(RunStatus::Fatal);
                    } else {
                        warn!(
                            run_id = %run.run_id,
                            workflow,
                            stage = name,
                            code = error.code(),
                            error = %error.detail,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Stage failed"
                        );
                        halted = Some(RunStatus::Failed);
                    }
                    break;
                }
                RunPolicy::BestEffort => {
                    warn!(
                        run_id = %run.run_id,
                        workflow,
                        stage = name,
                        code = error.code(),
                        error = %error.detail,
                        "Stage failed, continuing"
                    );
                    run.warnings.push(StageWarning { stage: name, error });
                }
            }
        }

        run.status = match halted {
            Some(status) => status,
            None if run.warnings.is_empty() => RunStatus::Completed,
            None => RunStatus::CompletedWithWarnings,
        };
        run.elapsed = run_started.elapsed();

        info!(
            run_id = %run.run_id,
            workflow,
            status = %run.status,
            warnings = run.warnings.len(),
            elapsed_ms = run.elapsed.as_millis() as u64,
            "Workflow finished"
        );

        (run, ctx)
    }
}

//! Staged Workflows
//!
//! A workflow is an ordered list of [`Stage`]s sharing one [`StageContext`].
//! [`WorkflowExecutor`] drives them and produces a [`WorkflowRun`] record.

pub mod executor;
pub mod retry;
pub mod run;
pub mod stage;
pub mod state;

pub use executor::{RunPolicy, StageList, WorkflowExecutor};
pub use retry::RetryPolicy;
pub use run::{StageRecord, StageWarning, WorkflowRun};
pub use stage::{ErrorKind, Stage, StageContext, StageError, StageResult};
pub use state::{RunStatus, StageState};

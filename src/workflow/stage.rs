//! Stage contract and results

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::chain::ProviderError;
use crate::engine::EngineError;

/// Failure classification shared by every workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network hiccup; a retry may succeed
    Transient,
    /// Refused by engine or chain; recoverable by the caller
    Rejected,
    /// Engine session is broken; escalate
    Engine,
    /// Cancellation token fired
    Cancelled,
    /// Submitted but inclusion could not be determined
    UnknownOutcome,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::Rejected => "REJECTED",
            ErrorKind::Engine => "ENGINE",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::UnknownOutcome => "UNKNOWN_OUTCOME",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rejected, detail)
    }

    pub fn engine(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Engine, detail)
    }

    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, detail)
    }

    pub fn unknown_outcome(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownOutcome, detail)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl From<EngineError> for StageError {
    fn from(e: EngineError) -> Self {
        let kind = match &e {
            EngineError::Network(_) => ErrorKind::Transient,
            EngineError::Rejected(_) | EngineError::Proof(_) | EngineError::Poi(_) => {
                ErrorKind::Rejected
            }
            EngineError::Session(_) => ErrorKind::Engine,
        };
        StageError::new(kind, e.to_string())
    }
}

impl From<ProviderError> for StageError {
    fn from(e: ProviderError) -> Self {
        let kind = match &e {
            // Safe to repeat for reads; submissions classify on their own
            ProviderError::RpcConnection(_) | ProviderError::ResponseLost(_) => ErrorKind::Transient,
            ProviderError::Rejected(_) | ProviderError::InvalidResponse(_) => ErrorKind::Rejected,
            ProviderError::Timeout { .. } => ErrorKind::UnknownOutcome,
        };
        StageError::new(kind, e.to_string())
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult<T> {
    Success(T),
    /// Recoverable; the workflow halts but the session is fine
    Failure(StageError),
    /// The session must be escalated
    Fatal(StageError),
}

impl<T> StageResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success(_))
    }
}

/// `Engine`-class errors are fatal, everything else is a failure
impl<T> From<Result<T, StageError>> for StageResult<T> {
    fn from(result: Result<T, StageError>) -> Self {
        match result {
            Ok(output) => StageResult::Success(output),
            Err(e) if e.kind == ErrorKind::Engine => StageResult::Fatal(e),
            Err(e) => StageResult::Failure(e),
        }
    }
}

/// Mutable accumulator owned by one workflow run
pub trait StageContext: Send + Sync {
    /// Closed set of outputs the workflow's stages may emit
    type Output: Send;

    fn merge(&mut self, output: Self::Output);
}

#[async_trait]
pub trait Stage<C: StageContext>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run against the outputs of earlier stages. Must not mutate `ctx`.
    async fn execute(&self, ctx: &C, cancel: &CancellationToken) -> StageResult<C::Output>;
}

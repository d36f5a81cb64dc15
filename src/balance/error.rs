use std::time::Duration;
use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// The triggering refresh failed before any balance arrived
    #[error("Balance refresh failed: {0}")]
    Refresh(EngineError),

    /// The collecting task panicked or was aborted by runtime shutdown
    #[error("Balance aggregation task aborted: {0}")]
    Aborted(String),

    #[error("Ceiling {ceiling:?} must exceed quiescence window {quiescence:?}")]
    InvalidConfig {
        quiescence: Duration,
        ceiling: Duration,
    },
}

impl AggregateError {
    pub fn code(&self) -> &'static str {
        match self {
            AggregateError::Refresh(_) => "REFRESH_FAILED",
            AggregateError::Aborted(_) => "AGGREGATION_ABORTED",
            AggregateError::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }

    /// Refresh failures mean the engine session is suspect
    pub fn is_fatal(&self) -> bool {
        matches!(self, AggregateError::Refresh(_) | AggregateError::Aborted(_))
    }
}

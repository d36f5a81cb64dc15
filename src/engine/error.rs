//! Engine Error Types

use thiserror::Error;

/// Errors reported by the shielded wallet engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Network hiccup between engine and its RPC/POI nodes; safe to retry
    #[error("Engine network error: {0}")]
    Network(String),

    /// Request rejected (insufficient balance, invalid recipient, ...)
    #[error("Rejected by engine: {0}")]
    Rejected(String),

    #[error("Proof generation failed: {0}")]
    Proof(String),

    #[error("POI operation failed: {0}")]
    Poi(String),

    /// Engine/session state is no longer trustworthy
    #[error("Engine session error: {0}")]
    Session(String),
}

impl EngineError {
    /// Get the error code for logs and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Network(_) => "ENGINE_NETWORK",
            EngineError::Rejected(_) => "ENGINE_REJECTED",
            EngineError::Proof(_) => "PROOF_FAILED",
            EngineError::Poi(_) => "POI_FAILED",
            EngineError::Session(_) => "ENGINE_SESSION",
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }

    /// Whether the surrounding engine session must be torn down
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Session(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::Network("x".into()).code(), "ENGINE_NETWORK");
        assert_eq!(EngineError::Session("x".into()).code(), "ENGINE_SESSION");
    }

    #[test]
    fn test_classification() {
        assert!(EngineError::Network("timeout".into()).is_transient());
        assert!(!EngineError::Rejected("insufficient balance".into()).is_transient());
        assert!(EngineError::Session("engine stopped".into()).is_fatal());
        assert!(!EngineError::Proof("bad witness".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = EngineError::Rejected("insufficient balance".into());
        assert_eq!(err.to_string(), "Rejected by engine: insufficient balance");
    }
}

//! Error taxonomy for the analytics core.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by analytics components and the service layer.
///
/// `InsufficientData` and `ModelFit` are absorbed by the ensemble and insight
/// layers; only `InvalidParameter`, `Timeout`, and `Store` reach callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    /// Fewer observations than a component's stated minimum.
    #[error("insufficient data for {component}: need {required}, got {available}")]
    InsufficientData {
        component: &'static str,
        required: usize,
        available: usize,
    },

    /// Numerical non-convergence or degenerate input.
    #[error("model fit failed: {0}")]
    ModelFit(String),

    /// Caller-supplied parameter out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A component exceeded its bounded runtime.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Failure reported by a collaborator (trade store, metadata source).
    #[error("store error: {0}")]
    Store(String),
}

impl AnalyticsError {
    /// Shorthand for an `InsufficientData` error.
    #[must_use]
    pub const fn insufficient(component: &'static str, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            component,
            required,
            available,
        }
    }

    /// Returns true for failures a component recovers from locally.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientData { .. } | Self::ModelFit(_))
    }

    /// Returns true for failures worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Store(_))
    }
}

impl From<anyhow::Error> for AnalyticsError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}

pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_component() {
        let err = AnalyticsError::insufficient("regime", 40, 12);
        assert_eq!(
            err.to_string(),
            "insufficient data for regime: need 40, got 12"
        );
    }

    #[test]
    fn recoverable_and_retryable_are_disjoint() {
        let cases = [
            AnalyticsError::insufficient("x", 1, 0),
            AnalyticsError::ModelFit("constant series".into()),
            AnalyticsError::InvalidParameter("horizon".into()),
            AnalyticsError::Timeout {
                operation: "ensemble",
                after: Duration::from_secs(1),
            },
            AnalyticsError::Store("down".into()),
        ];
        for err in &cases {
            assert!(!(err.is_recoverable() && err.is_retryable()), "{err}");
        }
        assert!(cases[0].is_recoverable());
        assert!(cases[1].is_recoverable());
        assert!(!cases[2].is_recoverable());
        assert!(cases[3].is_retryable());
    }

    #[test]
    fn anyhow_errors_map_to_store() {
        let err: AnalyticsError = anyhow::anyhow!("connection refused").into();
        assert!(matches!(err, AnalyticsError::Store(msg) if msg.contains("refused")));
    }
}

/// Error taxonomy of the analytics engine.
///
/// `InsufficientData` and `CapabilityUnavailable` are expected outcomes that
/// callers surface as client errors / disabled features. `Computation` is a
/// numerical failure inside a statistical routine. `InvalidParameter` is
/// raised by the service boundary when a query parameter is out of range.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    #[error("insufficient data for {report}: need at least {required} readings, got {available}")]
    InsufficientData {
        report: &'static str,
        required: usize,
        available: usize,
    },

    #[error("computation failed in {context}: {reason}")]
    Computation {
        context: &'static str,
        reason: String,
    },

    #[error("{0} capability is not available")]
    CapabilityUnavailable(&'static str),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },
}

impl AnalyticsError {
    pub(crate) fn insufficient(report: &'static str, required: usize, available: usize) -> Self {
        AnalyticsError::InsufficientData {
            report,
            required,
            available,
        }
    }

    pub(crate) fn computation(context: &'static str, reason: impl Into<String>) -> Self {
        AnalyticsError::Computation {
            context,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        AnalyticsError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalyticsError::InsufficientData { .. } | AnalyticsError::InvalidParameter { .. }
        )
    }
}

/// Fails with `InsufficientData` when `available < required`.
pub(crate) fn require(
    report: &'static str,
    required: usize,
    available: usize,
) -> Result<(), AnalyticsError> {
    if available < required {
        Err(AnalyticsError::insufficient(report, required, available))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_passes_at_exact_minimum() {
        assert!(require("trends", 10, 10).is_ok());
        assert_eq!(
            require("trends", 10, 9),
            Err(AnalyticsError::InsufficientData {
                report: "trends",
                required: 10,
                available: 9
            })
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AnalyticsError::insufficient("x", 1, 0).is_client_error());
        assert!(AnalyticsError::invalid("days", "out of range").is_client_error());
        assert!(!AnalyticsError::computation("zscore", "zero variance").is_client_error());
        assert!(!AnalyticsError::CapabilityUnavailable("forecast").is_client_error());
    }

    #[test]
    fn test_messages_name_the_report() {
        let msg = AnalyticsError::insufficient("thermal_amplitude", 24, 3).to_string();
        assert!(msg.contains("thermal_amplitude"));
        assert!(msg.contains("24"));
    }
}

//! Domain errors for submission, scoring and settlement.

use uuid::Uuid;

pub type PoiResult<T> = std::result::Result<T, PoiError>;

/// Errors surfaced by the prediction store, the scoring engine and market data sources.
#[derive(Debug, Clone, PartialEq)]
pub enum PoiError {
    /// Malformed submission shape or values. Rejected before anything is stored.
    Validation(String),
    NotFound(Uuid),
    /// Scoring engine was handed actuals it cannot score (e.g. a non-positive price).
    InvalidInput(String),
    /// Market data fetch failed. Non-fatal: pending records stay pending until the next poll.
    DataUnavailable(String),
    /// Storage write failed. The mutation that caused it was rolled back.
    Persistence(String),
}

impl PoiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn data_unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::DataUnavailable(_) => "data_unavailable",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl std::fmt::Display for PoiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation failed: {}", msg),
            Self::NotFound(id) => write!(f, "prediction {} not found", id),
            Self::InvalidInput(msg) => write!(f, "invalid scoring input: {}", msg),
            Self::DataUnavailable(msg) => write!(f, "market data unavailable: {}", msg),
            Self::Persistence(msg) => write!(f, "failed to persist predictions: {}", msg),
        }
    }
}

impl std::error::Error for PoiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoiError::validation("stake must be positive");
        assert_eq!(err.to_string(), "validation failed: stake must be positive");

        let id = Uuid::nil();
        assert_eq!(
            PoiError::NotFound(id).to_string(),
            format!("prediction {} not found", id)
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(PoiError::data_unavailable("timeout").kind(), "data_unavailable");
        assert_eq!(PoiError::persistence("disk full").kind(), "persistence");
        assert_eq!(PoiError::invalid_input("x").kind(), "invalid_input");
    }
}

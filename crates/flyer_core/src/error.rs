//! crates/flyer_core/src/error.rs
//!
//! The error taxonomy surfaced by the core services.

use crate::layout::SpanError;
use crate::ports::PortError;

/// Distinct, user-actionable failures of core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An id did not resolve (flyer, page, slot, product, promo, approval).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation is not allowed in the entity's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller lacks ownership or role for the target.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The caller's identity does not match the record it tries to act on.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A structural precondition was not met.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A collaborator failed for reasons that carry no domain meaning.
    #[error("Collaborator failure: {0}")]
    Port(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<PortError> for CoreError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => CoreError::NotFound(what),
            PortError::Conflict(what) => CoreError::Conflict(what),
            PortError::Unauthorized => {
                CoreError::Unauthorized("collaborator rejected the caller".to_string())
            }
            PortError::Unexpected(msg) => CoreError::Port(msg),
        }
    }
}

impl From<SpanError> for CoreError {
    fn from(err: SpanError) -> Self {
        match err {
            SpanError::PositionOutOfRange(_) | SpanError::FooterNotSlottable => {
                CoreError::ValidationFailed(err.to_string())
            }
            SpanError::OffGrid { .. } | SpanError::HeaderPlacement(_) | SpanError::Overlap(_) => {
                CoreError::InvalidState(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PromoSize;

    #[test]
    fn port_errors_keep_their_meaning() {
        assert!(matches!(
            CoreError::from(PortError::NotFound("flyer".into())),
            CoreError::NotFound(_)
        ));
        assert!(matches!(
            CoreError::from(PortError::Conflict("page 1".into())),
            CoreError::Conflict(_)
        ));
        assert!(matches!(
            CoreError::from(PortError::Unexpected("db down".into())),
            CoreError::Port(_)
        ));
    }

    #[test]
    fn span_errors_split_between_validation_and_state() {
        assert!(matches!(
            CoreError::from(SpanError::PositionOutOfRange(9)),
            CoreError::ValidationFailed(_)
        ));
        assert!(matches!(
            CoreError::from(SpanError::OffGrid {
                size: PromoSize::Square,
                anchor: 1
            }),
            CoreError::InvalidState(_)
        ));
    }
}

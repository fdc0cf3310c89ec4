use thiserror::Error;

pub type TimetableResult<T> = Result<T, TimetableError>;

/// Every way an invocation can fail before a solver outcome exists.
///
/// Infeasible and unknown solver outcomes are not errors; they are reported
/// through [`crate::extract::SolveReport`].
#[derive(Error, Debug)]
pub enum TimetableError {
    #[error("Invalid invocation: {0}")]
    Argument(String),
    #[error("Failed to parse input JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Solver failure: {0}")]
    Solver(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TimetableError {
    /// Stable category name reported as `stats.error_type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            TimetableError::Argument(_) => "ArgumentError",
            TimetableError::Json(_) => "JSONDecodeError",
            TimetableError::Validation(_) => "ValidationError",
            TimetableError::Solver(_) => "SolverError",
            TimetableError::Internal(_) => "InternalError",
        }
    }

    /// Whether the caller sent something unusable, as opposed to a fault on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TimetableError::Argument(_) | TimetableError::Json(_) | TimetableError::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_convert_and_keep_their_category() {
        let err: TimetableError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.error_type(), "JSONDecodeError");
        assert!(err.is_client_error());
        assert!(err.to_string().starts_with("Failed to parse input JSON"));
    }

    #[test]
    fn internal_errors_are_not_client_errors() {
        let err = TimetableError::Internal("room lookup failed".to_string());
        assert_eq!(err.error_type(), "InternalError");
        assert!(!err.is_client_error());
    }
}

//! Domain-level error taxonomy for checkrun.

/// checkrun domain errors.
///
/// `StepFailed` is the only run-level failure; the other variants reject
/// bad input before a run starts.
#[derive(Debug, thiserror::Error)]
pub enum CheckrunError {
    #[error("step '{step}' failed with exit code {exit_code}")]
    StepFailed { step: String, exit_code: i32 },

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("invalid branch filter '{pattern}': {source}")]
    InvalidBranchFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("workflow parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for checkrun domain operations.
pub type Result<T> = std::result::Result<T, CheckrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_display() {
        let err = CheckrunError::StepFailed {
            step: "Black formatting check".to_string(),
            exit_code: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("Black formatting check"));
        assert!(msg.contains("exit code 1"));
    }

    #[test]
    fn test_input_errors_display() {
        let err = CheckrunError::UnknownEventKind("tag".to_string());
        assert_eq!(err.to_string(), "unknown event kind: tag");

        let err = CheckrunError::InvalidWorkflow("steps cannot be empty".to_string());
        assert!(err.to_string().contains("invalid workflow"));
    }
}

use conduit_llm::ProviderError;
use conduit_tools::ToolError;

/// Classify a tool subsystem failure in the gateway's error taxonomy
pub fn tool_error(error: &ToolError) -> ProviderError {
    match error {
        ToolError::ProviderNotFound { .. } | ToolError::ResourceNotFound { .. } => {
            ProviderError::not_found(error.to_string())
        }
        ToolError::InvalidConfig(_) | ToolError::NameCollision { .. } | ToolError::AlreadyRegistered { .. } => {
            ProviderError::validation(error.to_string())
        }
        ToolError::Connection(_) | ToolError::Execution(_) => ProviderError::tool_execution(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use conduit_llm::ErrorKind;

    use super::*;

    #[test]
    fn registration_conflicts_are_validation_errors() {
        let err = tool_error(&ToolError::NameCollision {
            tool: "search".into(),
            provider: "web".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("search"));

        let err = tool_error(&ToolError::AlreadyRegistered { id: "web".into() });
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let err = tool_error(&ToolError::ProviderNotFound { id: "web".into() });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn connection_failures_are_tool_errors() {
        let err = tool_error(&ToolError::Connection("refused".into()));
        assert_eq!(err.kind(), ErrorKind::ToolExecutionError);
        assert!(!err.is_retryable());
    }
}

use thiserror::Error;

/// Host-side failures. Faults raised by sandboxed source never take this
/// path; they are carried as values inside `ExecutionResult::Failure`.
#[derive(Error, Debug)]
pub enum PyletError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Source input errors
    #[error("Source file not found: {path}")]
    SourceNotFound { path: String },

    #[error("Source is not valid UTF-8: {path}")]
    SourceEncoding { path: String },

    // Execution boundary errors
    #[error("Sandbox task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PyletError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &str) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    #[test]
    fn test_io_errors_convert_through_question_mark() {
        let err = read("/definitely/not/here.py").unwrap_err();
        assert!(matches!(err, PyletError::Io(_)));
        assert!(err.to_string().starts_with("IO error: "));
    }

    #[test]
    fn test_source_errors_name_the_path() {
        let err = PyletError::SourceNotFound {
            path: "script.py".to_string(),
        };
        assert_eq!(err.to_string(), "Source file not found: script.py");
    }
}

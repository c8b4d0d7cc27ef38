use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyletConfig {
    pub sandbox: SandboxConfig,
}

/// Execution budget applied to every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit in seconds; unset means no limit
    pub timeout_seconds: Option<u64>,
    /// Maximum depth of nested function calls
    pub max_recursion_depth: usize,
    /// Stack size of the worker thread that runs the interpreter, in MB
    pub stack_size_mb: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: None,
            max_recursion_depth: 1000,
            stack_size_mb: 64,
        }
    }
}

impl SandboxConfig {
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_impose_no_timeout() {
        let config = PyletConfig::default();
        assert_eq!(config.sandbox.timeout_seconds, None);
        assert_eq!(config.sandbox.max_recursion_depth, 1000);
        assert_eq!(config.sandbox.stack_size_mb, 64);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PyletConfig = toml::from_str("[sandbox]\ntimeout_seconds = 5\n").unwrap();
        assert_eq!(config.sandbox.timeout_seconds, Some(5));
        assert_eq!(config.sandbox.max_recursion_depth, 1000);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = PyletConfig {
            sandbox: SandboxConfig::default().with_timeout(3),
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: PyletConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}

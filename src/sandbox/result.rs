use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::lang::Fault;

/// Returned in place of an empty string when code ran without printing.
pub const EMPTY_SENTINEL: &str = "Code executed successfully (no output)";

/// Prefix of every failure text.
pub const ERROR_TAG: &str = "Error: ";

/// Outcome of one execution. Exactly one variant is produced per call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Captured output, byte-for-byte.
    Success(String),
    SuccessEmpty,
    Failure(Fault),
}

impl ExecutionResult {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionResult::Success(_) => "output",
            ExecutionResult::SuccessEmpty => "empty",
            ExecutionResult::Failure(_) => "error",
        }
    }

    /// The text handed back to the caller.
    pub fn text(&self) -> String {
        match self {
            ExecutionResult::Success(output) => output.clone(),
            ExecutionResult::SuccessEmpty => EMPTY_SENTINEL.to_string(),
            ExecutionResult::Failure(fault) => format!("{}{}", ERROR_TAG, fault.message),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionResult::Failure(_))
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ExecutionResult::Failure(fault) => Some(fault),
            _ => None,
        }
    }

    pub(crate) fn from_output(output: String) -> Self {
        if output.is_empty() {
            ExecutionResult::SuccessEmpty
        } else {
            ExecutionResult::Success(output)
        }
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExecutionResult", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("text", &self.text())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_text() {
        assert_eq!(ExecutionResult::Success("hi\n".into()).text(), "hi\n");
        assert_eq!(ExecutionResult::SuccessEmpty.text(), EMPTY_SENTINEL);

        let failure = ExecutionResult::Failure(Fault::zero_division("division by zero"));
        assert_eq!(failure.text(), "Error: division by zero");
        assert_eq!(failure.kind(), "error");
    }

    #[test]
    fn test_from_output_never_yields_empty_text() {
        assert_eq!(ExecutionResult::from_output(String::new()), ExecutionResult::SuccessEmpty);
        assert_eq!(
            ExecutionResult::from_output(" ".into()),
            ExecutionResult::Success(" ".into())
        );
    }

    #[test]
    fn test_serializes_kind_and_text() {
        let json = serde_json::to_value(ExecutionResult::SuccessEmpty).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "empty", "text": EMPTY_SENTINEL})
        );
    }
}

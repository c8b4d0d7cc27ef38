use std::fmt;

use serde::Serialize;

/// Broad category of a fault raised while parsing or evaluating sandboxed
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// Source could not be parsed.
    Syntax,
    /// An identifier could not be resolved against the scopes or the
    /// capability allowlist.
    Resolution,
    /// Anything raised while evaluating well-formed source.
    Runtime,
}

/// A fault raised by sandboxed source.
///
/// `exception` is the Python-style exception name (`ZeroDivisionError`,
/// `NameError`, ...) and `message` is what `str(exc)` would render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub exception: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Fault {
    fn new(kind: FaultKind, exception: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            exception,
            message: message.into(),
            line: None,
        }
    }

    /// Syntax faults always carry their location in the message, the way
    /// `str(SyntaxError)` does.
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        let message = format!("{} (<string>, line {})", message.into(), line);
        Self {
            line: Some(line),
            ..Self::new(FaultKind::Syntax, "SyntaxError", message)
        }
    }

    pub fn indentation(message: impl Into<String>, line: usize) -> Self {
        Self {
            exception: "IndentationError",
            ..Self::syntax(message, line)
        }
    }

    pub fn tab_error(message: impl Into<String>, line: usize) -> Self {
        Self {
            exception: "TabError",
            ..Self::syntax(message, line)
        }
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(
            FaultKind::Resolution,
            "NameError",
            format!("name '{}' is not defined", name),
        )
    }

    pub fn unbound_local(name: &str) -> Self {
        Self::new(
            FaultKind::Resolution,
            "UnboundLocalError",
            format!(
                "cannot access local variable '{}' where it is not associated with a value",
                name
            ),
        )
    }

    pub fn import_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Resolution, "ImportError", message)
    }

    pub fn resolution(exception: &'static str, message: impl Into<String>) -> Self {
        Self::new(FaultKind::Resolution, exception, message)
    }

    pub fn runtime(exception: &'static str, message: impl Into<String>) -> Self {
        Self::new(FaultKind::Runtime, exception, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::runtime("ValueError", message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::runtime("IndexError", message)
    }

    pub fn key_error(repr: impl Into<String>) -> Self {
        Self::runtime("KeyError", repr)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::runtime("ZeroDivisionError", message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::runtime("OverflowError", message)
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::runtime(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", type_name, attr),
        )
    }

    pub fn recursion() -> Self {
        Self::runtime("RecursionError", "maximum recursion depth exceeded")
    }

    /// `RecursionError` naming what was being done, e.g. `"in comparison"`.
    pub fn recursion_while(activity: &str) -> Self {
        Self::runtime(
            "RecursionError",
            format!("maximum recursion depth exceeded {}", activity),
        )
    }

    pub fn memory_error() -> Self {
        Self::runtime("MemoryError", "")
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::runtime(
            "TimeoutError",
            format!("execution exceeded {} seconds", seconds),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::runtime("SystemError", format!("internal error: {}", message.into()))
    }

    /// Attach a source line if none is recorded yet.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// Execution-budget faults bypass `except:` so a loop cannot swallow
    /// its own deadline.
    pub fn is_catchable(&self) -> bool {
        !matches!(self.exception, "TimeoutError" | "SystemError")
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Fault {}

pub type FaultResult<T> = std::result::Result<T, Fault>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_message_carries_location() {
        let fault = Fault::syntax("invalid syntax", 3);
        assert_eq!(fault.message, "invalid syntax (<string>, line 3)");
        assert_eq!(fault.kind, FaultKind::Syntax);
        assert_eq!(fault.line, Some(3));
    }

    #[test]
    fn test_name_error_is_resolution() {
        let fault = Fault::name_error("open");
        assert_eq!(fault.kind, FaultKind::Resolution);
        assert_eq!(fault.to_string(), "name 'open' is not defined");
    }

    #[test]
    fn test_timeout_is_not_catchable() {
        assert!(!Fault::timeout(2).is_catchable());
        assert!(Fault::zero_division("division by zero").is_catchable());
    }
}

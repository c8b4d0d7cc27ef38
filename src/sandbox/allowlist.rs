use std::collections::HashMap;

use crate::lang::Builtin;

/// The closed set of names a sandboxed program can resolve besides its own
/// bindings. Built once per execution and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Capabilities {
    entries: HashMap<&'static str, Builtin>,
}

impl Capabilities {
    /// Every primitive the dialect knows about.
    pub fn standard() -> Self {
        Self::from_builtins(Builtin::ALL)
    }

    pub fn from_builtins(builtins: impl IntoIterator<Item = Builtin>) -> Self {
        let entries = builtins.into_iter().map(|b| (b.name(), b)).collect();
        Self { entries }
    }

    pub fn resolve(&self, name: &str) -> Option<Builtin> {
        self.entries.get(name).copied()
    }

    /// Allowed names in alphabetical order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_allowlist_contents() {
        let caps = Capabilities::standard();
        assert_eq!(caps.len(), 17);
        for name in ["print", "len", "sorted", "round", "bool"] {
            assert!(caps.resolve(name).is_some(), "{} should be allowed", name);
        }
    }

    #[test]
    fn test_ambient_facilities_are_absent() {
        let caps = Capabilities::standard();
        for name in [
            "open",
            "exec",
            "eval",
            "compile",
            "__import__",
            "getattr",
            "globals",
            "input",
            "type",
            "object",
            "__build_class__",
            "Exception",
        ] {
            assert!(caps.resolve(name).is_none(), "{} must not resolve", name);
        }
    }

    #[test]
    fn test_restricted_allowlist() {
        let caps = Capabilities::from_builtins([Builtin::Print, Builtin::Len]);
        assert_eq!(caps.names(), vec!["len", "print"]);
        assert!(caps.resolve("sum").is_none());
    }
}

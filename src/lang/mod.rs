//! The sandboxed Python dialect: parser front end and tree-walking evaluator.

pub mod ast;
pub mod builtins;
pub mod fault;
pub mod format;
pub mod interpreter;
pub mod methods;
pub mod parser;
pub mod scope;
pub mod value;

pub use builtins::Builtin;
pub use fault::{Fault, FaultKind, FaultResult};
pub use interpreter::{Interpreter, Limits};
pub use parser::parse;

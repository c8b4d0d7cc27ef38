pub mod cli;
pub mod config;
pub mod error;
pub mod lang;
pub mod sandbox;

pub use error::{PyletError, Result};
pub use sandbox::{ExecutionResult, Sandbox};

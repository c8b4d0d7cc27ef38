pub mod allowlist;
pub mod capture;
mod executor;
mod result;

pub use allowlist::Capabilities;
pub use capture::{CapturedOutput, OutputStream, Redirect};
pub use executor::Sandbox;
pub use result::{ExecutionResult, EMPTY_SENTINEL, ERROR_TAG};

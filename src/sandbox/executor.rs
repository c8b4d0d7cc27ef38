use std::any::Any;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::types::SandboxConfig;
use crate::lang::{parse, Fault, Interpreter, Limits};
use crate::sandbox::allowlist::Capabilities;
use crate::sandbox::capture::{OutputStream, Redirect};
use crate::sandbox::result::ExecutionResult;

/// The execution boundary: source text in, [`ExecutionResult`] out.
///
/// Nothing raised by the executed code escapes `execute`; every fault is
/// turned into `ExecutionResult::Failure`.
#[derive(Debug)]
pub struct Sandbox {
    config: SandboxConfig,
    capabilities: Capabilities,
    output: OutputStream,
}

impl Sandbox {
    /// A sandbox whose output slot starts out pointing at process stdout.
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_output(config, OutputStream::stdout())
    }

    pub fn with_output(config: SandboxConfig, output: OutputStream) -> Self {
        Self {
            config,
            capabilities: Capabilities::standard(),
            output,
        }
    }

    /// Replace the allowlist, e.g. with a narrower one.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn output(&self) -> &OutputStream {
        &self.output
    }

    /// Parse only. Runs on the same sized worker as `execute`, so a
    /// pathological source faults instead of exhausting the caller's stack.
    pub fn check(&self, source: &str) -> Result<(), Fault> {
        debug!(source_len = source.len(), "Checking source");
        self.on_worker(move || parse(source).map(|_| ()))
    }

    /// Run `source` with stdout captured. Takes `&mut self` so one sandbox
    /// never has two executions sharing its output slot.
    pub fn execute(&mut self, source: &str) -> ExecutionResult {
        let started = Instant::now();
        debug!(source_len = source.len(), "Executing source");

        let redirect = Redirect::install(&self.output);
        let outcome = self.run_on_worker(source);
        let captured = redirect.captured().contents();
        drop(redirect);

        let result = match outcome {
            Ok(()) => ExecutionResult::from_output(captured),
            Err(fault) => {
                debug!(
                    exception = fault.exception,
                    line = ?fault.line,
                    discarded_bytes = captured.len(),
                    "Execution faulted"
                );
                ExecutionResult::Failure(fault)
            }
        };

        info!(
            kind = result.kind(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Execution finished"
        );
        result
    }

    fn limits(&self) -> Limits {
        Limits {
            max_recursion_depth: self.config.max_recursion_depth,
            timeout: self.config.timeout_seconds.map(Duration::from_secs),
        }
    }

    fn run_on_worker(&self, source: &str) -> Result<(), Fault> {
        let limits = self.limits();
        let capabilities = &self.capabilities;
        let output = self.output.clone();

        self.on_worker(move || {
            let program = parse(source)?;
            let mut interpreter = Interpreter::new(capabilities, output, limits);
            interpreter.run(&program)
        })
    }

    /// Runs `job` on a dedicated thread with the configured stack size,
    /// joined before returning. A panic becomes an internal fault.
    fn on_worker<F>(&self, job: F) -> Result<(), Fault>
    where
        F: FnOnce() -> Result<(), Fault> + Send,
    {
        let stack_size = self.config.stack_size_mb.saturating_mul(1024 * 1024);

        thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("pylet-worker".to_string())
                .stack_size(stack_size)
                .spawn_scoped(scope, job);

            let worker = match worker {
                Ok(worker) => worker,
                Err(e) => {
                    warn!(error = %e, "Failed to start worker thread");
                    return Err(Fault::internal(format!("could not start worker: {}", e)));
                }
            };

            worker.join().unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                warn!(panic = %message, "Worker panicked");
                Err(Fault::internal(message))
            })
        })
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::capture::CapturedOutput;

    fn sandbox() -> (Sandbox, CapturedOutput) {
        let host = CapturedOutput::new();
        let sandbox = Sandbox::with_output(SandboxConfig::default(), OutputStream::new(host.clone()));
        (sandbox, host)
    }

    #[test]
    fn test_output_is_captured_not_leaked() {
        let (mut sandbox, host) = sandbox();
        let result = sandbox.execute("print('hi')");
        assert_eq!(result, ExecutionResult::Success("hi\n".to_string()));
        assert!(host.is_empty());
    }

    #[test]
    fn test_stream_restored_after_fault() {
        let (mut sandbox, host) = sandbox();
        let result = sandbox.execute("print('partial')\n1/0");
        assert!(result.is_failure());
        sandbox.output().write_str("host again").unwrap();
        assert_eq!(host.contents(), "host again");
    }

    #[test]
    fn test_check_only_parses() {
        let (sandbox, host) = sandbox();
        assert!(sandbox.check("x = 1\nprint(x)").is_ok());
        assert!(sandbox.check("undefined_name").is_ok());
        assert!(sandbox.check("def f(:\n  pass").is_err());
        assert!(host.is_empty());
    }

    #[test]
    fn test_check_rejects_deep_source() {
        let (sandbox, _host) = sandbox();
        let source = format!("x = 1{}", " + 1".repeat(200_000));
        let fault = sandbox.check(&source).unwrap_err();
        assert_eq!(fault.exception, "RecursionError");
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}

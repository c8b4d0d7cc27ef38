use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

type Target = Box<dyn Write + Send>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The standard-output slot visible to executed code. Whatever target is
/// installed receives everything `print` writes.
#[derive(Clone)]
pub struct OutputStream {
    slot: Arc<Mutex<Target>>,
}

impl OutputStream {
    /// A slot initially pointing at the process stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(target: impl Write + Send + 'static) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Box::new(target))),
        }
    }

    pub fn write_str(&self, text: &str) -> io::Result<()> {
        let mut target = lock(&self.slot);
        target.write_all(text.as_bytes())?;
        target.flush()
    }

    fn replace(&self, target: Target) -> Target {
        std::mem::replace(&mut *lock(&self.slot), target)
    }
}

impl Default for OutputStream {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream").finish_non_exhaustive()
    }
}

/// In-memory text accumulator for one execution.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.buffer).is_empty()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buffer)).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Points an [`OutputStream`] at a fresh [`CapturedOutput`] until dropped.
///
/// The previous target is put back in `Drop`, so the slot is restored on
/// every exit path including unwinding.
pub struct Redirect<'a> {
    stream: &'a OutputStream,
    previous: Option<Target>,
    captured: CapturedOutput,
}

impl<'a> Redirect<'a> {
    pub fn install(stream: &'a OutputStream) -> Self {
        let captured = CapturedOutput::new();
        let previous = stream.replace(Box::new(captured.clone()));
        trace!("Output redirected to capture buffer");
        Self {
            stream,
            previous: Some(previous),
            captured,
        }
    }

    pub fn captured(&self) -> &CapturedOutput {
        &self.captured
    }
}

impl Drop for Redirect<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.stream.replace(previous);
            trace!("Output stream restored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_captures_and_restores() {
        let host = CapturedOutput::new();
        let stream = OutputStream::new(host.clone());

        stream.write_str("before\n").unwrap();
        {
            let redirect = Redirect::install(&stream);
            stream.write_str("inside\n").unwrap();
            assert_eq!(redirect.captured().contents(), "inside\n");
        }
        stream.write_str("after\n").unwrap();

        assert_eq!(host.contents(), "before\nafter\n");
    }

    #[test]
    fn test_redirect_restores_during_unwind() {
        let host = CapturedOutput::new();
        let stream = OutputStream::new(host.clone());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _redirect = Redirect::install(&stream);
            stream.write_str("lost\n").unwrap();
            panic!("boom");
        }));
        assert!(outcome.is_err());

        stream.write_str("still host\n").unwrap();
        assert_eq!(host.contents(), "still host\n");
    }

    #[test]
    fn test_nested_redirects_unwind_in_order() {
        let host = CapturedOutput::new();
        let stream = OutputStream::new(host.clone());
        {
            let outer = Redirect::install(&stream);
            {
                let inner = Redirect::install(&stream);
                stream.write_str("inner").unwrap();
                assert_eq!(inner.captured().contents(), "inner");
            }
            stream.write_str("outer").unwrap();
            assert_eq!(outer.captured().contents(), "outer");
        }
        assert!(host.is_empty());
    }
}

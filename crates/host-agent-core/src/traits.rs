//! Observer contract for process output.

/// Receives every output line produced by an executed or supervised process.
///
/// Implementations are invoked from the stream reader task that read the
/// line, so a slow sink delays that reader and nothing else.
pub trait LineSink: Send + Sync {
    /// Deliver one line (without its trailing newline).
    fn emit(&self, line: &str);
}

impl<F> LineSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, line: &str) {
        self(line);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LineSink for NullSink {
    fn emit(&self, _line: &str) {}
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_closure_sink() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink: Arc<dyn LineSink> = Arc::new(move |line: &str| {
            captured.lock().unwrap().push(line.to_string());
        });
        sink.emit("one");
        sink.emit("two");
        NullSink.emit("ignored");
        assert_eq!(*lines.lock().unwrap(), vec!["one", "two"]);
    }
}

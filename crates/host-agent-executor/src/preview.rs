//! Size-capped copy of process output.

use std::sync::{Mutex, PoisonError};

/// Default preview budget in bytes.
pub const PREVIEW_CAP: usize = 2048;

/// Output preview shared by the stdout and stderr readers of one execution.
///
/// Once `cap` bytes are stored further input is silently dropped; callers
/// keep forwarding the full output elsewhere.
#[derive(Debug)]
pub struct Preview {
    buf: Mutex<String>,
    cap: usize,
}

impl Default for Preview {
    fn default() -> Self {
        Self::new(PREVIEW_CAP)
    }
}

impl Preview {
    /// Create an empty preview holding at most `cap` bytes.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            buf: Mutex::new(String::with_capacity(cap.min(PREVIEW_CAP))),
            cap,
        }
    }

    /// Append one output line followed by a newline.
    pub fn push_line(&self, line: &str) {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        append_capped(&mut buf, line, self.cap);
        append_capped(&mut buf, "\n", self.cap);
    }

    /// Whether the byte budget is exhausted.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).len() >= self.cap
    }

    /// The preview with surrounding whitespace trimmed.
    #[must_use]
    pub fn finish(&self) -> String {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .trim()
            .to_string()
    }
}

fn append_capped(buf: &mut String, s: &str, cap: usize) {
    let remaining = cap.saturating_sub(buf.len());
    if remaining == 0 {
        return;
    }
    if s.len() <= remaining {
        buf.push_str(s);
        return;
    }
    let mut end = remaining;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.push_str(&s[..end]);
}

/// Display surface
/// Per-tab scrollback that receives shell output and built-in output,
/// plus the hook trait an embedding host implements to observe it.

use crate::error::TerminalError;
use crate::models::SessionId;

/// Callbacks into the embedding host. Every method is optional.
pub trait DisplayHook {
    /// Text was appended to a session's display.
    fn output(&mut self, _session: SessionId, _text: &str) {}

    /// A session's display was reset.
    fn cleared(&mut self, _session: SessionId) {}

    /// The process-wide font size changed.
    fn font_changed(&mut self, _size: u8) {}

    /// A session could not start its shell process.
    fn session_failed(&mut self, _session: SessionId, _error: &TerminalError) {}
}

/// Hook for hosts that only poll display contents.
#[derive(Debug, Default)]
pub struct NullHook;

impl DisplayHook for NullHook {}

/// Scrollback for a single tab
#[derive(Debug, Clone)]
pub struct Display {
    buffer: String,
    limit: usize,
    /// Decoded carry-over for a UTF-8 sequence split across PTY reads
    pending: Vec<u8>,
}

impl Display {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit: limit.max(1024),
            pending: Vec::new(),
        }
    }

    /// Append text and trim the oldest output past the scrollback limit.
    pub fn feed(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.trim();
    }

    /// Append raw PTY bytes. Returns the decoded text that was appended.
    /// Invalid bytes become U+FFFD; an incomplete trailing sequence waits
    /// for the next read.
    pub fn feed_bytes(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let mut text = String::new();
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_up_to = consumed + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[consumed..valid_up_to]) {
                        text.push_str(valid);
                    }
                    consumed = valid_up_to;
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed += len;
                        }
                        None => break,
                    }
                }
            }
        }
        self.pending.drain(..consumed);
        self.feed(&text);
        text
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending.clear();
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    /// Contents with escape sequences and control characters removed.
    pub fn plain_text(&self) -> String {
        strip_ansi(&self.buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn trim(&mut self) {
        if self.buffer.len() > self.limit {
            // Must land on a char boundary to avoid panics on multi-byte chars
            let mut start = self.buffer.len() - self.limit / 2;
            while start < self.buffer.len() && !self.buffer.is_char_boundary(start) {
                start += 1;
            }
            self.buffer.drain(..start);
        }
    }
}

/// Strip ANSI escape codes and control characters from text
pub fn strip_ansi(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // CSI - skip until the final byte
                    for next in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&next) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    // OSC - ends at BEL or ESC \
                    while let Some(next) = chars.next() {
                        if next == '\x07' {
                            break;
                        }
                        if next == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                Some('(') | Some(')') => {
                    chars.next();
                    chars.next();
                }
                _ => {
                    chars.next();
                }
            }
        } else if c == '\r' {
            continue;
        } else if c.is_control() && c != '\n' && c != '\t' {
            continue;
        } else {
            result.push(c);
        }
    }

    result
}

//! Folding streamed text deltas into sentences.
//!
//! The engine posts replies sentence by sentence, but the backend streams
//! arbitrary text fragments. `SentenceAccumulator` buffers fragments and
//! emits a sentence whenever a terminator (`.`, `!`, `?`) is followed by
//! whitespace, or on a newline. A terminator followed by a non-space
//! character ("3.14", "e.g.x") does not split.

/// Incremental sentence splitter over streamed text deltas.
#[derive(Debug, Default)]
pub struct SentenceAccumulator {
    buffer: String,
    pending_boundary: bool,
}

impl SentenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta; returns every sentence completed by it.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut sentences = Vec::new();

        for ch in delta.chars() {
            if ch == '\n' {
                self.flush_into(&mut sentences);
                self.pending_boundary = false;
                continue;
            }

            if self.pending_boundary && ch.is_whitespace() {
                self.flush_into(&mut sentences);
                self.pending_boundary = false;
                continue;
            }

            self.buffer.push(ch);
            self.pending_boundary = matches!(ch, '.' | '!' | '?');
        }

        sentences
    }

    /// Flush whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.trim().to_string();
        self.buffer.clear();
        self.pending_boundary = false;
        if rest.is_empty() { None } else { Some(rest) }
    }

    fn flush_into(&mut self, sentences: &mut Vec<String>) {
        let sentence = self.buffer.trim().to_string();
        self.buffer.clear();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
    }
}

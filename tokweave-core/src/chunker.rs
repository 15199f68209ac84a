//! Fragment chunker
//!
//! Provider fragments do not line up with words. A fragment can hold several
//! words, half a word, or half a marker. The chunker keeps the current mode and
//! a carry of text that may still turn into a marker, and releases complete
//! tokens in order.

use crate::marker::{MarkerSet, MarkerTable};
use crate::message::{Token, VisibilityMode};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Chunker {
    table: MarkerTable,
    mode: VisibilityMode,
    carry: String,
}

impl Chunker {
    pub fn new(markers: &MarkerSet) -> Self {
        Self::with_mode(markers, VisibilityMode::default())
    }

    pub fn with_mode(markers: &MarkerSet, mode: VisibilityMode) -> Self {
        Self {
            table: markers.table(),
            mode,
            carry: String::new(),
        }
    }

    pub fn mode(&self) -> VisibilityMode {
        self.mode
    }

    pub fn carry(&self) -> &str {
        &self.carry
    }

    /// Feed one raw fragment and return the tokens it completes.
    pub fn feed(&mut self, fragment: &str) -> Vec<Token> {
        let mut buf = std::mem::take(&mut self.carry);
        buf.push_str(fragment);

        let mut tokens = Vec::new();
        loop {
            let Some((pos, len, mode)) = self.table.find_leftmost(&buf) else {
                break;
            };
            for word in buf[..pos].split_whitespace() {
                if self.table.is_unterminated(word) {
                    // A marker follows, so this prefix can never complete.
                    debug!(word, "dropping unterminated word before marker");
                    continue;
                }
                tokens.push(Token::new(word, self.mode));
            }
            if self.mode != mode {
                debug!(from = %self.mode, to = %mode, "visibility mode switch");
            }
            self.mode = mode;
            buf.drain(..pos + len);
        }

        let words: Vec<&str> = buf.split_whitespace().collect();
        let last = words.len().saturating_sub(1);
        for (i, word) in words.iter().enumerate() {
            if self.table.is_unterminated(word) {
                self.carry.push_str(word);
                if i != last {
                    self.carry.push(' ');
                }
            } else {
                tokens.push(Token::new(*word, self.mode));
            }
        }
        // A fragment ending in whitespace cannot extend the held word.
        if !self.carry.is_empty() && buf.ends_with(char::is_whitespace) && !self.carry.ends_with(' ') {
            self.carry.push(' ');
        }

        tokens
    }

    /// End of stream: whatever is still carried never closed and is dropped.
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let dropped = self.carry.len();
        if dropped > 0 {
            debug!(carry = %self.carry, "discarding unterminated marker at end of stream");
            self.carry.clear();
        }
        dropped
    }

    /// Forget the carry before a fresh generation; the mode persists.
    pub fn reset(&mut self) {
        self.carry.clear();
    }
}

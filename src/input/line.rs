//! The line currently being typed
//!
//! Caret movement and deletion work on grapheme clusters so that combining
//! marks and emoji sequences are edited as the user perceives them.

use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Editable input text with a caret (byte offset on a grapheme boundary)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLine {
    text: String,
    caret: usize,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A line holding `text` with the caret at its end
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let caret = text.len();
        Self { text, caret }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text before the caret
    pub fn before_caret(&self) -> &str {
        &self.text[..self.caret]
    }

    pub fn insert_char(&mut self, c: char) {
        self.text.insert(self.caret, c);
        self.caret += c.len_utf8();
    }

    pub fn insert_str(&mut self, s: &str) {
        self.text.insert_str(self.caret, s);
        self.caret += s.len();
    }

    /// Delete the grapheme before the caret. Returns false at the start of the line.
    pub fn backspace(&mut self) -> bool {
        if self.caret == 0 {
            return false;
        }
        let start = prev_grapheme_boundary(&self.text, self.caret);
        self.text.replace_range(start..self.caret, "");
        self.caret = start;
        true
    }

    /// Delete the grapheme under the caret. Returns false at the end of the line.
    pub fn delete(&mut self) -> bool {
        if self.caret >= self.text.len() {
            return false;
        }
        let end = next_grapheme_boundary(&self.text, self.caret);
        self.text.replace_range(self.caret..end, "");
        true
    }

    pub fn move_left(&mut self) {
        self.caret = prev_grapheme_boundary(&self.text, self.caret);
    }

    pub fn move_right(&mut self) {
        self.caret = next_grapheme_boundary(&self.text, self.caret);
    }

    pub fn move_home(&mut self) {
        self.caret = 0;
    }

    pub fn move_end(&mut self) {
        self.caret = self.text.len();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.caret = 0;
    }

    /// Replace the whole text, placing the caret at the end
    pub fn set_text(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.caret = self.text.len();
    }

    /// Take the text out, leaving an empty line
    pub fn take(&mut self) -> String {
        self.caret = 0;
        std::mem::take(&mut self.text)
    }

    /// Byte range of the token that ends at the caret
    pub fn trailing_token_range(&self) -> Range<usize> {
        let before = self.before_caret();
        let start = before
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        start..self.caret
    }

    /// The token that ends at the caret
    pub fn trailing_token(&self) -> &str {
        &self.text[self.trailing_token_range()]
    }

    /// Replace `range` with `replacement`, leaving the caret after it
    pub fn replace_range(&mut self, range: Range<usize>, replacement: &str) {
        let start = range.start;
        self.text.replace_range(range, replacement);
        self.caret = start + replacement.len();
    }
}

fn prev_grapheme_boundary(s: &str, pos: usize) -> usize {
    s.grapheme_indices(true)
        .map(|(idx, _)| idx)
        .take_while(|&idx| idx < pos)
        .last()
        .unwrap_or(0)
}

fn next_grapheme_boundary(s: &str, pos: usize) -> usize {
    s.grapheme_indices(true)
        .map(|(idx, grapheme)| idx + grapheme.len())
        .find(|&end| end > pos)
        .unwrap_or(s.len())
}

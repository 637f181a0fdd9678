//! Collaborator interfaces for the visible surface
//!
//! The shell never draws anything itself. It writes complete lines into a
//! [`DisplaySink`], asks it to present the prompt with the line being
//! typed, and obtains passwords through a [`SecretPrompt`]. The terminal
//! implementations live in [`crate::terminal`]; the in-memory ones here are
//! used by tests and embedders.

use crate::input::InputLine;

/// Scrollback surface the shell writes into
pub trait DisplaySink {
    /// Append one line of output below everything shown so far
    fn append_line(&mut self, text: &str);

    /// Erase all scrollback
    fn clear(&mut self);

    /// Present the prompt followed by the input line, caret included
    fn show_prompt(&mut self, prompt: &str, line: &InputLine);
}

/// Secure input surface for passwords
pub trait SecretPrompt {
    /// Ask the user for a secret. An empty string means none was given.
    fn request_secret(&mut self, prompt: &str) -> String;
}

/// A [`DisplaySink`] that records everything in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Vec<String>,
    prompt: String,
    input: InputLine,
    clears: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line appended since the last clear
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether a line equal to `text` was appended
    pub fn contains_line(&self, text: &str) -> bool {
        self.lines.iter().any(|line| line == text)
    }

    /// The most recently presented prompt
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The most recently presented input line
    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl DisplaySink for MemorySink {
    fn append_line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn clear(&mut self) {
        self.lines.clear();
        self.clears += 1;
    }

    fn show_prompt(&mut self, prompt: &str, line: &InputLine) {
        self.prompt = prompt.to_string();
        self.input = line.clone();
    }
}

/// A [`SecretPrompt`] that always answers with the same secret
#[derive(Debug, Clone, Default)]
pub struct FixedSecret {
    secret: String,
    requests: Vec<String>,
}

impl FixedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            requests: Vec::new(),
        }
    }

    /// Prompts that were shown, in order
    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

impl SecretPrompt for FixedSecret {
    fn request_secret(&mut self, prompt: &str) -> String {
        self.requests.push(prompt.to_string());
        self.secret.clone()
    }
}

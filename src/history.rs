//! Command history
//!
//! Keeps the lines the user has submitted, most recent last, and a
//! navigation cursor for Up/Down recall. The cursor ranges over
//! `0..=len`, where `len` is the "live" position: the fresh line the
//! user is typing rather than a recalled entry.
//!
//! History is persisted as newline-delimited UTF-8 text and rewritten in
//! full on every save.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default bound on the number of stored entries
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Bounded command history with a recall cursor
#[derive(Debug, Clone)]
pub struct History {
    /// Entries, oldest first
    entries: VecDeque<String>,

    /// Recall position; `entries.len()` means the live line
    cursor: usize,

    /// Maximum number of entries to keep
    max_size: usize,

    /// Backing file, if this history is persisted
    path: Option<PathBuf>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    /// Create an in-memory history holding at most `max_size` entries
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            max_size: max_size.max(1),
            path: None,
        }
    }

    /// Create a history backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn with_file(path: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new(max_size)
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current recall position (`len()` when editing a fresh line)
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Iterate over entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// The most recently appended entry
    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    /// Append a submitted line.
    ///
    /// Blank lines and a line equal to the most recent entry are ignored.
    /// Returns true if the line was stored. Always resets the recall cursor.
    pub fn append(&mut self, line: &str) -> bool {
        let stored = if line.trim().is_empty() || self.last() == Some(line) {
            false
        } else {
            self.entries.push_back(line.to_string());
            self.trim_to_capacity();
            true
        };

        self.reset_cursor();
        stored
    }

    /// Move the recall cursor back to the live line
    pub fn reset_cursor(&mut self) {
        self.cursor = self.entries.len();
    }

    /// Recall the previous (older) entry.
    ///
    /// The cursor is clamped at the oldest entry, so repeated calls keep
    /// returning it. Returns `None` only when the history is empty.
    pub fn navigate_up(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }

        self.cursor = self.cursor.saturating_sub(1);
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Recall the next (newer) entry.
    ///
    /// Stepping past the newest entry returns to the live position and
    /// yields an empty line. When already on the live line there is nothing
    /// to recall and `None` is returned, leaving the typed text alone.
    pub fn navigate_down(&mut self) -> Option<&str> {
        let len = self.entries.len();
        if self.cursor >= len {
            self.cursor = len;
            return None;
        }

        self.cursor += 1;
        if self.cursor > len.saturating_sub(1) {
            self.cursor = len;
            return Some("");
        }

        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Replace the in-memory entries with the contents of the backing file.
    ///
    /// A missing file is treated as an empty history. Returns the number of
    /// entries loaded.
    pub fn load(&mut self) -> io::Result<usize> {
        let Some(path) = self.path.clone() else {
            return Ok(0);
        };

        self.entries = read_history_file(&path)?.into();
        self.trim_to_capacity();
        self.reset_cursor();

        tracing::debug!("Loaded {} history entries from {:?}", self.len(), path);
        Ok(self.len())
    }

    /// Write every entry to the backing file, replacing its contents.
    pub fn persist(&mut self) -> io::Result<()> {
        self.trim_to_capacity();

        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut contents = String::new();
        for entry in &self.entries {
            contents.push_str(entry);
            contents.push('\n');
        }
        fs::write(path, contents)?;

        tracing::debug!("Saved {} history entries to {:?}", self.len(), path);
        Ok(())
    }

    fn trim_to_capacity(&mut self) {
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
        self.cursor = self.cursor.min(self.entries.len());
    }
}

/// Read a history file, skipping blank lines. A missing file reads as empty.
pub fn read_history_file(path: &Path) -> io::Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

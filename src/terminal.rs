//! Terminal front end
//!
//! Raw-mode setup, a [`DisplaySink`] that draws into the normal screen
//! buffer, a no-echo [`SecretPrompt`], and the keyboard reader thread that
//! feeds key events to the control task.

use crate::display::{DisplaySink, SecretPrompt};
use crate::input::InputLine;
use anyhow::Result;
use crossterm::{
    cursor::{MoveTo, MoveToColumn},
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
    ExecutableCommand,
};
use std::io::{stdout, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

/// How long the key reader waits for an event before re-checking its gate
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tracks which terminal modes have been enabled and restores them on drop
#[derive(Debug, Default)]
pub struct TerminalModes {
    raw_mode: bool,
    bracketed_paste: bool,
}

impl TerminalModes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable raw mode and bracketed paste.
    ///
    /// On error, undoes any partially enabled modes.
    pub fn enable() -> Result<Self> {
        let mut modes = Self::new();

        if let Err(e) = enable_raw_mode() {
            tracing::error!("Failed to enable raw mode: {}", e);
            return Err(e.into());
        }
        modes.raw_mode = true;
        tracing::debug!("Enabled raw mode");

        if let Err(e) = stdout().execute(EnableBracketedPaste) {
            tracing::warn!("Failed to enable bracketed paste: {}", e);
        } else {
            modes.bracketed_paste = true;
            tracing::debug!("Enabled bracketed paste mode");
        }

        Ok(modes)
    }

    /// Restore the terminal. Safe to call more than once.
    pub fn undo(&mut self) {
        if self.bracketed_paste {
            let _ = stdout().execute(DisableBracketedPaste);
            self.bracketed_paste = false;
            tracing::debug!("Disabled bracketed paste");
        }

        if self.raw_mode {
            let _ = disable_raw_mode();
            self.raw_mode = false;
            tracing::debug!("Disabled raw mode");
        }

        let _ = stdout().flush();
    }

    /// Restore the terminal without tracked state, for use in a panic hook
    pub fn emergency_cleanup() {
        let _ = stdout().execute(DisableBracketedPaste);
        let _ = disable_raw_mode();
        let _ = stdout().flush();
    }
}

impl Drop for TerminalModes {
    fn drop(&mut self) {
        self.undo();
    }
}

/// Input delivered by the keyboard reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalInput {
    Key(KeyEvent),
    Paste(String),
}

/// Lets the secret prompt take the keyboard away from the reader thread
#[derive(Debug, Default)]
pub struct InputGate {
    paused: AtomicBool,
    lock: Mutex<()>,
}

impl InputGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

/// Start the thread that reads terminal events and forwards them to `tx`.
///
/// The thread ends when the receiver is dropped or reading fails.
pub fn spawn_key_reader(
    tx: mpsc::UnboundedSender<TerminalInput>,
    gate: Arc<InputGate>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        if tx.is_closed() {
            break;
        }
        if gate.is_paused() {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let guard = gate.acquire();
        if gate.is_paused() {
            continue;
        }
        let input = match event::poll(POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => Some(TerminalInput::Key(key)),
                Ok(Event::Paste(text)) => Some(TerminalInput::Paste(text)),
                Ok(_) => None,
                Err(e) => {
                    tracing::error!("Reading terminal event failed: {}", e);
                    break;
                }
            },
            Ok(false) => None,
            Err(e) => {
                tracing::error!("Polling terminal failed: {}", e);
                break;
            }
        };
        drop(guard);

        if let Some(input) = input {
            if tx.send(input).is_err() {
                break;
            }
        }
    })
}

/// Draws scrollback and the prompt line on stdout.
///
/// Interactive mode expects raw mode and redraws the prompt line in place.
/// Plain mode just prints output lines, for non-interactive runs.
pub struct TerminalSink {
    out: Stdout,
    interactive: bool,
}

impl TerminalSink {
    pub fn interactive() -> Self {
        Self {
            out: stdout(),
            interactive: true,
        }
    }

    pub fn plain() -> Self {
        Self {
            out: stdout(),
            interactive: false,
        }
    }

    fn try_append(&mut self, text: &str) -> std::io::Result<()> {
        if self.interactive {
            queue!(
                self.out,
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(text),
                Print("\r\n")
            )?;
        } else {
            writeln!(self.out, "{}", text)?;
        }
        self.out.flush()
    }

    fn try_clear(&mut self) -> std::io::Result<()> {
        queue!(self.out, Clear(ClearType::All), Clear(ClearType::Purge), MoveTo(0, 0))?;
        self.out.flush()
    }

    fn try_show_prompt(&mut self, prompt: &str, line: &InputLine) -> std::io::Result<()> {
        let caret_column = prompt.width() + line.before_caret().width();
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(prompt),
            Print(line.text()),
            MoveToColumn(u16::try_from(caret_column).unwrap_or(u16::MAX))
        )?;
        self.out.flush()
    }
}

impl DisplaySink for TerminalSink {
    fn append_line(&mut self, text: &str) {
        if let Err(e) = self.try_append(text) {
            tracing::warn!("Failed to write output: {}", e);
        }
    }

    fn clear(&mut self) {
        if !self.interactive {
            return;
        }
        if let Err(e) = self.try_clear() {
            tracing::warn!("Failed to clear screen: {}", e);
        }
    }

    fn show_prompt(&mut self, prompt: &str, line: &InputLine) {
        if !self.interactive {
            return;
        }
        if let Err(e) = self.try_show_prompt(prompt, line) {
            tracing::warn!("Failed to draw prompt: {}", e);
        }
    }
}

/// Reads a password from the keyboard without echoing it
pub struct TerminalSecretPrompt {
    gate: Arc<InputGate>,
}

impl TerminalSecretPrompt {
    pub fn new(gate: Arc<InputGate>) -> Self {
        Self { gate }
    }

    fn read_secret(&self, prompt: &str) -> std::io::Result<String> {
        let mut out = stdout();
        queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(prompt))?;
        out.flush()?;

        let mut secret = String::new();
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            match key.code {
                KeyCode::Enter => break,
                KeyCode::Esc => {
                    secret.clear();
                    break;
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    secret.clear();
                    break;
                }
                KeyCode::Backspace => {
                    secret.pop();
                }
                KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    secret.push(c);
                }
                _ => {}
            }
        }

        queue!(out, Print("\r\n"))?;
        out.flush()?;
        Ok(secret)
    }
}

impl SecretPrompt for TerminalSecretPrompt {
    fn request_secret(&mut self, prompt: &str) -> String {
        self.gate.paused.store(true, Ordering::Release);
        let secret = {
            let _guard = self.gate.acquire();
            self.read_secret(prompt)
        };
        self.gate.paused.store(false, Ordering::Release);

        secret.unwrap_or_else(|e| {
            tracing::warn!("Failed to read secret: {}", e);
            String::new()
        })
    }
}

/// Prompt used when stdin is not a terminal: secrets cannot be asked for
#[derive(Debug, Default)]
pub struct NoSecret;

impl SecretPrompt for NoSecret {
    fn request_secret(&mut self, prompt: &str) -> String {
        tracing::debug!("No terminal to ask '{}' on", prompt);
        String::new()
    }
}

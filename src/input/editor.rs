//! Key handling for the input line.
//!
//! Translates key events into edits of the [`InputLine`], history recall
//! and Tab completion, and reports anything the shell has to act on as an
//! [`EditorAction`].

use super::line::InputLine;
use crate::completion::{common_prefix, CompletionSource, CompletionState};
use crate::config::CompletionStyle;
use crate::history::History;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What the shell should do after a key was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    /// Nothing changed
    None,
    /// The input line changed and should be redrawn
    Redraw,
    /// The user pressed Enter; the line has been taken out of the editor
    Submit(String),
    /// Ctrl+C
    Interrupt,
    /// Ctrl+L
    ClearScreen,
    /// Ctrl+D on an empty line
    Exit,
    /// Several completion candidates should be shown to the user
    ShowCandidates(Vec<String>),
}

/// Input line plus the transient completion state
#[derive(Debug, Clone, Default)]
pub struct InputEditor {
    line: InputLine,
    completion: Option<CompletionState>,
    style: CompletionStyle,
}

impl InputEditor {
    pub fn new(style: CompletionStyle) -> Self {
        Self {
            line: InputLine::new(),
            completion: None,
            style,
        }
    }

    pub fn line(&self) -> &InputLine {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut InputLine {
        &mut self.line
    }

    pub fn completion(&self) -> Option<&CompletionState> {
        self.completion.as_ref()
    }

    /// Insert pasted text at the caret. Like any non-Tab input, this ends a
    /// completion cycle.
    pub fn insert_paste(&mut self, text: &str) {
        self.completion = None;
        self.line.insert_str(text);
    }

    pub fn handle_key(
        &mut self,
        event: &KeyEvent,
        history: &mut History,
        source: &dyn CompletionSource,
    ) -> EditorAction {
        if event.kind == KeyEventKind::Release {
            return EditorAction::None;
        }

        if event.code == KeyCode::Tab && event.modifiers.is_empty() {
            return self.complete(source);
        }
        self.completion = None;

        let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
        let alt = event.modifiers.contains(KeyModifiers::ALT);

        match event.code {
            KeyCode::Enter => {
                history.reset_cursor();
                EditorAction::Submit(self.line.take())
            }

            KeyCode::Char(c) if ctrl => match c.to_ascii_lowercase() {
                'c' => EditorAction::Interrupt,
                'l' => EditorAction::ClearScreen,
                'd' if self.line.is_empty() => EditorAction::Exit,
                'd' => redraw_if(self.line.delete()),
                'a' => {
                    self.line.move_home();
                    EditorAction::Redraw
                }
                'e' => {
                    self.line.move_end();
                    EditorAction::Redraw
                }
                'u' => {
                    self.line.clear();
                    EditorAction::Redraw
                }
                _ => EditorAction::None,
            },
            KeyCode::Char(_) if alt => EditorAction::None,
            KeyCode::Char(c) => {
                self.line.insert_char(c);
                EditorAction::Redraw
            }

            KeyCode::Backspace => redraw_if(self.line.backspace()),
            KeyCode::Delete => redraw_if(self.line.delete()),
            KeyCode::Left => {
                self.line.move_left();
                EditorAction::Redraw
            }
            KeyCode::Right => {
                self.line.move_right();
                EditorAction::Redraw
            }
            KeyCode::Home => {
                self.line.move_home();
                EditorAction::Redraw
            }
            KeyCode::End => {
                self.line.move_end();
                EditorAction::Redraw
            }

            KeyCode::Up => match history.navigate_up() {
                Some(entry) => {
                    self.line.set_text(entry);
                    EditorAction::Redraw
                }
                None => EditorAction::None,
            },
            KeyCode::Down => match history.navigate_down() {
                Some(entry) => {
                    self.line.set_text(entry);
                    EditorAction::Redraw
                }
                None => EditorAction::None,
            },

            _ => EditorAction::None,
        }
    }

    /// Handle Tab.
    ///
    /// On blank input a literal tab is inserted. A single candidate
    /// replaces the trailing token; several either start a cycle or are
    /// listed, depending on the configured style.
    fn complete(&mut self, source: &dyn CompletionSource) -> EditorAction {
        if let Some(state) = self.completion.as_mut() {
            let range = state.start()..self.line.caret();
            let next = state.advance().to_string();
            self.line.replace_range(range, &next);
            return EditorAction::Redraw;
        }

        let range = self.line.trailing_token_range();
        let prefix = self.line.trailing_token().to_string();
        if prefix.is_empty() {
            self.line.insert_char('\t');
            return EditorAction::Redraw;
        }

        let candidates = source.complete(&prefix);
        match candidates.len() {
            0 => EditorAction::None,
            1 => {
                self.line.replace_range(range, &candidates[0]);
                EditorAction::Redraw
            }
            _ => match self.style {
                CompletionStyle::Cycle => {
                    self.line.replace_range(range.clone(), &candidates[0]);
                    self.completion = CompletionState::new(prefix, range.start, candidates);
                    EditorAction::Redraw
                }
                CompletionStyle::List => {
                    let common = common_prefix(&candidates);
                    if common.len() > prefix.len() {
                        self.line.replace_range(range, common);
                    }
                    EditorAction::ShowCandidates(candidates)
                }
            },
        }
    }
}

fn redraw_if(changed: bool) -> EditorAction {
    if changed {
        EditorAction::Redraw
    } else {
        EditorAction::None
    }
}

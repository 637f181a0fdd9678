//! The shell proper: dispatches submitted lines, routes job events to the
//! display and keeps the prompt and the line being typed intact while
//! output scrolls past.
//!
//! [`Shell`] is driven by a single control task. It is fed key events (or
//! whole lines) and [`JobEvent`]s and never blocks on a child process.

use crate::config::Config;
use crate::display::{DisplaySink, SecretPrompt};
use crate::history::History;
use crate::input::{EditorAction, InputEditor};
use crate::jobs::{
    parse_kill_args, JobController, JobEvent, JobUpdate, LaunchError, LaunchOutcome,
    OutputAssembler,
};
use crate::parser::{parse, ParsedCommand};
use crate::session::Session;
use crossterm::event::KeyEvent;
use tokio::sync::mpsc;

/// Line that leaves the shell when submitted
pub const EXIT_COMMAND: &str = "exit";

/// Echo shown for Ctrl+C
pub const INTERRUPT_ECHO: &str = "^C";

/// Exit status recorded for an interrupted foreground job
const INTERRUPTED_STATUS: i32 = 130;

/// Exit status recorded when a program could not be found
const NOT_FOUND_STATUS: i32 = 127;

pub struct Shell<D: DisplaySink, S: SecretPrompt> {
    session: Session,
    history: History,
    jobs: JobController,
    editor: InputEditor,
    assembler: OutputAssembler,
    display: D,
    secrets: S,
    exit_requested: bool,
    last_status: Option<i32>,
}

impl<D: DisplaySink, S: SecretPrompt> Shell<D, S> {
    /// Create a shell. Child processes report into `events`; the receiving
    /// end must be fed back through [`Shell::handle_job_event`].
    pub fn new(
        config: &Config,
        session: Session,
        history: History,
        events: mpsc::UnboundedSender<JobEvent>,
        display: D,
        secrets: S,
    ) -> Self {
        let mut shell = Self {
            session,
            history,
            jobs: JobController::new(events, &config.jobs),
            editor: InputEditor::new(config.completion.style),
            assembler: OutputAssembler::new(),
            display,
            secrets,
            exit_requested: false,
            last_status: None,
        };
        shell.redraw();
        shell
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn jobs(&self) -> &JobController {
        &self.jobs
    }

    pub fn editor(&self) -> &InputEditor {
        &self.editor
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn secrets(&self) -> &S {
        &self.secrets
    }

    /// Whether `exit` or Ctrl+D asked the shell to stop
    pub fn should_exit(&self) -> bool {
        self.exit_requested
    }

    /// Exit status of the last foreground command, if any finished
    pub fn last_status(&self) -> Option<i32> {
        self.last_status
    }

    /// The prompt currently in effect. Empty while a foreground job runs.
    pub fn active_prompt(&self) -> &str {
        if self.jobs.foreground_busy() {
            ""
        } else {
            self.session.prompt()
        }
    }

    /// Feed one key press
    pub fn handle_key(&mut self, event: &KeyEvent) {
        let action = self
            .editor
            .handle_key(event, &mut self.history, &self.session);

        match action {
            EditorAction::None => {}
            EditorAction::Redraw => self.redraw(),
            EditorAction::Submit(line) => self.submit(&line),
            EditorAction::Interrupt => self.interrupt(),
            EditorAction::ClearScreen => {
                self.display.clear();
                self.redraw();
            }
            EditorAction::Exit => {
                tracing::debug!("Exit requested from keyboard");
                self.exit_requested = true;
            }
            EditorAction::ShowCandidates(candidates) => {
                self.append_preserving_input(&[candidates.join("  ")]);
            }
        }
    }

    /// Insert pasted text at the caret. Line breaks become spaces; a paste
    /// never submits.
    pub fn handle_paste(&mut self, text: &str) {
        let flattened: String = text
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        self.editor.insert_paste(&flattened);
        self.redraw();
    }

    /// Submit a complete line as if typed and confirmed with Enter
    pub fn submit(&mut self, line: &str) {
        let line = line.trim();
        let echo = format!("{}{}", self.active_prompt(), line);
        self.display.append_line(&echo);
        self.history.append(line);
        self.history.reset_cursor();

        if line == EXIT_COMMAND {
            tracing::debug!("Exit requested by command");
            self.exit_requested = true;
            return;
        }

        self.execute(line);
        self.redraw();
    }

    /// Run one line without echo or history
    pub fn execute(&mut self, line: &str) {
        let command = parse(line);
        tracing::debug!("Dispatching {:?}", command);

        match command {
            ParsedCommand::Empty => {}
            ParsedCommand::Cd(args) => match self.session.change_directory(&args) {
                Ok(dir) => {
                    let message = dir.display().to_string();
                    self.display.append_line(&message);
                }
                Err(e) => self.display.append_line(&e.to_string()),
            },
            ParsedCommand::Clear => self.display.clear(),
            ParsedCommand::Jobs { long } => {
                for summary in self.jobs.list_background() {
                    self.display.append_line(&summary.format(long));
                }
            }
            ParsedCommand::Kill(args) => {
                match parse_kill_args(&args).and_then(|id| self.jobs.kill(id)) {
                    Ok(job) => {
                        let id = job.id().map(|id| id.to_string()).unwrap_or_default();
                        self.display
                            .append_line(&format!("[{}] killed {}", id, job.command_line()));
                    }
                    Err(e) => self.display.append_line(&e.to_string()),
                }
            }
            ParsedCommand::Launch(request) => {
                match self
                    .jobs
                    .launch(&request, &self.session, &mut self.secrets)
                {
                    Ok(LaunchOutcome::Foreground { .. }) => {}
                    Ok(LaunchOutcome::Background { id, pid }) => {
                        let message = match pid {
                            Some(pid) => format!("[{}] {}", id, pid),
                            None => format!("[{}]", id),
                        };
                        self.display.append_line(&message);
                    }
                    Err(e) => {
                        tracing::debug!("Launch of '{}' failed: {}", request.command_line, e);
                        match e {
                            LaunchError::AlreadyRunning => {}
                            LaunchError::NotFound(_) => {
                                self.last_status = Some(NOT_FOUND_STATUS)
                            }
                            LaunchError::Spawn { .. } => self.last_status = Some(1),
                        }
                        self.display.append_line(&e.to_string());
                    }
                }
            }
        }
    }

    /// Feed one event from the job channel
    pub fn handle_job_event(&mut self, event: JobEvent) {
        match &event {
            JobEvent::Output {
                ticket,
                stream,
                data,
            } => {
                let lines = self.assembler.push(*ticket, *stream, data);
                if !lines.is_empty() {
                    self.append_preserving_input(&lines);
                }
            }
            JobEvent::Exited { ticket, .. } => {
                let mut lines = self.assembler.finish(*ticket);
                match self.jobs.handle_event(&event) {
                    Some(JobUpdate::ForegroundFinished { outcome, .. }) => {
                        self.last_status = Some(outcome.code());
                        lines.push(outcome.to_string());
                    }
                    Some(JobUpdate::BackgroundFinished { job, outcome }) => {
                        tracing::debug!("Background job {:?} finished: {}", job.id(), outcome);
                        lines.push(format!("{} done", job.command_line()));
                    }
                    None => {}
                }
                self.append_preserving_input(&lines);
            }
        }
    }

    /// Ctrl+C: terminate the foreground job, or discard the line being typed
    pub fn interrupt(&mut self) {
        match self.jobs.interrupt() {
            Some(job) => {
                tracing::info!("Interrupted '{}'", job.command_line());
                self.last_status = Some(INTERRUPTED_STATUS);
                self.display.append_line(INTERRUPT_ECHO);
            }
            None => {
                let echo = format!(
                    "{}{}{}",
                    self.session.prompt(),
                    self.editor.line().text(),
                    INTERRUPT_ECHO
                );
                self.display.append_line(&echo);
                self.editor.line_mut().clear();
                self.history.reset_cursor();
            }
        }
        self.redraw();
    }

    /// Present the active prompt with the current input line
    pub fn redraw(&mut self) {
        let prompt = if self.jobs.foreground_busy() {
            ""
        } else {
            self.session.prompt()
        };
        self.display.show_prompt(prompt, self.editor.line());
    }

    /// Append `lines` and re-present the prompt with whatever the user had
    /// typed, caret at the end
    fn append_preserving_input(&mut self, lines: &[String]) {
        let typed = self.editor.line().text().to_string();
        for line in lines {
            self.display.append_line(line);
        }
        self.editor.line_mut().set_text(&typed);
        self.redraw();
    }

    /// Terminate every job and save history
    pub async fn shutdown(&mut self) {
        self.jobs.terminate_all().await;
        if let Err(e) = self.history.persist() {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

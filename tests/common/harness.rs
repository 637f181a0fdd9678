use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use shmel::config::Config;
use shmel::display::{FixedSecret, MemorySink};
use shmel::history::History;
use shmel::jobs::JobEvent;
use shmel::session::Session;
use shmel::shell::Shell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// How long to wait for a job before a test fails
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// A shell wired to an in-memory display, rooted in a scratch home directory
pub struct ShellHarness {
    pub shell: Shell<MemorySink, FixedSecret>,
    events: mpsc::UnboundedReceiver<JobEvent>,
    home: PathBuf,
    _temp: TempDir,
}

impl ShellHarness {
    pub fn new() -> Self {
        Self::with_secret("")
    }

    /// Harness whose secret prompt always answers `secret`
    pub fn with_secret(secret: &str) -> Self {
        super::tracing::init_tracing_from_env();

        let temp = TempDir::new().unwrap();
        let home = temp.path().canonicalize().unwrap();
        let config = Config::default();

        let session = Session::new(&home, config.prompt.suffix.clone()).with_home(&home);
        let history = History::with_file(home.join(".shmel_history"), config.history.max_size);
        let (tx, events) = mpsc::unbounded_channel();

        let shell = Shell::new(
            &config,
            session,
            history,
            tx,
            MemorySink::new(),
            FixedSecret::new(secret),
        );

        Self {
            shell,
            events,
            home,
            _temp: temp,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Write an executable shell script into the home directory
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.home.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn submit(&mut self, line: &str) {
        self.shell.submit(line);
    }

    pub fn type_text(&mut self, text: &str) {
        for c in text.chars() {
            self.press(KeyCode::Char(c));
        }
    }

    pub fn press(&mut self, code: KeyCode) {
        self.shell.handle_key(&KeyEvent::new(code, KeyModifiers::NONE));
    }

    pub fn ctrl(&mut self, c: char) {
        self.shell
            .handle_key(&KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
    }

    pub fn lines(&self) -> &[String] {
        self.shell.display().lines()
    }

    pub fn has_line(&self, text: &str) -> bool {
        self.shell.display().contains_line(text)
    }

    /// Position of the first line equal to `text`
    pub fn line_index(&self, text: &str) -> Option<usize> {
        self.lines().iter().position(|line| line == text)
    }

    /// Feed job events into the shell until `done` holds
    pub async fn pump_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        while !done(self) {
            let event = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out; display so far: {:#?}", self.lines()))
                .expect("job channel closed");
            self.shell.handle_job_event(event);
        }
    }

    pub async fn wait_for_line(&mut self, text: &str) {
        let text = text.to_string();
        self.pump_until(move |h| h.has_line(&text)).await;
    }

    /// Wait until no job is left running
    pub async fn wait_idle(&mut self) {
        self.pump_until(|h| h.shell.jobs().is_idle()).await;
    }

    /// Handle whatever events arrive within `window`
    pub async fn pump_for(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.events.recv()).await {
            self.shell.handle_job_event(event);
        }
    }

    /// Terminate remaining jobs and save history
    pub async fn shutdown(&mut self) {
        self.shell.shutdown().await;
    }
}

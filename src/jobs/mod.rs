//! Job control
//!
//! The [`JobController`] owns every process the shell started: at most one
//! foreground job and any number of numbered background jobs. Processes are
//! supervised by tokio tasks (see `process`) which report back through a
//! [`JobEvent`] channel; the controller itself never blocks.
//!
//! Every spawned process gets an internal [`Ticket`]. Events carry the
//! ticket rather than the user-visible [`JobId`], so output or an exit from
//! a job that was already interrupted or killed can never be mistaken for
//! one of its successors.

mod output;
mod process;

pub use output::OutputAssembler;

use crate::config::JobsConfig;
use crate::display::SecretPrompt;
use crate::parser::{resolve_program, LaunchRequest};
use crate::session::Session;
use std::collections::BTreeMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Prompt shown when an elevated command needs a password
pub const SECRET_PROMPT: &str = "[sudo] password: ";

/// Internal routing key for one spawned process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

/// User-visible number of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Message sent by supervision tasks to the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// A chunk read from one of the job's output pipes
    Output {
        ticket: Ticket,
        stream: OutputStream,
        data: Vec<u8>,
    },
    /// The process is gone. Always sent after the job's last output chunk.
    Exited { ticket: Ticket, outcome: ExitOutcome },
}

impl JobEvent {
    pub fn ticket(&self) -> Ticket {
        match self {
            JobEvent::Output { ticket, .. } | JobEvent::Exited { ticket, .. } => *ticket,
        }
    }
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Code(i32),
    Signal(i32),
    WaitFailed(String),
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitOutcome::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitOutcome::Signal(signal);
            }
        }
        ExitOutcome::WaitFailed(format!("unknown exit status: {}", status))
    }

    /// Exit code in the shell's convention (128 + signal for signals)
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Code(code) => *code,
            ExitOutcome::Signal(signal) => 128 + signal,
            ExitOutcome::WaitFailed(_) => 1,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => write!(f, "exit code: {}", code),
            ExitOutcome::Signal(signal) => write!(f, "terminated by signal {}", signal),
            ExitOutcome::WaitFailed(msg) => write!(f, "wait failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Foreground,
    Background,
}

/// A running process owned by the controller.
///
/// Dropping a job drops its cancel channel, which terminates the process.
#[derive(Debug)]
pub struct Job {
    id: Option<JobId>,
    ticket: Ticket,
    pid: Option<u32>,
    command_line: String,
    kind: JobKind,
    cancel: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl Job {
    /// Background job number; `None` for the foreground job
    pub fn id(&self) -> Option<JobId> {
        self.id
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Ask the supervisor to terminate the process. Does not wait.
    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    fn summary(&self) -> Option<JobSummary> {
        Some(JobSummary {
            id: self.id?,
            pid: self.pid,
            command_line: self.command_line.clone(),
        })
    }
}

/// One row of the `jobs` listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: JobId,
    pub pid: Option<u32>,
    pub command_line: String,
}

impl JobSummary {
    /// `[id] command`, or `[id] pid command` in long form
    pub fn format(&self, long: bool) -> String {
        match (long, self.pid) {
            (true, Some(pid)) => format!("[{}] {} {}", self.id, pid, self.command_line),
            _ => format!("[{}] {}", self.id, self.command_line),
        }
    }
}

/// Result of a successful launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Foreground { pid: Option<u32> },
    Background { id: JobId, pid: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// A foreground job already occupies the slot
    AlreadyRunning,
    NotFound(String),
    Spawn { program: String, message: String },
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::AlreadyRunning => write!(f, "command already running"),
            LaunchError::NotFound(program) => write!(f, "{}: command not found", program),
            LaunchError::Spawn { program, message } => {
                write!(f, "{}: failed to start: {}", program, message)
            }
        }
    }
}

impl std::error::Error for LaunchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillError {
    Usage,
    InvalidJobId,
}

impl fmt::Display for KillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillError::Usage => write!(f, "kill: usage: kill <job_id>"),
            KillError::InvalidJobId => write!(f, "kill: invalid job_id"),
        }
    }
}

impl std::error::Error for KillError {}

/// Parse the arguments of `kill`: exactly one integer job id
pub fn parse_kill_args(args: &[String]) -> Result<JobId, KillError> {
    match args {
        [arg] => arg
            .parse::<u32>()
            .map(JobId)
            .map_err(|_| KillError::InvalidJobId),
        _ => Err(KillError::Usage),
    }
}

/// A job that finished on its own
#[derive(Debug)]
pub enum JobUpdate {
    ForegroundFinished { job: Job, outcome: ExitOutcome },
    BackgroundFinished { job: Job, outcome: ExitOutcome },
}

/// Owner of the foreground slot and the background job table
#[derive(Debug)]
pub struct JobController {
    events: mpsc::UnboundedSender<JobEvent>,
    foreground: Option<Job>,
    background: BTreeMap<JobId, Job>,
    next_job_id: u32,
    next_ticket: u64,
    term: String,
    kill_grace: Duration,
}

impl JobController {
    /// Create a controller whose jobs report into `events`
    pub fn new(events: mpsc::UnboundedSender<JobEvent>, config: &JobsConfig) -> Self {
        Self {
            events,
            foreground: None,
            background: BTreeMap::new(),
            next_job_id: 1,
            next_ticket: 1,
            term: config.term.clone(),
            kill_grace: config.kill_grace(),
        }
    }

    /// Whether the foreground slot is occupied
    pub fn foreground_busy(&self) -> bool {
        self.foreground.is_some()
    }

    pub fn foreground(&self) -> Option<&Job> {
        self.foreground.as_ref()
    }

    pub fn background_count(&self) -> usize {
        self.background.len()
    }

    /// Whether any job is still running
    pub fn is_idle(&self) -> bool {
        self.foreground.is_none() && self.background.is_empty()
    }

    /// Start an external program.
    ///
    /// Must be called from within a tokio runtime. For elevated requests the
    /// secret is obtained after the process has started and written to its
    /// stdin; an empty secret just closes stdin.
    pub fn launch(
        &mut self,
        request: &LaunchRequest,
        session: &Session,
        secrets: &mut dyn SecretPrompt,
    ) -> Result<LaunchOutcome, LaunchError> {
        if !request.background && self.foreground.is_some() {
            tracing::debug!("Rejecting '{}': foreground busy", request.command_line);
            return Err(LaunchError::AlreadyRunning);
        }

        let path = resolve_program(&request.program, session)
            .ok_or_else(|| LaunchError::NotFound(request.program.clone()))?;

        let mut command = Command::new(&path);
        command
            .args(&request.args)
            .current_dir(session.working_dir())
            .envs(session.environment())
            .env("TERM", &self.term)
            .stdin(if request.elevated {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| LaunchError::Spawn {
            program: request.program.clone(),
            message: e.to_string(),
        })?;
        let pid = child.id();

        if request.elevated {
            if let Some(stdin) = child.stdin.take() {
                let secret = secrets.request_secret(SECRET_PROMPT);
                if !secret.is_empty() {
                    tokio::spawn(process::write_secret(stdin, secret));
                }
            }
        }

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let supervisor = tokio::spawn(process::supervise(
            ticket,
            child,
            cancel_rx,
            self.kill_grace,
            self.events.clone(),
        ));

        let mut job = Job {
            id: None,
            ticket,
            pid,
            command_line: request.command_line.clone(),
            kind: JobKind::Foreground,
            cancel: Some(cancel_tx),
            supervisor: Some(supervisor),
        };

        if request.background {
            let id = JobId(self.next_job_id);
            self.next_job_id += 1;
            job.id = Some(id);
            job.kind = JobKind::Background;
            tracing::info!(
                "Started background job {} ({:?}, pid {:?}): {}",
                id,
                ticket,
                pid,
                job.command_line
            );
            self.background.insert(id, job);
            Ok(LaunchOutcome::Background { id, pid })
        } else {
            tracing::info!(
                "Started foreground job {:?} (pid {:?}): {}",
                ticket,
                pid,
                job.command_line
            );
            self.foreground = Some(job);
            Ok(LaunchOutcome::Foreground { pid })
        }
    }

    /// Terminate the foreground job and free the slot immediately
    pub fn interrupt(&mut self) -> Option<Job> {
        let mut job = self.foreground.take()?;
        tracing::debug!("Interrupting foreground job {:?}", job.ticket);
        job.cancel();
        Some(job)
    }

    /// Terminate background job `id` and remove it from the table
    pub fn kill(&mut self, id: JobId) -> Result<Job, KillError> {
        let mut job = self.background.remove(&id).ok_or(KillError::InvalidJobId)?;
        tracing::debug!("Killing background job {} ({:?})", id, job.ticket);
        job.cancel();
        Ok(job)
    }

    /// Background jobs in ascending id order
    pub fn list_background(&self) -> Vec<JobSummary> {
        self.background.values().filter_map(Job::summary).collect()
    }

    /// Whether events for `ticket` belong to a job that is still tracked
    pub fn is_live(&self, ticket: Ticket) -> bool {
        self.foreground.as_ref().is_some_and(|job| job.ticket == ticket)
            || self.background.values().any(|job| job.ticket == ticket)
    }

    /// Route an event. Only exits of tracked jobs produce an update;
    /// exits of interrupted or killed jobs are swallowed.
    pub fn handle_event(&mut self, event: &JobEvent) -> Option<JobUpdate> {
        let JobEvent::Exited { ticket, outcome } = event else {
            return None;
        };

        if self.foreground.as_ref().is_some_and(|job| job.ticket == *ticket) {
            let job = self.foreground.take()?;
            return Some(JobUpdate::ForegroundFinished {
                job,
                outcome: outcome.clone(),
            });
        }

        let id = self
            .background
            .iter()
            .find(|(_, job)| job.ticket == *ticket)
            .map(|(id, _)| *id);
        match id.and_then(|id| self.background.remove(&id)) {
            Some(job) => Some(JobUpdate::BackgroundFinished {
                job,
                outcome: outcome.clone(),
            }),
            None => {
                tracing::debug!("Ignoring exit of untracked {:?}", ticket);
                None
            }
        }
    }

    /// Terminate every live job and wait for the supervisors to finish
    pub async fn terminate_all(&mut self) {
        let jobs: Vec<Job> = self
            .foreground
            .take()
            .into_iter()
            .chain(std::mem::take(&mut self.background).into_values())
            .collect();
        if jobs.is_empty() {
            return;
        }
        tracing::info!("Terminating {} job(s)", jobs.len());

        let deadline = self.kill_grace + Duration::from_secs(1);
        for mut job in jobs {
            job.cancel();
            if let Some(supervisor) = job.supervisor.take() {
                if tokio::time::timeout(deadline, supervisor).await.is_err() {
                    tracing::warn!("Job {:?} did not stop in time", job.ticket);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FixedSecret;
    use tempfile::TempDir;

    fn controller() -> (JobController, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = JobsConfig {
            kill_grace_ms: 200,
            ..JobsConfig::default()
        };
        (JobController::new(tx, &config), rx)
    }

    fn request(line: &str) -> LaunchRequest {
        match crate::parser::parse(line) {
            crate::parser::ParsedCommand::Launch(request) => request,
            other => panic!("not a launch: {:?}", other),
        }
    }

    async fn next_exit(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> JobEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for job event")
                .expect("channel closed");
            if matches!(event, JobEvent::Exited { .. }) {
                return event;
            }
        }
    }

    #[test]
    fn test_parse_kill_args() {
        assert_eq!(parse_kill_args(&[]), Err(KillError::Usage));
        assert_eq!(
            parse_kill_args(&["1".into(), "2".into()]),
            Err(KillError::Usage)
        );
        assert_eq!(parse_kill_args(&["x".into()]), Err(KillError::InvalidJobId));
        assert_eq!(parse_kill_args(&["-3".into()]), Err(KillError::InvalidJobId));
        assert_eq!(parse_kill_args(&["7".into()]), Ok(JobId(7)));
    }

    #[test]
    fn test_summary_format() {
        let summary = JobSummary {
            id: JobId(2),
            pid: Some(4242),
            command_line: "sleep 5".into(),
        };
        assert_eq!(summary.format(false), "[2] sleep 5");
        assert_eq!(summary.format(true), "[2] 4242 sleep 5");
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(ExitOutcome::Code(0).to_string(), "exit code: 0");
        assert_eq!(ExitOutcome::Signal(15).to_string(), "terminated by signal 15");
        assert_eq!(ExitOutcome::Signal(15).code(), 143);
    }

    #[tokio::test]
    async fn test_foreground_slot_is_exclusive() {
        let (mut jobs, _rx) = controller();
        let dir = TempDir::new().unwrap();
        let session = Session::new(dir.path(), "$ ");
        let mut secrets = FixedSecret::default();

        let first = jobs.launch(&request("sleep 5"), &session, &mut secrets);
        assert!(matches!(first, Ok(LaunchOutcome::Foreground { .. })));
        let ticket = jobs.foreground().unwrap().ticket();

        let second = jobs.launch(&request("sleep 1"), &session, &mut secrets);
        assert_eq!(second, Err(LaunchError::AlreadyRunning));
        assert_eq!(jobs.foreground().unwrap().ticket(), ticket);

        // background launches are still accepted
        let bg = jobs.launch(&request("sleep 5 &"), &session, &mut secrets);
        assert!(matches!(bg, Ok(LaunchOutcome::Background { id: JobId(1), .. })));

        jobs.terminate_all().await;
        assert!(jobs.is_idle());
    }

    #[tokio::test]
    async fn test_not_found_starts_nothing() {
        let (mut jobs, _rx) = controller();
        let dir = TempDir::new().unwrap();
        let session = Session::new(dir.path(), "$ ");
        let result = jobs.launch(
            &request("definitely-not-a-real-program-xyz"),
            &session,
            &mut FixedSecret::default(),
        );
        assert_eq!(
            result,
            Err(LaunchError::NotFound("definitely-not-a-real-program-xyz".into()))
        );
        assert!(jobs.is_idle());
    }

    #[tokio::test]
    async fn test_background_ids_are_not_reused() {
        let (mut jobs, mut rx) = controller();
        let dir = TempDir::new().unwrap();
        let session = Session::new(dir.path(), "$ ");
        let mut secrets = FixedSecret::default();

        jobs.launch(&request("true &"), &session, &mut secrets).unwrap();
        let exit = next_exit(&mut rx).await;
        assert!(matches!(
            jobs.handle_event(&exit),
            Some(JobUpdate::BackgroundFinished { .. })
        ));
        assert_eq!(jobs.background_count(), 0);

        let outcome = jobs.launch(&request("sleep 5 &"), &session, &mut secrets);
        assert!(matches!(outcome, Ok(LaunchOutcome::Background { id: JobId(2), .. })));

        assert_eq!(jobs.kill(JobId(1)).unwrap_err(), KillError::InvalidJobId);
        jobs.terminate_all().await;
    }

    #[tokio::test]
    async fn test_kill_removes_and_swallows_exit() {
        let (mut jobs, mut rx) = controller();
        let dir = TempDir::new().unwrap();
        let session = Session::new(dir.path(), "$ ");
        let mut secrets = FixedSecret::default();

        jobs.launch(&request("sleep 30 &"), &session, &mut secrets).unwrap();
        jobs.launch(&request("sleep 30 &"), &session, &mut secrets).unwrap();

        let killed = jobs.kill(JobId(1)).unwrap();
        assert_eq!(killed.command_line(), "sleep 30");
        let remaining: Vec<JobId> = jobs.list_background().iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![JobId(2)]);

        let exit = next_exit(&mut rx).await;
        assert_eq!(exit.ticket(), killed.ticket());
        assert!(jobs.handle_event(&exit).is_none());

        jobs.terminate_all().await;
    }

    #[tokio::test]
    async fn test_interrupt_frees_slot() {
        let (mut jobs, mut rx) = controller();
        let dir = TempDir::new().unwrap();
        let session = Session::new(dir.path(), "$ ");

        jobs.launch(&request("sleep 30"), &session, &mut FixedSecret::default())
            .unwrap();
        let job = jobs.interrupt().unwrap();
        assert!(!jobs.foreground_busy());
        assert!(jobs.interrupt().is_none());

        let exit = next_exit(&mut rx).await;
        assert_eq!(exit.ticket(), job.ticket());
        assert!(!jobs.is_live(job.ticket()));
        assert!(jobs.handle_event(&exit).is_none());
    }

    #[tokio::test]
    async fn test_child_runs_in_session_directory_with_term() {
        let (mut jobs, mut rx) = controller();
        let dir = TempDir::new().unwrap();
        let probe = dir.path().join("probe.sh");
        std::fs::write(&probe, "#!/bin/sh\npwd -P\necho \"$TERM $SHMEL_TEST_VALUE\"\n").unwrap();
        std::fs::set_permissions(&probe, std::os::unix::fs::PermissionsExt::from_mode(0o755))
            .unwrap();

        let mut session = Session::new(dir.path().canonicalize().unwrap(), "$ ");
        session.set_env("SHMEL_TEST_VALUE", "42");

        jobs.launch(&request("./probe.sh"), &session, &mut FixedSecret::default())
            .unwrap();

        let mut assembler = OutputAssembler::new();
        let mut lines = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match &event {
                JobEvent::Output { ticket, stream, data } => {
                    lines.extend(assembler.push(*ticket, *stream, data))
                }
                JobEvent::Exited { ticket, .. } => {
                    lines.extend(assembler.finish(*ticket));
                    break;
                }
            }
        }

        assert_eq!(
            lines,
            vec![
                dir.path().canonicalize().unwrap().display().to_string(),
                "xterm 42".to_string()
            ]
        );
    }
}

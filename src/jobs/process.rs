//! Child process supervision
//!
//! Each spawned job gets one task per output stream and one supervising
//! task that owns the [`Child`]. Readers forward raw chunks in the order
//! the stream produced them; the supervisor waits for exit (or a
//! termination request), lets the readers drain, and only then reports
//! the exit, so a job's output always precedes its completion.

use super::{ExitOutcome, JobEvent, OutputStream, Ticket};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot};

/// Size of a single read from a child's output pipe
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long to wait for output pipes to close after the child has exited.
/// Grandchildren can keep a pipe open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Supervise a spawned child until it exits, then send [`JobEvent::Exited`].
///
/// Dropping or firing `cancel` terminates the child: SIGTERM first, then
/// SIGKILL once `kill_grace` has passed.
pub(super) async fn supervise(
    ticket: Ticket,
    mut child: Child,
    cancel: oneshot::Receiver<()>,
    kill_grace: Duration,
    events: mpsc::UnboundedSender<JobEvent>,
) {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_stream(
            ticket,
            OutputStream::Stdout,
            stdout,
            events.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_stream(
            ticket,
            OutputStream::Stderr,
            stderr,
            events.clone(),
        )));
    }

    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel => {
            tracing::debug!("Terminating job {:?}", ticket);
            terminate(&mut child, kill_grace).await
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            tracing::warn!("Output of job {:?} still open after exit, detaching", ticket);
            reader.abort();
        }
    }

    let outcome = match status {
        Ok(status) => ExitOutcome::from_status(status),
        Err(e) => ExitOutcome::WaitFailed(e.to_string()),
    };
    tracing::info!("Job {:?} finished: {:?}", ticket, outcome);

    let _ = events.send(JobEvent::Exited { ticket, outcome });
}

/// Ask the child to exit, escalating to SIGKILL after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!("SIGTERM to {} failed: {}", pid, e);
        }
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status;
        }
        tracing::debug!("Process {} ignored SIGTERM, killing", pid);
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!("SIGKILL failed: {}", e);
    }
    child.wait().await
}

/// Forward everything read from `reader` as [`JobEvent::Output`] chunks
async fn forward_stream<R>(
    ticket: Ticket,
    stream: OutputStream,
    mut reader: R,
    events: mpsc::UnboundedSender<JobEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let event = JobEvent::Output {
                    ticket,
                    stream,
                    data: buf[..n].to_vec(),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Reading {:?} of job {:?} failed: {}", stream, ticket, e);
                break;
            }
        }
    }
}

/// Write `secret` and a newline to the child's stdin, then close it
pub(super) async fn write_secret(mut stdin: ChildStdin, secret: String) {
    let mut payload = secret.into_bytes();
    payload.push(b'\n');

    if let Err(e) = stdin.write_all(&payload).await {
        tracing::warn!("Failed to pass secret to child: {}", e);
        return;
    }
    let _ = stdin.flush().await;
}

//! Child process execution.
//!
//! Two modes:
//! - [`run`] waits for the process to exit and returns its merged output.
//! - [`stream`] yields stdout lines as they arrive while the process keeps
//!   running, until it exits or a [`CancellationToken`] fires.

use std::collections::VecDeque;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use capcompat_protocol::record::{self, Record};
use capcompat_protocol::{CodecError, KeyAlgorithm, KeyError, RecordError};
use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{DriverError, Result};

/// Lines of streamed output kept for a failed exit.
const TAIL_LINES: usize = 64;

/// How long a failed exit waits for stderr to be drained.
const STDERR_DRAIN: Duration = Duration::from_secs(1);

/// Output of a process run to completion.
#[derive(Debug, Clone)]
pub struct Captured {
    /// The command line as it was logged.
    pub command: String,
    /// stdout and stderr lines, interleaved in arrival order.
    pub raw: Vec<u8>,
    /// `raw` as text, with invalid UTF-8 replaced.
    pub output: String,
}

impl Captured {
    fn new(command: String, raw: Vec<u8>) -> Self {
        let output = String::from_utf8_lossy(&raw).into_owned();
        Self {
            command,
            raw,
            output,
        }
    }

    /// Decode the whole output as one structured record.
    pub fn decode(&self) -> Result<Record> {
        std::str::from_utf8(&self.raw).map_err(|e| {
            self.decode_error(RecordError::Malformed(format!("output is not UTF-8: {e}")))
        })?;
        record::decode(&self.raw).map_err(|source| self.decode_error(source))
    }

    /// Attach this command and its output to a record error.
    pub fn decode_error(&self, source: RecordError) -> DriverError {
        DriverError::Decode {
            command: self.command.clone(),
            output: self.output.clone(),
            source,
        }
    }

    /// Attach this command and its output to a key that failed to decode.
    pub fn key_error(&self, algorithm: KeyAlgorithm, source: KeyError) -> DriverError {
        DriverError::KeyMaterial {
            algorithm,
            command: self.command.clone(),
            output: self.output.clone(),
            source,
        }
    }

    /// Attach this command and its output to a response that failed to decode.
    pub fn response_error(&self, source: CodecError) -> DriverError {
        DriverError::Response {
            command: self.command.clone(),
            output: self.output.clone(),
            source,
        }
    }
}

fn command_line(argv: &[String]) -> String {
    argv.join(" ")
}

fn spawn(cwd: &Path, argv: &[String]) -> Result<Child> {
    let (program, args) = argv.split_first().ok_or(DriverError::EmptyCommand)?;
    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DriverError::Spawn {
            command: command_line(argv),
            source,
        })
}

fn trim_cr(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

async fn next_text<R: AsyncBufRead + Unpin>(
    lines: &mut Split<R>,
) -> std::io::Result<Option<String>> {
    let line = lines.next_segment().await?;
    Ok(line.map(|line| String::from_utf8_lossy(&trim_cr(line)).into_owned()))
}

fn piped<T>(pipe: Option<T>, name: &str) -> Result<T> {
    pipe.ok_or_else(|| DriverError::Io(std::io::Error::other(format!("{name} not captured"))))
}

/// Run `argv` in `cwd` to completion.
///
/// A non-zero exit is an [`DriverError::Exit`] carrying the captured output.
pub async fn run(cwd: &Path, argv: &[String]) -> Result<Captured> {
    let command = command_line(argv);
    tracing::info!(cwd = %cwd.display(), "→ {command}");

    let mut child = spawn(cwd, argv)?;
    let mut stdout = BufReader::new(piped(child.stdout.take(), "stdout")?).split(b'\n');
    let mut stderr = BufReader::new(piped(child.stderr.take(), "stderr")?).split(b'\n');

    let mut lines = Vec::new();
    let (mut stdout_open, mut stderr_open) = (true, true);
    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout.next_segment(), if stdout_open => match line? {
                Some(line) => lines.push(trim_cr(line)),
                None => stdout_open = false,
            },
            line = stderr.next_segment(), if stderr_open => match line? {
                Some(line) => lines.push(trim_cr(line)),
                None => stderr_open = false,
            },
        }
    }

    let status = child.wait().await?;
    let captured = Captured::new(command, lines.join(&b'\n'));
    tracing::debug!("← {}", captured.output);

    if !status.success() {
        return Err(DriverError::Exit {
            command: captured.command,
            code: status.code(),
            output: captured.output,
        });
    }

    Ok(captured)
}

/// Lines written to stdout by a running process.
///
/// Ends with `Err(Canceled)` when the token fires, with `Err(Exit)` when
/// the process exits unsuccessfully, and plainly otherwise. An `Exit`
/// carries the last lines the process wrote to stdout and stderr. Dropping it
/// does not stop the process; the token does.
#[derive(Debug)]
pub struct OutputLines {
    command: String,
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

impl OutputLines {
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Stream for OutputLines {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Spawn `argv` in `cwd` and stream its stdout line by line.
///
/// stderr is drained into debug logs so a chatty process never blocks.
/// Invalid UTF-8 is replaced rather than ending the stream.
pub fn stream(cwd: &Path, argv: &[String], cancel: CancellationToken) -> Result<OutputLines> {
    let command = command_line(argv);
    tracing::info!(cwd = %cwd.display(), "→ {command}");

    let mut child = spawn(cwd, argv)?;
    let stdout = piped(child.stdout.take(), "stdout")?;
    let stderr = piped(child.stderr.take(), "stderr")?;
    let (tx, rx) = mpsc::unbounded_channel();
    let tail = Tail::default();

    let label = command.clone();
    let stderr_tail = tail.clone();
    let drain = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).split(b'\n');
        while let Ok(Some(line)) = next_text(&mut lines).await {
            tracing::debug!(command = %label, "stderr: {line}");
            stderr_tail.push(&line);
        }
    });

    let label = command.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).split(b'\n');
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    terminate(&mut child, &label).await;
                    let _ = tx.send(Err(DriverError::Canceled));
                    return;
                }
                line = next_text(&mut lines) => match line {
                    // A dropped receiver is fine; keep draining.
                    Ok(Some(line)) => {
                        tail.push(&line);
                        let _ = tx.send(Ok(line));
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err.into()));
                        break;
                    }
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        match status {
            None => {
                terminate(&mut child, &label).await;
                let _ = tx.send(Err(DriverError::Canceled));
            }
            Some(Ok(status)) if status.success() => {
                tracing::debug!(command = %label, "process exited");
            }
            Some(Ok(status)) => {
                if tokio::time::timeout(STDERR_DRAIN, drain).await.is_err() {
                    tracing::debug!(command = %label, "stderr still open after exit");
                }
                let _ = tx.send(Err(DriverError::Exit {
                    command: label,
                    code: status.code(),
                    output: tail.join(),
                }));
            }
            Some(Err(err)) => {
                let _ = tx.send(Err(err.into()));
            }
        }
    });

    Ok(OutputLines { command, rx })
}

/// The last [`TAIL_LINES`] lines of a streamed process, stdout and stderr
/// interleaved.
#[derive(Debug, Default, Clone)]
struct Tail(Arc<Mutex<VecDeque<String>>>);

impl Tail {
    fn push(&self, line: &str) {
        let mut lines = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    fn join(&self) -> String {
        let mut lines = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        lines.make_contiguous().join("\n")
    }
}

async fn terminate(child: &mut Child, command: &str) {
    match child.kill().await {
        Ok(()) => tracing::debug!(command, "process killed"),
        Err(err) => tracing::debug!(command, error = %err, "failed to kill process"),
    }
}

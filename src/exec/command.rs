// src/exec/command.rs

//! Turning a built command line into a supervised child process.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::Result;

use super::process::{descendants_of, kill_tree};

/// How long to keep draining pipes after the process itself has exited.
/// A descendant that escaped the kill may hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A fully substituted command, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Run through the platform shell.
    Shell(String),
    /// Program and arguments, no shell involved.
    Argv(Vec<String>),
}

impl CommandLine {
    fn to_command(&self) -> Command {
        match self {
            CommandLine::Shell(line) => {
                // Build a shell command appropriate for the platform.
                if cfg!(windows) {
                    let mut c = Command::new("cmd");
                    c.arg("/C").arg(line);
                    c
                } else {
                    let mut c = Command::new("sh");
                    c.arg("-c").arg(line);
                    c
                }
            }
            CommandLine::Argv(argv) => {
                let mut c = Command::new(&argv[0]);
                c.args(&argv[1..]);
                c
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(line) => f.write_str(line),
            CommandLine::Argv(argv) => {
                let quoted: Vec<String> = argv
                    .iter()
                    .map(|a| shlex::try_quote(a).map(|q| q.into_owned()).unwrap_or_else(|_| a.clone()))
                    .collect();
                f.write_str(&quoted.join(" "))
            }
        }
    }
}

/// Text captured from a finished process.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A spawned child with its output being drained in the background.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    pid: Option<u32>,
    stdout: Option<OutputReader>,
    stderr: Option<OutputReader>,
}

/// Background reader appending one pipe into a shared buffer, so whatever
/// arrived before the reader is abandoned is kept.
#[derive(Debug)]
struct OutputReader {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl OutputReader {
    fn start<R: AsyncRead + Unpin + Send + 'static>(reader: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(read_into(reader, Arc::clone(&buf)));
        Self { buf, handle }
    }

    fn take_text(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Spawn `line` as the leader of a new process group with piped output.
pub fn spawn(line: &CommandLine) -> Result<RunningProcess> {
    if let CommandLine::Argv(argv) = line {
        if argv.is_empty() {
            return Err(anyhow::anyhow!("empty argument vector").into());
        }
    }

    let mut cmd = line.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning `{line}`"))?;

    let pid = child.id();
    let stdout = child.stdout.take().map(OutputReader::start);
    let stderr = child.stderr.take().map(OutputReader::start);

    debug!(?pid, command = %line, "spawned process");

    Ok(RunningProcess {
        child,
        pid,
        stdout,
        stderr,
    })
}

async fn read_into<R: AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut buf = buf.lock().unwrap_or_else(PoisonError::into_inner);
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                warn!(error = %e, "failed reading process output");
                break;
            }
        }
    }
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The child plus whatever it has already forked.
    pub fn pids(&self) -> Vec<u32> {
        match self.pid {
            Some(pid) => {
                let mut pids = vec![pid];
                pids.extend(descendants_of(pid));
                pids
            }
            None => Vec::new(),
        }
    }

    /// Wait for exit, giving up after `limit`.
    ///
    /// `Ok(None)` means the limit elapsed and the process is still running.
    pub async fn wait_timeout(&mut self, limit: Option<Duration>) -> Result<Option<ExitStatus>> {
        let status = match limit {
            None => Some(self.child.wait().await.context("waiting for process")?),
            Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
                Ok(status) => Some(status.context("waiting for process")?),
                Err(_elapsed) => None,
            },
        };
        Ok(status)
    }

    /// Wait for exit without a limit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await.context("waiting for process")?)
    }

    /// Collect stdout/stderr. Call after the process has exited.
    ///
    /// Whatever is left of the process group (background children of the
    /// exited leader) is killed first so it cannot keep the pipes open.
    pub async fn collect_output(&mut self) -> CapturedOutput {
        self.kill_leftovers();
        CapturedOutput {
            stdout: drain(self.stdout.take()).await,
            stderr: drain(self.stderr.take()).await,
        }
    }

    /// SIGKILL the child's process group. Nothing to do once it is empty.
    fn kill_leftovers(&self) {
        if self.pid.is_some() {
            kill_tree(self.pid, &[]);
        }
    }
}

/// Wait up to [`DRAIN_GRACE`] for the pipe to close, then return what was
/// read, complete or not.
async fn drain(reader: Option<OutputReader>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut reader.handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "output reader task failed"),
        Err(_) => {
            warn!("output pipe still open after process exit; keeping partial output");
            reader.handle.abort();
        }
    }
    reader.take_text()
}

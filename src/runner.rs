// src/runner.rs
//! Bounded-time execution of GPFS diagnostic commands.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::{self, ErrorKind};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::RunnerError;

/// Time a timed-out process group gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// A fixed command line plus whatever the tool expects on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program and arguments joined for log output.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes an invocation and returns its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<String, RunnerError>;
}

/// Runs invocations as real child processes, optionally behind a
/// privilege-escalation prefix such as `sudo`.
///
/// Each child leads its own process group so that a timeout can kill the
/// whole tree, including the tool started by the prefix.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    prefix: Option<String>,
}

impl ProcessRunner {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = match &self.prefix {
            Some(prefix) => {
                let mut cmd = Command::new(prefix);
                cmd.arg(&invocation.program);
                cmd
            }
            None => Command::new(&invocation.program),
        };
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<String, RunnerError> {
        debug!(command = %invocation.command_line(), ?timeout, "running command");

        let mut child = self.command(invocation).spawn().map_err(|e| {
            RunnerError::Execution(format!("failed to start {}: {}", invocation.program, e))
        })?;

        match tokio::time::timeout(timeout, wait_for(&mut child, invocation)).await {
            Ok(result) => result,
            Err(_) => {
                terminate(&mut child).await;
                Err(RunnerError::Timeout(timeout))
            }
        }
    }
}

/// Function to feed stdin and collect the output of a spawned child.
async fn wait_for(child: &mut Child, invocation: &Invocation) -> Result<String, RunnerError> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (_, stdout, stderr, status) = tokio::try_join!(
        write_pipe(stdin, invocation.stdin.as_deref()),
        read_pipe(stdout),
        read_pipe(stderr),
        child.wait(),
    )
    .map_err(|e| RunnerError::Execution(format!("failed to run {}: {}", invocation.program, e)))?;

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(RunnerError::Execution(format!(
            "{} exited with {}: {}",
            invocation.program,
            status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

async fn write_pipe<W: AsyncWrite + Unpin>(pipe: Option<W>, input: Option<&str>) -> io::Result<()> {
    let (Some(mut pipe), Some(input)) = (pipe, input) else {
        return Ok(());
    };
    // A tool that exits without reading stdin is judged by its exit status.
    match pipe.write_all(input.as_bytes()).await {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
        result => result,
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

/// Function to kill a timed-out child together with everything it started.
///
/// The group gets SIGTERM first so a `sudo` prefix can relay it to the tool,
/// then SIGKILL. The child itself is reaped before returning.
async fn terminate(child: &mut Child) {
    let group = child.id();
    signal_group(group, Signal::Terminate);
    let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
    signal_group(group, Signal::Kill);
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already gone");
    }
}

enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(group: Option<u32>, signal: Signal) {
    let Some(group) = group else {
        return;
    };
    let signal = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: killpg only sends a signal; the group id is the child's pid.
    let ret = unsafe { libc::killpg(group as libc::pid_t, signal) };
    if ret != 0 {
        let e = io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            warn!(group, error = %e, "failed to signal process group");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_group: Option<u32>, _signal: Signal) {}

/// Canned-response runner for exercising collectors without GPFS installed.
#[derive(Debug)]
pub struct FakeRunner {
    response: Mutex<Result<String, RunnerError>>,
    last: Mutex<Option<Invocation>>,
    calls: AtomicUsize,
}

impl FakeRunner {
    pub fn succeeding(stdout: impl Into<String>) -> Self {
        Self::with_response(Ok(stdout.into()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_response(Err(RunnerError::Execution(message.into())))
    }

    pub fn timing_out() -> Self {
        Self::with_response(Err(RunnerError::Timeout(Duration::ZERO)))
    }

    pub fn with_response(response: Result<String, RunnerError>) -> Self {
        Self {
            response: Mutex::new(response),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the response returned by subsequent runs.
    pub fn respond(&self, response: Result<String, RunnerError>) {
        *self.response.lock() = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_invocation(&self) -> Option<Invocation> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<String, RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(invocation.clone());
        match &*self.response.lock() {
            Err(RunnerError::Timeout(_)) => Err(RunnerError::Timeout(timeout)),
            other => other.clone(),
        }
    }
}

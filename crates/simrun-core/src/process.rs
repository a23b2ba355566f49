//! Captured subprocess execution
//!
//! Every external program simrun starts (simulations, build steps, git
//! helpers) goes through [`run_captured`]: stdout and stderr are captured in
//! full, the child is polled rather than blocked on so that an [`Interrupt`]
//! can be forwarded to it, and an optional timeout kills runaway children.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::interrupt::Interrupt;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[cfg(unix)]
const SIGINT: i32 = nix::sys::signal::Signal::SIGINT as i32;
#[cfg(not(unix))]
const SIGINT: i32 = 2;

/// A program invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory (defaults to the current directory)
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Kill the program after this long
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Create an invocation of `program` without arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            timeout: None,
        }
    }

    /// Run `command` through the platform shell
    pub fn shell(command: &str) -> Self {
        let shell = if cfg!(windows) { "cmd" } else { "sh" };
        let shell_arg = if cfg!(windows) { "/C" } else { "-c" };
        Self::new(shell).with_arg(shell_arg).with_arg(command)
    }

    /// Append one argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human readable command line
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a finished program
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// The command line that was run
    pub command: String,
    /// Exit code, if the program exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    /// Whether the program stopped because of an interruption
    pub interrupted: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration
    pub duration: Duration,
}

impl CapturedOutput {
    /// Whether the program exited with code zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output followed by standard error
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim_end().is_empty(), self.stderr.trim_end().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
        }
    }
}

/// Run a program to completion and capture its output.
///
/// If `interrupt` fires while the program runs, SIGINT is forwarded once and
/// the program is awaited; the result then reports `interrupted`.
pub fn run_captured(
    spec: &CommandSpec,
    interrupt: Option<&Interrupt>,
) -> Result<CapturedOutput, ProcessError> {
    let command = spec.display();
    debug!(command = %command, cwd = ?spec.cwd, "running subprocess");
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (k, v) in &spec.env {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
        command: command.clone(),
        message: e.to_string(),
    })?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let mut forwarded = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                return Err(ProcessError::WaitFailed {
                    command,
                    message: e.to_string(),
                });
            }
        }

        if !forwarded && interrupt.is_some_and(Interrupt::is_triggered) {
            debug!(command = %command, pid = child.id(), "forwarding interrupt to subprocess");
            forward_interrupt(&mut child);
            forwarded = true;
        }

        if let Some(timeout) = spec.timeout {
            if start.elapsed() > timeout {
                warn!(command = %command, timeout_secs = timeout.as_secs(), "subprocess timed out");
                let _ = child.kill();
                let _ = child.wait();
                join_reader(stdout_reader);
                join_reader(stderr_reader);
                return Err(ProcessError::TimedOut {
                    command,
                    seconds: timeout.as_secs(),
                });
            }
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);
    let signal = exit_signal(&status);
    let exit_code = status.code();
    let interrupted = forwarded || signal == Some(SIGINT) || exit_code == Some(128 + SIGINT);

    debug!(
        command = %command,
        exit_code = ?exit_code,
        signal = ?signal,
        duration_ms = start.elapsed().as_millis() as u64,
        "subprocess finished"
    );

    Ok(CapturedOutput {
        command,
        exit_code,
        signal,
        interrupted,
        stdout,
        stderr,
        duration: start.elapsed(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    source.map(|mut source| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = source.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn forward_interrupt(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let sent = i32::try_from(child.id())
        .map_err(|_| nix::errno::Errno::ESRCH)
        .and_then(|pid| kill(Pid::from_raw(pid), Signal::SIGINT));
    if let Err(e) = sent {
        warn!(pid = child.id(), error = %e, "cannot forward SIGINT, killing child");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn forward_interrupt(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_both_streams_and_exit_code() {
        let spec = CommandSpec::shell("echo out; echo err 1>&2; exit 3");
        let output = run_captured(&spec, None).unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert!(!output.interrupted);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.combined_output(), "out\nerr");
    }

    #[test]
    fn test_cwd_and_env() {
        let temp = tempfile::TempDir::new().unwrap();
        let spec = CommandSpec::shell("pwd; echo $SIMRUN_TEST_VALUE")
            .with_cwd(temp.path())
            .with_env("SIMRUN_TEST_VALUE", "42");
        let output = run_captured(&spec, None).unwrap();

        assert!(output.success());
        assert!(output.stdout.contains("42"));
    }

    #[test]
    fn test_spawn_failure() {
        let spec = CommandSpec::new("/nonexistent/simrun-test-program");
        let err = run_captured(&spec, None).unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
    }

    #[test]
    fn test_timeout_kills_program() {
        let spec = CommandSpec::new("sleep")
            .with_arg("5")
            .with_timeout(Duration::from_millis(100));
        let err = run_captured(&spec, None).unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }

    #[test]
    fn test_interrupt_is_forwarded() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let spec = CommandSpec::new("sleep").with_arg("5");
        let output = run_captured(&spec, Some(&interrupt)).unwrap();

        assert!(output.interrupted);
        assert_eq!(output.signal, Some(SIGINT));
        assert!(output.duration < Duration::from_secs(5));
    }

    #[test]
    fn test_interrupt_lets_program_shut_down() {
        let interrupt = Interrupt::new();
        let trigger = {
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                interrupt.trigger();
            })
        };
        let spec = CommandSpec::shell("trap 'echo caught; exit 0' INT; sleep 5 >/dev/null 2>&1 & wait");
        let output = run_captured(&spec, Some(&interrupt)).unwrap();
        trigger.join().unwrap();

        assert!(output.interrupted);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout.trim(), "caught");
    }

    #[test]
    fn test_display() {
        let spec = CommandSpec::new("make").with_args(["MODE=release", "-j8"]);
        assert_eq!(spec.display(), "make MODE=release -j8");
    }
}

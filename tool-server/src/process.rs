//! Child process execution for the process-backed tools.
//!
//! Every external command runs with a timeout and bounded output capture, and
//! its outcome is folded into an [`Envelope`] so that nothing a child process
//! does can surface as an invocation fault.

use std::io::{self, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::envelope::Envelope;

/// Limits applied to one command execution.
#[derive(Debug, Clone, Copy)]
pub struct CommandLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Normalize to `{ok, stdout, stderr[, returncode]}`.
    ///
    /// A nonzero exit carries `returncode`; a timeout is tagged `error:"timeout"`
    /// and keeps whatever output was captured before the kill.
    pub fn into_envelope(self, timeout: Duration) -> Envelope {
        let stdout = lossy_with_notice(&self.stdout, self.stdout_truncated);
        let stderr = lossy_with_notice(&self.stderr, self.stderr_truncated);

        if self.timed_out {
            return Envelope::failure("timeout")
                .with("stdout", stdout)
                .with("stderr", stderr)
                .with("timeout_secs", timeout.as_secs());
        }

        let mut env = Envelope::new(self.status.success())
            .with("stdout", stdout)
            .with("stderr", stderr);
        // A signal-killed child has no exit code to report.
        if let (false, Some(code)) = (env.ok, self.status.code()) {
            env = env.with("returncode", code);
        }
        env
    }
}

fn lossy_with_notice(bytes: &[u8], truncated: usize) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[truncated {truncated} bytes]\n"));
    }
    text
}

/// Run `program args...` in `workdir` and return its envelope.
///
/// Spawn failures become `{ok:false, error:"spawn_failed", message}`.
#[instrument(skip_all, fields(program = %program, timeout_secs = limits.timeout.as_secs()))]
pub fn run_to_envelope(
    program: &str,
    args: &[String],
    workdir: &Path,
    limits: CommandLimits,
) -> Envelope {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(workdir);
    match run_command_with_timeout(cmd, limits) {
        Ok(output) => output.into_envelope(limits.timeout),
        Err(err) => {
            warn!(program, err = %format!("{err:#}"), "command could not be run");
            Envelope::failure("spawn_failed")
                .with("command", program)
                .with("message", format!("{err:#}"))
        }
    }
}

/// How long to keep draining pipes after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// On unix the child leads its own process group and a timeout kills the whole group. Readers
/// still blocked on a pipe held open by a surviving descendant are detached once the deadline
/// has passed, so the call never outlives `timeout` by more than a short grace period.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs(), output_limit_bytes = limits.output_limit_bytes))]
pub fn run_command_with_timeout(mut cmd: Command, limits: CommandLimits) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let stdout_reader = StreamReader::spawn(stdout, limit);
    let stderr_reader = StreamReader::spawn(stderr, limit);

    let mut timed_out = false;
    let status = match child
        .wait_timeout(limits.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = limits.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let grace_deadline = Instant::now() + DRAIN_GRACE;
    let drain_deadline = if timed_out {
        grace_deadline
    } else {
        (started + limits.timeout).max(grace_deadline)
    };
    let stdout = stdout_reader.finish(drain_deadline).context("collect stdout")?;
    let stderr = stderr_reader.finish(drain_deadline).context("collect stderr")?;

    if stdout.truncated > 0 || stderr.truncated > 0 {
        warn!(
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "output truncated"
        );
    }

    debug!(
        exit_code = ?status.code(),
        timed_out,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "command finished"
    );
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.truncated,
        stderr_truncated: stderr.truncated,
        timed_out,
    })
}

/// Kill the child and, on unix, every process left in its group.
fn kill_process_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => debug!(?status, "process group kill failed"),
            Err(err) => debug!(err = %err, "kill unavailable"),
        }
    }
    // Only errors with InvalidInput once the child has been reaped.
    match child.kill() {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(err).context("kill command"),
    }
}

#[derive(Debug, Default, Clone)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

/// Background reader for one pipe, readable up to a deadline.
struct StreamReader {
    captured: Arc<Mutex<Captured>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&captured);
        let (tx, done) = mpsc::channel();
        thread::spawn(move || {
            // The receiver is gone if the caller already detached.
            let _ = tx.send(read_stream_limited(reader, limit, &sink));
        });
        Self { captured, done }
    }

    /// Wait for EOF until `deadline`, then return whatever has been captured.
    fn finish(self, deadline: Instant) -> Result<Captured> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(wait) {
            Ok(result) => result?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("pipe still held open by a descendant, detaching reader");
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
        let captured = self
            .captured
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        Ok(captured.clone())
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    sink: &Mutex<Captured>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(captured.bytes.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            captured.bytes.extend_from_slice(&chunk[..keep]);
            captured.truncated += n.saturating_sub(keep);
        } else {
            captured.truncated += n;
        }
    }

    Ok(())
}

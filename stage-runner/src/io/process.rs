//! Helpers for running stage processes with optional timeouts and bounded capture.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

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

/// Marker appended to logs when a captured stream was cut short.
pub fn truncated_notice(label: &str, stream: &str, truncated: usize) -> String {
    if truncated > 0 {
        format!("\n[{label} {stream} truncated {truncated} bytes]\n")
    } else {
        String::new()
    }
}

/// How long reader threads may keep draining after a timed-out stage was killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

type StreamResult = Result<(Vec<u8>, usize)>;

/// Where child output goes besides the bounded in-memory copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// Forward child stdout/stderr to our own stdout/stderr as it arrives.
    Console,
    /// Capture only.
    Silent,
}

/// Run a command to completion, echoing and capturing stdout/stderr without risking pipe
/// deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory per stream; bytes beyond it are still echoed, only counted
/// instead of stored. With `timeout = None` the call blocks until the child exits.
///
/// With a timeout the child leads its own process group, so a timeout kills every process the
/// tool started, not only the direct child. Without one the child stays in our group and still
/// receives terminal signals such as Ctrl-C.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_stage_command(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
    echo: Echo,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    if timeout.is_some() {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!(program = %program, "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(program = %program, err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {program}"));
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

    let stdout_rx = spawn_reader(move || {
        let tee = (echo == Echo::Console).then(std::io::stdout);
        read_stream_limited_with_tee(stdout, output_limit_bytes, tee)
    });
    let stderr_rx = spawn_reader(move || {
        let tee = (echo == Echo::Console).then(std::io::stderr);
        read_stream_limited_with_tee(stderr, output_limit_bytes, tee)
    });

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(
                    program = %program,
                    timeout_secs = limit.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                kill_process_tree(&mut child)?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    // Escaped descendants may still hold the pipes; never wait on them past the grace period.
    let drain_limit = timed_out.then_some(DRAIN_GRACE);
    let (stdout, stdout_truncated) =
        collect_output(&stdout_rx, "stdout", drain_limit).context("join stdout")?;
    let (stderr, stderr_truncated) =
        collect_output(&stderr_rx, "stderr", drain_limit).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "captured output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Run `read` on its own thread and hand back a channel for its result.
fn spawn_reader<F>(read: F) -> Receiver<StreamResult>
where
    F: FnOnce() -> StreamResult + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only if we stopped waiting on this stream.
        let _ = tx.send(read());
    });
    rx
}

/// Wait for a reader thread's result, at most `limit` when set.
///
/// A reader still blocked after `limit` is detached and its capture dropped.
fn collect_output(
    rx: &Receiver<StreamResult>,
    stream: &str,
    limit: Option<Duration>,
) -> StreamResult {
    let received = match limit {
        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        Some(limit) => rx.recv_timeout(limit),
    };
    match received {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(stream, "pipe still open after kill, dropping captured output");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Kill the child and, on unix, every process in its process group.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        // Group already gone; the child itself is reaped by the caller.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(anyhow!(e)).context("kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Read a stream to EOF with a size limit, optionally tee-ing every chunk to `tee`.
fn read_stream_limited_with_tee<R: Read, W: Write>(
    mut reader: R,
    limit: usize,
    mut tee: Option<W>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }

        if let Some(writer) = tee.as_mut() {
            // Keep draining the pipe even if the console went away.
            if let Err(e) = writer.write_all(&chunk[..n]).and_then(|()| writer.flush()) {
                warn!(err = %e, "failed to echo child output");
                tee = None;
            }
        }

        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_read_counts_truncated_bytes() {
        let input: &[u8] = b"0123456789";
        let (kept, truncated) =
            read_stream_limited_with_tee(input, 4, None::<Vec<u8>>).expect("read");
        assert_eq!(kept, b"0123");
        assert_eq!(truncated, 6);
    }

    #[test]
    fn tee_receives_full_stream() {
        let input: &[u8] = b"hello world";
        let mut sink = Vec::new();
        let (kept, truncated) =
            read_stream_limited_with_tee(input, 5, Some(&mut sink)).expect("read");
        assert_eq!(kept, b"hello");
        assert_eq!(truncated, 6);
        assert_eq!(sink, b"hello world");
    }

    #[test]
    fn notice_is_empty_without_truncation() {
        assert_eq!(truncated_notice("lint", "stdout", 0), "");
        assert_eq!(
            truncated_notice("lint", "stdout", 3),
            "\n[lint stdout truncated 3 bytes]\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn captures_exit_status_and_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err 1>&2; exit 3");
        let output = run_stage_command(cmd, None, 1024, Echo::Silent).expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn kills_child_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output = run_stage_command(cmd, Some(Duration::from_millis(100)), 1024, Echo::Silent)
            .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_grandchildren_holding_pipes() {
        // Two commands keep `sh` from exec-ing into `sleep`, so `sleep` is a grandchild
        // that inherits the stdout/stderr pipes.
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo started; sleep 30; echo finished");
        let started = std::time::Instant::now();
        let output = run_stage_command(cmd, Some(Duration::from_millis(200)), 1024, Echo::Silent)
            .expect("run");
        assert!(output.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "stage outlived its timeout: {:?}",
            started.elapsed()
        );
        assert_eq!(output.stdout, b"started\n");
    }

    #[test]
    fn collect_output_gives_up_after_limit() {
        let (_tx, rx) = mpsc::channel::<StreamResult>();
        let (kept, truncated) =
            collect_output(&rx, "stdout", Some(Duration::from_millis(10))).expect("collect");
        assert!(kept.is_empty());
        assert_eq!(truncated, 0);
    }

    #[test]
    fn collect_output_reports_dead_reader() {
        let (tx, rx) = mpsc::channel::<StreamResult>();
        drop(tx);
        assert!(collect_output(&rx, "stdout", None).is_err());
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let cmd = Command::new("stage-runner-definitely-missing-tool");
        let err = run_stage_command(cmd, None, 1024, Echo::Silent).expect_err("spawn");
        assert!(format!("{err:#}").contains("spawn stage-runner-definitely-missing-tool"));
    }
}

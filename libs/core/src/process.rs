use std::{
    io::{IsTerminal, Read},
    process::{Child, Command, ExitStatus, Stdio},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, instrument, warn};

use crate::{error::BridgeError, plan::ProcessPlan};

/// Exit code reported when the child was killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of one process execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ProcessResult {
    pub fn is_successful(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Executes a [`ProcessPlan`].
pub trait ProcessRunner: Send + Sync {
    fn run(&self, plan: &ProcessPlan) -> Result<ProcessResult, BridgeError>;
}

pub type SharedProcessRunner = Arc<dyn ProcessRunner>;

/// Runs plans through the platform shell (`sh -c` / `cmd /C`).
///
/// The child always starts in its own process group so a timeout kills the
/// whole tree, not only the shell. With TTY passthrough that group is also
/// made the terminal's foreground group until the child is reaped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellProcessRunner;

impl ProcessRunner for ShellProcessRunner {
    #[instrument(name = "e2e.process", skip_all, fields(cwd = %plan.command.working_dir.display()))]
    fn run(&self, plan: &ProcessPlan) -> Result<ProcessResult, BridgeError> {
        let inherit_tty = plan.options.inherit_tty
            && std::io::stdin().is_terminal()
            && std::io::stdout().is_terminal();
        execute(plan, inherit_tty)
    }
}

fn execute(plan: &ProcessPlan, inherit_tty: bool) -> Result<ProcessResult, BridgeError> {
    let mut cmd = shell_command(&plan.command.command);
    cmd.current_dir(&plan.command.working_dir)
        .envs(plan.command.merged_env());
    if inherit_tty {
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
    } else {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    }
    detach_process_group(&mut cmd);

    debug!(command = %plan.command.command, inherit_tty, "spawning e2e process");
    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|error| BridgeError::Spawn {
        command: plan.command.command.clone(),
        cwd: plan.command.working_dir.clone(),
        error,
    })?;
    // restored on drop, after the child has been reaped
    let _foreground = inherit_tty
        .then(|| ForegroundGuard::hand_to(&child))
        .flatten();

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let wait = wait_with_timeout(&mut child, plan.options.timeout, started);
    let duration = started.elapsed();
    let stdout = join_reader(stdout);
    let mut stderr = join_reader(stderr);

    let (exit_code, timed_out) = match wait {
        Ok(Waited::Exited(status)) => (exit_code_of(status), false),
        Ok(Waited::TimedOut(limit)) => {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "[pest-e2e] process timed out after {:.1}s and was killed\n",
                limit.as_secs_f64()
            ));
            warn!(timeout_secs = limit.as_secs_f64(), "e2e process timed out");
            (TIMEOUT_EXIT_CODE, true)
        }
        Err(error) => {
            return Err(BridgeError::Spawn {
                command: plan.command.command.clone(),
                cwd: plan.command.working_dir.clone(),
                error,
            });
        }
    };

    debug!(exit_code, duration_ms = duration.as_millis() as u64, "e2e process finished");
    Ok(ProcessResult {
        exit_code,
        stdout,
        stderr,
        duration,
        timed_out,
    })
}

enum Waited {
    Exited(ExitStatus),
    TimedOut(Duration),
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
    started: Instant,
) -> std::io::Result<Waited> {
    let Some(limit) = timeout else {
        return child.wait().map(Waited::Exited);
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Waited::Exited(status));
        }
        if started.elapsed() >= limit {
            kill_tree(child);
            let _ = child.wait();
            return Ok(Waited::TimedOut(limit));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn detach_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach_process_group(_cmd: &mut Command) {}

/// Keeps the child's process group in the terminal foreground so it can read
/// the terminal while living in its own group.
#[cfg(unix)]
struct ForegroundGuard {
    fd: libc::c_int,
    previous: libc::pid_t,
}

#[cfg(unix)]
impl ForegroundGuard {
    /// Returns `None` when stdin is not a terminal or this process is not in
    /// its foreground.
    fn hand_to(child: &Child) -> Option<Self> {
        let fd = libc::STDIN_FILENO;
        let pgid = child.id() as libc::pid_t;
        // SAFETY: read-only queries on our own stdin and process group.
        let (previous, own) = unsafe { (libc::tcgetpgrp(fd), libc::getpgrp()) };
        if previous < 0 || previous != own {
            return None;
        }
        if !set_foreground(fd, pgid) {
            debug!("could not hand the terminal to the e2e process group");
            return None;
        }
        // a child that touched the terminal early was stopped with SIGTTIN
        // SAFETY: signalling the group we spawned.
        unsafe {
            libc::kill(-pgid, libc::SIGCONT);
        }
        Some(Self { fd, previous })
    }
}

#[cfg(unix)]
impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        if !set_foreground(self.fd, self.previous) {
            warn!("could not take the terminal back from the e2e process group");
        }
    }
}

#[cfg(unix)]
fn set_foreground(fd: libc::c_int, pgid: libc::pid_t) -> bool {
    // SAFETY: SIGTTOU is ignored only around tcsetpgrp, which a background
    // group may call only while ignoring it; the old disposition is restored.
    unsafe {
        let previous = libc::signal(libc::SIGTTOU, libc::SIG_IGN);
        let rc = libc::tcsetpgrp(fd, pgid);
        libc::signal(libc::SIGTTOU, previous);
        rc == 0
    }
}

#[cfg(not(unix))]
struct ForegroundGuard;

#[cfg(not(unix))]
impl ForegroundGuard {
    fn hand_to(_child: &Child) -> Option<Self> {
        None
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: signalling a process group we created; a stale id only yields ESRCH.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = source.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

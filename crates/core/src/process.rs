//! Background processes with owned lifecycles.
//!
//! A [`ProcessHandle`] is returned by [`launch`] while the process keeps
//! running. Its owner must call [`ProcessHandle::terminate`] before letting
//! it go; dropping a handle that is still running terminates it and logs a
//! warning.

use crate::error::{Error, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Time a process gets to exit after SIGTERM before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Liveness of a launched process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Not yet observed to exit.
    Running,
    /// Reaped; carries the exit code when there was one.
    Exited(Option<i32>),
}

/// Handle to a process started with [`launch`].
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    command: String,
    log_path: PathBuf,
    state: ProcessState,
    grace_period: Duration,
}

/// Start `command` in the background with stdout and stderr sent to
/// `log_path`, which is created or truncated.
///
/// `command` is split into words with shell quoting rules and executed
/// directly, without a shell, so [`ProcessHandle::pid`] is the pid of the
/// program itself. Pipes, redirections and `&&` are not interpreted; wrap
/// such lines in `sh -c '...'`.
///
/// # Errors
///
/// [`Error::Io`] if the log file cannot be created and [`Error::Spawn`] if
/// the command line is malformed or the program cannot be started, e.g.
/// because the binary does not exist.
pub fn launch(command: &str, log_path: &Path, working_dir: Option<&Path>) -> Result<ProcessHandle> {
    let spawn_error = |source: io::Error| Error::Spawn {
        command: command.to_string(),
        source,
    };

    let argv = shell_words::split(command)
        .map_err(|err| spawn_error(io::Error::new(io::ErrorKind::InvalidInput, err)))?;
    let Some((program, args)) = argv.split_first() else {
        return Err(spawn_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty command line",
        )));
    };

    let log = File::create(log_path)?;
    let log_err = log.try_clone()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(spawn_error)?;
    let pid = child.id();

    info!(command, pid, log = %log_path.display(), "launched background process");

    Ok(ProcessHandle {
        child,
        pid,
        command: command.to_string(),
        log_path: log_path.to_path_buf(),
        state: ProcessState::Running,
        grace_period: DEFAULT_GRACE_PERIOD,
    })
}

impl ProcessHandle {
    /// OS process identifier.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Command line the process was started with.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// File receiving the process's stdout and stderr.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Last observed state, without polling.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Override the SIGTERM grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Poll the process without blocking.
    pub fn is_running(&mut self) -> Result<bool> {
        self.poll()?;
        Ok(self.state == ProcessState::Running)
    }

    fn poll(&mut self) -> Result<()> {
        if self.state == ProcessState::Running {
            if let Some(status) = self.child.try_wait()? {
                debug!(pid = self.pid, code = ?status.code(), "process exited");
                self.state = ProcessState::Exited(status.code());
            }
        }
        Ok(())
    }

    /// Stop the process: SIGTERM, then SIGKILL once the grace period runs
    /// out. Calling this on an exited handle does nothing.
    pub fn terminate(&mut self) -> Result<()> {
        self.poll()?;
        if self.state != ProcessState::Running {
            return Ok(());
        }

        send_sigterm(self.pid);

        let deadline = Instant::now() + self.grace_period;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait()? {
                self.state = ProcessState::Exited(status.code());
                info!(pid = self.pid, "process terminated");
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }

        warn!(pid = self.pid, grace = ?self.grace_period, "process ignored SIGTERM, killing");
        if let Err(err) = self.child.kill() {
            // Raced with a natural exit; wait() below reaps it either way.
            debug!(pid = self.pid, %err, "kill failed");
        }
        let status = self.child.wait()?;
        self.state = ProcessState::Exited(status.code());
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.state == ProcessState::Running {
            warn!(pid = self.pid, command = %self.command, "process handle dropped while running");
            if let Err(err) = self.terminate() {
                warn!(pid = self.pid, %err, "failed to terminate dropped process");
            }
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn send_sigterm(pid: u32) {
    // SAFETY: pid belongs to a child we spawned and have not reaped yet, so it
    // cannot have been recycled. SIGTERM is a valid signal number.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        debug!(pid, err = %io::Error::last_os_error(), "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

/// Whether a process with this pid currently exists on the host.
pub fn process_exists(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new(&format!("/proc/{pid}")).exists()
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        signal_zero(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
#[allow(unsafe_code)]
fn signal_zero(pid: u32) -> bool {
    // SAFETY: signal 0 performs the permission and existence checks only.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_launch_exposes_pid_and_redirects_output() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");

        let mut handle = launch(
            "sh -c 'echo hello; echo oops >&2; exec sleep 30'",
            &log,
            None,
        )
        .unwrap();
        assert!(handle.pid() > 0);
        assert!(handle.is_running().unwrap());

        thread::sleep(Duration::from_millis(200));
        handle.terminate().unwrap();

        let content = fs::read_to_string(&log).unwrap();
        assert!(content.contains("hello"));
        assert!(content.contains("oops"));
    }

    #[test]
    fn test_pid_is_the_command_itself() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = launch("sleep 30", &dir.path().join("sleep.log"), None).unwrap();
        thread::sleep(Duration::from_millis(100));

        let comm = fs::read_to_string(format!("/proc/{}/comm", handle.pid())).unwrap();
        assert_eq!(comm.trim(), "sleep");

        handle.terminate().unwrap();
    }

    #[test]
    fn test_log_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        fs::write(&log, "stale contents from a previous trial").unwrap();

        let mut handle = launch("true", &log, None).unwrap();
        thread::sleep(Duration::from_millis(100));
        handle.terminate().unwrap();

        assert!(!fs::read_to_string(&log).unwrap().contains("stale"));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = launch("sleep 30", &dir.path().join("s.log"), None).unwrap();
        let pid = handle.pid();

        handle.terminate().unwrap();
        let first = handle.state();
        handle.terminate().unwrap();

        assert!(matches!(first, ProcessState::Exited(_)));
        assert_eq!(handle.state(), first);
        assert!(!process_exists(pid));
    }

    #[test]
    fn test_terminate_kills_after_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = launch(
            "sh -c 'trap \"\" TERM; while :; do sleep 1; done'",
            &dir.path().join("stubborn.log"),
            None,
        )
        .unwrap()
        .with_grace_period(Duration::from_millis(200));
        let pid = handle.pid();
        thread::sleep(Duration::from_millis(100));

        handle.terminate().unwrap();

        assert!(!process_exists(pid));
    }

    #[test]
    fn test_working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("pwd.log");

        let mut handle = launch("pwd", &log, Some(dir.path())).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(!handle.is_running().unwrap());
        handle.terminate().unwrap();

        let reported = PathBuf::from(fs::read_to_string(&log).unwrap().trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_drop_terminates_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let handle = launch("sleep 30", &dir.path().join("drop.log"), None).unwrap();
        let pid = handle.pid();

        drop(handle);

        assert!(!process_exists(pid));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = launch("/no/such/bin 1", &dir.path().join("missing.log"), None).unwrap_err();
        match err {
            Error::Spawn { command, source } => {
                assert_eq!(command, "/no/such/bin 1");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_command_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("bad.log");
        assert!(matches!(
            launch("sleep 'unterminated", &log, None),
            Err(Error::Spawn { .. })
        ));
        assert!(matches!(launch("   ", &log, None), Err(Error::Spawn { .. })));
    }

    #[test]
    fn test_quoted_arguments_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("quoted.log");

        let mut handle = launch("printf '%s|%s' 'a b' c", &log, None).unwrap();
        thread::sleep(Duration::from_millis(200));
        handle.terminate().unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "a b|c");
    }

    #[test]
    fn test_unwritable_log_path_is_io_error() {
        let err = launch("true", Path::new("/definitely/not/here/x.log"), None).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}

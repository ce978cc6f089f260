//! Running one target under one configuration.
//!
//! A trial moves through
//!
//! ```text
//! Idle -> ServerStarting -> ServerBound -> ClientRunning -> ServerStopping -> Complete
//! ```
//!
//! and ends in `Failed` if any step goes wrong. Once the server has been
//! launched it is terminated on every path out of the trial, before any
//! error is returned.

use crate::config::{render_template, ClientConfig, TrialSettings};
use crate::error::{BenchError, Result};
use crate::parse::parse_throughput;
use crate::record::BenchmarkRecord;
use crate::target::TargetSpec;
use echobench_core::{launch, AffinityBinder, CommandRunner, ProcessHandle};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const READINESS_POLL: Duration = Duration::from_millis(20);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Attribute key holding the target name.
pub const ATTR_TARGET: &str = "target";
/// Attribute key holding the client concurrency.
pub const ATTR_CLIENT_NUMBER: &str = "client_number";
/// Attribute key holding the trial duration.
pub const ATTR_DURATION_SECONDS: &str = "duration_seconds";
/// Attribute key holding the payload size.
pub const ATTR_MESSAGE_LENGTH: &str = "message_length";
/// Result key holding the measured throughput.
pub const RESULT_REQUEST_PER_SECOND: &str = "request_per_second";

/// Where a trial is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    /// Nothing started.
    Idle,
    /// Launching the server and waiting for it to accept connections.
    ServerStarting,
    /// Pinning the server to its CPU.
    ServerBound,
    /// Load generator running against the server.
    ClientRunning,
    /// Terminating the server.
    ServerStopping,
    /// Record produced.
    Complete,
    /// Trial aborted.
    Failed,
}

/// Parameters of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialConfig {
    /// Concurrent clients.
    pub concurrency: u32,
    /// Message length in bytes.
    pub payload_size: u32,
    /// Seconds the client runs for.
    pub duration_seconds: u32,
}

/// Runs trials one at a time.
pub struct TrialRunner<A> {
    settings: TrialSettings,
    client: ClientConfig,
    binder: A,
    history: Vec<TrialState>,
    last_server_pid: Option<u32>,
}

impl<A: AffinityBinder> TrialRunner<A> {
    /// Create a runner.
    pub fn new(settings: TrialSettings, client: ClientConfig, binder: A) -> Self {
        Self {
            settings,
            client,
            binder,
            history: Vec::new(),
            last_server_pid: None,
        }
    }

    /// Shared trial settings.
    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    /// Current state of the most recent trial.
    pub fn state(&self) -> TrialState {
        self.history.last().copied().unwrap_or(TrialState::Idle)
    }

    /// States the most recent trial went through, in order.
    pub fn history(&self) -> &[TrialState] {
        &self.history
    }

    /// Pid of the server launched by the most recent trial.
    pub fn last_server_pid(&self) -> Option<u32> {
        self.last_server_pid
    }

    fn transition(&mut self, state: TrialState) {
        debug!(from = ?self.state(), to = ?state, "trial state");
        self.history.push(state);
    }

    /// Run `target` under `trial` and return its record.
    pub fn run(&mut self, target: &TargetSpec, trial: &TrialConfig) -> Result<BenchmarkRecord> {
        self.history.clear();
        self.last_server_pid = None;
        self.transition(TrialState::Idle);

        info!(
            target_name = %target.name,
            clients = trial.concurrency,
            length = trial.payload_size,
            duration = trial.duration_seconds,
            "starting trial"
        );

        self.transition(TrialState::ServerStarting);
        let mut server = match self.launch_server(target) {
            Ok(server) => server,
            Err(err) => {
                self.transition(TrialState::Failed);
                return Err(err);
            }
        };
        self.last_server_pid = Some(server.pid());

        let measured = self.measure(&mut server, target, trial);

        self.transition(TrialState::ServerStopping);
        let stopped = server.terminate();

        let output = match (measured, stopped) {
            (Ok(output), Ok(())) => output,
            (Err(err), stopped) => {
                if let Err(stop_err) = stopped {
                    warn!(target_name = %target.name, %stop_err, "failed to stop server after trial error");
                }
                self.transition(TrialState::Failed);
                return Err(err);
            }
            (Ok(_), Err(stop_err)) => {
                self.transition(TrialState::Failed);
                return Err(stop_err.into());
            }
        };

        let speed = match parse_throughput(&output) {
            Ok(speed) => speed,
            Err(err) => {
                self.transition(TrialState::Failed);
                return Err(err);
            }
        };
        info!(target_name = %target.name, request_per_second = speed, "trial complete");

        self.transition(TrialState::Complete);
        Ok(BenchmarkRecord::builder()
            .attribute(ATTR_TARGET, target.name.as_str())
            .attribute(ATTR_CLIENT_NUMBER, trial.concurrency)
            .attribute(ATTR_DURATION_SECONDS, trial.duration_seconds)
            .attribute(ATTR_MESSAGE_LENGTH, trial.payload_size)
            .result(RESULT_REQUEST_PER_SECOND, speed)
            .build())
    }

    fn launch_server(&self, target: &TargetSpec) -> Result<ProcessHandle> {
        let command = target.command_for(self.settings.port);
        let log_path = target.log_path(&self.settings.log_dir);
        launch(&command, &log_path, target.working_dir.as_deref())
            .map(|handle| handle.with_grace_period(self.settings.grace_period()))
            .map_err(|err| BenchError::ServerLaunch {
                target: target.name.clone(),
                reason: format!("could not launch `{command}`"),
                source: Some(err),
            })
    }

    /// Everything between launch and termination. Returns the client output.
    fn measure(
        &mut self,
        server: &mut ProcessHandle,
        target: &TargetSpec,
        trial: &TrialConfig,
    ) -> Result<String> {
        self.wait_ready(server, target)?;

        self.transition(TrialState::ServerBound);
        self.binder.bind(server.pid(), target.cpu)?;
        info!(target_name = %target.name, pid = server.pid(), cpu = target.cpu, "server pinned");

        self.transition(TrialState::ClientRunning);
        let command = self.client_command(trial);
        let output = CommandRunner::new()
            .maybe_working_dir(self.client.working_dir.as_deref())
            .run(&command)?;
        Ok(output.combined_lossy())
    }

    fn client_command(&self, trial: &TrialConfig) -> String {
        render_template(
            &self.client.command,
            &[
                ("address", self.settings.address()),
                ("host", self.settings.host.clone()),
                ("port", self.settings.port.to_string()),
                ("clients", trial.concurrency.to_string()),
                ("duration", trial.duration_seconds.to_string()),
                ("length", trial.payload_size.to_string()),
            ],
        )
    }

    /// Block until the server accepts TCP connections, exits, or the
    /// readiness timeout passes. Without a timeout only liveness is checked.
    fn wait_ready(&self, server: &mut ProcessHandle, target: &TargetSpec) -> Result<()> {
        let exited = |server: &ProcessHandle| BenchError::ServerLaunch {
            target: target.name.clone(),
            reason: format!(
                "server exited during startup ({:?}), see {}",
                server.state(),
                server.log_path().display()
            ),
            source: None,
        };

        let Some(timeout) = self.settings.readiness_timeout() else {
            return if server.is_running()? {
                Ok(())
            } else {
                Err(exited(&*server))
            };
        };

        let deadline = Instant::now() + timeout;
        loop {
            if !server.is_running()? {
                return Err(exited(&*server));
            }
            if self.accepts_connections() {
                debug!(target_name = %target.name, "server is accepting connections");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BenchError::ServerLaunch {
                    target: target.name.clone(),
                    reason: format!(
                        "{} not accepting connections after {timeout:?}",
                        self.settings.address()
                    ),
                    source: None,
                });
            }
            thread::sleep(READINESS_POLL);
        }
    }

    fn accepts_connections(&self) -> bool {
        let Ok(addrs) = (self.settings.host.as_str(), self.settings.port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echobench_core::process_exists;
    use mockall::mock;
    use std::net::TcpListener;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    mock! {
        pub Binder {}
        impl AffinityBinder for Binder {
            fn bind(&self, pid: u32, cpu: usize) -> echobench_core::Result<()>;
        }
    }

    const SPEED_LINE: &str = "printf 'Speed: 152720 request/sec, 152720 response/sec\\n'";

    fn settings(log_dir: &Path) -> TrialSettings {
        TrialSettings {
            readiness_timeout_ms: 0,
            grace_period_ms: 500,
            log_dir: log_dir.to_path_buf(),
            ..TrialSettings::default()
        }
    }

    fn client(command: &str) -> ClientConfig {
        ClientConfig {
            command: command.to_string(),
            working_dir: None,
        }
    }

    fn sleeper(name: &str, cpu: usize) -> TargetSpec {
        TargetSpec::new(name, "sleep 30", cpu)
    }

    fn trial() -> TrialConfig {
        TrialConfig {
            concurrency: 200,
            payload_size: 128,
            duration_seconds: 20,
        }
    }

    fn accepting_binder() -> MockBinder {
        let mut binder = MockBinder::new();
        binder.expect_bind().returning(|_, _| Ok(()));
        binder
    }

    #[test]
    fn test_successful_trial_produces_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut binder = MockBinder::new();
        binder
            .expect_bind()
            .withf(|pid, cpu| *pid > 0 && *cpu == 1)
            .times(1)
            .returning(|_, _| Ok(()));
        let mut runner = TrialRunner::new(settings(dir.path()), client(SPEED_LINE), binder);

        let record = runner.run(&sleeper("epoll", 1), &trial()).unwrap();

        let expected = BenchmarkRecord::builder()
            .attribute("target", "epoll")
            .attribute("client_number", 200u32)
            .attribute("duration_seconds", 20u32)
            .attribute("message_length", 128u32)
            .result("request_per_second", 152_720u64)
            .build();
        assert_eq!(record, expected);
        assert_eq!(
            runner.history(),
            &[
                TrialState::Idle,
                TrialState::ServerStarting,
                TrialState::ServerBound,
                TrialState::ClientRunning,
                TrialState::ServerStopping,
                TrialState::Complete,
            ]
        );
        assert!(!process_exists(runner.last_server_pid().unwrap()));
        assert!(dir.path().join("echo_server_epoll.log").exists());
    }

    #[test]
    fn test_client_receives_trial_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = TrialRunner::new(
            settings(dir.path()),
            client("echo '{address} {clients} {duration} {length}' >&2; printf 'Speed: 1 request/sec'"),
            accepting_binder(),
        );

        runner.run(&sleeper("io_uring", 0), &trial()).unwrap();

        assert_eq!(
            runner.client_command(&trial()),
            "echo 'localhost:8080 200 20 128' >&2; printf 'Speed: 1 request/sec'"
        );
    }

    #[test]
    fn test_affinity_failure_stops_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut binder = MockBinder::new();
        binder.expect_bind().returning(|pid, cpu| {
            Err(echobench_core::Error::Affinity {
                pid,
                cpu,
                reason: "no such cpu".to_string(),
            })
        });
        let mut runner = TrialRunner::new(settings(dir.path()), client(SPEED_LINE), binder);

        let err = runner.run(&sleeper("io_uring", 0), &trial()).unwrap_err();

        assert!(matches!(
            err,
            BenchError::Process(echobench_core::Error::Affinity { .. })
        ));
        assert_eq!(runner.state(), TrialState::Failed);
        assert!(runner.history().contains(&TrialState::ServerStopping));
        assert!(!runner.history().contains(&TrialState::ClientRunning));
        assert!(!process_exists(runner.last_server_pid().unwrap()));
    }

    #[test]
    fn test_missing_speed_line_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = TrialRunner::new(
            settings(dir.path()),
            client("echo 'connection refused'"),
            accepting_binder(),
        );

        let err = runner.run(&sleeper("epoll", 1), &trial()).unwrap_err();

        match err {
            BenchError::Parse { raw_output } => assert!(raw_output.contains("connection refused")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!process_exists(runner.last_server_pid().unwrap()));
    }

    #[test]
    fn test_client_failure_stops_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = TrialRunner::new(settings(dir.path()), client("exit 4"), accepting_binder());

        let err = runner.run(&sleeper("epoll", 1), &trial()).unwrap_err();

        assert!(matches!(
            err,
            BenchError::Process(echobench_core::Error::CommandExecution {
                exit_code: Some(4),
                ..
            })
        ));
        assert!(!process_exists(runner.last_server_pid().unwrap()));
    }

    fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_server_that_dies_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.host = "127.0.0.1".to_string();
        s.port = unused_port();
        s.readiness_timeout_ms = 2_000;
        let mut binder = MockBinder::new();
        binder.expect_bind().never();
        let mut runner = TrialRunner::new(s, client(SPEED_LINE), binder);
        let target = TargetSpec::new("broken", "sh -c 'exit 3' {port}", 0);

        let err = runner.run(&target, &trial()).unwrap_err();

        assert!(matches!(err, BenchError::ServerLaunch { .. }), "{err}");
        assert!(err.to_string().contains("exited during startup"));
        assert_eq!(runner.state(), TrialState::Failed);
        assert!(!process_exists(runner.last_server_pid().unwrap()));
    }

    #[test]
    fn test_missing_server_binary_fails_before_readiness_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut binder = MockBinder::new();
        binder.expect_bind().never();
        let mut runner = TrialRunner::new(settings(dir.path()), client(SPEED_LINE), binder);
        let target = TargetSpec::new("ghost", "/definitely/not/a/server {port}", 0);

        let err = runner.run(&target, &trial()).unwrap_err();

        match err {
            BenchError::ServerLaunch {
                target,
                source: Some(echobench_core::Error::Spawn { .. }),
                ..
            } => assert_eq!(target, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            runner.history(),
            &[TrialState::Idle, TrialState::ServerStarting, TrialState::Failed]
        );
        assert!(runner.last_server_pid().is_none());
    }

    #[test]
    fn test_readiness_check_waits_for_listener() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut s = settings(dir.path());
        s.host = "127.0.0.1".to_string();
        s.port = listener.local_addr().unwrap().port();
        s.readiness_timeout_ms = 2_000;
        let mut runner = TrialRunner::new(s, client(SPEED_LINE), accepting_binder());

        let record = runner.run(&sleeper("epoll", 1), &trial()).unwrap();

        assert_eq!(record.result("request_per_second").and_then(|v| v.as_i64()), Some(152_720));
    }

    #[test]
    fn test_readiness_timeout_stops_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.host = "127.0.0.1".to_string();
        s.port = unused_port();
        s.readiness_timeout_ms = 200;
        let mut binder = MockBinder::new();
        binder.expect_bind().never();
        let mut runner = TrialRunner::new(s, client(SPEED_LINE), binder);

        let err = runner.run(&sleeper("epoll", 1), &trial()).unwrap_err();

        assert!(err.to_string().contains("not accepting connections"));
        assert!(!process_exists(runner.last_server_pid().unwrap()));
    }

    #[test]
    fn test_pids_are_recorded_per_trial() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut binder = MockBinder::new();
        binder.expect_bind().returning(move |pid, _| {
            sink.lock().unwrap().push(pid);
            Ok(())
        });
        let mut runner = TrialRunner::new(settings(dir.path()), client(SPEED_LINE), binder);

        runner.run(&sleeper("io_uring", 0), &trial()).unwrap();
        runner.run(&sleeper("epoll", 1), &trial()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert_eq!(runner.last_server_pid(), Some(seen[1]));
    }
}

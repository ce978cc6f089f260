//! Harness configuration.
//!
//! Every field has a default reproducing the classic io_uring vs epoll echo
//! benchmark, so an empty configuration file is a valid one. Loading and
//! layering (file, environment) is done by the CLI; this module only
//! defines the shape.

use crate::sweep::SweepPlan;
use crate::target::TargetSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Sweep axes.
    pub sweep: SweepConfig,
    /// Settings shared by every trial.
    pub trial: TrialSettings,
    /// Load generator invocation.
    pub client: ClientConfig,
    /// Competing server implementations, in run order.
    pub targets: Vec<TargetSpec>,
    /// Build commands run before a sweep.
    pub setup: Vec<BuildStep>,
    /// Where results go.
    pub output: OutputConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            trial: TrialSettings::default(),
            client: ClientConfig::default(),
            targets: TargetSpec::defaults(),
            setup: BuildStep::defaults(),
            output: OutputConfig::default(),
        }
    }
}

/// Sweep axes as configured; see [`SweepPlan`] for the validated form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Concurrent client counts.
    pub concurrency: Vec<u32>,
    /// Message lengths in bytes.
    pub payload_sizes: Vec<u32>,
    /// Seconds each trial runs the client for.
    pub duration_seconds: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: vec![1, 200, 400, 600, 800, 1000],
            payload_sizes: vec![1, 128, 1024],
            duration_seconds: 20,
        }
    }
}

impl SweepConfig {
    /// Validate into a plan.
    pub fn plan(&self) -> crate::Result<SweepPlan> {
        SweepPlan::new(
            self.concurrency.clone(),
            self.payload_sizes.clone(),
            self.duration_seconds,
        )
    }
}

/// Settings shared by every trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialSettings {
    /// Host the client connects to.
    pub host: String,
    /// Port every server listens on.
    pub port: u16,
    /// Milliseconds a server gets to exit after SIGTERM.
    pub grace_period_ms: u64,
    /// Milliseconds to wait for the server to accept connections; 0 skips
    /// the readiness check.
    pub readiness_timeout_ms: u64,
    /// Directory for per-target server logs.
    pub log_dir: PathBuf,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            grace_period_ms: 2_000,
            readiness_timeout_ms: 5_000,
            log_dir: PathBuf::from("."),
        }
    }
}

impl TrialSettings {
    /// `host:port` the client targets.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Grace period as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Readiness timeout, `None` when the readiness check is disabled.
    pub fn readiness_timeout(&self) -> Option<Duration> {
        (self.readiness_timeout_ms > 0).then(|| Duration::from_millis(self.readiness_timeout_ms))
    }
}

/// Load generator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Command template. Placeholders: `{address}`, `{host}`, `{port}`,
    /// `{clients}`, `{duration}`, `{length}`.
    pub command: String,
    /// Directory the client runs in.
    pub working_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: "cargo run --release -- --address '{address}' --number {clients} \
                      --duration {duration} --length {length}"
                .to_string(),
            working_dir: Some(PathBuf::from("../rust_echo_bench")),
        }
    }
}

/// One build command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Shell command line.
    pub command: String,
    /// Directory to run in.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Skip the step when this path already exists.
    #[serde(default)]
    pub creates: Option<PathBuf>,
}

impl BuildStep {
    fn new(command: &str, working_dir: Option<&str>, creates: Option<&str>) -> Self {
        Self {
            command: command.to_string(),
            working_dir: working_dir.map(PathBuf::from),
            creates: creates.map(PathBuf::from),
        }
    }

    /// Build steps for the two bundled echo servers.
    ///
    /// liburing is cloned and installed under `$HOME/lib/liburing` unless a
    /// checkout already exists, and the io_uring server is linked against
    /// that install.
    pub fn defaults() -> Vec<BuildStep> {
        vec![
            BuildStep::new(
                "git clone https://github.com/axboe/liburing",
                None,
                Some("liburing"),
            ),
            BuildStep::new(
                "./configure --prefix=$HOME/lib/liburing && make && make install",
                Some("liburing"),
                Some("src/liburing.a"),
            ),
            BuildStep::new("mkdir -p build", None, None),
            BuildStep::new(
                "c++ ./benchmark/echo_server_io_uring.cpp -o ./build/echo_server_io_uring \
                 -Wall -O2 -D_GNU_SOURCE -I$HOME/lib/liburing/include -L$HOME/lib/liburing/lib \
                 -Wl,-rpath,$HOME/lib/liburing/lib -luring",
                None,
                None,
            ),
            BuildStep::new(
                "c++ ./benchmark/echo_server_epoll.cpp -o ./build/echo_server_epoll \
                 -Wall -O2 -D_GNU_SOURCE",
                None,
                None,
            ),
        ]
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for record files.
    pub record_dir: PathBuf,
    /// Directory for rendered charts.
    pub img_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            record_dir: PathBuf::from(crate::io::RECORD_DIR),
            img_dir: PathBuf::from(crate::io::IMG_DIR),
        }
    }
}

/// Substitute `{name}` placeholders in `template`.
///
/// Unknown placeholders are left untouched.
pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_classic_benchmark() {
        let config = BenchConfig::default();
        assert_eq!(config.trial.port, 8080);
        assert_eq!(config.trial.address(), "localhost:8080");
        assert_eq!(config.sweep.duration_seconds, 20);
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[0].name, "io_uring");
        assert_eq!(config.targets[1].name, "epoll");
    }

    #[test]
    fn test_default_setup_builds_liburing_first() {
        let steps = BuildStep::defaults();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[0].creates, Some(PathBuf::from("liburing")));
        assert_eq!(steps[1].working_dir, Some(PathBuf::from("liburing")));
        assert!(steps[3].command.contains("-I$HOME/lib/liburing/include"));
        assert!(steps[3].command.contains("-L$HOME/lib/liburing/lib"));
        assert!(!steps[4].command.contains("-luring"));
    }

    #[test]
    fn test_empty_json_is_default() {
        let config: BenchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BenchConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config: BenchConfig =
            serde_json::from_str(r#"{"trial": {"port": 9000}, "sweep": {"concurrency": [4]}}"#)
                .unwrap();
        assert_eq!(config.trial.port, 9000);
        assert_eq!(config.trial.host, "localhost");
        assert_eq!(config.sweep.concurrency, vec![4]);
        assert_eq!(config.sweep.payload_sizes, vec![1, 128, 1024]);
    }

    #[test]
    fn test_readiness_zero_disables_readiness_check() {
        let settings = TrialSettings {
            readiness_timeout_ms: 0,
            ..TrialSettings::default()
        };
        assert_eq!(settings.readiness_timeout(), None);
        assert_eq!(
            TrialSettings::default().readiness_timeout(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_render_template() {
        let rendered = render_template(
            ClientConfig::default().command.as_str(),
            &[
                ("address", "localhost:8080".to_string()),
                ("clients", "200".to_string()),
                ("duration", "20".to_string()),
                ("length", "128".to_string()),
            ],
        );
        assert_eq!(
            rendered,
            "cargo run --release -- --address 'localhost:8080' --number 200 \
             --duration 20 --length 128"
        );
        assert_eq!(render_template("{unknown}", &[]), "{unknown}");
    }
}

//! Benchmark targets.
//!
//! A target is one competing server implementation: how to start it, where
//! its output goes, and which CPU it is pinned to.

use crate::config::render_template;
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One server implementation under benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Name stored in the `target` attribute of every record.
    pub name: String,
    /// Server command template; `{port}` is replaced with the trial port.
    /// Executed directly, not through a shell.
    pub server_command: String,
    /// Directory the server runs in.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Server log file; defaults to `echo_server_<name>.log` in the log dir.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Logical CPU the server is pinned to.
    pub cpu: usize,
}

impl TargetSpec {
    /// Create a target with default working directory and log file.
    pub fn new(name: impl Into<String>, server_command: impl Into<String>, cpu: usize) -> Self {
        Self {
            name: name.into(),
            server_command: server_command.into(),
            working_dir: None,
            log_file: None,
            cpu,
        }
    }

    /// io_uring on CPU 0 and epoll on CPU 1.
    pub fn defaults() -> Vec<TargetSpec> {
        vec![
            TargetSpec::new("io_uring", "./build/echo_server_io_uring {port}", 0),
            TargetSpec::new("epoll", "./build/echo_server_epoll {port}", 1),
        ]
    }

    /// Server command line for `port`.
    pub fn command_for(&self, port: u16) -> String {
        render_template(&self.server_command, &[("port", port.to_string())])
    }

    /// Log file path, resolved against `log_dir` when relative or unset.
    pub fn log_path(&self, log_dir: &Path) -> PathBuf {
        match &self.log_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => log_dir.join(path),
            None => log_dir.join(format!("echo_server_{}.log", self.name)),
        }
    }
}

/// Check a target list before any trial runs.
///
/// Names must be unique and non-empty, and every target needs its own CPU
/// taken from `available_cpus`, the CPU indices this host lets the harness
/// use. A host with fewer usable CPUs than targets is rejected instead of
/// pinning two servers to the same core.
pub fn validate_targets(targets: &[TargetSpec], available_cpus: &[usize]) -> Result<()> {
    if targets.is_empty() {
        return Err(BenchError::InvalidConfig("no targets configured".to_string()));
    }
    if targets.len() > available_cpus.len() {
        return Err(BenchError::InvalidConfig(format!(
            "{} targets need disjoint cpus but only {} are usable ({available_cpus:?})",
            targets.len(),
            available_cpus.len()
        )));
    }

    let mut names = HashSet::new();
    let mut cpus = HashSet::new();
    for target in targets {
        if target.name.trim().is_empty() {
            return Err(BenchError::InvalidConfig("target name is empty".to_string()));
        }
        if !names.insert(target.name.as_str()) {
            return Err(BenchError::InvalidConfig(format!(
                "duplicate target name `{}`",
                target.name
            )));
        }
        if !available_cpus.contains(&target.cpu) {
            return Err(BenchError::InvalidConfig(format!(
                "target `{}` is pinned to cpu {}, which is not usable ({available_cpus:?})",
                target.name, target.cpu
            )));
        }
        if !cpus.insert(target.cpu) {
            return Err(BenchError::InvalidConfig(format!(
                "target `{}` shares cpu {} with another target",
                target.name, target.cpu
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EIGHT_CPUS: [usize; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

    #[test]
    fn test_command_for_port() {
        let target = &TargetSpec::defaults()[0];
        assert_eq!(target.command_for(8080), "./build/echo_server_io_uring 8080");
    }

    #[test]
    fn test_log_path_resolution() {
        let mut target = TargetSpec::new("epoll", "srv {port}", 1);
        assert_eq!(
            target.log_path(Path::new("logs")),
            PathBuf::from("logs/echo_server_epoll.log")
        );

        target.log_file = Some(PathBuf::from("custom.log"));
        assert_eq!(target.log_path(Path::new("logs")), PathBuf::from("logs/custom.log"));

        target.log_file = Some(PathBuf::from("/tmp/abs.log"));
        assert_eq!(target.log_path(Path::new("logs")), PathBuf::from("/tmp/abs.log"));
    }

    #[test]
    fn test_defaults_are_valid_on_two_cpus() {
        validate_targets(&TargetSpec::defaults(), &[0, 1]).unwrap();
    }

    #[test]
    fn test_single_cpu_host_is_rejected() {
        let err = validate_targets(&TargetSpec::defaults(), &[0]).unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }

    #[test]
    fn test_cpu_set_with_gaps() {
        let spread = vec![
            TargetSpec::new("io_uring", "a {port}", 0),
            TargetSpec::new("epoll", "b {port}", 2),
        ];
        validate_targets(&spread, &[0, 2]).unwrap();

        let err = validate_targets(&TargetSpec::defaults(), &[0, 2]).unwrap_err();
        assert!(err.to_string().contains("cpu 1, which is not usable"));
    }

    #[test]
    fn test_shared_cpu_is_rejected() {
        let targets = vec![
            TargetSpec::new("a", "a {port}", 0),
            TargetSpec::new("b", "b {port}", 0),
        ];
        let err = validate_targets(&targets, &EIGHT_CPUS).unwrap_err();
        assert!(err.to_string().contains("shares cpu 0"));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let targets = vec![
            TargetSpec::new("a", "a {port}", 0),
            TargetSpec::new("a", "b {port}", 1),
        ];
        assert!(validate_targets(&targets, &EIGHT_CPUS).is_err());
    }

    #[test]
    fn test_empty_target_list_is_rejected() {
        assert!(validate_targets(&[], &EIGHT_CPUS).is_err());
    }
}

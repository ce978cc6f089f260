//! Error types for process management.

use std::io;
use thiserror::Error;

/// Errors raised while running, launching, or pinning external processes.
#[derive(Debug, Error)]
pub enum Error {
    /// The process could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Command line that failed to start.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A synchronous command exited with a non-zero status.
    #[error("command `{command}` failed with exit code {}: {stderr}", display_code(.exit_code))]
    CommandExecution {
        /// Command line that failed.
        command: String,
        /// Exit code, `None` when terminated by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// CPU pinning failed.
    #[error("failed to pin pid {pid} to cpu {cpu}: {reason}")]
    Affinity {
        /// Target process.
        pid: u32,
        /// Requested logical CPU.
        cpu: usize,
        /// Why the kernel (or the pre-check) refused.
        reason: String,
    },

    /// Filesystem or pipe I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

/// Result type for process operations.
pub type Result<T> = std::result::Result<T, Error>;

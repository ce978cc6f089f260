//! Error types for benchmark orchestration and reporting.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running trials or handling records.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The target server could not be brought up.
    #[error("failed to start server for target `{target}`: {reason}")]
    ServerLaunch {
        /// Target name.
        target: String,
        /// What went wrong.
        reason: String,
        /// Underlying process error, if any.
        #[source]
        source: Option<echobench_core::Error>,
    },

    /// Command execution, CPU pinning, or other process-level failure.
    #[error(transparent)]
    Process(#[from] echobench_core::Error),

    /// Client output did not contain the throughput line.
    #[error("no `Speed: <n> request/sec` line in client output:\n{raw_output}")]
    Parse {
        /// Everything the client printed.
        raw_output: String,
    },

    /// No record file to load.
    #[error("no record file found in {}", directory.display())]
    NoReportFound {
        /// Directory that was scanned.
        directory: PathBuf,
    },

    /// A record lacks a key needed for reporting, or it is not numeric.
    #[error("record has no numeric field `{key}`")]
    MissingField {
        /// Requested key.
        key: String,
    },

    /// Report filters matched no records.
    #[error("no records match the report selection")]
    EmptySelection,

    /// Sweep or target configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A trial failed; the sweep stops here.
    #[error(
        "trial failed (target={target}, client_number={concurrency}, \
         message_length={payload_size}, duration_seconds={duration})"
    )]
    Trial {
        /// Target name.
        target: String,
        /// Client concurrency.
        concurrency: u32,
        /// Payload size in bytes.
        payload_size: u32,
        /// Trial duration in seconds.
        duration: u32,
        /// What went wrong.
        #[source]
        source: Box<BenchError>,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    /// The innermost error, looking through [`BenchError::Trial`] wrappers.
    pub fn root(&self) -> &BenchError {
        match self {
            BenchError::Trial { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;

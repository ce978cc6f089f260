//! Process lifecycle primitives for echobench.
//!
//! Everything the harness does to other programs goes through this crate:
//!
//! - [`command`] runs short-lived commands and captures their output
//! - [`process`] launches long-running servers and terminates them
//! - [`affinity`] pins a process to a logical CPU
//! - [`timestamp`] issues sortable, strictly increasing file-name stamps

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod affinity;
pub mod command;
pub mod error;
pub mod process;
pub mod timestamp;

pub use affinity::{allowed_cpus, online_cpus, AffinityBinder, SchedAffinity};
pub use command::{run_command, CommandOutput, CommandRunner};
pub use error::{Error, Result};
pub use process::{launch, process_exists, ProcessHandle, ProcessState};

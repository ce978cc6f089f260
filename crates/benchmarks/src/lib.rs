//! Benchmark orchestration for echobench.
//!
//! This crate runs competing echo servers under a load generator, turns the
//! generator's output into [`BenchmarkRecord`]s, and stores and charts them.
//!
//! # Quick Start
//!
//! ```no_run
//! use echobench_benchmarks::{run_configured_sweep, BenchConfig};
//!
//! let config = BenchConfig::default();
//! let outcome = run_configured_sweep(&config)?;
//!
//! for record in &outcome.records {
//!     println!("{:?}", record.test_result());
//! }
//! # Ok::<(), echobench_benchmarks::BenchError>(())
//! ```
//!
//! # Modules
//!
//! - [`record`] - The `BenchmarkRecord` measurement unit
//! - [`io`] - Record files: save and load the latest
//! - [`trial`] - One target under one configuration
//! - [`sweep`] - The full configuration cross product
//! - [`chart`] - SVG charts from stored records
//! - [`markdown`] - Markdown summaries

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod chart;
pub mod config;
pub mod error;
pub mod io;
pub mod markdown;
pub mod parse;
pub mod record;
pub mod setup;
pub mod sweep;
pub mod target;
pub mod trial;

pub use chart::{ChartSpec, ReportRenderer};
pub use config::{BenchConfig, BuildStep, ClientConfig, SweepConfig, TrialSettings};
pub use error::{BenchError, Result};
pub use io::RecordStore;
pub use record::{BenchmarkRecord, Scalar};
pub use sweep::{SweepController, SweepOutcome, SweepPlan};
pub use target::TargetSpec;
pub use trial::{TrialConfig, TrialRunner, TrialState};

use echobench_core::SchedAffinity;

/// Build the sweep controller described by `config`, pinning with
/// `sched_setaffinity`.
pub fn controller_for(config: &BenchConfig) -> SweepController<SchedAffinity> {
    let runner = TrialRunner::new(config.trial.clone(), config.client.clone(), SchedAffinity::new());
    SweepController::new(runner, config.targets.clone())
}

/// Run the sweep described by `config` and persist its records.
///
/// This is the canonical entrypoint for a benchmark run. Build steps are not
/// run here; see [`setup::run_setup`].
///
/// # Errors
///
/// Configuration errors before any trial, the first failing trial, or a
/// failure writing the record file.
pub fn run_configured_sweep(config: &BenchConfig) -> Result<SweepOutcome> {
    let plan = config.sweep.plan()?;
    let store = RecordStore::new(&config.output.record_dir);
    controller_for(config).run_and_persist(&plan, &store)
}

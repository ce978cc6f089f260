//! Sweeping the configuration space.
//!
//! The sweep visits every (concurrency, payload size) pair, concurrency in
//! the outer loop and both ascending, and runs each target once per pair in
//! configured order. The first failed trial stops the sweep.

use crate::error::{BenchError, Result};
use crate::io::RecordStore;
use crate::record::BenchmarkRecord;
use crate::target::{validate_targets, TargetSpec};
use crate::trial::{TrialConfig, TrialRunner};
use echobench_core::{allowed_cpus, AffinityBinder};
use std::path::PathBuf;
use tracing::{error, info};

/// Validated sweep axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    concurrency_levels: Vec<u32>,
    payload_sizes: Vec<u32>,
    duration_seconds: u32,
}

impl SweepPlan {
    /// Build a plan. Axes are sorted ascending and de-duplicated.
    ///
    /// # Errors
    ///
    /// [`BenchError::InvalidConfig`] if an axis is empty or any value is zero.
    pub fn new(
        mut concurrency_levels: Vec<u32>,
        mut payload_sizes: Vec<u32>,
        duration_seconds: u32,
    ) -> Result<Self> {
        for (axis, values) in [
            ("concurrency", &mut concurrency_levels),
            ("payload size", &mut payload_sizes),
        ] {
            if values.is_empty() {
                return Err(BenchError::InvalidConfig(format!("{axis} axis is empty")));
            }
            if values.contains(&0) {
                return Err(BenchError::InvalidConfig(format!("{axis} values must be positive")));
            }
            values.sort_unstable();
            values.dedup();
        }
        if duration_seconds == 0 {
            return Err(BenchError::InvalidConfig("duration must be positive".to_string()));
        }

        Ok(Self {
            concurrency_levels,
            payload_sizes,
            duration_seconds,
        })
    }

    /// Concurrency levels, ascending.
    pub fn concurrency_levels(&self) -> &[u32] {
        &self.concurrency_levels
    }

    /// Payload sizes, ascending.
    pub fn payload_sizes(&self) -> &[u32] {
        &self.payload_sizes
    }

    /// Seconds per trial.
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    /// Trial configurations in sweep order.
    pub fn trials(&self) -> impl Iterator<Item = TrialConfig> + '_ {
        self.concurrency_levels.iter().flat_map(move |&concurrency| {
            self.payload_sizes.iter().map(move |&payload_size| TrialConfig {
                concurrency,
                payload_size,
                duration_seconds: self.duration_seconds,
            })
        })
    }

    /// Number of trials per target.
    pub fn len(&self) -> usize {
        self.concurrency_levels.len() * self.payload_sizes.len()
    }

    /// Always false for a validated plan.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Records of a finished sweep and where they were written.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Records in sweep order.
    pub records: Vec<BenchmarkRecord>,
    /// Record file.
    pub path: PathBuf,
}

/// Drives a [`TrialRunner`] across a [`SweepPlan`].
pub struct SweepController<A> {
    runner: TrialRunner<A>,
    targets: Vec<TargetSpec>,
    available_cpus: Vec<usize>,
}

impl<A: AffinityBinder> SweepController<A> {
    /// Create a controller for `targets`, run in the given order.
    pub fn new(runner: TrialRunner<A>, targets: Vec<TargetSpec>) -> Self {
        Self {
            runner,
            targets,
            available_cpus: allowed_cpus(),
        }
    }

    /// Override the CPU indices targets are validated against.
    pub fn with_available_cpus(mut self, available_cpus: impl IntoIterator<Item = usize>) -> Self {
        self.available_cpus = available_cpus.into_iter().collect();
        self
    }

    /// Targets in run order.
    pub fn targets(&self) -> &[TargetSpec] {
        &self.targets
    }

    /// The underlying trial runner.
    pub fn runner(&self) -> &TrialRunner<A> {
        &self.runner
    }

    /// Run every trial of `plan` and return the records in sweep order.
    ///
    /// # Errors
    ///
    /// [`BenchError::InvalidConfig`] before any trial if the targets are
    /// unusable on this host, otherwise [`BenchError::Trial`] for the first
    /// trial that fails.
    pub fn run_sweep(&mut self, plan: &SweepPlan) -> Result<Vec<BenchmarkRecord>> {
        validate_targets(&self.targets, &self.available_cpus)?;

        let total = plan.len() * self.targets.len();
        info!(
            trials = total,
            targets = self.targets.len(),
            duration = plan.duration_seconds(),
            "starting sweep"
        );

        let mut records = Vec::with_capacity(total);
        for trial in plan.trials() {
            for target in &self.targets {
                match self.runner.run(target, &trial) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        error!(
                            target_name = %target.name,
                            clients = trial.concurrency,
                            length = trial.payload_size,
                            %err,
                            "trial failed, aborting sweep"
                        );
                        return Err(BenchError::Trial {
                            target: target.name.clone(),
                            concurrency: trial.concurrency,
                            payload_size: trial.payload_size,
                            duration: trial.duration_seconds,
                            source: Box::new(err),
                        });
                    }
                }
                info!(completed = records.len(), total, "trial finished");
            }
        }

        Ok(records)
    }

    /// Run the sweep and persist its records to `store`.
    pub fn run_and_persist(&mut self, plan: &SweepPlan, store: &RecordStore) -> Result<SweepOutcome> {
        let records = self.run_sweep(plan)?;
        let path = store.save(&records)?;
        Ok(SweepOutcome { records, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_sorts_and_dedups() {
        let plan = SweepPlan::new(vec![400, 1, 200, 1], vec![1024, 1, 128], 20).unwrap();
        assert_eq!(plan.concurrency_levels(), &[1, 200, 400]);
        assert_eq!(plan.payload_sizes(), &[1, 128, 1024]);
        assert_eq!(plan.len(), 9);
    }

    #[test]
    fn test_trial_order_is_concurrency_major() {
        let plan = SweepPlan::new(vec![200, 1], vec![128, 1], 5).unwrap();
        let order: Vec<(u32, u32)> = plan
            .trials()
            .map(|t| (t.concurrency, t.payload_size))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 128), (200, 1), (200, 128)]);
        assert!(plan.trials().all(|t| t.duration_seconds == 5));
    }

    #[test]
    fn test_plan_rejects_bad_axes() {
        assert!(SweepPlan::new(vec![], vec![1], 1).is_err());
        assert!(SweepPlan::new(vec![1], vec![], 1).is_err());
        assert!(SweepPlan::new(vec![0, 1], vec![1], 1).is_err());
        assert!(SweepPlan::new(vec![1], vec![0], 1).is_err());
        assert!(SweepPlan::new(vec![1], vec![1], 0).is_err());
    }
}

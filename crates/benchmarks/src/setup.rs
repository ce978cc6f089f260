//! Build steps run before a sweep.

use crate::config::BuildStep;
use crate::error::Result;
use echobench_core::CommandRunner;
use tracing::info;

/// What happened to a build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The command ran and succeeded.
    Ran,
    /// The step's `creates` path already existed.
    Skipped,
}

/// Run `steps` in order, stopping at the first failure.
pub fn run_setup(steps: &[BuildStep]) -> Result<Vec<StepOutcome>> {
    let mut outcomes = Vec::with_capacity(steps.len());
    for step in steps {
        if let Some(creates) = &step.creates {
            let resolved = match &step.working_dir {
                Some(dir) if creates.is_relative() => dir.join(creates),
                _ => creates.clone(),
            };
            if resolved.exists() {
                info!(command = %step.command, creates = %resolved.display(), "skipping build step");
                outcomes.push(StepOutcome::Skipped);
                continue;
            }
        }

        info!(command = %step.command, "running build step");
        CommandRunner::new()
            .maybe_working_dir(step.working_dir.as_deref())
            .run(&step.command)?;
        outcomes.push(StepOutcome::Ran);
    }
    Ok(outcomes)
}

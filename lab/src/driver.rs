//! Multi-batch driver for `lab run`.

use anyhow::Result;
use tracing::info;

use crate::coordinator::{CoordinationOutcome, Coordinator};
use crate::core::types::RoundRecord;

/// Why `run_until_finalized` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStop {
    /// A batch ended with a finalized outcome.
    Finalized,
    /// The operator declined another batch.
    OperatorStopped,
    /// The batch ran out of rounds and continuation prompts are off.
    BudgetSpent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOutcome {
    pub outcome: CoordinationOutcome,
    /// Number of `coordinate` calls made.
    pub batches: u32,
    pub rounds: u32,
    pub stop: DriverStop,
}

/// Invoke `coordinate` repeatedly. After each non-finalized batch the operator
/// is asked whether to run another one when `continue_prompt` is set.
///
/// Run telemetry is persisted once on the way out, also when a batch errors.
pub fn run_until_finalized<F: FnMut(&RoundRecord)>(
    coordinator: &mut Coordinator<'_>,
    topic: &str,
    continue_prompt: bool,
    mut on_round: F,
) -> Result<DriverOutcome> {
    let result = drive(coordinator, topic, continue_prompt, &mut on_round);
    let finished = coordinator.finish();
    let outcome = result?;
    finished?;
    Ok(outcome)
}

fn drive(
    coordinator: &mut Coordinator<'_>,
    topic: &str,
    continue_prompt: bool,
    on_round: &mut dyn FnMut(&RoundRecord),
) -> Result<DriverOutcome> {
    let batch_rounds = coordinator.settings().max_rounds;
    let mut batches = 0u32;
    loop {
        let outcome = coordinator.coordinate_with(topic, on_round)?;
        batches += 1;
        let rounds = coordinator.state().round;

        let stop = if outcome.finalized {
            DriverStop::Finalized
        } else if !continue_prompt {
            DriverStop::BudgetSpent
        } else if coordinator.operator().confirm(&format!(
            "Not finalized after {rounds} rounds. Run another {batch_rounds} rounds?"
        ))? {
            info!(batches, rounds, "operator requested another batch");
            continue;
        } else {
            DriverStop::OperatorStopped
        };

        info!(batches, rounds, ?stop, "driver stopped");
        return Ok(DriverOutcome {
            outcome,
            batches,
            rounds,
            stop,
        });
    }
}

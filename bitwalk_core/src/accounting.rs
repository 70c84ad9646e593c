//! Closed-form iteration accounting.
//!
//! Totals are computed from the input length and mode alone, never by running
//! the engine. Per-stage terms saturate at zero so inputs shorter than a
//! window contribute nothing instead of going negative.

use crate::stage::Stage;

/// Mutations a single stage yields for an input of `input_len` bytes.
pub fn stage_iterations(stage: Stage, input_len: usize) -> u64 {
    stage.position_count(input_len)
}

/// Total mutations obtainable before exhaustion.
///
/// With a restriction this is the single stage's count; otherwise the sum of
/// all six stages in sweep order.
pub fn total_iterations(input_len: usize, restriction: Option<Stage>) -> u64 {
    match restriction {
        Some(stage) => stage_iterations(stage, input_len),
        None => Stage::ALL
            .iter()
            .map(|stage| stage_iterations(*stage, input_len))
            .sum(),
    }
}

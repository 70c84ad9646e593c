use crate::state::SnapshotError;
use thiserror::Error;

/// Errors an engine call can report. Exhaustion is deliberately not here: it
/// is a normal terminal value, carried by [`MutateOutcome::Exhausted`].
#[derive(Error, Debug)]
pub enum MutatorError {
    /// The destination buffer cannot hold a full copy of the seed.
    #[error("output buffer too small: need {needed} bytes, got {got}")]
    Capacity { needed: usize, got: usize },

    /// The state guard could not be acquired, or a previous holder poisoned
    /// it. Fatal for the failing call only; the engine stays usable.
    #[error("mutation guard unavailable: {0}")]
    Guard(String),

    /// Encoding or decoding a state snapshot failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Construction-time option rejection.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Outcome of one advance-and-produce step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutateOutcome {
    /// A mutant of this many bytes was written into the output buffer.
    Mutated(usize),
    /// No mutations remain. Terminal and idempotent.
    Exhausted,
}

impl MutateOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, MutateOutcome::Exhausted)
    }

    /// Bytes written into the output buffer; zero once exhausted.
    pub fn written_len(&self) -> usize {
        match self {
            MutateOutcome::Mutated(len) => *len,
            MutateOutcome::Exhausted => 0,
        }
    }
}

/// Per-call behavior flags for [`ResumableMutator::mutate_extended`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutateFlags {
    /// Serialize this advance-and-produce step against other callers sharing
    /// the same engine handle.
    pub thread_safe: bool,
}

impl MutateFlags {
    pub const THREAD_SAFE: MutateFlags = MutateFlags { thread_safe: true };
}

/// Byte-length report for the inputs an engine currently owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    pub num_inputs: usize,
    pub sizes: Vec<usize>,
}

/// A deterministic mutation engine whose enumeration can be paused, shipped
/// elsewhere as a snapshot string, and resumed bit-for-bit identically.
///
/// All methods take `&self`: implementations are expected to use interior
/// mutability so one engine handle can be shared (for example behind an
/// `Arc`) by several caller threads. Only the advance-and-produce step ever
/// mutates iteration state, and only under the implementation's guard.
pub trait ResumableMutator: Send + Sync {
    /// Produces the next mutant into `out`, advancing the engine by one step.
    ///
    /// `out` must be at least as large as the current seed; smaller buffers
    /// fail with [`MutatorError::Capacity`] without touching engine state.
    /// This is the unsynchronized path: callers guarantee no concurrent use
    /// of the same handle.
    fn mutate(&self, out: &mut [u8]) -> Result<MutateOutcome, MutatorError>;

    /// Same contract as [`mutate`](ResumableMutator::mutate), with per-call
    /// flags. With [`MutateFlags::THREAD_SAFE`] the step blocks on the guard
    /// and concurrent callers each observe a fully-advanced-or-not state.
    fn mutate_extended(
        &self,
        out: &mut [u8],
        flags: MutateFlags,
    ) -> Result<MutateOutcome, MutatorError>;

    /// Serializes the current iteration state (plus base configuration) into
    /// snapshot text for checkpoint/restore.
    fn state_snapshot(&self) -> Result<String, MutatorError>;

    /// Replaces the iteration state with a previously captured snapshot.
    ///
    /// A malformed snapshot leaves the current state untouched; the new state
    /// is applied only after the whole snapshot has validated.
    fn restore_snapshot(&self, snapshot: &str) -> Result<(), MutatorError>;

    /// Mutations produced so far.
    fn current_iteration(&self) -> u64;

    /// Exact number of mutations this engine can produce in total, computed
    /// in closed form from the seed length and mode. Always finite.
    fn total_iterations(&self) -> u64;

    /// Reports how many inputs the engine owns and their byte lengths.
    fn input_info(&self) -> InputInfo;

    /// Replaces the seed wholesale. Iteration state is carried over, not
    /// reset; see the engine documentation for the continuation semantics.
    fn set_input(&self, new_input: Vec<u8>) -> Result<(), MutatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_reports_written_length() {
        assert_eq!(MutateOutcome::Mutated(12).written_len(), 12);
        assert!(!MutateOutcome::Mutated(12).is_exhausted());
        assert_eq!(MutateOutcome::Exhausted.written_len(), 0);
        assert!(MutateOutcome::Exhausted.is_exhausted());
    }

    #[test]
    fn flags_default_to_the_unsynchronized_path() {
        assert!(!MutateFlags::default().thread_safe);
        assert!(MutateFlags::THREAD_SAFE.thread_safe);
    }
}

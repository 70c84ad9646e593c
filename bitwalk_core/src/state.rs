use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current snapshot format revision. Bumped whenever a field changes meaning.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors arising while encoding or decoding an engine state snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The underlying JSON encoder failed.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
    /// The snapshot text is not parseable as the expected structure.
    #[error("snapshot decoding failed: {0}")]
    Decode(String),
    /// The snapshot was produced by an incompatible format revision.
    #[error("unsupported snapshot version {0}, expected {SNAPSHOT_VERSION}")]
    UnsupportedVersion(u32),
    /// A field parsed but holds a value no reachable state can have.
    #[error("invalid snapshot field: {0}")]
    InvalidField(String),
}

/// Iteration progress of one mutation engine.
///
/// The record is mutated only by the engine's advance-and-produce step and is
/// fully captured by [`StateSnapshot`], so an enumeration can be paused and
/// resumed bit-for-bit identically elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationState {
    /// Index into [`Stage::ALL`] of the stage the next mutation comes from.
    pub stage: usize,
    /// Bit or byte offset of the next mutation within the current stage.
    pub cursor: u64,
    /// Mutations produced so far. Exhausted calls do not count.
    pub iteration: u64,
    /// When set, `stage` is pinned for the life of the engine.
    pub one_stage_only: bool,
}

impl MutationState {
    /// Fresh state: either the start of a full sweep, or pinned to the single
    /// stage named by the restriction.
    pub fn fresh(restriction: Option<Stage>) -> Self {
        match restriction {
            Some(stage) => MutationState {
                stage: stage.index(),
                cursor: 0,
                iteration: 0,
                one_stage_only: true,
            },
            None => MutationState {
                stage: 0,
                cursor: 0,
                iteration: 0,
                one_stage_only: false,
            },
        }
    }

    /// The stage the next mutation will be dispatched to.
    pub fn current_stage(&self) -> Stage {
        Stage::ALL[self.stage]
    }
}

/// Serialized form of [`MutationState`] plus the base window-size
/// configuration, exchanged as JSON text for checkpoint/restore.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub version: u32,
    pub iteration: u64,
    /// Window-size restriction in bits; 0 when sweeping all six stages.
    #[serde(default)]
    pub num_bits: u64,
    #[serde(default)]
    pub stage: usize,
    #[serde(default)]
    pub cursor: u64,
}

impl StateSnapshot {
    /// Captures a state into its snapshot form. Always succeeds for a
    /// well-formed state.
    pub fn capture(state: &MutationState) -> Self {
        StateSnapshot {
            version: SNAPSHOT_VERSION,
            iteration: state.iteration,
            num_bits: if state.one_stage_only {
                state.current_stage().width_bits()
            } else {
                0
            },
            stage: state.stage,
            cursor: state.cursor,
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Parses snapshot text. Fields are matched by name; `num_bits`, `stage`
    /// and `cursor` may be absent and default to zero.
    pub fn from_json(snapshot: &str) -> Result<Self, SnapshotError> {
        let snapshot: StateSnapshot =
            serde_json::from_str(snapshot).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    /// Validates every field and converts into a live state. Nothing is
    /// applied to an engine until this has succeeded in full.
    pub fn into_state(self) -> Result<MutationState, SnapshotError> {
        if self.stage >= Stage::ALL.len() {
            return Err(SnapshotError::InvalidField(format!(
                "stage index {} is outside the operator table",
                self.stage
            )));
        }
        let one_stage_only = self.num_bits != 0;
        if one_stage_only {
            let restricted = Stage::from_num_bits(self.num_bits).ok_or_else(|| {
                SnapshotError::InvalidField(format!(
                    "num_bits {} is not a supported window size",
                    self.num_bits
                ))
            })?;
            if restricted.index() != self.stage {
                return Err(SnapshotError::InvalidField(format!(
                    "stage index {} disagrees with num_bits {}",
                    self.stage, self.num_bits
                )));
            }
        }
        Ok(MutationState {
            stage: self.stage,
            cursor: self.cursor,
            iteration: self.iteration,
            one_stage_only,
        })
    }
}

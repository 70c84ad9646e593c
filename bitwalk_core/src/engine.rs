use crate::accounting;
use crate::config::MutatorOptions;
use crate::input::SeedInput;
use crate::mutator::{InputInfo, MutateFlags, MutateOutcome, MutatorError, ResumableMutator};
use crate::stage::Stage;
use crate::state::{MutationState, StateSnapshot};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

/// Usage text for the options this engine recognizes.
pub const HELP_TEXT: &str = "\
bitwalk - walking bit flip mutation engine
Options:
  num_bits              The number of bits to operate on; either 1, 2, 4, 8,
                          16, or 32. The default is to run all six window
                          sizes, one after another.
";

/// Deterministic walking-flip mutation engine.
///
/// Owns a seed input and a [`MutationState`], and produces the finite
/// enumeration of window flips the stage table defines for that seed. One
/// engine handle can be shared across threads: the state sits behind a mutex
/// that [`MutateFlags::THREAD_SAFE`] callers block on, and the seed behind a
/// read-write lock so `set_input` can replace it wholesale.
pub struct BitFlipEngine {
    seed: RwLock<SeedInput>,
    state: Mutex<MutationState>,
}

impl BitFlipEngine {
    /// Builds an engine with fresh state from parsed options and a seed.
    ///
    /// Fails if `num_bits` names an unsupported window size.
    pub fn new(options: MutatorOptions, seed: Vec<u8>) -> Result<Self, MutatorError> {
        let restriction = options.restriction()?;
        Ok(BitFlipEngine {
            seed: RwLock::new(SeedInput::new(seed)),
            state: Mutex::new(MutationState::fresh(restriction)),
        })
    }

    /// Builds an engine and rehydrates its state from a snapshot instead of
    /// starting fresh. The snapshot's mode wins over `options` where the two
    /// disagree, as a restore would at any later point.
    pub fn with_snapshot(
        options: MutatorOptions,
        snapshot: &str,
        seed: Vec<u8>,
    ) -> Result<Self, MutatorError> {
        let engine = BitFlipEngine::new(options, seed)?;
        engine.restore_snapshot(snapshot)?;
        Ok(engine)
    }

    /// Static usage text enumerating the `num_bits` option.
    pub fn help() -> &'static str {
        HELP_TEXT
    }

    fn lock_state(&self, flags: MutateFlags) -> Result<MutexGuard<'_, MutationState>, MutatorError> {
        if flags.thread_safe {
            self.state
                .lock()
                .map_err(|_| MutatorError::Guard("state mutex poisoned".to_string()))
        } else {
            // Unsynchronized path: exclusivity is the caller's contract, so
            // contention here is a violation and surfaces as an error rather
            // than a data race.
            self.state.try_lock().map_err(|e| match e {
                TryLockError::Poisoned(_) => {
                    MutatorError::Guard("state mutex poisoned".to_string())
                }
                TryLockError::WouldBlock => MutatorError::Guard(
                    "state mutex contended on the unsynchronized path".to_string(),
                ),
            })
        }
    }

    fn produce(&self, out: &mut [u8], flags: MutateFlags) -> Result<MutateOutcome, MutatorError> {
        let seed = self
            .seed
            .read()
            .map_err(|_| MutatorError::Guard("seed lock poisoned".to_string()))?;
        if out.len() < seed.len() {
            return Err(MutatorError::Capacity {
                needed: seed.len(),
                got: out.len(),
            });
        }

        let mut state = self.lock_state(flags)?;
        let out = &mut out[..seed.len()];
        out.copy_from_slice(seed.as_bytes());

        loop {
            let stage = state.current_stage();
            if state.cursor < stage.position_count(seed.len()) {
                stage.apply(state.cursor, out);
                state.cursor += 1;
                state.iteration += 1;
                return Ok(MutateOutcome::Mutated(seed.len()));
            }
            // Current stage exhausted. Roll over, skipping stages whose
            // cursor range is empty for this seed length.
            if state.one_stage_only || state.stage + 1 >= Stage::ALL.len() {
                return Ok(MutateOutcome::Exhausted);
            }
            state.stage += 1;
            state.cursor = 0;
        }
    }
}

impl ResumableMutator for BitFlipEngine {
    fn mutate(&self, out: &mut [u8]) -> Result<MutateOutcome, MutatorError> {
        self.produce(out, MutateFlags::default())
    }

    fn mutate_extended(
        &self,
        out: &mut [u8],
        flags: MutateFlags,
    ) -> Result<MutateOutcome, MutatorError> {
        self.produce(out, flags)
    }

    fn state_snapshot(&self) -> Result<String, MutatorError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(StateSnapshot::capture(&state).to_json()?)
    }

    fn restore_snapshot(&self, snapshot: &str) -> Result<(), MutatorError> {
        let restored = StateSnapshot::from_json(snapshot)?.into_state()?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = restored;
        Ok(())
    }

    fn current_iteration(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iteration
    }

    fn total_iterations(&self) -> u64 {
        let seed_len = self
            .seed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let restriction = if state.one_stage_only {
            Some(state.current_stage())
        } else {
            None
        };
        accounting::total_iterations(seed_len, restriction)
    }

    fn input_info(&self) -> InputInfo {
        let seed = self.seed.read().unwrap_or_else(PoisonError::into_inner);
        InputInfo {
            num_inputs: 1,
            sizes: vec![seed.len()],
        }
    }

    fn set_input(&self, new_input: Vec<u8>) -> Result<(), MutatorError> {
        let mut seed = self
            .seed
            .write()
            .map_err(|_| MutatorError::Guard("seed lock poisoned".to_string()))?;
        seed.replace(new_input);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn engine_with_bits(seed: &[u8], num_bits: Option<u64>) -> BitFlipEngine {
        BitFlipEngine::new(
            MutatorOptions { num_bits },
            seed.to_vec(),
        )
        .expect("valid construction options")
    }

    /// Runs the engine dry and returns every produced mutant in order.
    fn drain(engine: &BitFlipEngine) -> Vec<Vec<u8>> {
        let seed_len = engine.input_info().sizes[0];
        let mut outputs = Vec::new();
        let mut buf = vec![0u8; seed_len];
        loop {
            match engine.mutate(&mut buf).expect("mutation must not error") {
                MutateOutcome::Mutated(len) => outputs.push(buf[..len].to_vec()),
                MutateOutcome::Exhausted => return outputs,
            }
        }
    }

    #[test]
    fn walking_bit_over_two_bytes_matches_the_reference_scenario() {
        let engine = engine_with_bits(b"AB", Some(1));
        assert_eq!(engine.total_iterations(), 16, "8 * 2 bit positions");

        let outputs = drain(&engine);
        assert_eq!(outputs.len(), 16, "exactly the closed-form count");
        assert_eq!(
            outputs[0],
            vec![0x41 ^ 0x80, 0x42],
            "first mutant flips bit 0 of byte 0"
        );
        assert_eq!(
            outputs[8],
            vec![0x41, 0x42 ^ 0x80],
            "ninth mutant begins walking byte 1"
        );
        assert_eq!(engine.current_iteration(), 16);
    }

    #[test]
    fn walking_byte_over_one_byte_complements_it_once() {
        let engine = engine_with_bits(&[0x5A], Some(8));
        assert_eq!(engine.total_iterations(), 1);

        let outputs = drain(&engine);
        assert_eq!(outputs, vec![vec![!0x5A]]);
    }

    #[test]
    fn full_sweep_consumes_stages_in_window_order() {
        let seed = b"AB";
        let engine = engine_with_bits(seed, None);
        // 16 + 15 + 13 + 2 + 1 + 0 (the 32-bit window does not fit).
        assert_eq!(engine.total_iterations(), 47);

        let outputs = drain(&engine);
        assert_eq!(outputs.len(), 47);

        // The first mutant of each stage shows that stage's window at
        // offset zero.
        let diff = |m: &[u8]| -> Vec<u8> { m.iter().zip(seed).map(|(a, b)| a ^ b).collect() };
        assert_eq!(diff(&outputs[0]), vec![0x80, 0x00], "1-bit stage");
        assert_eq!(diff(&outputs[16]), vec![0xC0, 0x00], "2-bit stage");
        assert_eq!(diff(&outputs[31]), vec![0xF0, 0x00], "4-bit stage");
        assert_eq!(diff(&outputs[44]), vec![0xFF, 0x00], "byte stage");
        assert_eq!(diff(&outputs[46]), vec![0xFF, 0xFF], "2-byte stage");
    }

    #[test]
    fn sweep_skips_stages_an_input_is_too_short_for() {
        // One byte: the 16- and 32-bit windows contribute nothing.
        let engine = engine_with_bits(&[0xFF], None);
        assert_eq!(engine.total_iterations(), 8 + 7 + 5 + 1);
        assert_eq!(drain(&engine).len() as u64, engine.total_iterations());
    }

    #[test]
    fn exhaustion_is_idempotent() {
        let engine = engine_with_bits(&[7], Some(8));
        let mut buf = [0u8; 1];
        assert!(matches!(
            engine.mutate(&mut buf),
            Ok(MutateOutcome::Mutated(1))
        ));
        for _ in 0..3 {
            assert!(matches!(
                engine.mutate(&mut buf),
                Ok(MutateOutcome::Exhausted)
            ));
        }
        assert_eq!(
            engine.current_iteration(),
            1,
            "exhausted calls must not count as produced mutations"
        );
    }

    #[test]
    fn undersized_buffer_is_an_error_and_leaves_state_alone() {
        let engine = engine_with_bits(b"ABCD", Some(1));
        let reference = engine_with_bits(b"ABCD", Some(1));

        let mut small = [0u8; 3];
        match engine.mutate(&mut small) {
            Err(MutatorError::Capacity { needed: 4, got: 3 }) => {}
            other => panic!("expected a capacity error, got {other:?}"),
        }
        assert_eq!(engine.current_iteration(), 0);
        assert_eq!(
            drain(&engine),
            drain(&reference),
            "a rejected call must not perturb the sequence"
        );
    }

    #[test]
    fn snapshot_restore_resumes_the_exact_sequence() {
        let seed = b"xyz";
        let reference: Vec<Vec<u8>> = drain(&engine_with_bits(seed, None));

        for k in [0usize, 1, 7, 20, reference.len() - 1] {
            let engine = engine_with_bits(seed, None);
            let mut buf = vec![0u8; seed.len()];
            for _ in 0..k {
                engine.mutate(&mut buf).expect("prefix mutation");
            }
            let snapshot = engine.state_snapshot().expect("snapshot always encodes");

            let resumed = BitFlipEngine::with_snapshot(
                MutatorOptions::default(),
                &snapshot,
                seed.to_vec(),
            )
            .expect("snapshot must rehydrate");
            assert_eq!(resumed.current_iteration(), k as u64);
            assert_eq!(
                drain(&resumed),
                reference[k..].to_vec(),
                "suffix after restoring at {k} must match the uninterrupted run"
            );
        }
    }

    #[test]
    fn restoring_a_snapshot_restores_the_mode_too() {
        let engine = engine_with_bits(b"AB", Some(8));
        let snapshot = engine.state_snapshot().unwrap();

        // Construction said full sweep; the snapshot pins the byte stage.
        let resumed =
            BitFlipEngine::with_snapshot(MutatorOptions::default(), &snapshot, b"AB".to_vec())
                .unwrap();
        assert_eq!(resumed.total_iterations(), 2);
    }

    #[test]
    fn failed_restore_leaves_the_sequence_untouched() {
        let engine = engine_with_bits(b"AB", None);
        let reference = engine_with_bits(b"AB", None);
        let mut buf = [0u8; 2];
        engine.mutate(&mut buf).unwrap();
        reference.mutate(&mut buf).unwrap();

        for bad in [
            "garbage",
            "{\"version\":99,\"iteration\":0}",
            "{\"version\":1,\"iteration\":0,\"num_bits\":3}",
            "{\"version\":1,\"iteration\":0,\"stage\":9}",
        ] {
            assert!(engine.restore_snapshot(bad).is_err(), "{bad} must fail");
        }
        assert_eq!(
            drain(&engine),
            drain(&reference),
            "failed restores must not partially mutate state"
        );
    }

    #[test]
    fn snapshot_survives_a_checkpoint_file() {
        let engine = engine_with_bits(b"checkpointed", Some(2));
        let mut buf = [0u8; 12];
        for _ in 0..10 {
            engine.mutate(&mut buf).unwrap();
        }

        let dir = tempfile::tempdir().expect("temp dir for checkpoint");
        let path = dir.path().join("bitwalk.state");
        std::fs::write(&path, engine.state_snapshot().unwrap()).expect("write checkpoint");

        let text = std::fs::read_to_string(&path).expect("read checkpoint");
        let resumed = BitFlipEngine::with_snapshot(
            MutatorOptions::default(),
            &text,
            b"checkpointed".to_vec(),
        )
        .expect("checkpoint file must rehydrate");
        assert_eq!(resumed.current_iteration(), 10);
        assert_eq!(drain(&resumed), drain(&engine));
    }

    #[test]
    fn invalid_num_bits_fails_construction() {
        let result = BitFlipEngine::new(
            MutatorOptions { num_bits: Some(3) },
            vec![0u8; 4],
        );
        assert!(matches!(result, Err(MutatorError::Config(_))));
    }

    #[test]
    fn set_input_replaces_the_seed_without_resetting_progress() {
        let engine = engine_with_bits(b"AAAA", Some(1));
        let mut buf = [0u8; 4];
        for _ in 0..5 {
            engine.mutate(&mut buf).unwrap();
        }

        engine.set_input(b"ZZ".to_vec()).unwrap();
        assert_eq!(engine.input_info().sizes, vec![2]);
        assert_eq!(
            engine.current_iteration(),
            5,
            "continuation semantics: the counter carries over"
        );
        assert_eq!(engine.total_iterations(), 16, "totals track the new length");

        // Cursor 5 is still in range for the shorter seed; the walk continues
        // from there instead of starting over.
        let mut out = [0u8; 2];
        match engine.mutate(&mut out).unwrap() {
            MutateOutcome::Mutated(2) => {
                assert_eq!(out, [b'Z' ^ (0x80 >> 5), b'Z']);
            }
            other => panic!("expected a mutant of the new seed, got {other:?}"),
        }
    }

    #[test]
    fn input_info_reports_the_single_owned_seed() {
        let engine = engine_with_bits(b"seed bytes", None);
        let info = engine.input_info();
        assert_eq!(info.num_inputs, 1);
        assert_eq!(info.sizes, vec![10]);
    }

    #[test]
    fn help_text_names_the_num_bits_option() {
        assert!(BitFlipEngine::help().contains("num_bits"));
        for bits in ["1", "2", "4", "8", "16", "32"] {
            assert!(BitFlipEngine::help().contains(bits));
        }
    }

    #[test]
    fn thread_safe_calls_share_one_engine_without_losing_mutations() {
        let seed = vec![0xA5u8; 8];
        let engine = Arc::new(engine_with_bits(&seed, None));
        let total = engine.total_iterations();

        let produced: u64 = std::thread::scope(|scope| {
            let mut workers = Vec::new();
            for _ in 0..4 {
                let engine = Arc::clone(&engine);
                let seed_len = seed.len();
                workers.push(scope.spawn(move || {
                    let mut buf = vec![0u8; seed_len];
                    let mut produced = 0u64;
                    loop {
                        match engine
                            .mutate_extended(&mut buf, MutateFlags::THREAD_SAFE)
                            .expect("guarded mutation must not error")
                        {
                            MutateOutcome::Mutated(_) => produced += 1,
                            MutateOutcome::Exhausted => return produced,
                        }
                    }
                }));
            }
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });

        assert_eq!(
            produced, total,
            "every mutation must be produced exactly once across threads"
        );
        assert_eq!(engine.current_iteration(), total);
    }
}

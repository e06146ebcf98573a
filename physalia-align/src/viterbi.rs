//! The three-dimensional Viterbi lattice.
//!
//! # Model
//!
//! A cell `(state, pos, mutator-state)` holds the log-probability of the
//! best path that leaves the machine in `state` after the mutator has
//! accounted for the first `pos` observed symbols. The mutator state records
//! the last channel operation:
//!
//! - **S** — the previous observed symbol was a (possibly substituted) emission
//! - **D** — the previous emission was deleted; no observed symbol consumed
//! - **T(k)** — mid tandem duplication, re-emitting the base `k` places back
//!   in the state's left context
//!
//! Emissions advance `pos` and the machine state; deletions advance only the
//! machine state; duplications advance only `pos`, counting `k` down to zero.
//! Null machine transitions advance neither and are folded in within one
//! position, which is why states are filled in null-closure topological
//! order.
//!
//! The lattice is filled once at construction and borrowed immutably by
//! [`ViterbiAligner::traceback`], which recomputes each cell's candidates
//! instead of storing backpointer planes.

use log::debug;

use physalia_core::logspace::{is_finite_log, LOG_ZERO};
use physalia_core::{PhysaliaError, Result};
use physalia_machine::{InputModel, Machine, MutatorParams, StateIdx};

use crate::scores::MachineScores;

/// Flat indices of the fixed mutator states; `T(k)` lives at `MUT_T0 + k`.
const MUT_S: usize = 0;
const MUT_D: usize = 1;
const MUT_T0: usize = 2;

/// Mutator state of a lattice cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutState {
    /// Substitute / match: one observed symbol consumed as an emission.
    Sub,
    /// Delete: the previous emission produced no observed symbol.
    Del,
    /// Tandem duplication in progress, `k` bases of context still to re-emit
    /// after the current one.
    Dup(usize),
}

impl MutState {
    fn index(self) -> usize {
        match self {
            MutState::Sub => MUT_S,
            MutState::Del => MUT_D,
            MutState::Dup(k) => MUT_T0 + k,
        }
    }
}

/// Batch Viterbi alignment of one observed sequence against a machine.
///
/// Construction tokenizes the sequence, precomputes score tables, fills the
/// lattice, and resolves the terminal cell; it fails with
/// [`PhysaliaError::Unalignable`] if no end state is reachable with finite
/// log-probability. The machine, mutator, and observed sequence are borrowed
/// for the engine's lifetime; the lattice is owned exclusively.
#[derive(Debug)]
pub struct ViterbiAligner<'a> {
    machine: &'a Machine,
    params: &'a MutatorParams,
    scores: MachineScores,
    seq: Vec<usize>,
    cell: Vec<f64>,
    n_states: usize,
    seq_len: usize,
    width: usize,
    loglike: f64,
    best_end: (StateIdx, usize),
}

impl<'a> ViterbiAligner<'a> {
    /// Align `observed` against `machine` under the given input prior and
    /// mutation model.
    ///
    /// # Errors
    ///
    /// - [`PhysaliaError::InvalidInput`] if the machine has no states or
    ///   `observed` contains a symbol outside the mutator's output alphabet
    /// - [`PhysaliaError::NullCycle`] if the machine's null transitions are
    ///   cyclic
    /// - [`PhysaliaError::Unalignable`] if no end state has finite
    ///   log-probability after the final observed symbol
    pub fn new(
        machine: &'a Machine,
        input_model: &InputModel,
        params: &'a MutatorParams,
        observed: &[u8],
    ) -> Result<Self> {
        if machine.n_states() == 0 {
            return Err(PhysaliaError::InvalidInput(
                "machine has no states".into(),
            ));
        }
        let seq = observed
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                params.alphabet().index_of(c).ok_or_else(|| {
                    PhysaliaError::InvalidInput(format!(
                        "observed symbol {:?} at position {i} is not in the output alphabet",
                        c as char
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let scores = MachineScores::new(machine, input_model, params)?;
        let order = machine.null_topological_order()?;

        let n_states = machine.n_states();
        let seq_len = seq.len();
        let width = params.max_dup_len() + 2;
        let mut cell = vec![LOG_ZERO; n_states * (seq_len + 1) * width];
        cell[width * machine.start_state()] = 0.0;

        fill_lattice(&mut cell, &scores, params, &order, &seq, n_states, width);

        let mut aligner = Self {
            machine,
            params,
            scores,
            seq,
            cell,
            n_states,
            seq_len,
            width,
            loglike: LOG_ZERO,
            best_end: (machine.start_state(), MUT_S),
        };
        let (loglike, best_end) = aligner.terminate()?;
        aligner.loglike = loglike;
        aligner.best_end = best_end;
        debug!(
            "aligned {} observed symbols over {} states: loglike {:.4}",
            seq_len, n_states, loglike
        );
        Ok(aligner)
    }

    /// Log-probability of the best path, including the mutator's terminal
    /// mass.
    pub fn loglike(&self) -> f64 {
        self.loglike
    }

    /// The log-probability stored at one lattice cell.
    ///
    /// # Panics
    ///
    /// Panics if `state`, `pos`, or the duplication index is out of range.
    pub fn log_cell(&self, state: StateIdx, pos: usize, mut_state: MutState) -> f64 {
        let m = mut_state.index();
        assert!(m < self.width && state < self.n_states && pos <= self.seq_len);
        self.get(state, pos, m)
    }

    /// Maximum-likelihood input string, reconstructed by walking the filled
    /// lattice backward from the terminal cell.
    ///
    /// Input symbols are collected from the machine transitions the walk
    /// crosses (emissions, deletions, and null steps); duplication steps
    /// cross no transition. Ties are resolved toward the predecessor listed
    /// first in the machine's transition order, matching the fill.
    ///
    /// # Errors
    ///
    /// Returns an error if the lattice is corrupt (a finite cell with no
    /// predecessor achieving its score).
    pub fn traceback(&self) -> Result<String> {
        let (mut state, mut pos, mut m) = (self.best_end.0, self.seq_len, self.best_end.1);
        let mut out: Vec<u8> = Vec::new();
        let mut steps = 0usize;

        while !(state == self.machine.start_state() && pos == 0 && m == MUT_S) {
            steps += 1;
            if steps > self.cell.len() {
                return Err(PhysaliaError::Other(
                    "viterbi traceback did not terminate".into(),
                ));
            }
            let v = self.get(state, pos, m);
            if !is_finite_log(v) {
                return Err(self.corrupt(state, pos, m));
            }

            let ss = self.scores.state(state);
            let mut next: Option<(StateIdx, usize, usize, Option<u8>)> = None;

            match m {
                MUT_S => {
                    if pos > 0 {
                        let x = self.seq[pos - 1];
                        'emit: for e in &ss.emit {
                            let Some(base) = e.base else { continue };
                            let step = e.score + self.params.log_sub(base, x);
                            for sm in 0..self.width {
                                if self.get(e.src, pos - 1, sm) + step == v {
                                    next = Some((e.src, pos - 1, sm, e.input));
                                    break 'emit;
                                }
                            }
                        }
                    }
                    if next.is_none() {
                        for n in &ss.null {
                            if self.get(n.src, pos, MUT_S) + n.score == v {
                                next = Some((n.src, pos, MUT_S, n.input));
                                break;
                            }
                        }
                    }
                }
                MUT_D => {
                    'emit: for e in &ss.emit {
                        let step = e.score + self.params.log_del();
                        for sm in 0..self.width {
                            if self.get(e.src, pos, sm) + step == v {
                                next = Some((e.src, pos, sm, e.input));
                                break 'emit;
                            }
                        }
                    }
                    if next.is_none() {
                        for n in &ss.null {
                            if self.get(n.src, pos, MUT_D) + n.score == v {
                                next = Some((n.src, pos, MUT_D, n.input));
                                break;
                            }
                        }
                    }
                }
                t => {
                    let k = t - MUT_T0;
                    let x = self.seq[pos - 1];
                    let base = ss.left_context[ss.left_context.len() - 1 - k];
                    let sub = self.params.log_sub(base, x);
                    for sm in [MUT_S, MUT_D] {
                        if self.get(state, pos - 1, sm) + self.params.log_dup(k) + sub == v {
                            next = Some((state, pos - 1, sm, None));
                            break;
                        }
                    }
                    if next.is_none()
                        && k + 1 < self.kmax(state)
                        && self.get(state, pos - 1, t + 1) + sub == v
                    {
                        next = Some((state, pos - 1, t + 1, None));
                    }
                }
            }

            let Some((ns, np, nm, input)) = next else {
                return Err(self.corrupt(state, pos, m));
            };
            if let Some(c) = input {
                out.push(c);
            }
            (state, pos, m) = (ns, np, nm);
        }

        out.reverse();
        String::from_utf8(out)
            .map_err(|_| PhysaliaError::Other("input symbols are not valid UTF-8".into()))
    }

    fn terminate(&self) -> Result<(f64, (StateIdx, usize))> {
        let mut best = LOG_ZERO;
        let mut best_end = None;
        for (s, state) in self.machine.states().iter().enumerate() {
            if !state.is_end {
                continue;
            }
            for m in [MUT_S, MUT_D] {
                let v = self.get(s, self.seq_len, m) + self.params.log_end();
                if v > best {
                    best = v;
                    best_end = Some((s, m));
                }
            }
        }
        match best_end {
            Some(be) if is_finite_log(best) => Ok((best, be)),
            _ => Err(PhysaliaError::Unalignable),
        }
    }

    fn corrupt(&self, state: StateIdx, pos: usize, m: usize) -> PhysaliaError {
        PhysaliaError::Other(format!(
            "viterbi lattice is corrupt: no predecessor for state {} at position {pos} (mutator state {m})",
            self.machine.state(state).name
        ))
    }

    fn index(&self, state: StateIdx, pos: usize, m: usize) -> usize {
        self.width * (pos * self.n_states + state) + m
    }

    fn get(&self, state: StateIdx, pos: usize, m: usize) -> f64 {
        self.cell[self.index(state, pos, m)]
    }

    fn kmax(&self, state: StateIdx) -> usize {
        self.params
            .max_dup_len()
            .min(self.scores.state(state).left_context.len())
    }
}

/// Single forward pass over the lattice.
///
/// Positions outermost; states in null-closure topological order so that
/// scores propagated along null transitions within a position are final
/// before successors read them; S before D within a state so that a
/// deletion may follow an emission into the same state.
fn fill_lattice(
    cell: &mut [f64],
    scores: &MachineScores,
    params: &MutatorParams,
    order: &[StateIdx],
    seq: &[usize],
    n_states: usize,
    width: usize,
) {
    let idx = |state: StateIdx, pos: usize, m: usize| width * (pos * n_states + state) + m;
    let max_dup = params.max_dup_len();

    for pos in 0..=seq.len() {
        for &state in order {
            let ss = scores.state(state);
            let kmax = max_dup.min(ss.left_context.len());

            // S: an emission consumes one observed symbol
            let mut best_s = LOG_ZERO;
            if pos > 0 {
                let x = seq[pos - 1];
                for e in &ss.emit {
                    let Some(base) = e.base else { continue };
                    let mut src_best = LOG_ZERO;
                    for m in 0..width {
                        src_best = src_best.max(cell[idx(e.src, pos - 1, m)]);
                    }
                    let cand = src_best + e.score + params.log_sub(base, x);
                    if cand > best_s {
                        best_s = cand;
                    }
                }
            }
            for n in &ss.null {
                let cand = cell[idx(n.src, pos, MUT_S)] + n.score;
                if cand > best_s {
                    best_s = cand;
                }
            }
            let i = idx(state, pos, MUT_S);
            if best_s > cell[i] {
                // the seeded start cell keeps its 0.0
                cell[i] = best_s;
            }

            // D: a deletion consumes no observed symbol; sources sit at the
            // same position
            let mut best_d = LOG_ZERO;
            for e in &ss.emit {
                let mut src_best = LOG_ZERO;
                for m in 0..width {
                    src_best = src_best.max(cell[idx(e.src, pos, m)]);
                }
                let cand = src_best + e.score + params.log_del();
                if cand > best_d {
                    best_d = cand;
                }
            }
            for n in &ss.null {
                let cand = cell[idx(n.src, pos, MUT_D)] + n.score;
                if cand > best_d {
                    best_d = cand;
                }
            }
            cell[idx(state, pos, MUT_D)] = best_d;

            // T(k): a duplication of total length k+1 starts from S or D and
            // counts k down to zero; the machine state stays put
            if pos > 0 {
                let x = seq[pos - 1];
                for k in 0..kmax {
                    let base = ss.left_context[ss.left_context.len() - 1 - k];
                    let sub = params.log_sub(base, x);
                    let mut best_t = LOG_ZERO;
                    for m in [MUT_S, MUT_D] {
                        let cand = cell[idx(state, pos - 1, m)] + params.log_dup(k) + sub;
                        if cand > best_t {
                            best_t = cand;
                        }
                    }
                    if k + 1 < kmax {
                        let cand = cell[idx(state, pos - 1, MUT_T0 + k + 1)] + sub;
                        if cand > best_t {
                            best_t = cand;
                        }
                    }
                    cell[idx(state, pos, MUT_T0 + k)] = best_t;
                }
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use physalia_machine::symbols::{BIT0, BIT1};
    use physalia_machine::OutputAlphabet;
    use proptest::prelude::*;

    fn bit_word(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(prop_oneof![Just(BIT0), Just(BIT1)], 0..=max_len)
    }

    proptest! {
        #[test]
        fn noise_free_round_trip(word in bit_word(40)) {
            let mut m = Machine::new();
            let s = m.add_state("loop", true);
            m.add_transition(s, s, Some(BIT0), Some(BIT0)).unwrap();
            m.add_transition(s, s, Some(BIT1), Some(BIT1)).unwrap();
            let input_model =
                InputModel::with_control_prob(&[BIT0, BIT1], 0.0).unwrap();
            let params = MutatorParams::noiseless(OutputAlphabet::bits());

            let aligner = ViterbiAligner::new(&m, &input_model, &params, &word).unwrap();
            let traced = aligner.traceback().unwrap();
            prop_assert_eq!(traced.as_bytes(), word.as_slice());
            let expected = word.len() as f64 * 0.5_f64.ln();
            prop_assert!((aligner.loglike() - expected).abs() < 1e-9);
        }

        #[test]
        fn loglike_is_deterministic(word in bit_word(30)) {
            let mut m = Machine::new();
            let s = m.add_state("loop", true);
            m.add_transition(s, s, Some(BIT0), Some(BIT0)).unwrap();
            m.add_transition(s, s, Some(BIT1), Some(BIT1)).unwrap();
            let input_model =
                InputModel::with_control_prob(&[BIT0, BIT1], 0.05).unwrap();
            let params =
                MutatorParams::from_rates(OutputAlphabet::bits(), 0.02, 0.02, &[]).unwrap();

            if word.is_empty() {
                return Ok(());
            }
            let a = ViterbiAligner::new(&m, &input_model, &params, &word).unwrap();
            let b = ViterbiAligner::new(&m, &input_model, &params, &word).unwrap();
            prop_assert_eq!(a.loglike(), b.loglike());
            prop_assert_eq!(a.traceback().unwrap(), b.traceback().unwrap());
        }
    }
}

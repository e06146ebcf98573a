//! Precomputed score tables for the Viterbi fill.
//!
//! The lattice recurrences consume predecessors, not successors, so the
//! machine's forward transitions are inverted once per alignment into
//! per-destination lists of [`IncomingTransScore`] records, split into emit
//! and null predecessors. Each destination also carries its *left context*:
//! the most recent output bases on any path reaching it, which tandem
//! duplications re-emit. The machine contract guarantees the left context
//! is path-independent for reachable states; this is not verified here.

use physalia_core::{PhysaliaError, Result};
use physalia_machine::{InputModel, Machine, MutatorParams, StateIdx};

/// One scored incoming transition.
#[derive(Debug, Clone)]
pub struct IncomingTransScore {
    /// Source state.
    pub src: StateIdx,
    /// `log P_input(input) + ln weight`.
    pub score: f64,
    /// Input symbol consumed, if any.
    pub input: Option<u8>,
    /// Emitted base as an output-alphabet index; `None` for null transitions.
    pub base: Option<usize>,
}

/// Per-destination score tables.
#[derive(Debug, Clone, Default)]
pub struct StateScores {
    /// Output-alphabet indices of the last bases emitted on any path
    /// reaching this state, oldest first, capped at the mutator's maximum
    /// duplication length.
    pub left_context: Vec<usize>,
    /// Incoming emit transitions, ordered by source state then declaration.
    pub emit: Vec<IncomingTransScore>,
    /// Incoming null transitions, same order.
    pub null: Vec<IncomingTransScore>,
}

/// Score tables for every state of a machine.
#[derive(Debug, Clone)]
pub struct MachineScores {
    state_scores: Vec<StateScores>,
}

impl MachineScores {
    /// Invert the machine's transitions into predecessor lists and compute
    /// left contexts.
    ///
    /// Predecessor order (source state index, then transition declaration
    /// order) is the tie-break order of the aligner.
    ///
    /// # Errors
    ///
    /// Returns an error if a transition emits a symbol outside the
    /// mutator's output alphabet.
    pub fn new(machine: &Machine, input_model: &InputModel, params: &MutatorParams) -> Result<Self> {
        let mut state_scores = vec![StateScores::default(); machine.n_states()];

        for (src, state) in machine.states().iter().enumerate() {
            for t in &state.trans {
                let base = match t.output {
                    None => None,
                    Some(c) => Some(params.alphabet().index_of(c).ok_or_else(|| {
                        PhysaliaError::InvalidInput(format!(
                            "state {} emits {:?}, not in the output alphabet",
                            state.name, c as char
                        ))
                    })?),
                };
                let record = IncomingTransScore {
                    src,
                    score: input_model.log_prob(t.input) + t.weight.ln(),
                    input: t.input,
                    base,
                };
                let dest = &mut state_scores[t.dest];
                if base.is_some() {
                    dest.emit.push(record);
                } else {
                    dest.null.push(record);
                }
            }
        }

        Self::fill_left_contexts(machine, params, &mut state_scores)?;
        Ok(Self { state_scores })
    }

    /// Breadth-first walk from the start state, extending each context by
    /// the emitted base and keeping the most recent `max_dup_len` entries.
    /// The first context to reach a state wins; the machine contract makes
    /// later arrivals identical.
    fn fill_left_contexts(
        machine: &Machine,
        params: &MutatorParams,
        state_scores: &mut [StateScores],
    ) -> Result<()> {
        let cap = params.max_dup_len();
        let mut visited = vec![false; machine.n_states()];
        let mut queue = std::collections::VecDeque::new();
        visited[machine.start_state()] = true;
        queue.push_back(machine.start_state());

        while let Some(s) = queue.pop_front() {
            let ctx = state_scores[s].left_context.clone();
            for t in &machine.state(s).trans {
                if visited[t.dest] {
                    continue;
                }
                let mut next = ctx.clone();
                if let Some(c) = t.output {
                    let idx = params.alphabet().index_of(c).ok_or_else(|| {
                        PhysaliaError::InvalidInput(format!(
                            "state {} emits {:?}, not in the output alphabet",
                            machine.state(s).name,
                            c as char
                        ))
                    })?;
                    next.push(idx);
                    if next.len() > cap {
                        next.remove(0);
                    }
                }
                state_scores[t.dest].left_context = next;
                visited[t.dest] = true;
                queue.push_back(t.dest);
            }
        }
        Ok(())
    }

    /// Score tables for `state`.
    pub fn state(&self, state: StateIdx) -> &StateScores {
        &self.state_scores[state]
    }
}

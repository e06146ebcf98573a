//! The finite-state transducer.
//!
//! States form a directed graph with input/output-labeled edges. States are
//! stored in an ordered sequence and referenced by integer index; transitions
//! are owned by their source state. Transitions with a null (`None`) output
//! are *null transitions*; the machine contract requires the null-transition
//! subgraph to be acyclic so that the null closure of every state terminates.

use core::fmt;

use physalia_core::{PhysaliaError, Result};

/// Index of a state in a [`Machine`].
pub type StateIdx = usize;

/// A labeled edge: consume `input` (or nothing), emit `output` (or nothing),
/// move to `dest`.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineTransition {
    /// Input symbol consumed, or `None` for a null input.
    pub input: Option<u8>,
    /// Output symbol emitted, or `None` for a null output.
    pub output: Option<u8>,
    /// Destination state.
    pub dest: StateIdx,
    /// Transition probability; 1.0 for deterministic machines.
    pub weight: f64,
}

impl fmt::Display for MachineTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = |s: Option<u8>| s.map_or('_', |c| c as char);
        write!(
            f,
            "{}/{} -> #{}",
            sym(self.input),
            sym(self.output),
            self.dest
        )
    }
}

/// A named state and its outgoing transitions.
#[derive(Debug, Clone)]
pub struct MachineState {
    /// Human-readable state name, used in diagnostics.
    pub name: String,
    /// Whether decoding and alignment may terminate here.
    pub is_end: bool,
    /// Outgoing transitions, in declaration order. Order is significant:
    /// ties in the aligner are broken toward the earlier transition.
    pub trans: Vec<MachineTransition>,
}

impl MachineState {
    /// True iff this state has outgoing transitions and every one of them
    /// emits an output symbol.
    pub fn emits_output(&self) -> bool {
        !self.trans.is_empty() && self.trans.iter().all(|t| t.output.is_some())
    }

    /// True iff this state has outgoing transitions and every one of them
    /// consumes an input symbol.
    pub fn exits_with_input(&self) -> bool {
        !self.trans.is_empty() && self.trans.iter().all(|t| t.input.is_some())
    }
}

/// A finite-state transducer with a distinguished start state.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    states: Vec<MachineState>,
    start: StateIdx,
}

impl Machine {
    /// An empty machine. Add states before use; the first state added is
    /// the start state unless [`set_start`](Self::set_start) overrides it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a state and return its index.
    pub fn add_state(&mut self, name: impl Into<String>, is_end: bool) -> StateIdx {
        self.states.push(MachineState {
            name: name.into(),
            is_end,
            trans: Vec::new(),
        });
        self.states.len() - 1
    }

    /// Add a transition with weight 1.0.
    ///
    /// # Errors
    ///
    /// Returns an error if either state index is out of range.
    pub fn add_transition(
        &mut self,
        src: StateIdx,
        dest: StateIdx,
        input: Option<u8>,
        output: Option<u8>,
    ) -> Result<()> {
        self.add_weighted_transition(src, dest, input, output, 1.0)
    }

    /// Add a transition with an explicit probability weight.
    ///
    /// # Errors
    ///
    /// Returns an error if either state index is out of range or the weight
    /// is not in `(0, 1]`.
    pub fn add_weighted_transition(
        &mut self,
        src: StateIdx,
        dest: StateIdx,
        input: Option<u8>,
        output: Option<u8>,
        weight: f64,
    ) -> Result<()> {
        if src >= self.states.len() || dest >= self.states.len() {
            return Err(PhysaliaError::InvalidInput(format!(
                "transition {src} -> {dest} references a state out of range (machine has {})",
                self.states.len()
            )));
        }
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(PhysaliaError::InvalidInput(format!(
                "transition weight {weight} out of (0, 1]"
            )));
        }
        self.states[src].trans.push(MachineTransition {
            input,
            output,
            dest,
            weight,
        });
        Ok(())
    }

    /// Override the start state (defaults to the first state added).
    ///
    /// # Errors
    ///
    /// Returns an error if `start` is out of range.
    pub fn set_start(&mut self, start: StateIdx) -> Result<()> {
        if start >= self.states.len() {
            return Err(PhysaliaError::InvalidInput(format!(
                "start state {start} out of range"
            )));
        }
        self.start = start;
        Ok(())
    }

    /// Number of states.
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// The distinguished start state.
    pub fn start_state(&self) -> StateIdx {
        self.start
    }

    /// The state at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    pub fn state(&self, idx: StateIdx) -> &MachineState {
        &self.states[idx]
    }

    /// All states in index order.
    pub fn states(&self) -> &[MachineState] {
        &self.states
    }

    /// States ordered so that every null-transition predecessor comes before
    /// its successors; ties broken by state index.
    ///
    /// This is the fill order for the Viterbi lattice: scores propagated
    /// along null transitions within one observed position are final by the
    /// time a successor reads them.
    ///
    /// # Errors
    ///
    /// Returns [`PhysaliaError::NullCycle`] if the null-transition subgraph
    /// is cyclic, which violates the machine contract.
    pub fn null_topological_order(&self) -> Result<Vec<StateIdx>> {
        let n = self.states.len();
        let mut indegree = vec![0usize; n];
        for state in &self.states {
            for t in &state.trans {
                if t.output.is_none() {
                    indegree[t.dest] += 1;
                }
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut placed = vec![false; n];
        for _ in 0..n {
            let next = (0..n).find(|&s| !placed[s] && indegree[s] == 0);
            let Some(s) = next else {
                let stuck = (0..n).find(|&s| !placed[s]).unwrap_or(0);
                return Err(PhysaliaError::NullCycle(self.states[stuck].name.clone()));
            };
            placed[s] = true;
            order.push(s);
            for t in &self.states[s].trans {
                if t.output.is_none() {
                    indegree[t.dest] -= 1;
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{BIT0, BIT1};

    fn identity_machine() -> Machine {
        let mut m = Machine::new();
        let s = m.add_state("loop", true);
        m.add_transition(s, s, Some(BIT0), Some(BIT0)).unwrap();
        m.add_transition(s, s, Some(BIT1), Some(BIT1)).unwrap();
        m
    }

    #[test]
    fn builder_indices_and_start() {
        let mut m = Machine::new();
        let a = m.add_state("a", false);
        let b = m.add_state("b", true);
        assert_eq!((a, b), (0, 1));
        assert_eq!(m.start_state(), 0);
        m.set_start(b).unwrap();
        assert_eq!(m.start_state(), 1);
        assert!(m.set_start(7).is_err());
    }

    #[test]
    fn rejects_out_of_range_transition() {
        let mut m = Machine::new();
        let a = m.add_state("a", false);
        assert!(m.add_transition(a, 3, None, None).is_err());
    }

    #[test]
    fn rejects_bad_weight() {
        let mut m = Machine::new();
        let a = m.add_state("a", false);
        assert!(m.add_weighted_transition(a, a, None, Some(b'A'), 0.0).is_err());
        assert!(m.add_weighted_transition(a, a, None, Some(b'A'), 1.5).is_err());
    }

    #[test]
    fn emits_output_observation() {
        let m = identity_machine();
        assert!(m.state(0).emits_output());
        assert!(m.state(0).exits_with_input());

        let mut mixed = Machine::new();
        let a = mixed.add_state("a", false);
        let b = mixed.add_state("b", true);
        mixed.add_transition(a, b, Some(BIT0), Some(b'A')).unwrap();
        mixed.add_transition(a, b, Some(BIT1), None).unwrap();
        assert!(!mixed.state(a).emits_output());
        assert!(mixed.state(a).exits_with_input());
        // no outgoing transitions: emits nothing, consumes nothing
        assert!(!mixed.state(b).emits_output());
        assert!(!mixed.state(b).exits_with_input());
    }

    #[test]
    fn null_order_respects_chain() {
        // c --null--> a --null--> b, plus an emitting self-loop elsewhere
        let mut m = Machine::new();
        let a = m.add_state("a", false);
        let b = m.add_state("b", false);
        let c = m.add_state("c", false);
        let d = m.add_state("d", true);
        m.add_transition(c, a, Some(BIT0), None).unwrap();
        m.add_transition(a, b, Some(BIT1), None).unwrap();
        m.add_transition(b, d, None, Some(b'A')).unwrap();
        m.add_transition(d, d, Some(BIT0), Some(b'C')).unwrap();

        let order = m.null_topological_order().unwrap();
        let pos = |s: StateIdx| order.iter().position(|&x| x == s).unwrap();
        assert!(pos(c) < pos(a));
        assert!(pos(a) < pos(b));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn null_cycle_fails_loudly() {
        let mut m = Machine::new();
        let a = m.add_state("a", false);
        let b = m.add_state("b", false);
        m.add_transition(a, b, None, None).unwrap();
        m.add_transition(b, a, None, None).unwrap();
        let err = m.null_topological_order().unwrap_err();
        assert!(matches!(err, PhysaliaError::NullCycle(_)));
    }

    #[test]
    fn emit_cycles_are_fine() {
        let m = identity_machine();
        assert_eq!(m.null_topological_order().unwrap(), vec![0]);
    }

    #[test]
    fn transition_display() {
        let t = MachineTransition {
            input: Some(BIT0),
            output: None,
            dest: 2,
            weight: 1.0,
        };
        assert_eq!(t.to_string(), "0/_ -> #2");
    }
}

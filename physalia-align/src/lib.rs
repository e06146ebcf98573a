//! Viterbi alignment of noisy channel output against a transducer.
//!
//! Given a machine, an input-symbol prior, a mutator, and an observed
//! output sequence, [`ViterbiAligner`] recovers the maximum-likelihood
//! input string by dynamic programming over a
//! `state × position × mutator-state` lattice.
//!
//! # Quick start
//!
//! ```
//! use physalia_machine::{symbols, InputModel, Machine, MutatorParams, OutputAlphabet};
//! use physalia_align::ViterbiAligner;
//!
//! // Identity transducer: each input bit is emitted unchanged.
//! let mut m = Machine::new();
//! let s = m.add_state("loop", true);
//! m.add_transition(s, s, Some(symbols::BIT0), Some(symbols::BIT0)).unwrap();
//! m.add_transition(s, s, Some(symbols::BIT1), Some(symbols::BIT1)).unwrap();
//!
//! let input_model = InputModel::with_control_prob(&[symbols::BIT0, symbols::BIT1], 0.0).unwrap();
//! let params = MutatorParams::noiseless(OutputAlphabet::bits());
//!
//! let aligner = ViterbiAligner::new(&m, &input_model, &params, b"0110").unwrap();
//! assert_eq!(aligner.traceback().unwrap(), "0110");
//! ```

pub mod scores;
pub mod viterbi;

pub use scores::{IncomingTransScore, MachineScores, StateScores};
pub use viterbi::{MutState, ViterbiAligner};

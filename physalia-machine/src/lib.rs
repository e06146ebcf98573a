//! Transducer data model for the Physalia channel codec.
//!
//! A Physalia *machine* is a finite-state transducer whose transitions
//! consume input symbols (bits and control tokens) and emit output symbols
//! (bases). This crate provides the shared data model consumed by both the
//! batch Viterbi aligner (`physalia-align`) and the streaming decoder
//! (`physalia-decode`):
//!
//! - **Wire symbols** — reserved byte values and classification ([`symbols`])
//! - **Machine** — states, labeled transitions, null-closure ordering ([`machine`])
//! - **Input model** — prior over input symbols and control tokens ([`input_model`])
//! - **Mutator** — substitution/deletion/tandem-duplication channel parameters ([`mutator`])

pub mod input_model;
pub mod machine;
pub mod mutator;
pub mod symbols;

pub use input_model::InputModel;
pub use machine::{Machine, MachineState, MachineTransition, StateIdx};
pub use mutator::MutatorParams;
pub use symbols::OutputAlphabet;

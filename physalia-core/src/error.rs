//! Structured error types for the Physalia workspace.

use thiserror::Error;

/// Unified error type for all Physalia operations.
#[derive(Debug, Error)]
pub enum PhysaliaError {
    /// I/O error (failed sink write, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input (bad arguments, out-of-range probabilities, unknown symbols)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Viterbi termination found no end state with finite log-probability
    #[error("sequence cannot be aligned to the machine: no reachable end state")]
    Unalignable,

    /// Two hypothesis paths reached one state with different pending input queues
    #[error("state {state} has two possible input queues ({existing}, {incoming})")]
    QueueConflict {
        state: String,
        existing: String,
        incoming: String,
    },

    /// No hypothesis survived an observed output symbol
    #[error("can't decode {0:?}")]
    CannotDecode(char),

    /// The null-transition subgraph is cyclic, violating the machine contract
    #[error("null transitions do not terminate at state {0}")]
    NullCycle(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the Physalia workspace.
pub type Result<T> = std::result::Result<T, PhysaliaError>;

//! Reserved wire symbols and output alphabets.
//!
//! Four disjoint token classes travel on the wire: plain input symbols
//! (bits), delimiters ([`SOF`], [`EOF_SYM`]), indexed control tokens, and
//! the explicit null. Output symbols (bases) form a separate, configurable
//! [`OutputAlphabet`]. The byte assignments here are fixed and must match
//! between encoder and decoder.

use physalia_core::{PhysaliaError, Result};

/// Input bit zero.
pub const BIT0: u8 = b'0';

/// Input bit one.
pub const BIT1: u8 = b'1';

/// Start-of-frame delimiter.
pub const SOF: u8 = b'>';

/// End-of-frame delimiter.
pub const EOF_SYM: u8 = b'<';

/// Explicit null: no input consumed / no output emitted on a transition.
pub const NULL_SYM: u8 = b'_';

/// Indexed control tokens, in index order.
pub const CONTROL_TOKENS: &[u8] = b"!#$%&*+/=?@^~";

/// Whether `c` is one of the two input bit symbols.
pub fn is_bit(c: u8) -> bool {
    c == BIT0 || c == BIT1
}

/// Whether `c` is an indexed control token.
pub fn is_control(c: u8) -> bool {
    CONTROL_TOKENS.contains(&c)
}

/// Index of a control token, or `None` if `c` is not one.
pub fn control_index(c: u8) -> Option<usize> {
    CONTROL_TOKENS.iter().position(|&t| t == c)
}

/// The control token with the given index, if in range.
pub fn control_token(index: usize) -> Option<u8> {
    CONTROL_TOKENS.get(index).copied()
}

/// Whether the decoder recognizes `c` as an input-side wire byte: a bit,
/// the null, a delimiter, or a control token. Everything else is ignored
/// with a warning.
pub fn is_decodable(c: u8) -> bool {
    is_bit(c) || c == NULL_SYM || c == SOF || c == EOF_SYM || is_control(c)
}

/// An ordered set of output symbols (bases) the transducer emits and the
/// mutator operates on.
///
/// The substitution matrix and tandem-duplication scoring index bases by
/// their position in this alphabet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputAlphabet {
    symbols: Vec<u8>,
}

impl OutputAlphabet {
    /// Build an alphabet from distinct symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if `symbols` is empty or contains duplicates.
    pub fn new(symbols: &[u8]) -> Result<Self> {
        if symbols.is_empty() {
            return Err(PhysaliaError::InvalidInput(
                "output alphabet must not be empty".into(),
            ));
        }
        for (i, &s) in symbols.iter().enumerate() {
            if symbols[..i].contains(&s) {
                return Err(PhysaliaError::InvalidInput(format!(
                    "duplicate output symbol {:?}",
                    s as char
                )));
            }
        }
        Ok(Self {
            symbols: symbols.to_vec(),
        })
    }

    /// The DNA base alphabet `ACGT`.
    pub fn dna() -> Self {
        Self {
            symbols: b"ACGT".to_vec(),
        }
    }

    /// The binary output alphabet `01`, for machines that emit bits directly.
    pub fn bits() -> Self {
        Self {
            symbols: vec![BIT0, BIT1],
        }
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the alphabet is empty (never true for a constructed value).
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Index of a symbol, or `None` if it is not in the alphabet.
    pub fn index_of(&self, c: u8) -> Option<usize> {
        self.symbols.iter().position(|&s| s == c)
    }

    /// The symbol at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn symbol(&self, index: usize) -> u8 {
        self.symbols[index]
    }

    /// The symbols in index order.
    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }
}

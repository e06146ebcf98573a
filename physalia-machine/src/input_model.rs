//! Prior distribution over input symbols.
//!
//! The aligner scores each consumed input symbol under this model. The
//! convenience constructors split a single *control probability* uniformly
//! across the indexed control tokens and the remaining mass uniformly across
//! the plain input symbols.

use std::collections::BTreeMap;

use physalia_core::logspace::{ln_checked, LOG_ONE, LOG_ZERO};
use physalia_core::{PhysaliaError, Result};

use crate::symbols::{is_control, CONTROL_TOKENS, EOF_SYM, SOF};

/// A probability mass function over input symbols, stored in log-space.
///
/// Symbols absent from the model have probability zero; the null input
/// (a transition consuming nothing) has probability one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputModel {
    log_prob: BTreeMap<u8, f64>,
}

impl InputModel {
    /// Split `control_prob` uniformly across the indexed control tokens and
    /// `1 − control_prob` uniformly across `input_alphabet`.
    ///
    /// The frame delimiters get no mass: they mark endpoints, and interior
    /// mass would let the aligner hallucinate frame boundaries mid-sequence.
    /// Use [`with_delimited_controls`](Self::with_delimited_controls) for
    /// machines that legitimately re-emit delimiters.
    ///
    /// # Errors
    ///
    /// Returns an error if the alphabet is empty or contains a control
    /// token, or if `control_prob` is not in `[0, 1)`.
    pub fn with_control_prob(input_alphabet: &[u8], control_prob: f64) -> Result<Self> {
        Self::build(input_alphabet, control_prob, false)
    }

    /// Like [`with_control_prob`](Self::with_control_prob), but `SOF` and
    /// `EOF` share the control mass alongside the indexed control tokens.
    ///
    /// # Errors
    ///
    /// Same conditions as [`with_control_prob`](Self::with_control_prob).
    pub fn with_delimited_controls(input_alphabet: &[u8], control_prob: f64) -> Result<Self> {
        Self::build(input_alphabet, control_prob, true)
    }

    fn build(input_alphabet: &[u8], control_prob: f64, delimiters: bool) -> Result<Self> {
        if input_alphabet.is_empty() {
            return Err(PhysaliaError::InvalidInput(
                "input alphabet must not be empty".into(),
            ));
        }
        if !(0.0..1.0).contains(&control_prob) {
            return Err(PhysaliaError::InvalidInput(format!(
                "control probability {control_prob} out of [0, 1)"
            )));
        }
        for (i, &c) in input_alphabet.iter().enumerate() {
            if is_control(c) || c == SOF || c == EOF_SYM {
                return Err(PhysaliaError::InvalidInput(format!(
                    "input alphabet symbol {:?} is a reserved token",
                    c as char
                )));
            }
            if input_alphabet[..i].contains(&c) {
                return Err(PhysaliaError::InvalidInput(format!(
                    "duplicate input symbol {:?}",
                    c as char
                )));
            }
        }

        let mut log_prob = BTreeMap::new();
        let log_sym = ln_checked((1.0 - control_prob) / input_alphabet.len() as f64)?;
        for &c in input_alphabet {
            log_prob.insert(c, log_sym);
        }
        if control_prob > 0.0 {
            let n_ctrl = CONTROL_TOKENS.len() + if delimiters { 2 } else { 0 };
            let log_ctrl = ln_checked(control_prob / n_ctrl as f64)?;
            for &c in CONTROL_TOKENS {
                log_prob.insert(c, log_ctrl);
            }
            if delimiters {
                log_prob.insert(SOF, log_ctrl);
                log_prob.insert(EOF_SYM, log_ctrl);
            }
        }
        Ok(Self { log_prob })
    }

    /// Log-probability of consuming `sym`. The null input (`None`) costs
    /// nothing; symbols outside the model are impossible.
    pub fn log_prob(&self, sym: Option<u8>) -> f64 {
        match sym {
            None => LOG_ONE,
            Some(c) => self.log_prob.get(&c).copied().unwrap_or(LOG_ZERO),
        }
    }

    /// The modeled symbols and their log-probabilities, in byte order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, f64)> + '_ {
        self.log_prob.iter().map(|(&c, &lp)| (c, lp))
    }
}

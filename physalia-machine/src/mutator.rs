//! Channel mutation model: substitution, deletion, tandem duplication.
//!
//! # Model
//!
//! Each base the transducer emits passes through the mutator, which either
//! passes it on (possibly substituted), deletes it, or begins a tandem
//! duplication that re-emits the last `k + 1` bases of the emission history.
//! The per-emission event space is normalized: for every source base `a`,
//!
//! ```text
//! Σ_b P(sub a → b) + P(del) + Σ_k P(dup of length k+1) = 1
//! ```
//!
//! so each substitution entry carries the joint mass of choosing to emit
//! *and* producing `b`. All parameters are stored as natural logarithms.

use physalia_core::logspace::{ln_checked, LOG_ONE, LOG_ZERO};
use physalia_core::{PhysaliaError, Result};

use crate::symbols::OutputAlphabet;

/// Log-space mutation parameters over an output alphabet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MutatorParams {
    alphabet: OutputAlphabet,
    /// `log_sub[a][b]`: joint log-mass of emitting `b` given the machine
    /// emitted `a`. Rows sum (with deletion and duplication) to one.
    log_sub: Vec<Vec<f64>>,
    log_del: f64,
    /// `log_dup[k]`: log-probability of starting a tandem duplication of
    /// total length `k + 1`.
    log_dup: Vec<f64>,
    log_end: f64,
}

impl MutatorParams {
    /// Build a normalized mutator from scalar rates.
    ///
    /// `sub_rate` is the conditional probability that an emitted base is
    /// replaced by one of the other bases (split uniformly among them);
    /// `del_rate` deletes the base; `dup_rates[k]` starts a tandem
    /// duplication of total length `k + 1`. The end mass defaults to one;
    /// see [`with_end_prob`](Self::with_end_prob).
    ///
    /// # Errors
    ///
    /// Returns an error if any rate is outside `[0, 1]`, if deletion and
    /// duplication leave no emission mass, or if `sub_rate > 0` on a
    /// single-symbol alphabet.
    pub fn from_rates(
        alphabet: OutputAlphabet,
        sub_rate: f64,
        del_rate: f64,
        dup_rates: &[f64],
    ) -> Result<Self> {
        for &r in [sub_rate, del_rate].iter().chain(dup_rates) {
            if !(0.0..=1.0).contains(&r) {
                return Err(PhysaliaError::InvalidInput(format!(
                    "mutation rate {r} out of [0, 1]"
                )));
            }
        }
        let dup_total: f64 = dup_rates.iter().sum();
        let emit_mass = 1.0 - del_rate - dup_total;
        if emit_mass <= 0.0 {
            return Err(PhysaliaError::InvalidInput(format!(
                "deletion ({del_rate}) and duplication ({dup_total}) leave no emission mass"
            )));
        }
        let n = alphabet.len();
        if n == 1 && sub_rate > 0.0 {
            return Err(PhysaliaError::InvalidInput(
                "substitution is impossible on a single-symbol alphabet".into(),
            ));
        }

        let diag = ln_checked(emit_mass * (1.0 - sub_rate))?;
        let off = if sub_rate == 0.0 {
            LOG_ZERO
        } else {
            ln_checked(emit_mass * sub_rate / (n - 1) as f64)?
        };
        let log_sub = (0..n)
            .map(|a| (0..n).map(|b| if a == b { diag } else { off }).collect())
            .collect();
        let log_dup = dup_rates
            .iter()
            .map(|&r| ln_checked(r))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            alphabet,
            log_sub,
            log_del: ln_checked(del_rate)?,
            log_dup,
            log_end: LOG_ONE,
        })
    }

    /// The identity channel: every base passes through unchanged at no
    /// cost, and indels are impossible.
    pub fn noiseless(alphabet: OutputAlphabet) -> Self {
        let n = alphabet.len();
        let log_sub = (0..n)
            .map(|a| {
                (0..n)
                    .map(|b| if a == b { LOG_ONE } else { LOG_ZERO })
                    .collect()
            })
            .collect();
        Self {
            alphabet,
            log_sub,
            log_del: LOG_ZERO,
            log_dup: Vec::new(),
            log_end: LOG_ONE,
        }
    }

    /// Replace the terminal mass applied when alignment ends.
    ///
    /// # Errors
    ///
    /// Returns an error if `p` is not in `(0, 1]`.
    pub fn with_end_prob(mut self, p: f64) -> Result<Self> {
        if !(p > 0.0 && p <= 1.0) {
            return Err(PhysaliaError::InvalidInput(format!(
                "end probability {p} out of (0, 1]"
            )));
        }
        self.log_end = p.ln();
        Ok(self)
    }

    /// The output alphabet this mutator operates on.
    pub fn alphabet(&self) -> &OutputAlphabet {
        &self.alphabet
    }

    /// Longest tandem duplication the model permits (0 = none).
    pub fn max_dup_len(&self) -> usize {
        self.log_dup.len()
    }

    /// Joint log-mass of observing base index `to` where the machine
    /// emitted base index `from`.
    pub fn log_sub(&self, from: usize, to: usize) -> f64 {
        self.log_sub[from][to]
    }

    /// Log-probability of deleting an emitted base.
    pub fn log_del(&self) -> f64 {
        self.log_del
    }

    /// Log-probability of starting a tandem duplication of total length
    /// `k + 1`.
    pub fn log_dup(&self, k: usize) -> f64 {
        self.log_dup[k]
    }

    /// Terminal log-mass applied once at alignment end.
    pub fn log_end(&self) -> f64 {
        self.log_end
    }
}

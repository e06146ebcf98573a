//! Sinks for decoded input symbols.
//!
//! The decoder hands committed input symbols to a [`DecodeSink`].
//! [`TextWriter`] forwards them verbatim; [`BinaryWriter`] reassembles the
//! original byte stream from bit symbols, eight at a time.

use std::io::Write;

use log::{debug, warn};

use physalia_core::Result;
use physalia_machine::symbols::{control_index, is_control, BIT0, BIT1, EOF_SYM, SOF};

/// Receives decoded input symbols from a [`Decoder`](crate::Decoder).
pub trait DecodeSink {
    /// Accept a run of committed input symbols.
    ///
    /// # Errors
    ///
    /// Implementations propagate underlying write failures.
    fn write_symbols(&mut self, syms: &[u8]) -> Result<()>;
}

/// Writes decoded symbols through unchanged.
#[derive(Debug)]
pub struct TextWriter<W: Write> {
    inner: W,
}

impl<W: Write> TextWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> DecodeSink for TextWriter<W> {
    fn write_symbols(&mut self, syms: &[u8]) -> Result<()> {
        self.inner.write_all(syms)?;
        Ok(())
    }
}

/// Packs decoded input bits into bytes.
///
/// Bit symbols accumulate in an eight-slot buffer that flushes as one byte
/// when full. With `msb0` unset (the default), bit `n` of a group lands at
/// bit position `n` of the byte; with it set, at position `7 − n`. Control
/// tokens, frame delimiters, and unknown bytes are ignored with a log
/// message. A partial byte left at drop is reported and discarded.
#[derive(Debug)]
pub struct BinaryWriter<W: Write> {
    inner: W,
    msb0: bool,
    bits: Vec<bool>,
}

impl<W: Write> BinaryWriter<W> {
    /// Writer with the default bit order (first bit of each group is the
    /// least significant).
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            msb0: false,
            bits: Vec::with_capacity(8),
        }
    }

    /// Writer with the first bit of each group at the most significant
    /// position.
    pub fn msb_first(inner: W) -> Self {
        Self {
            inner,
            msb0: true,
            bits: Vec::with_capacity(8),
        }
    }

    fn flush_byte(&mut self) -> Result<()> {
        let mut byte = 0u8;
        for (n, &bit) in self.bits.iter().enumerate() {
            if bit {
                byte |= 1 << if self.msb0 { 7 - n } else { n };
            }
        }
        debug!("packed byte {byte:#04x}");
        self.bits.clear();
        self.inner.write_all(&[byte])?;
        Ok(())
    }
}

impl<W: Write> DecodeSink for BinaryWriter<W> {
    fn write_symbols(&mut self, syms: &[u8]) -> Result<()> {
        for &c in syms {
            match c {
                BIT0 | BIT1 => {
                    self.bits.push(c == BIT1);
                    if self.bits.len() == 8 {
                        self.flush_byte()?;
                    }
                }
                SOF => debug!("ignoring start-of-frame delimiter in binary writer"),
                EOF_SYM => debug!("ignoring end-of-frame delimiter in binary writer"),
                c if is_control(c) => warn!(
                    "ignoring control token #{} ({:?}) in binary writer",
                    control_index(c).unwrap_or(0),
                    c as char
                ),
                c => warn!("ignoring unknown byte {:?} (0x{c:02x}) in binary writer", c as char),
            }
        }
        Ok(())
    }
}

impl<W: Write> Drop for BinaryWriter<W> {
    fn drop(&mut self) {
        if !self.bits.is_empty() {
            if !self.msb0 {
                self.bits.reverse();
            }
            let shown: String = self
                .bits
                .iter()
                .map(|&b| if b { '1' } else { '0' })
                .collect();
            warn!("{} bits ({shown}) remaining on output", self.bits.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_writer_is_verbatim() {
        let mut buf = Vec::new();
        let mut w = TextWriter::new(&mut buf);
        w.write_symbols(b"01!0").unwrap();
        assert_eq!(buf, b"01!0");
    }

    #[test]
    fn binary_writer_lsb_first() {
        let mut buf = Vec::new();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_symbols(b"10110001").unwrap();
        }
        assert_eq!(buf, vec![0x8D]);
    }

    #[test]
    fn binary_writer_msb_first() {
        let mut buf = Vec::new();
        {
            let mut w = BinaryWriter::msb_first(&mut buf);
            w.write_symbols(b"10110001").unwrap();
        }
        assert_eq!(buf, vec![0xB1]);
    }

    #[test]
    fn binary_writer_splits_groups() {
        let mut buf = Vec::new();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_symbols(b"1111111100000001").unwrap();
        }
        assert_eq!(buf, vec![0xFF, 0x80]);
    }

    #[test]
    fn partial_byte_is_discarded() {
        let mut buf = Vec::new();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_symbols(b"101").unwrap();
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn non_bit_symbols_are_skipped() {
        let mut buf = Vec::new();
        {
            let mut w = BinaryWriter::new(&mut buf);
            w.write_symbols(b"10>1!1<00a01").unwrap();
        }
        // only the eight bit symbols count
        assert_eq!(buf, vec![0x8D]);
    }
}

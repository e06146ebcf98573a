//! Streaming decoder for clean transducer output.
//!
//! [`Decoder`] consumes output symbols one at a time, tracks every machine
//! state compatible with the observed prefix together with its pending input
//! queue, and commits input symbols to a [`DecodeSink`] the moment they are
//! common to all surviving hypotheses. [`TextWriter`] passes committed
//! symbols through verbatim; [`BinaryWriter`] packs input bits into bytes.
//!
//! # Quick start
//!
//! ```
//! use physalia_machine::{symbols, Machine};
//! use physalia_decode::{Decoder, TextWriter};
//!
//! // Identity transducer: each input bit is emitted unchanged.
//! let mut m = Machine::new();
//! let s = m.add_state("loop", true);
//! m.add_transition(s, s, Some(symbols::BIT0), Some(symbols::BIT0)).unwrap();
//! m.add_transition(s, s, Some(symbols::BIT1), Some(symbols::BIT1)).unwrap();
//!
//! let mut buf = Vec::new();
//! {
//!     let mut sink = TextWriter::new(&mut buf);
//!     let mut decoder = Decoder::new(&m, &mut sink).unwrap();
//!     decoder.decode_string(b"0110").unwrap();
//!     decoder.close().unwrap();
//! }
//! assert_eq!(buf, b"0110");
//! ```

pub mod decoder;
pub mod writer;

pub use decoder::Decoder;
pub use writer::{BinaryWriter, DecodeSink, TextWriter};

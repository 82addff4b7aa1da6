//! HPACK ([RFC 7541](https://datatracker.ietf.org/doc/html/rfc7541)) header
//! compression, shared by HTTP/2 and (with a different static table) QPACK.
//!
//! This module covers the codec in isolation — the wire framing that
//! carries HPACK-encoded header blocks (HTTP/2 HEADERS frames, QPACK's
//! stream/encoder-stream split) is out of scope here; [`Encoder`] and
//! [`Decoder`] just turn header lists into/from header-block byte
//! strings.
mod decoder;
mod dynamic_table;
mod encoder;
mod huffman;
mod static_table;

pub use decoder::Decoder;
pub use encoder::Encoder;

use std::error;
use std::fmt;

/// Errors surfaced while decoding or encoding a header block.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// A prefixed integer's continuation bytes never terminated, or the
    /// decoded value overflowed `usize`.
    IntegerOverflow,
    /// A string length claimed more bytes than remain in the block.
    StringTruncated,
    /// Huffman-coded string data didn't decode to a valid byte sequence
    /// (bad code, non-EOS padding, or padding longer than 7 bits).
    HuffmanError,
    /// An index referenced neither the static nor the dynamic table.
    InvalidIndex(usize),
    /// The block ended mid-representation.
    UnexpectedEof,
    /// A dynamic table size update exceeded the negotiated maximum.
    DynamicTableSizeExceeded,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl error::Error for Error {}

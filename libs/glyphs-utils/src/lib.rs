//! Small shared utilities for the Glyphs protocol.

pub mod varint;

pub use varint::{decode_varint, encode_varint, VarintError};

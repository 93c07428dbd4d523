//! The glyphstone: the tagged binary record that describes an etch, mint
//! or transfer inside a transaction's data-carrier output.

pub mod name;
pub mod stone;
pub mod tag;

pub use name::{int_to_name, is_valid_name, is_valid_symbol, name_to_int};
pub use stone::{Glyphstone, ParseMode};
pub use tag::Tag;

use glyphs_utils::VarintError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoneError {
    #[error("invalid glyph name: {0}")]
    InvalidName(String),

    #[error("glyph name {0:?} does not fit the on-chain integer encoding")]
    NameTooLong(String),

    #[error("name integers start at 1")]
    ZeroNameInteger,

    #[error("invalid currency symbol: {0:?}")]
    InvalidSymbol(char),

    #[error("divisibility {0} out of range")]
    InvalidDivisibility(u64),

    #[error("empty glyphstone payload")]
    Empty,

    #[error("unknown record kind {0:#04x}")]
    InvalidKind(u8),

    #[error("unknown field tag {0:#04x}")]
    UnknownTag(u8),

    #[error("transaction index {0} out of range")]
    InvalidTxIndex(u64),

    #[error("output index {0} out of range")]
    InvalidOutputIndex(u64),

    #[error("trailing bytes after record")]
    TrailingData,

    #[error(transparent)]
    Varint(#[from] VarintError),
}

pub type Result<T> = std::result::Result<T, StoneError>;

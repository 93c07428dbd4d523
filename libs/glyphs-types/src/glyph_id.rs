use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier of a glyph: the location of its etch transaction.
///
/// `block` is the height of the block containing the etch, `tx` the index
/// of the transaction within that block. Rendered as `"BLOCK:TX"`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GlyphId {
    pub block: u64,
    pub tx: u32,
}

impl GlyphId {
    pub const fn new(block: u64, tx: u32) -> Self {
        Self { block, tx }
    }
}

impl fmt::Display for GlyphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.tx)
    }
}

impl FromStr for GlyphId {
    type Err = ParseGlyphIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (block, tx) = s.split_once(':').ok_or_else(|| ParseGlyphIdError::Format {
            input: s.to_string(),
        })?;
        let block = block.parse::<u64>().map_err(|e| ParseGlyphIdError::Block {
            value: block.to_string(),
            source: e,
        })?;
        let tx = tx.parse::<u32>().map_err(|e| ParseGlyphIdError::Tx {
            value: tx.to_string(),
            source: e,
        })?;
        Ok(Self { block, tx })
    }
}

#[derive(Error, Debug)]
pub enum ParseGlyphIdError {
    #[error("invalid glyph id {input:?}, expected BLOCK:TX")]
    Format { input: String },

    #[error("invalid block height {value:?}")]
    Block {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid transaction index {value:?}")]
    Tx {
        value: String,
        source: std::num::ParseIntError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let id: GlyphId = "840000:17".parse().unwrap();
        assert_eq!(id, GlyphId::new(840_000, 17));
        assert_eq!(id.to_string(), "840000:17");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("840000".parse::<GlyphId>().is_err());
        assert!("840000:17:2".parse::<GlyphId>().is_err());
        assert!("block:tx".parse::<GlyphId>().is_err());
        assert!("-1:0".parse::<GlyphId>().is_err());
        assert!("".parse::<GlyphId>().is_err());
    }

    #[test]
    fn ordering_is_by_block_then_tx() {
        let a = GlyphId::new(100, 5);
        let b = GlyphId::new(100, 6);
        let c = GlyphId::new(101, 0);
        assert!(a < b && b < c);
    }

    #[test]
    fn serde_roundtrip() {
        let id = GlyphId::new(840_000, 17);
        let json = serde_json::to_string(&id).unwrap();
        let back: GlyphId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}

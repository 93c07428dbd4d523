//! Request validation ahead of transaction construction.

use glyphs_types::{GlyphEtching, MAX_DIVISIBILITY};
use glyphstone::name;

use crate::errors::{GlyphError, GlyphResult};

pub(crate) fn validate_etching(etching: &GlyphEtching) -> GlyphResult<()> {
    if !name::is_valid_name(&etching.name) {
        return Err(GlyphError::InvalidArgument(format!(
            "invalid glyph name: {}",
            etching.name
        )));
    }

    if etching.divisibility > MAX_DIVISIBILITY {
        return Err(GlyphError::InvalidArgument(format!(
            "divisibility {} exceeds the protocol maximum {}",
            etching.divisibility, MAX_DIVISIBILITY
        )));
    }

    if let Some(symbol) = etching.symbol {
        if !name::is_valid_symbol(symbol) {
            return Err(GlyphError::InvalidArgument(format!(
                "invalid currency symbol: {symbol:?}"
            )));
        }
    }

    if let Some(terms) = &etching.terms {
        if terms.amount == Some(0) {
            return Err(GlyphError::InvalidArgument(
                "mint amount cannot be zero".to_string(),
            ));
        }
        if terms.cap == Some(0) {
            return Err(GlyphError::InvalidArgument(
                "mint cap cannot be zero".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (terms.height_start, terms.height_end) {
            if start >= end {
                return Err(GlyphError::InvalidArgument(
                    "mint window is empty: start height is not below end height".to_string(),
                ));
            }
        }
        if let (Some(start), Some(end)) = (terms.offset_start, terms.offset_end) {
            if start >= end {
                return Err(GlyphError::InvalidArgument(
                    "mint window is empty: start offset is not below end offset".to_string(),
                ));
            }
        }
    }

    Ok(())
}

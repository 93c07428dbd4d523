use thiserror::Error;

/// Error taxonomy surfaced at the public boundary of the engine.
///
/// There is no local retry: every failure propagates to the caller, and
/// [`GlyphError::is_retryable`] tells them whether retrying unchanged can
/// help.
#[derive(Error, Debug)]
pub enum GlyphError {
    // Caller errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    // Funding errors
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The node rejected a submission because an input was already spent;
    /// UTXO selection is racy by construction and the node is the sole
    /// arbiter.
    #[error("utxo conflict: {0}")]
    UtxoConflict(String),

    // Node errors
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    // Protocol errors
    #[error("cenotaph: {0}")]
    Cenotaph(String),

    #[error("mint closed for glyph {0}")]
    MintClosed(String),

    #[error("swap precondition failed: {0}")]
    SwapPreconditionFailed(String),
}

impl GlyphError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GlyphError::NodeUnavailable(_) | GlyphError::UtxoConflict(_)
        )
    }
}

impl From<bitcoin_utils::BitcoinUtilsError> for GlyphError {
    fn from(err: bitcoin_utils::BitcoinUtilsError) -> Self {
        GlyphError::InvalidArgument(err.to_string())
    }
}

impl From<glyphs_types::ParseGlyphIdError> for GlyphError {
    fn from(err: glyphs_types::ParseGlyphIdError) -> Self {
        GlyphError::InvalidArgument(err.to_string())
    }
}

/// Result type for engine operations.
pub type GlyphResult<T> = std::result::Result<T, GlyphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GlyphError::NodeUnavailable("connection refused".into()).is_retryable());
        assert!(GlyphError::UtxoConflict("missing inputs".into()).is_retryable());
        assert!(!GlyphError::InvalidArgument("bad name".into()).is_retryable());
        assert!(!GlyphError::MintClosed("840000:17".into()).is_retryable());
        assert!(!GlyphError::Cenotaph("unknown tag".into()).is_retryable());
    }
}

//! Bitcoin script construction for the Glyphs protocol: the data-carrier
//! script, the HTLC redeem script and its spend templates, and the taproot
//! auxiliary-key binder.

pub mod address;
pub mod htlc;
pub mod script;
pub mod taproot;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BitcoinUtilsError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("script error: {0}")]
    ScriptError(String),
}

pub type Result<T> = std::result::Result<T, BitcoinUtilsError>;

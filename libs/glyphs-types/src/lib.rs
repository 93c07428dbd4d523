//! Core data model for the Glyphs protocol.

mod glyph_id;

pub use glyph_id::{GlyphId, ParseGlyphIdError};

use std::fmt;
use std::str::FromStr;

use bitcoin::{OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of satoshis in one bitcoin.
pub const COIN: u64 = 100_000_000;

/// Default divisibility for a new glyph.
pub const DEFAULT_DIVISIBILITY: u8 = 8;

/// Protocol maximum divisibility.
pub const MAX_DIVISIBILITY: u8 = 8;

/// Default currency symbol for a new glyph.
pub const DEFAULT_SYMBOL: char = '¤';

/// Maximum length of a glyph name, including spacers.
pub const MAX_NAME_LENGTH: usize = 26;

/// Decorative separator allowed inside glyph names.
pub const SPACER: char = '•';

/// Bitcoin network a protocol instance operates on.
///
/// Selected at construction time and threaded into address parsing;
/// never a process-wide singleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet4,
}

impl Network {
    /// Network used for address parsing and consensus constants.
    /// Testnet4 shares the testnet address encodings.
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet4 => bitcoin::Network::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet4 => write!(f, "testnet4"),
        }
    }
}

impl FromStr for Network {
    type Err = ParseNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet4" => Ok(Network::Testnet4),
            other => Err(ParseNetworkError(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("unknown network: {0} (expected mainnet or testnet4)")]
pub struct ParseNetworkError(String);

/// Open minting terms attached to an etch.
///
/// `Some(0)` is meaningful and distinct from an absent field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintTerms {
    /// Maximum number of mints allowed.
    pub cap: Option<u64>,
    /// Fixed amount of glyphs minted per transaction.
    pub amount: Option<u64>,
    /// Absolute block height at which the open mint begins.
    pub height_start: Option<u64>,
    /// Absolute block height at which the open mint ends.
    pub height_end: Option<u64>,
    /// Offset from the etch block at which the open mint begins.
    pub offset_start: Option<u64>,
    /// Offset from the etch block at which the open mint ends.
    pub offset_end: Option<u64>,
}

impl MintTerms {
    pub fn is_empty(&self) -> bool {
        self.cap.is_none()
            && self.amount.is_none()
            && self.height_start.is_none()
            && self.height_end.is_none()
            && self.offset_start.is_none()
            && self.offset_end.is_none()
    }
}

/// Parameters for creating a new glyph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphEtching {
    /// Glyph name, uppercase letters with optional spacers (e.g. "TEST•COIN").
    pub name: String,
    /// Number of decimal places; one atomic unit is `10^-divisibility` glyphs.
    pub divisibility: u8,
    /// Single currency symbol, neither a letter nor a number.
    pub symbol: Option<char>,
    /// Atomic units allocated to the etcher at creation.
    pub premine: u64,
    pub terms: Option<MintTerms>,
}

impl GlyphEtching {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            divisibility: DEFAULT_DIVISIBILITY,
            symbol: Some(DEFAULT_SYMBOL),
            premine: 0,
            terms: None,
        }
    }
}

/// Decoded information about an etched glyph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphInfo {
    /// Etch location; `id.block` is the etch height.
    pub id: GlyphId,
    pub name: String,
    pub divisibility: u8,
    pub symbol: Option<char>,
    pub premine: u64,
    pub terms: MintTerms,
    /// Number of mints observed so far, as reported by the configured
    /// mint index (zero when no index is wired in).
    pub minted_count: u64,
}

impl GlyphInfo {
    /// First height at which the mint is open. Absent bounds default to 0.
    pub fn effective_start(&self) -> u64 {
        self.terms
            .height_start
            .or(self
                .terms
                .offset_start
                .map(|o| self.id.block.saturating_add(o)))
            .unwrap_or(0)
    }

    /// First height at which the mint is closed again. Absent bounds are
    /// unbounded.
    pub fn effective_end(&self) -> u64 {
        self.terms
            .height_end
            .or(self
                .terms
                .offset_end
                .map(|o| self.id.block.saturating_add(o)))
            .unwrap_or(u64::MAX)
    }

    /// Whether a mint at `height` is allowed: inside the window and below
    /// the cap.
    pub fn is_mint_open(&self, height: u64) -> bool {
        if let Some(cap) = self.terms.cap {
            if self.minted_count >= cap {
                return false;
            }
        }
        self.effective_start() <= height && height < self.effective_end()
    }
}

/// Unspent transaction output owned by the node wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis.
    pub amount: u64,
    pub script_pubkey: ScriptBuf,
    pub address: Option<String>,
    pub confirmations: Option<u32>,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }
}

/// A transaction output as reported by the node, with confirmation count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutInfo {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: ScriptBuf,
    pub confirmations: u32,
}

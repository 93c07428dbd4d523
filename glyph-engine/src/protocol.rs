//! The protocol instance: etch, mint and transfer operations plus the
//! glyph-info and balance queries.

use bitcoin::{Amount, OutPoint, TxOut, Txid};
use tracing::info;

use bitcoin_utils::script as carrier;
use glyphs_types::{GlyphEtching, GlyphId, GlyphInfo};
use glyphstone::{Glyphstone, ParseMode, StoneError};

use crate::builder::{BuildOptions, BuildResult, TxPlan};
use crate::config::EngineConfig;
use crate::errors::{GlyphError, GlyphResult};
use crate::rpc::NodeRpc;
use crate::validators;

/// Source of truth for how many mints of a glyph have confirmed. The
/// engine does not index the chain itself; counting is delegated to an
/// external indexer behind this trait.
pub trait MintIndex {
    fn minted_count(&self, id: &GlyphId) -> GlyphResult<u64>;
}

/// Default index: reports no observed mints, so caps are enforced only
/// when a real index is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMintIndex;

impl MintIndex for NoMintIndex {
    fn minted_count(&self, _id: &GlyphId) -> GlyphResult<u64> {
        Ok(0)
    }
}

/// Where a transfer sends its glyphs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferDestination {
    Address(String),
    /// Zero-value bare OP_RETURN: burns the transferred amount.
    Burn,
}

/// A protocol instance bound to one node and one network.
pub struct GlyphProtocol<R> {
    pub(crate) rpc: R,
    pub(crate) config: EngineConfig,
    mint_index: Box<dyn MintIndex>,
}

impl<R: NodeRpc> GlyphProtocol<R> {
    pub fn new(rpc: R, config: EngineConfig) -> Self {
        Self {
            rpc,
            config,
            mint_index: Box::new(NoMintIndex),
        }
    }

    /// Replace the mint-count source of truth.
    pub fn with_mint_index(mut self, index: Box<dyn MintIndex>) -> Self {
        self.mint_index = index;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Etch a new glyph. A premine requires a destination address to
    /// receive it.
    pub fn etch(
        &self,
        etching: &GlyphEtching,
        destination: Option<&str>,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        validators::validate_etching(etching)?;
        if etching.premine > 0 && destination.is_none() {
            return Err(GlyphError::InvalidArgument(
                "a destination address is required for a premine".to_string(),
            ));
        }

        let stone = Glyphstone::Etch(etching.clone()).encode().map_err(invalid)?;
        let value_output = match destination {
            Some(addr) if etching.premine > 0 => Some(TxOut {
                value: Amount::from_sat(atomic_units(etching.premine, etching.divisibility)?),
                script_pubkey: self.destination_script(addr, opts.aux_pubkey.as_ref())?,
            }),
            _ => None,
        };

        info!(name = %etching.name, "etching glyph");
        self.build_and_submit(
            TxPlan {
                stone: Some(stone),
                value_output,
            },
            opts,
        )
    }

    /// Mint units of an existing glyph. Fails with [`GlyphError::MintClosed`]
    /// outside the mint window or once the cap is reached.
    pub fn mint(
        &self,
        id: &GlyphId,
        amount: u64,
        destination: &str,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        let glyph = self.glyph_info(id)?;
        let height = self.rpc.get_block_count()?;
        if !glyph.is_mint_open(height) {
            return Err(GlyphError::MintClosed(id.to_string()));
        }
        if let Some(required) = glyph.terms.amount {
            if amount != required {
                return Err(GlyphError::InvalidArgument(format!(
                    "mint amount must be exactly {required}"
                )));
            }
        }

        let stone = Glyphstone::Mint { id: *id, amount }.encode().map_err(invalid)?;
        let value_output = TxOut {
            value: Amount::from_sat(atomic_units(amount, glyph.divisibility)?),
            script_pubkey: self.destination_script(destination, opts.aux_pubkey.as_ref())?,
        };

        info!(glyph = %id, amount, "minting");
        self.build_and_submit(
            TxPlan {
                stone: Some(stone),
                value_output: Some(value_output),
            },
            opts,
        )
    }

    /// Transfer glyphs held by `input` to a destination, or burn them.
    pub fn transfer(
        &self,
        id: &GlyphId,
        input: OutPoint,
        amount: u64,
        destination: &TransferDestination,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        let available = self.glyph_balance(&input.txid, input.vout, id)?;
        if available < amount {
            return Err(GlyphError::InsufficientFunds(format!(
                "input holds {available} glyph units, requested {amount}"
            )));
        }

        // The destination output always sits at index 1, right after the
        // glyphstone.
        let stone = Glyphstone::Transfer {
            id: *id,
            amount,
            output: 1,
        }
        .encode()
        .map_err(invalid)?;

        let value_output = match destination {
            TransferDestination::Burn => TxOut {
                value: Amount::ZERO,
                script_pubkey: carrier::burn_script(),
            },
            TransferDestination::Address(addr) => {
                let glyph = self.glyph_info(id)?;
                TxOut {
                    value: Amount::from_sat(atomic_units(amount, glyph.divisibility)?),
                    script_pubkey: self.destination_script(addr, opts.aux_pubkey.as_ref())?,
                }
            }
        };

        info!(glyph = %id, amount, "transferring");
        let opts = BuildOptions {
            input: Some(input),
            ..opts.clone()
        };
        self.build_and_submit(
            TxPlan {
                stone: Some(stone),
                value_output: Some(value_output),
            },
            &opts,
        )
    }

    /// Decode the etch record at a glyph's id.
    pub fn glyph_info(&self, id: &GlyphId) -> GlyphResult<GlyphInfo> {
        let hash = self.rpc.get_block_hash(id.block)?;
        let block = self.rpc.get_block(&hash)?;
        let tx = block.txdata.get(id.tx as usize).ok_or_else(|| {
            GlyphError::NotFound(format!(
                "transaction index {} out of range for block {}",
                id.tx, id.block
            ))
        })?;

        let payload = tx
            .output
            .iter()
            .find_map(|out| carrier::glyphstone_payload(&out.script_pubkey))
            .ok_or_else(|| GlyphError::NotFound(format!("no glyphstone at {id}")))?;
        let stone = Glyphstone::decode(&payload, ParseMode::Lenient)
            .map_err(|e| GlyphError::Cenotaph(format!("glyphstone at {id}: {e}")))?;
        let Glyphstone::Etch(etching) = stone else {
            return Err(GlyphError::NotFound(format!("record at {id} is not an etch")));
        };

        Ok(GlyphInfo {
            id: *id,
            name: etching.name,
            divisibility: etching.divisibility,
            symbol: etching.symbol,
            premine: etching.premine,
            terms: etching.terms.unwrap_or_default(),
            minted_count: self.mint_index.minted_count(id)?,
        })
    }

    /// Glyph balance carried by a specific unspent output.
    pub fn glyph_balance(&self, txid: &Txid, vout: u32, id: &GlyphId) -> GlyphResult<u64> {
        let tx = self.rpc.get_raw_transaction(txid)?;
        let output = tx
            .output
            .get(vout as usize)
            .ok_or_else(|| GlyphError::NotFound(format!("output {vout} of {txid}")))?;
        if self.rpc.get_tx_out(txid, vout)?.is_none() {
            return Err(GlyphError::NotFound(format!("{txid}:{vout} has been spent")));
        }

        let payload = carrier::glyphstone_payload(&output.script_pubkey)
            .ok_or_else(|| GlyphError::NotFound(format!("{txid}:{vout} carries no glyphstone")))?;
        let stone = Glyphstone::decode(&payload, ParseMode::Lenient)
            .map_err(|e| GlyphError::Cenotaph(format!("glyphstone at {txid}:{vout}: {e}")))?;
        match stone {
            Glyphstone::Transfer {
                id: stone_id,
                amount,
                ..
            } if stone_id == *id => Ok(amount),
            Glyphstone::Transfer { id: stone_id, .. } => Err(GlyphError::NotFound(format!(
                "output carries glyph {stone_id}, not {id}"
            ))),
            _ => Err(GlyphError::NotFound(format!(
                "{txid}:{vout} is not a transfer record"
            ))),
        }
    }
}

pub(crate) fn invalid(err: StoneError) -> GlyphError {
    GlyphError::InvalidArgument(err.to_string())
}

/// Scale a glyph amount to atomic units carried as output value.
pub(crate) fn atomic_units(amount: u64, divisibility: u8) -> GlyphResult<u64> {
    10u64
        .checked_pow(divisibility as u32)
        .and_then(|scale| amount.checked_mul(scale))
        .ok_or_else(|| {
            GlyphError::InvalidArgument(format!(
                "glyph amount {amount} at divisibility {divisibility} overflows"
            ))
        })
}

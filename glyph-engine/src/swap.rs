//! HTLC swap engine: initiate, participate, claim and refund, plus the
//! per-participant session state machine.
//!
//! `claim` must not run before the counterparty HTLC has a confirmation;
//! `refund` must not run before the timelock has passed. Both
//! preconditions are checked against the node before any transaction is
//! assembled.

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Amount, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use tracing::info;

use bitcoin_utils::htlc::{self, HtlcParams};
use bitcoin_utils::script as carrier;
use glyphs_types::GlyphId;
use glyphstone::Glyphstone;

use crate::builder::{BuildOptions, BuildResult, TxPlan};
use crate::errors::{GlyphError, GlyphResult};
use crate::protocol::{atomic_units, invalid, GlyphProtocol};
use crate::rpc::{NodeRpc, PrevOutput};

/// Minimum number of blocks between the tip and an acceptable timelock.
pub const MIN_TIMELOCK_GAP: u64 = 6;

/// An HTLC as advertised by a counterparty, with its on-chain location.
#[derive(Clone, Debug)]
pub struct HtlcOnChain {
    pub outpoint: OutPoint,
    pub params: HtlcParams,
}

/// Everything the counterparty needs after a publish.
#[derive(Clone, Debug)]
pub struct SwapOffer {
    pub build: BuildResult,
    pub secret_hash: [u8; 32],
    pub timelock: u64,
    pub sender_pubkey: PublicKey,
}

enum SpendPath {
    Claim(Vec<u8>),
    Refund,
}

impl<R: NodeRpc> GlyphProtocol<R> {
    /// Open a swap: publish an HTLC locking `amount` glyphs to the
    /// counterparty's key. The committed hash is returned for the
    /// off-band handshake. The initiator's timelock must exceed the
    /// participant's, so it is required to sit well past the tip.
    pub fn swap_initiate(
        &self,
        id: &GlyphId,
        amount: u64,
        destination: &str,
        counterparty_pubkey: &PublicKey,
        secret: &[u8],
        timelock: u64,
        opts: &BuildOptions,
    ) -> GlyphResult<SwapOffer> {
        let height = self.rpc.get_block_count()?;
        if timelock <= height + MIN_TIMELOCK_GAP {
            return Err(GlyphError::SwapPreconditionFailed(format!(
                "timelock {timelock} is too close to tip {height}"
            )));
        }

        let secret_hash = htlc::secret_hash(secret);
        let sender = self.rpc.get_address_pubkey(destination)?;
        let params = HtlcParams {
            secret_hash,
            receiver: *counterparty_pubkey,
            sender,
            timelock,
        };
        let build = self.publish_htlc(id, amount, &params, opts)?;
        Ok(SwapOffer {
            build,
            secret_hash,
            timelock,
            sender_pubkey: sender,
        })
    }

    /// Answer a swap: verify the counterparty HTLC on-chain, then publish
    /// the mirror HTLC with a strictly shorter timelock so the initiator
    /// refunds last.
    pub fn swap_participate(
        &self,
        id: &GlyphId,
        amount: u64,
        counterparty: &HtlcOnChain,
        destination: &str,
        opts: &BuildOptions,
    ) -> GlyphResult<SwapOffer> {
        let height = self.rpc.get_block_count()?;
        self.verify_htlc(counterparty, 1)?;

        let gap = counterparty.params.timelock.saturating_sub(height);
        if gap < 2 * MIN_TIMELOCK_GAP {
            return Err(GlyphError::SwapPreconditionFailed(format!(
                "counterparty timelock leaves only {gap} blocks of margin"
            )));
        }
        let timelock = height + gap / 2;

        let sender = self.rpc.get_address_pubkey(destination)?;
        let secret_hash = counterparty.params.secret_hash;
        let params = HtlcParams {
            secret_hash,
            // The initiator claims the mirror with the revealed preimage.
            receiver: counterparty.params.sender,
            sender,
            timelock,
        };
        let build = self.publish_htlc(id, amount, &params, opts)?;
        Ok(SwapOffer {
            build,
            secret_hash,
            timelock,
            sender_pubkey: sender,
        })
    }

    /// Spend an HTLC through the preimage path, revealing the preimage to
    /// the network so the counterparty can claim the mirror.
    pub fn swap_claim(
        &self,
        htlc_output: &HtlcOnChain,
        preimage: &[u8],
        destination: &str,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        if htlc::secret_hash(preimage) != htlc_output.params.secret_hash {
            return Err(GlyphError::InvalidArgument(
                "preimage does not match the committed hash".to_string(),
            ));
        }
        self.verify_htlc(htlc_output, 1)?;
        info!(outpoint = %htlc_output.outpoint, "claiming HTLC");
        self.spend_htlc(
            htlc_output,
            SpendPath::Claim(preimage.to_vec()),
            destination,
            opts,
        )
    }

    /// Spend an HTLC through the timelock path; allowed only once the
    /// tip is past the timelock.
    pub fn swap_refund(
        &self,
        htlc_output: &HtlcOnChain,
        destination: &str,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        let height = self.rpc.get_block_count()?;
        if height <= htlc_output.params.timelock {
            return Err(GlyphError::SwapPreconditionFailed(format!(
                "refund locked until height {}",
                htlc_output.params.timelock + 1
            )));
        }
        self.verify_htlc(htlc_output, 0)?;
        info!(outpoint = %htlc_output.outpoint, "refunding HTLC");
        self.spend_htlc(htlc_output, SpendPath::Refund, destination, opts)
    }

    /// Publish a transfer glyphstone whose destination output is the HTLC.
    fn publish_htlc(
        &self,
        id: &GlyphId,
        amount: u64,
        params: &HtlcParams,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        let glyph = self.glyph_info(id)?;
        let stone = Glyphstone::Transfer {
            id: *id,
            amount,
            output: 1,
        }
        .encode()
        .map_err(invalid)?;
        let value_output = TxOut {
            value: Amount::from_sat(atomic_units(amount, glyph.divisibility)?),
            script_pubkey: htlc::htlc_script_pubkey(params, self.config.network.to_bitcoin())?,
        };

        // Bitcoin change from the funding input goes back to the wallet
        // rather than being left as fee.
        let mut opts = opts.clone();
        if opts.change_address.is_none() {
            opts.change_address = Some(self.rpc.get_new_address()?);
        }

        info!(glyph = %id, timelock = params.timelock, "publishing HTLC");
        self.build_and_submit(
            TxPlan {
                stone: Some(stone),
                value_output: Some(value_output),
            },
            &opts,
        )
    }

    /// Check that an HTLC output exists, is unspent, matches its stated
    /// parameters and carries at least `min_confirmations`.
    fn verify_htlc(&self, htlc_output: &HtlcOnChain, min_confirmations: u32) -> GlyphResult<()> {
        let out = self
            .rpc
            .get_tx_out(&htlc_output.outpoint.txid, htlc_output.outpoint.vout)?
            .ok_or_else(|| {
                GlyphError::SwapPreconditionFailed(format!(
                    "HTLC output {} is spent or unknown",
                    htlc_output.outpoint
                ))
            })?;

        let expected =
            htlc::htlc_script_pubkey(&htlc_output.params, self.config.network.to_bitcoin())?;
        if out.script_pubkey != expected {
            return Err(GlyphError::SwapPreconditionFailed(
                "HTLC output does not match its stated parameters".to_string(),
            ));
        }
        if out.confirmations < min_confirmations {
            return Err(GlyphError::SwapPreconditionFailed(format!(
                "HTLC has {} confirmations, need {min_confirmations}",
                out.confirmations
            )));
        }
        Ok(())
    }

    /// Build and submit the spend of an HTLC output. The wallet
    /// contributes the signature; the engine assembles the final
    /// scriptSig around it.
    fn spend_htlc(
        &self,
        htlc_output: &HtlcOnChain,
        path: SpendPath,
        destination: &str,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        let fee_rate = opts.fee_rate.unwrap_or(self.config.fee_rate);
        let value = self.input_amount(&htlc_output.outpoint)?;
        let redeem_script = htlc::htlc_script(&htlc_output.params);

        let (lock_time, sequence) = match &path {
            SpendPath::Claim(_) => (LockTime::ZERO, Sequence::ENABLE_RBF_NO_LOCKTIME),
            SpendPath::Refund => (
                LockTime::from_height(htlc_output.params.timelock as u32)
                    .map_err(|e| GlyphError::InvalidArgument(format!("timelock: {e}")))?,
                Sequence::ENABLE_LOCKTIME_NO_RBF,
            ),
        };

        let mut tx = Transaction {
            version: Version(2),
            lock_time,
            input: vec![TxIn {
                previous_output: htlc_output.outpoint,
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey: self.destination_script(destination, opts.aux_pubkey.as_ref())?,
            }],
        };

        // Fee over the final spend shape: signature, path data, script.
        let placeholder_sig = [0u8; 72];
        tx.input[0].script_sig = match &path {
            SpendPath::Claim(preimage) => {
                htlc::claim_script_sig(&placeholder_sig, preimage, &redeem_script)?
            }
            SpendPath::Refund => htlc::refund_script_sig(&placeholder_sig, &redeem_script)?,
        };
        let fee = consensus::serialize(&tx).len() as u64 * fee_rate;
        let output_value = value.checked_sub(fee).filter(|v| *v > 0).ok_or_else(|| {
            GlyphError::InsufficientFunds(format!(
                "HTLC value {value} does not cover the fee {fee}"
            ))
        })?;
        tx.output[0].value = Amount::from_sat(output_value);
        tx.input[0].script_sig = ScriptBuf::new();

        let prev = PrevOutput {
            outpoint: htlc_output.outpoint,
            script_pubkey: htlc::htlc_script_pubkey(
                &htlc_output.params,
                self.config.network.to_bitcoin(),
            )?,
            redeem_script: Some(redeem_script.clone()),
            amount: value,
        };
        let signed = self
            .rpc
            .sign_raw_transaction_with_wallet(&tx, std::slice::from_ref(&prev))?;
        let signature = signed
            .input
            .first()
            .and_then(|input| carrier::first_push(&input.script_sig))
            .filter(|sig| !sig.is_empty())
            .ok_or_else(|| {
                GlyphError::NodeUnavailable(
                    "wallet produced no signature for the HTLC input".to_string(),
                )
            })?;

        tx.input[0].script_sig = match &path {
            SpendPath::Claim(preimage) => {
                htlc::claim_script_sig(&signature, preimage, &redeem_script)?
            }
            SpendPath::Refund => htlc::refund_script_sig(&signature, &redeem_script)?,
        };

        if opts.broadcast {
            let txid = self.rpc.send_raw_transaction(&tx)?;
            Ok(BuildResult {
                tx,
                txid: Some(txid),
                warnings: Vec::new(),
            })
        } else {
            Ok(BuildResult {
                tx,
                txid: None,
                warnings: Vec::new(),
            })
        }
    }
}

/// Per-participant swap lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwapState {
    #[default]
    Idle,
    Initiated,
    Participated,
    Redeemed,
    Refunded,
}

impl SwapState {
    fn can_transition(self, next: SwapState) -> bool {
        use SwapState::*;
        matches!(
            (self, next),
            (Idle, Initiated)
                | (Idle, Participated)
                | (Initiated, Participated)
                | (Participated, Redeemed)
                | (Initiated, Refunded)
                | (Participated, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SwapState::Redeemed | SwapState::Refunded)
    }
}

/// Tracks one participant's progress through a swap and refuses
/// out-of-order transitions.
#[derive(Debug, Default)]
pub struct SwapSession {
    state: SwapState,
}

impl SwapSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SwapState {
        self.state
    }

    /// Move to `next`, or fail with [`GlyphError::SwapPreconditionFailed`]
    /// when the swap protocol does not allow it.
    pub fn advance(&mut self, next: SwapState) -> GlyphResult<()> {
        if !self.state.can_transition(next) {
            return Err(GlyphError::SwapPreconditionFailed(format!(
                "cannot move from {:?} to {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}

//! The consolidated transaction builder. Every public operation, token or
//! swap, funnels through [`GlyphProtocol::build_and_submit`] with a
//! [`TxPlan`] describing what the transaction carries.

use bitcoin::absolute::LockTime;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use tracing::{debug, warn};

use bitcoin_utils::script as carrier;
use bitcoin_utils::{address, taproot};
use glyphs_types::Utxo;
use glyphstone::{Glyphstone, ParseMode};

use crate::errors::{GlyphError, GlyphResult};
use crate::protocol::GlyphProtocol;
use crate::rpc::NodeRpc;

/// Per-operation options, enumerated explicitly by the caller.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// Address receiving bitcoin change; without it no change output is
    /// produced and the difference is spent as fee.
    pub change_address: Option<String>,
    /// Flat fee rate in satoshis per serialized byte; the engine default
    /// applies when unset.
    pub fee_rate: Option<u64>,
    /// Sign through the node wallet and broadcast when true; otherwise
    /// the unsigned transaction is returned.
    pub broadcast: bool,
    /// Spend this outpoint instead of selecting a wallet UTXO.
    pub input: Option<OutPoint>,
    /// Auxiliary key bound into destination addresses via the taproot
    /// leaf commitment.
    pub aux_pubkey: Option<XOnlyPublicKey>,
}

/// Warnings surfaced alongside a build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildWarning {
    /// The glyphstone was malformed; all outputs were replaced by a
    /// single zero-value burn output.
    Cenotaph,
}

impl std::fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildWarning::Cenotaph => write!(f, "Cenotaph"),
        }
    }
}

/// Outcome of a build.
#[derive(Clone, Debug)]
pub struct BuildResult {
    pub tx: Transaction,
    /// Set when the transaction was broadcast.
    pub txid: Option<Txid>,
    pub warnings: Vec<BuildWarning>,
}

impl BuildResult {
    pub fn raw_hex(&self) -> String {
        consensus::encode::serialize_hex(&self.tx)
    }
}

/// What a transaction should carry: the glyphstone payload (output 0) and
/// an optional value output (output 1, the destination or HTLC).
#[derive(Clone, Debug, Default)]
pub(crate) struct TxPlan {
    pub stone: Option<Vec<u8>>,
    pub value_output: Option<TxOut>,
}

impl<R: NodeRpc> GlyphProtocol<R> {
    pub(crate) fn build_and_submit(
        &self,
        plan: TxPlan,
        opts: &BuildOptions,
    ) -> GlyphResult<BuildResult> {
        let fee_rate = opts.fee_rate.unwrap_or(self.config.fee_rate);
        let mut warnings = Vec::new();

        // Outputs: carrier first, then the value output.
        let mut outputs = Vec::new();
        let mut stone_script = None;
        if let Some(payload) = &plan.stone {
            let script = carrier::glyphstone_script(payload)?;
            outputs.push(TxOut {
                value: Amount::ZERO,
                script_pubkey: script.clone(),
            });
            stone_script = Some(script);
        }
        if let Some(out) = plan.value_output.clone() {
            outputs.push(out);
        }

        // Input: caller override or the first sufficiently funded wallet
        // UTXO, deterministic over the node's order.
        let (outpoint, input_value) = match opts.input {
            Some(outpoint) => (outpoint, self.input_amount(&outpoint)?),
            None => {
                let utxo = self.select_utxo(self.config.bootstrap_funding_sats)?;
                (utxo.outpoint(), utxo.amount)
            }
        };
        let input = TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        };

        let mut tx = Transaction {
            version: Version(2),
            lock_time: LockTime::ZERO,
            input: vec![input],
            output: outputs,
        };

        // Flat fee over the provisional serialized size.
        let size = consensus::serialize(&tx).len() as u64;
        let fee = size * fee_rate;

        // Change, when strictly positive.
        if let Some(change_address) = &opts.change_address {
            let spent: u64 = plan
                .value_output
                .as_ref()
                .map(|o| o.value.to_sat())
                .unwrap_or(0);
            let change = input_value.saturating_sub(spent).saturating_sub(fee);
            if change > 0 {
                let script =
                    address::output_script(change_address, self.config.network.to_bitcoin())?;
                tx.output.push(TxOut {
                    value: Amount::from_sat(change),
                    script_pubkey: script,
                });
            }
        }

        // Cenotaph guard: a malformed glyphstone must never reach a
        // signer as-is. Replace every output with a single burn.
        if let Some(script) = &stone_script {
            let malformed = carrier::is_cenotaph(script)
                || plan
                    .stone
                    .as_deref()
                    .map(|payload| Glyphstone::decode(payload, ParseMode::Strict).is_err())
                    .unwrap_or(true);
            if malformed {
                warn!("malformed glyphstone detected, treating as cenotaph");
                tx.output = vec![TxOut {
                    value: Amount::ZERO,
                    script_pubkey: carrier::burn_script(),
                }];
                warnings.push(BuildWarning::Cenotaph);
            }
        }

        if opts.broadcast {
            let signed = self.rpc.sign_raw_transaction_with_wallet(&tx, &[])?;
            let txid = self.rpc.send_raw_transaction(&signed)?;
            debug!(%txid, "transaction broadcast");
            Ok(BuildResult {
                tx: signed,
                txid: Some(txid),
                warnings,
            })
        } else {
            Ok(BuildResult {
                tx,
                txid: None,
                warnings,
            })
        }
    }

    /// First wallet UTXO worth at least `needed_sats`.
    pub(crate) fn select_utxo(&self, needed_sats: u64) -> GlyphResult<Utxo> {
        let utxos = self.rpc.list_unspent()?;
        utxos
            .into_iter()
            .find(|utxo| utxo.amount >= needed_sats)
            .ok_or_else(|| {
                GlyphError::InsufficientFunds(format!("no UTXO with at least {needed_sats} sats"))
            })
    }

    /// Satoshi value of an arbitrary outpoint, fetched from the node.
    pub(crate) fn input_amount(&self, outpoint: &OutPoint) -> GlyphResult<u64> {
        let tx = self.rpc.get_raw_transaction(&outpoint.txid)?;
        let output = tx.output.get(outpoint.vout as usize).ok_or_else(|| {
            GlyphError::NotFound(format!("output {} of {}", outpoint.vout, outpoint.txid))
        })?;
        Ok(output.value.to_sat())
    }

    /// Script pubkey for a destination, with the auxiliary key bound in
    /// when one is supplied.
    pub(crate) fn destination_script(
        &self,
        destination: &str,
        aux: Option<&XOnlyPublicKey>,
    ) -> GlyphResult<ScriptBuf> {
        let network = self.config.network.to_bitcoin();
        let base = address::parse_address(destination, network)?;
        match aux {
            Some(aux) => {
                Ok(taproot::bind_aux_key(&base.script_pubkey(), aux, network)?.script_pubkey())
            }
            None => Ok(base.script_pubkey()),
        }
    }
}

//! Node RPC adapter: the capabilities the engine consumes from a Bitcoin
//! node, and their implementation over the Bitcoin Core JSON-RPC wallet.

use bitcoin::{Block, BlockHash, OutPoint, PublicKey, ScriptBuf, Transaction, Txid};
use bitcoincore_rpc::{json, Auth, Client, RpcApi};

use glyphs_types::{Network, TxOutInfo, Utxo};

use crate::errors::{GlyphError, GlyphResult};

/// Previous-output data handed to the wallet when signing, enough for it
/// to recognise P2SH inputs it cannot solve from its own index.
#[derive(Clone, Debug)]
pub struct PrevOutput {
    pub outpoint: OutPoint,
    pub script_pubkey: ScriptBuf,
    pub redeem_script: Option<ScriptBuf>,
    /// Value in satoshis.
    pub amount: u64,
}

/// Capabilities consumed from the node.
///
/// After `send_raw_transaction` succeeds the transaction may have
/// propagated even if the response is lost; the node is an at-most-once
/// submitter and callers must not resubmit blindly.
#[cfg_attr(test, mockall::automock)]
pub trait NodeRpc {
    fn list_unspent(&self) -> GlyphResult<Vec<Utxo>>;

    fn get_block_count(&self) -> GlyphResult<u64>;

    fn get_block_hash(&self, height: u64) -> GlyphResult<BlockHash>;

    fn get_block(&self, hash: &BlockHash) -> GlyphResult<Block>;

    fn get_raw_transaction(&self, txid: &Txid) -> GlyphResult<Transaction>;

    /// `Ok(None)` means the output has been spent.
    fn get_tx_out(&self, txid: &Txid, vout: u32) -> GlyphResult<Option<TxOutInfo>>;

    /// Public key the wallet knows for one of its own addresses.
    fn get_address_pubkey(&self, address: &str) -> GlyphResult<PublicKey>;

    fn get_new_address(&self) -> GlyphResult<String>;

    fn sign_raw_transaction_with_wallet(
        &self,
        tx: &Transaction,
        prev_outputs: &[PrevOutput],
    ) -> GlyphResult<Transaction>;

    fn send_raw_transaction(&self, tx: &Transaction) -> GlyphResult<Txid>;
}

/// Adapter over a Bitcoin Core node.
pub struct CoreRpc {
    client: Client,
    network: Network,
}

impl CoreRpc {
    /// Connect to a Bitcoin Core node at `url`.
    pub fn connect(url: &str, auth: Auth, network: Network) -> GlyphResult<Self> {
        let client = Client::new(url, auth).map_err(transport)?;
        Ok(Self { client, network })
    }
}

fn transport(err: bitcoincore_rpc::Error) -> GlyphError {
    GlyphError::NodeUnavailable(err.to_string())
}

/// Submission failures caused by already-spent inputs surface as
/// `UtxoConflict` so callers can reselect and retry.
fn submit_error(err: bitcoincore_rpc::Error) -> GlyphError {
    if let bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(ref rpc)) = err {
        let message = rpc.message.to_lowercase();
        if message.contains("missing inputs")
            || message.contains("missingorspent")
            || message.contains("txn-mempool-conflict")
        {
            return GlyphError::UtxoConflict(rpc.message.clone());
        }
    }
    transport(err)
}

impl NodeRpc for CoreRpc {
    fn list_unspent(&self) -> GlyphResult<Vec<Utxo>> {
        let entries = self
            .client
            .list_unspent(None, None, None, None, None)
            .map_err(transport)?;
        Ok(entries
            .into_iter()
            .map(|entry| Utxo {
                txid: entry.txid,
                vout: entry.vout,
                amount: entry.amount.to_sat(),
                script_pubkey: entry.script_pub_key,
                address: entry.address.map(|a| a.assume_checked().to_string()),
                confirmations: Some(entry.confirmations),
            })
            .collect())
    }

    fn get_block_count(&self) -> GlyphResult<u64> {
        self.client.get_block_count().map_err(transport)
    }

    fn get_block_hash(&self, height: u64) -> GlyphResult<BlockHash> {
        self.client.get_block_hash(height).map_err(transport)
    }

    fn get_block(&self, hash: &BlockHash) -> GlyphResult<Block> {
        self.client.get_block(hash).map_err(transport)
    }

    fn get_raw_transaction(&self, txid: &Txid) -> GlyphResult<Transaction> {
        self.client
            .get_raw_transaction(txid, None)
            .map_err(transport)
    }

    fn get_tx_out(&self, txid: &Txid, vout: u32) -> GlyphResult<Option<TxOutInfo>> {
        let out = self
            .client
            .get_tx_out(txid, vout, Some(true))
            .map_err(transport)?;
        Ok(out.map(|o| TxOutInfo {
            value: o.value.to_sat(),
            script_pubkey: ScriptBuf::from_bytes(o.script_pub_key.hex),
            confirmations: o.confirmations,
        }))
    }

    fn get_address_pubkey(&self, address: &str) -> GlyphResult<PublicKey> {
        let address = bitcoin_utils::address::parse_address(address, self.network.to_bitcoin())?;
        let info = self.client.get_address_info(&address).map_err(transport)?;
        info.pubkey
            .ok_or_else(|| GlyphError::NotFound(format!("no public key known for {address}")))
    }

    fn get_new_address(&self) -> GlyphResult<String> {
        Ok(self
            .client
            .get_new_address(None, None)
            .map_err(transport)?
            .assume_checked()
            .to_string())
    }

    fn sign_raw_transaction_with_wallet(
        &self,
        tx: &Transaction,
        prev_outputs: &[PrevOutput],
    ) -> GlyphResult<Transaction> {
        let prevtxs: Vec<json::SignRawTransactionInput> = prev_outputs
            .iter()
            .map(|p| json::SignRawTransactionInput {
                txid: p.outpoint.txid,
                vout: p.outpoint.vout,
                script_pub_key: p.script_pubkey.clone(),
                redeem_script: p.redeem_script.clone(),
                amount: Some(bitcoin::Amount::from_sat(p.amount)),
            })
            .collect();
        let result = if prevtxs.is_empty() {
            self.client.sign_raw_transaction_with_wallet(tx, None, None)
        } else {
            self.client
                .sign_raw_transaction_with_wallet(tx, Some(&prevtxs), None)
        }
        .map_err(transport)?;
        result.transaction().map_err(|e| {
            GlyphError::NodeUnavailable(format!("wallet returned an undecodable transaction: {e}"))
        })
    }

    fn send_raw_transaction(&self, tx: &Transaction) -> GlyphResult<Txid> {
        self.client.send_raw_transaction(tx).map_err(submit_error)
    }
}

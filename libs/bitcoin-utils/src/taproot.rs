//! Taproot auxiliary-key binder.

use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::taproot::TaprootBuilder;
use bitcoin::{Address, Network, Script, ScriptBuf};
use secp256k1::{Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::{BitcoinUtilsError, Result};

/// Deterministically bind an auxiliary (e.g. social-identity) x-only key
/// into a taproot address derived from a base payment script.
///
/// Binding rule: the internal key is the first valid x-only key in the
/// iterated SHA-256 chain of the base script-pubkey bytes; the tap tree is
/// a single leaf `{OP_1 <aux_pubkey>}`. Equal `(base, aux)` pairs always
/// produce the same address. The binder is constructive only; it neither
/// verifies the tweak nor produces a spend proof.
pub fn bind_aux_key(
    base_script: &Script,
    aux: &XOnlyPublicKey,
    network: Network,
) -> Result<Address> {
    let internal = derive_internal_key(base_script.as_bytes());
    let secp = Secp256k1::new();
    let spend_info = TaprootBuilder::new()
        .add_leaf(0, aux_leaf(aux))
        .map_err(|e| BitcoinUtilsError::ScriptError(format!("tap tree: {e}")))?
        .finalize(&secp, internal)
        .map_err(|_| BitcoinUtilsError::ScriptError("tap tree finalization failed".to_string()))?;
    Ok(Address::p2tr(
        &secp,
        internal,
        spend_info.merkle_root(),
        network,
    ))
}

/// Tapleaf committing to the auxiliary key: `OP_1 <aux_pubkey>`.
fn aux_leaf(aux: &XOnlyPublicKey) -> ScriptBuf {
    let key = PushBytesBuf::try_from(aux.serialize().to_vec()).expect("32-byte push");
    Builder::new()
        .push_int(1)
        .push_slice(key)
        .into_script()
}

/// Map arbitrary script bytes onto the x-only key domain. Roughly half of
/// all hashes are valid x coordinates, so the chain terminates after a
/// couple of iterations.
fn derive_internal_key(bytes: &[u8]) -> XOnlyPublicKey {
    let mut candidate: [u8; 32] = Sha256::digest(bytes).into();
    loop {
        if let Ok(key) = XOnlyPublicKey::from_slice(&candidate) {
            return key;
        }
        candidate = Sha256::digest(candidate).into();
    }
}

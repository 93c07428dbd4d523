//! Hash-time-locked contract script and spend templates.
//!
//! Redeem script layout:
//!
//! ```text
//! OP_IF
//!     OP_SHA256 <secret_hash> OP_EQUALVERIFY
//!     <receiver_pubkey>
//! OP_ELSE
//!     <timelock> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!     <sender_pubkey>
//! OP_ENDIF
//! OP_CHECKSIG
//! ```
//!
//! The preimage path checks the hash before the signature; the single
//! trailing `OP_CHECKSIG` verifies against whichever key the executed
//! branch selected, so no input can satisfy both paths at once. Outputs
//! are P2SH-wrapped so the node wallet can be handed the redeem script
//! when signing a spend.

use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CLTV, OP_DROP, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY, OP_IF, OP_SHA256,
};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{Address, Network, PublicKey, Script, ScriptBuf};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{BitcoinUtilsError, Result};

/// The tuple an HTLC output commits to. Serializable for the off-band
/// handshake between swap parties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcParams {
    /// SHA-256 hash of the secret preimage.
    pub secret_hash: [u8; 32],
    /// Key that can claim with the preimage.
    pub receiver: PublicKey,
    /// Key that can reclaim after the timelock.
    pub sender: PublicKey,
    /// Block height after which the sender path opens.
    pub timelock: u64,
}

/// SHA-256 of a secret preimage.
pub fn secret_hash(secret: &[u8]) -> [u8; 32] {
    Sha256::digest(secret).into()
}

/// Build the HTLC redeem script.
pub fn htlc_script(params: &HtlcParams) -> ScriptBuf {
    let hash = PushBytesBuf::try_from(params.secret_hash.to_vec()).expect("32-byte push");
    Builder::new()
        .push_opcode(OP_IF)
        .push_opcode(OP_SHA256)
        .push_slice(hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_key(&params.receiver)
        .push_opcode(OP_ELSE)
        .push_int(params.timelock as i64)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_key(&params.sender)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// P2SH address wrapping the redeem script.
pub fn htlc_address(params: &HtlcParams, network: Network) -> Result<Address> {
    Address::p2sh(&htlc_script(params), network)
        .map_err(|e| BitcoinUtilsError::ScriptError(format!("htlc redeem script: {e}")))
}

/// Script pubkey of the P2SH-wrapped HTLC.
pub fn htlc_script_pubkey(params: &HtlcParams, network: Network) -> Result<ScriptBuf> {
    Ok(htlc_address(params, network)?.script_pubkey())
}

/// scriptSig for the preimage path: `<sig> <preimage> 1 <script>`.
pub fn claim_script_sig(
    signature: &[u8],
    preimage: &[u8],
    redeem_script: &Script,
) -> Result<ScriptBuf> {
    Ok(Builder::new()
        .push_slice(push_buf(signature)?)
        .push_slice(push_buf(preimage)?)
        .push_int(1)
        .push_slice(push_buf(redeem_script.as_bytes())?)
        .into_script())
}

/// scriptSig for the timelock path: `<sig> 0 <script>`. The spending
/// transaction must set `nLockTime` to the timelock and use a non-final
/// sequence.
pub fn refund_script_sig(signature: &[u8], redeem_script: &Script) -> Result<ScriptBuf> {
    Ok(Builder::new()
        .push_slice(push_buf(signature)?)
        .push_int(0)
        .push_slice(push_buf(redeem_script.as_bytes())?)
        .into_script())
}

fn push_buf(data: &[u8]) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(data.to_vec())
        .map_err(|_| BitcoinUtilsError::ScriptError("element too large for a push".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::OP_PUSHNUM_1;
    use bitcoin::opcodes::Opcode;
    use bitcoin::script::Instruction;
    use std::str::FromStr;

    fn params() -> HtlcParams {
        HtlcParams {
            secret_hash: secret_hash(b"swap secret"),
            receiver: PublicKey::from_str(
                "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            )
            .unwrap(),
            sender: PublicKey::from_str(
                "02f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9",
            )
            .unwrap(),
            timelock: 840_010,
        }
    }

    fn opcodes(script: &Script) -> Vec<Opcode> {
        script
            .instructions()
            .filter_map(|i| match i.unwrap() {
                Instruction::Op(op) => Some(op),
                Instruction::PushBytes(_) => None,
            })
            .collect()
    }

    fn pushes(script: &Script) -> Vec<Vec<u8>> {
        script
            .instructions()
            .filter_map(|i| match i.unwrap() {
                Instruction::PushBytes(b) => Some(b.as_bytes().to_vec()),
                Instruction::Op(_) => None,
            })
            .collect()
    }

    #[test]
    fn script_opcode_sequence() {
        let script = htlc_script(&params());
        assert_eq!(
            opcodes(&script),
            vec![
                OP_IF,
                OP_SHA256,
                OP_EQUALVERIFY,
                OP_ELSE,
                OP_CLTV,
                OP_DROP,
                OP_ENDIF,
                OP_CHECKSIG,
            ]
        );
    }

    #[test]
    fn hash_check_precedes_the_signature_check() {
        let script = htlc_script(&params());
        let ops = opcodes(&script);
        let sha = ops.iter().position(|&op| op == OP_SHA256).unwrap();
        let checksig = ops.iter().position(|&op| op == OP_CHECKSIG).unwrap();
        assert!(sha < checksig);
    }

    #[test]
    fn exactly_one_checksig() {
        let script = htlc_script(&params());
        let count = opcodes(&script)
            .iter()
            .filter(|&&op| op == OP_CHECKSIG)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn script_commits_to_the_full_tuple() {
        let p = params();
        let script = htlc_script(&p);
        let elements = pushes(&script);
        assert!(elements.contains(&p.secret_hash.to_vec()));
        assert!(elements.contains(&p.receiver.to_bytes()));
        assert!(elements.contains(&p.sender.to_bytes()));

        let mut different = p.clone();
        different.timelock += 1;
        assert_ne!(htlc_script(&different), script);
    }

    #[test]
    fn claim_and_refund_paths_are_exclusive() {
        let p = params();
        let script = htlc_script(&p);
        let sig = vec![0x30; 71];

        let claim = claim_script_sig(&sig, b"swap secret", &script).unwrap();
        let refund = refund_script_sig(&sig, &script).unwrap();

        // The path selector is the element consumed by OP_IF: 1 on the
        // claim path, an empty push on the refund path.
        assert!(opcodes(&claim).contains(&OP_PUSHNUM_1));
        assert!(!pushes(&claim).iter().any(|p| p.is_empty()));
        assert!(pushes(&refund).iter().any(|p| p.is_empty()));
        assert!(!opcodes(&refund).contains(&OP_PUSHNUM_1));

        // Both spends reveal the same redeem script as their final element.
        assert_eq!(pushes(&claim).last(), pushes(&refund).last());
        assert_eq!(
            pushes(&claim).last().unwrap(),
            &script.as_bytes().to_vec()
        );
    }

    #[test]
    fn p2sh_wrapping_is_deterministic() {
        let p = params();
        let a = htlc_address(&p, Network::Testnet).unwrap();
        let b = htlc_address(&p, Network::Testnet).unwrap();
        assert_eq!(a, b);
        assert_eq!(htlc_script_pubkey(&p, Network::Testnet).unwrap(), a.script_pubkey());
    }

    #[test]
    fn secret_hash_is_sha256() {
        // SHA-256 of the empty string.
        assert_eq!(
            hex::encode(secret_hash(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

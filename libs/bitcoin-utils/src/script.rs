//! The glyphstone data-carrier script and its cenotaph predicate.

use bitcoin::opcodes::all::{OP_PUSHNUM_13, OP_RETURN};
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::{Script, ScriptBuf};

use crate::{BitcoinUtilsError, Result};

/// Raw values of the two magic opcodes opening a carrier script.
const OP_RETURN_BYTE: u8 = 0x6a;
const OP_13_BYTE: u8 = 0x5d;

/// Build the data-carrier script `OP_RETURN OP_13 <payload>`.
pub fn glyphstone_script(payload: &[u8]) -> Result<ScriptBuf> {
    let payload = PushBytesBuf::try_from(payload.to_vec())
        .map_err(|_| BitcoinUtilsError::ScriptError("payload too large for a push".to_string()))?;
    Ok(Builder::new()
        .push_opcode(OP_RETURN)
        .push_opcode(OP_PUSHNUM_13)
        .push_slice(payload)
        .into_script())
}

/// Bare `OP_RETURN` output script; burns whatever glyphs ride the inputs.
pub fn burn_script() -> ScriptBuf {
    Builder::new().push_opcode(OP_RETURN).into_script()
}

/// Whether a script begins with exactly the two magic opcodes.
pub fn is_glyphstone(script: &Script) -> bool {
    let bytes = script.as_bytes();
    bytes.len() >= 2 && bytes[0] == OP_RETURN_BYTE && bytes[1] == OP_13_BYTE
}

/// A data-carrier output that does not open with the magic opcodes is a
/// cenotaph: any glyph balance on the transaction's inputs is burned.
pub fn is_cenotaph(script: &Script) -> bool {
    !is_glyphstone(script)
}

/// Extract the payload push from a carrier script.
pub fn glyphstone_payload(script: &Script) -> Option<Vec<u8>> {
    if !is_glyphstone(script) {
        return None;
    }
    let mut instructions = script.instructions();
    instructions.next()?.ok()?; // OP_RETURN
    instructions.next()?.ok()?; // OP_13
    match instructions.next()?.ok()? {
        Instruction::PushBytes(push) => Some(push.as_bytes().to_vec()),
        Instruction::Op(_) => None,
    }
}

/// First pushed element of a script, if any. Used to pull a wallet
/// signature out of a signed input.
pub fn first_push(script: &Script) -> Option<Vec<u8>> {
    for instruction in script.instructions() {
        if let Ok(Instruction::PushBytes(push)) = instruction {
            return Some(push.as_bytes().to_vec());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_script_layout() {
        let script = glyphstone_script(&[1, 2, 3]).unwrap();
        let bytes = script.as_bytes();
        assert_eq!(bytes[0], OP_RETURN_BYTE);
        assert_eq!(bytes[1], OP_13_BYTE);
        assert_eq!(bytes[2], 3); // direct push length
        assert_eq!(&bytes[3..], &[1, 2, 3]);
    }

    #[test]
    fn payload_roundtrips() {
        let payload = b"T\x01\x02\x03\x04".to_vec();
        let script = glyphstone_script(&payload).unwrap();
        assert!(is_glyphstone(&script));
        assert!(!is_cenotaph(&script));
        assert_eq!(glyphstone_payload(&script), Some(payload));
    }

    #[test]
    fn bare_op_return_is_a_cenotaph() {
        let script = burn_script();
        assert!(is_cenotaph(&script));
        assert_eq!(glyphstone_payload(&script), None);
    }

    #[test]
    fn empty_and_foreign_scripts_are_cenotaphs() {
        assert!(is_cenotaph(Script::from_bytes(&[])));
        assert!(is_cenotaph(Script::from_bytes(&[OP_RETURN_BYTE])));
        // OP_RETURN followed by a data push instead of OP_13.
        assert!(is_cenotaph(Script::from_bytes(&[
            OP_RETURN_BYTE,
            0x02,
            0xAA,
            0xBB
        ])));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(glyphstone_script(&[0u8; 600]).is_err());
    }
}

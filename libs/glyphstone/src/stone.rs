//! Encoding and decoding of the glyphstone record.
//!
//! The payload's first byte selects the record kind:
//!
//! - `E` (etch): `varint(name) varint(divisibility) [symbol utf8]
//!   [varint(premine) if > 0]` followed by tagged fields in the fixed
//!   order `C A S H O F`, each a tag byte plus one varint.
//! - `M` (mint): `varint(block) varint(tx) varint(amount)`.
//! - `T` (transfer): `varint(block) varint(tx) varint(amount)
//!   varint(output)`.
//!
//! The etch header is ambiguous between "symbol" and "premine". The
//! deployed rule, applied uniformly on encode and decode: the bytes after
//! divisibility are the symbol iff they form exactly one UTF-8 scalar
//! whose Unicode category starts with neither `L` nor `N`; otherwise they
//! are read as the premine varint (skipped when the next byte opens a
//! known tag).

use glyphs_types::{GlyphEtching, GlyphId, MintTerms};
use glyphs_utils::{decode_varint, encode_varint};

use crate::name;
use crate::tag::Tag;
use crate::{Result, StoneError};

/// How to treat bytes the grammar does not cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// An unknown tag byte terminates the parse; fields gathered so far
    /// are kept. This is the forward-compatible reading of chain data.
    Lenient,
    /// Unknown tags and trailing bytes are errors. Used by the builder so
    /// a malformed record becomes a cenotaph instead of a broadcast.
    Strict,
}

/// A decoded (or to-be-encoded) glyphstone record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Glyphstone {
    Etch(GlyphEtching),
    Mint { id: GlyphId, amount: u64 },
    Transfer { id: GlyphId, amount: u64, output: u32 },
}

impl Glyphstone {
    /// Serialize the record to its payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Glyphstone::Etch(etching) => encode_etch(etching),
            Glyphstone::Mint { id, amount } => {
                let mut bytes = vec![b'M'];
                bytes.extend(encode_varint(id.block));
                bytes.extend(encode_varint(id.tx as u64));
                bytes.extend(encode_varint(*amount));
                Ok(bytes)
            }
            Glyphstone::Transfer { id, amount, output } => {
                let mut bytes = vec![b'T'];
                bytes.extend(encode_varint(id.block));
                bytes.extend(encode_varint(id.tx as u64));
                bytes.extend(encode_varint(*amount));
                bytes.extend(encode_varint(*output as u64));
                Ok(bytes)
            }
        }
    }

    /// Parse a record from payload bytes.
    pub fn decode(bytes: &[u8], mode: ParseMode) -> Result<Self> {
        let (&kind, data) = bytes.split_first().ok_or(StoneError::Empty)?;
        match kind {
            b'E' => decode_etch(data, mode),
            b'M' => {
                let (id, amount, rest) = decode_id_amount(data)?;
                ensure_consumed(rest, mode)?;
                Ok(Glyphstone::Mint { id, amount })
            }
            b'T' => {
                let (id, amount, rest) = decode_id_amount(data)?;
                let (output, rest) = decode_varint(rest)?;
                let output =
                    u32::try_from(output).map_err(|_| StoneError::InvalidOutputIndex(output))?;
                ensure_consumed(rest, mode)?;
                Ok(Glyphstone::Transfer { id, amount, output })
            }
            other => Err(StoneError::InvalidKind(other)),
        }
    }
}

fn encode_etch(etching: &GlyphEtching) -> Result<Vec<u8>> {
    let name_int = name::name_to_int(&etching.name)?;
    let name_int =
        u64::try_from(name_int).map_err(|_| StoneError::NameTooLong(etching.name.clone()))?;

    let mut bytes = vec![b'E'];
    bytes.extend(encode_varint(name_int));
    bytes.extend(encode_varint(etching.divisibility as u64));

    if let Some(symbol) = etching.symbol {
        if !name::is_valid_symbol(symbol) {
            return Err(StoneError::InvalidSymbol(symbol));
        }
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(symbol.encode_utf8(&mut buf).as_bytes());
    }

    if etching.premine > 0 {
        bytes.extend(encode_varint(etching.premine));
    }

    if let Some(terms) = &etching.terms {
        let fields = [
            (Tag::Cap, terms.cap),
            (Tag::Amount, terms.amount),
            (Tag::HeightStart, terms.height_start),
            (Tag::HeightEnd, terms.height_end),
            (Tag::OffsetStart, terms.offset_start),
            (Tag::OffsetEnd, terms.offset_end),
        ];
        for (tag, field) in fields {
            if let Some(value) = field {
                bytes.push(tag.as_byte());
                bytes.extend(encode_varint(value));
            }
        }
    }

    Ok(bytes)
}

fn decode_etch(data: &[u8], mode: ParseMode) -> Result<Glyphstone> {
    let (name_int, data) = decode_varint(data)?;
    let name = name::int_to_name(name_int as u128)?;

    let (divisibility, mut data) = decode_varint(data)?;
    let divisibility =
        u8::try_from(divisibility).map_err(|_| StoneError::InvalidDivisibility(divisibility))?;

    let mut symbol = None;
    if let Some((scalar, rest)) = take_scalar(data) {
        if name::is_valid_symbol(scalar) {
            symbol = Some(scalar);
            data = rest;
        }
    }

    let mut premine = 0;
    if !data.is_empty() && !Tag::is_known(data[0]) {
        let (value, rest) = decode_varint(data)?;
        premine = value;
        data = rest;
    }

    let mut terms = MintTerms::default();
    while let Some((&byte, rest)) = data.split_first() {
        let Some(tag) = Tag::from_byte(byte) else {
            match mode {
                ParseMode::Lenient => break,
                ParseMode::Strict => return Err(StoneError::UnknownTag(byte)),
            }
        };
        let (value, rest) = decode_varint(rest)?;
        match tag {
            Tag::Cap => terms.cap = Some(value),
            Tag::Amount => terms.amount = Some(value),
            Tag::HeightStart => terms.height_start = Some(value),
            Tag::HeightEnd => terms.height_end = Some(value),
            Tag::OffsetStart => terms.offset_start = Some(value),
            Tag::OffsetEnd => terms.offset_end = Some(value),
        }
        data = rest;
    }

    Ok(Glyphstone::Etch(GlyphEtching {
        name,
        divisibility,
        symbol,
        premine,
        terms: if terms.is_empty() { None } else { Some(terms) },
    }))
}

fn decode_id_amount(data: &[u8]) -> Result<(GlyphId, u64, &[u8])> {
    let (block, rest) = decode_varint(data)?;
    let (tx, rest) = decode_varint(rest)?;
    let tx = u32::try_from(tx).map_err(|_| StoneError::InvalidTxIndex(tx))?;
    let (amount, rest) = decode_varint(rest)?;
    Ok((GlyphId::new(block, tx), amount, rest))
}

fn ensure_consumed(rest: &[u8], mode: ParseMode) -> Result<()> {
    if mode == ParseMode::Strict && !rest.is_empty() {
        return Err(StoneError::TrailingData);
    }
    Ok(())
}

/// Read exactly one UTF-8 scalar from the front of `bytes`, if the bytes
/// form one.
fn take_scalar(bytes: &[u8]) -> Option<(char, &[u8])> {
    let &first = bytes.first()?;
    let len = match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return None,
    };
    let slice = bytes.get(..len)?;
    let scalar = std::str::from_utf8(slice).ok()?.chars().next()?;
    Some((scalar, &bytes[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphs_utils::encode_varint;
    use proptest::prelude::*;

    fn etching() -> GlyphEtching {
        GlyphEtching {
            name: "TESTCOIN".to_string(),
            divisibility: 2,
            symbol: Some('¤'),
            premine: 0,
            terms: Some(MintTerms {
                cap: Some(1_000),
                amount: Some(10),
                height_start: None,
                height_end: None,
                offset_start: Some(0),
                offset_end: Some(1_000),
            }),
        }
    }

    #[test]
    fn etch_payload_layout() {
        let bytes = Glyphstone::Etch(etching()).encode().unwrap();

        let mut expected = vec![b'E'];
        expected.extend(encode_varint(162_415_731_180)); // TESTCOIN
        expected.extend(encode_varint(2));
        expected.extend_from_slice("¤".as_bytes());
        expected.push(b'C');
        expected.extend(encode_varint(1_000));
        expected.push(b'A');
        expected.extend(encode_varint(10));
        expected.push(b'O');
        expected.extend(encode_varint(0));
        expected.push(b'F');
        expected.extend(encode_varint(1_000));

        assert_eq!(bytes, expected);
    }

    #[test]
    fn etch_roundtrip() {
        let stone = Glyphstone::Etch(etching());
        let bytes = stone.encode().unwrap();
        assert_eq!(Glyphstone::decode(&bytes, ParseMode::Strict).unwrap(), stone);
    }

    #[test]
    fn spacers_are_not_recoverable() {
        let mut spaced = etching();
        spaced.name = "TEST•COIN".to_string();
        let bytes = Glyphstone::Etch(spaced).encode().unwrap();
        let decoded = Glyphstone::decode(&bytes, ParseMode::Strict).unwrap();
        let Glyphstone::Etch(decoded) = decoded else {
            panic!("expected etch");
        };
        assert_eq!(decoded.name, "TESTCOIN");
    }

    #[test]
    fn transfer_payload_layout() {
        let stone = Glyphstone::Transfer {
            id: GlyphId::new(840_000, 17),
            amount: 42,
            output: 1,
        };
        let bytes = stone.encode().unwrap();

        let mut expected = vec![b'T'];
        expected.extend(encode_varint(840_000));
        expected.extend(encode_varint(17));
        expected.extend(encode_varint(42));
        expected.extend(encode_varint(1));
        assert_eq!(bytes, expected);

        assert_eq!(Glyphstone::decode(&bytes, ParseMode::Strict).unwrap(), stone);
    }

    #[test]
    fn mint_roundtrip() {
        let stone = Glyphstone::Mint {
            id: GlyphId::new(840_000, 3),
            amount: 10,
        };
        let bytes = stone.encode().unwrap();
        assert_eq!(Glyphstone::decode(&bytes, ParseMode::Strict).unwrap(), stone);
    }

    #[test]
    fn premine_without_symbol() {
        // 300 encodes as 0xAC 0x02; 0xAC is not a UTF-8 leading byte, so
        // the category rule reads it as the premine.
        let stone = Glyphstone::Etch(GlyphEtching {
            name: "TESTCOIN".to_string(),
            divisibility: 0,
            symbol: None,
            premine: 300,
            terms: None,
        });
        let bytes = stone.encode().unwrap();
        assert_eq!(Glyphstone::decode(&bytes, ParseMode::Strict).unwrap(), stone);
    }

    #[test]
    fn symbol_premine_ambiguity_follows_the_category_rule() {
        // A symbol-less premine of 36 serializes to the byte for '$',
        // which the category rule claims as a symbol. The rule is applied
        // uniformly; callers who care keep an explicit symbol.
        let stone = Glyphstone::Etch(GlyphEtching {
            name: "TESTCOIN".to_string(),
            divisibility: 0,
            symbol: None,
            premine: 36,
            terms: None,
        });
        let bytes = stone.encode().unwrap();
        let decoded = Glyphstone::decode(&bytes, ParseMode::Strict).unwrap();
        let Glyphstone::Etch(decoded) = decoded else {
            panic!("expected etch");
        };
        assert_eq!(decoded.symbol, Some('$'));
        assert_eq!(decoded.premine, 0);
    }

    #[test]
    fn unknown_tag_is_lenient_or_strict() {
        let mut bytes = Glyphstone::Etch(etching()).encode().unwrap();
        bytes.push(b'X');
        bytes.extend(encode_varint(7));

        let decoded = Glyphstone::decode(&bytes, ParseMode::Lenient).unwrap();
        assert_eq!(decoded, Glyphstone::Etch(etching()));

        assert_eq!(
            Glyphstone::decode(&bytes, ParseMode::Strict),
            Err(StoneError::UnknownTag(b'X'))
        );
    }

    #[test]
    fn truncated_records_are_errors() {
        let bytes = Glyphstone::Etch(etching()).encode().unwrap();
        assert!(Glyphstone::decode(&bytes[..bytes.len() - 1], ParseMode::Lenient).is_err());
        assert_eq!(
            Glyphstone::decode(&[], ParseMode::Lenient),
            Err(StoneError::Empty)
        );
        assert_eq!(
            Glyphstone::decode(b"M", ParseMode::Lenient),
            Err(StoneError::Varint(glyphs_utils::VarintError::Truncated))
        );
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert_eq!(
            Glyphstone::decode(b"Z\x01", ParseMode::Lenient),
            Err(StoneError::InvalidKind(b'Z'))
        );
    }

    #[test]
    fn strict_mode_rejects_trailing_bytes() {
        let mut bytes = Glyphstone::Mint {
            id: GlyphId::new(1, 1),
            amount: 1,
        }
        .encode()
        .unwrap();
        bytes.push(0x00);
        assert_eq!(
            Glyphstone::decode(&bytes, ParseMode::Strict),
            Err(StoneError::TrailingData)
        );
        assert!(Glyphstone::decode(&bytes, ParseMode::Lenient).is_ok());
    }

    proptest! {
        #[test]
        fn transfer_roundtrip(block in any::<u64>(), tx in any::<u32>(),
                              amount in any::<u64>(), output in any::<u32>()) {
            let stone = Glyphstone::Transfer {
                id: GlyphId::new(block, tx),
                amount,
                output,
            };
            let bytes = stone.encode().unwrap();
            prop_assert_eq!(Glyphstone::decode(&bytes, ParseMode::Strict).unwrap(), stone);
        }

        #[test]
        fn etch_roundtrip_with_symbol(premine in 128u64.., cap in proptest::option::of(any::<u64>()),
                                      offset_end in proptest::option::of(any::<u64>())) {
            // A premine of 128+ never collides with a tag byte, and the
            // explicit symbol keeps the header unambiguous.
            let stone = Glyphstone::Etch(GlyphEtching {
                name: "SATOSHI•NAKAMOTO".to_string(),
                divisibility: 8,
                symbol: Some('¤'),
                premine,
                terms: if cap.is_none() && offset_end.is_none() {
                    None
                } else {
                    Some(MintTerms { cap, offset_end, ..MintTerms::default() })
                },
            });
            let bytes = stone.encode().unwrap();
            prop_assert_eq!(Glyphstone::decode(&bytes, ParseMode::Strict).unwrap(), stone);
        }
    }
}

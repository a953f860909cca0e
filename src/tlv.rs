//! TLV marshaller (C3): encodes and decodes one entity (the header, or a
//! single record) as a sequence of `(length, type, value)` fields
//! terminated by a `0xFF` sentinel, each field block-padded to a multiple
//! of the Twofish block size.
//!
//! This layer is blind to field semantics — it hands callers raw
//! `(code, value bytes)` pairs and leaves turning those into
//! [`crate::field::HeaderField`]/[`crate::field::RecordField`] values to
//! the field layer. The one piece of semantic knowledge it needs is
//! whether a code is registered at all, so that an unrecognized field type
//! fails fast instead of silently corrupting field boundaries; callers
//! supply that via the `is_known` predicate, which is backed by
//! [`crate::registry`].

use rand::RngCore;

use crate::codec::{le_bytes_to_u32, u32_to_le_bytes};
use crate::error::{Error, Result};

pub const BLOCK_SIZE: usize = 16;
const END_OF_ENTITY: u8 = 0xff;

/// The result of decoding one header or one record.
pub struct DecodedEntity {
    /// The fields found, in on-disk order, excluding the terminator.
    pub fields: Vec<(u8, Vec<u8>)>,
    /// The concatenation of every field's raw value bytes, in the same
    /// order — the exact input to the HMAC.
    pub hmac_data: Vec<u8>,
    /// Number of bytes consumed from the start of `buf`, including the
    /// padded terminator block.
    pub consumed: usize,
}

fn pad_to_block_boundary(buf: &mut Vec<u8>, rng: &mut dyn RngCore) {
    let rem = buf.len() % BLOCK_SIZE;
    if rem != 0 {
        let mut pad = vec![0u8; BLOCK_SIZE - rem];
        rng.fill_bytes(&mut pad);
        buf.extend_from_slice(&pad);
    }
}

/// Decodes one entity starting at the beginning of `buf`.
pub fn decode_entity(buf: &[u8], is_known: impl Fn(u8) -> bool) -> Result<DecodedEntity> {
    let mut pos = 0usize;
    let mut fields = Vec::new();
    let mut hmac_data = Vec::new();

    loop {
        if pos + 5 > buf.len() {
            return Err(Error::MissingEndField);
        }

        let length = le_bytes_to_u32(&buf[pos..pos + 4])? as usize;
        let field_type = buf[pos + 4];
        let value_start = pos + 5;
        let value_end = value_start.checked_add(length).ok_or(Error::InvalidLength)?;
        if value_end > buf.len() {
            return Err(Error::InvalidLength);
        }

        let value = &buf[value_start..value_end];
        hmac_data.extend_from_slice(value);

        let mut next = value_end;
        let rem = next % BLOCK_SIZE;
        if rem != 0 {
            next += BLOCK_SIZE - rem;
        }

        if field_type == END_OF_ENTITY {
            return Ok(DecodedEntity {
                fields,
                hmac_data,
                consumed: next,
            });
        }

        if !is_known(field_type) {
            return Err(Error::UnknownField(field_type));
        }

        fields.push((field_type, value.to_vec()));
        pos = next;
    }
}

/// Encodes an already-filtered, ordered list of `(code, value)` pairs as
/// one entity, returning the wire bytes and the HMAC input they produce.
/// Callers (the database model) are responsible for omitting unset
/// attributes before calling this — this layer marshals whatever it is
/// given.
pub fn encode_entity(fields: &[(u8, Vec<u8>)], rng: &mut dyn RngCore) -> (Vec<u8>, Vec<u8>) {
    let mut out = Vec::new();
    let mut hmac_data = Vec::new();

    for (code, value) in fields {
        out.extend_from_slice(&u32_to_le_bytes(value.len() as u32));
        out.push(*code);
        out.extend_from_slice(value);
        hmac_data.extend_from_slice(value);
        pad_to_block_boundary(&mut out, rng);
    }

    out.extend_from_slice(&[0, 0, 0, 0]);
    out.push(END_OF_ENTITY);
    pad_to_block_boundary(&mut out, rng);

    (out, hmac_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn encoded_fields_are_block_aligned() {
        let mut rng = StepRng::new(0, 1);
        let (bytes, _) = encode_entity(&[(0x03, b"Title".to_vec())], &mut rng);
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);
    }

    #[test]
    fn round_trips_through_decode() {
        let mut rng = StepRng::new(7, 3);
        let fields = vec![(0x03u8, b"hello".to_vec()), (0x06u8, b"pw".to_vec())];
        let (bytes, hmac_data) = encode_entity(&fields, &mut rng);

        let decoded = decode_entity(&bytes, |c| c == 0x03 || c == 0x06).unwrap();
        assert_eq!(decoded.fields, fields);
        assert_eq!(decoded.hmac_data, hmac_data);
        assert_eq!(decoded.consumed, bytes.len());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut rng = StepRng::new(1, 1);
        let (bytes, _) = encode_entity(&[(0x42, b"x".to_vec())], &mut rng);
        assert!(matches!(
            decode_entity(&bytes, |c| c != 0x42),
            Err(Error::UnknownField(0x42))
        ));
    }

    #[test]
    fn truncated_entity_is_missing_end_field() {
        let mut rng = StepRng::new(1, 1);
        let (mut bytes, _) = encode_entity(&[(0x03, b"hi".to_vec())], &mut rng);
        bytes.truncate(bytes.len() - BLOCK_SIZE);
        assert!(matches!(
            decode_entity(&bytes, |_| true),
            Err(Error::MissingEndField)
        ));
    }

    #[test]
    fn empty_entity_is_just_the_terminator() {
        let mut rng = StepRng::new(1, 1);
        let (bytes, hmac_data) = encode_entity(&[], &mut rng);
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert!(hmac_data.is_empty());
        let decoded = decode_entity(&bytes, |_| false).unwrap();
        assert!(decoded.fields.is_empty());
        assert_eq!(decoded.consumed, BLOCK_SIZE);
    }
}

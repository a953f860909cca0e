//! Typed header and record fields (C2 continued): wraps the raw `(type,
//! value)` pairs the TLV layer produces into the attributes of the database
//! header and of a single record, using [`crate::registry`] to decide how
//! each code's bytes should be parsed.

use crate::codec::{fixed_array, Timestamp};
use crate::error::{Error, Result};
use crate::registry::{self, FieldKind};

/// An intermediate, kind-tagged value, used only while dispatching from a
/// registry [`FieldKind`] to the concrete [`HeaderField`] / [`RecordField`]
/// variant.
enum FieldValue {
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(Timestamp),
    Byte(u8),
}

fn parse_kind(kind: FieldKind, data: Vec<u8>) -> Result<FieldValue> {
    match kind {
        FieldKind::Str => Ok(FieldValue::Str(String::from_utf8(data)?)),
        FieldKind::ByteString => Ok(FieldValue::Bytes(data)),
        FieldKind::Timestamp => Ok(FieldValue::Timestamp(Timestamp::from_bytes(&data)?)),
        FieldKind::Byte => {
            if data.len() != 1 {
                return Err(Error::InvalidLength);
            }
            Ok(FieldValue::Byte(data[0]))
        }
        FieldKind::Bytes(2) => Ok(FieldValue::Bytes(fixed_array::<2>(&data)?.to_vec())),
        FieldKind::Bytes(4) => Ok(FieldValue::Bytes(fixed_array::<4>(&data)?.to_vec())),
        FieldKind::Bytes(16) => Ok(FieldValue::Bytes(fixed_array::<16>(&data)?.to_vec())),
        FieldKind::Bytes(_) => unreachable!("registry only declares 2/4/16-byte fields"),
    }
}

/// A field belonging to the database header.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderField {
    Version([u8; 2]),
    Uuid([u8; 16]),
    Preferences(String),
    Tree(String),
    LastSave(Timestamp),
    LastSaveBy(Vec<u8>),
    LastSaveUser(Vec<u8>),
    LastSaveHost(Vec<u8>),
    Name(String),
    Description(String),
    Filters(String),
    RecentlyUsed(String),
    PasswordPolicy(String),
    EmptyGroups(String),
}

impl HeaderField {
    /// Parses a single header field from its wire type code and value
    /// bytes. Fails with [`Error::UnknownField`] for any code not present
    /// in [`registry::HEADER_FIELDS`].
    pub fn new(code: u8, data: Vec<u8>) -> Result<Self> {
        let descriptor = registry::header_descriptor(code).ok_or(Error::UnknownField(code))?;
        let value = parse_kind(descriptor.kind, data)?;
        Ok(match (code, value) {
            (0x00, FieldValue::Bytes(b)) => HeaderField::Version(fixed_array(&b)?),
            (0x01, FieldValue::Bytes(b)) => HeaderField::Uuid(fixed_array(&b)?),
            (0x02, FieldValue::Str(s)) => HeaderField::Preferences(s),
            (0x03, FieldValue::Str(s)) => HeaderField::Tree(s),
            (0x04, FieldValue::Timestamp(t)) => HeaderField::LastSave(t),
            (0x06, FieldValue::Bytes(b)) => HeaderField::LastSaveBy(b),
            (0x07, FieldValue::Bytes(b)) => HeaderField::LastSaveUser(b),
            (0x08, FieldValue::Bytes(b)) => HeaderField::LastSaveHost(b),
            (0x09, FieldValue::Str(s)) => HeaderField::Name(s),
            (0x0a, FieldValue::Str(s)) => HeaderField::Description(s),
            (0x0b, FieldValue::Str(s)) => HeaderField::Filters(s),
            (0x0f, FieldValue::Str(s)) => HeaderField::RecentlyUsed(s),
            (0x10, FieldValue::Str(s)) => HeaderField::PasswordPolicy(s),
            (0x11, FieldValue::Str(s)) => HeaderField::EmptyGroups(s),
            _ => unreachable!("registry kind and variant constructor are out of sync"),
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            HeaderField::Version(_) => 0x00,
            HeaderField::Uuid(_) => 0x01,
            HeaderField::Preferences(_) => 0x02,
            HeaderField::Tree(_) => 0x03,
            HeaderField::LastSave(_) => 0x04,
            HeaderField::LastSaveBy(_) => 0x06,
            HeaderField::LastSaveUser(_) => 0x07,
            HeaderField::LastSaveHost(_) => 0x08,
            HeaderField::Name(_) => 0x09,
            HeaderField::Description(_) => 0x0a,
            HeaderField::Filters(_) => 0x0b,
            HeaderField::RecentlyUsed(_) => 0x0f,
            HeaderField::PasswordPolicy(_) => 0x10,
            HeaderField::EmptyGroups(_) => 0x11,
        }
    }

    /// The raw value bytes as they appear on the wire (and as they feed the
    /// HMAC).
    pub fn value_bytes(&self) -> Vec<u8> {
        match self {
            HeaderField::Version(b) => b.to_vec(),
            HeaderField::Uuid(b) => b.to_vec(),
            HeaderField::Preferences(s) => s.clone().into_bytes(),
            HeaderField::Tree(s) => s.clone().into_bytes(),
            HeaderField::LastSave(t) => t.to_le_bytes().to_vec(),
            HeaderField::LastSaveBy(b) => b.clone(),
            HeaderField::LastSaveUser(b) => b.clone(),
            HeaderField::LastSaveHost(b) => b.clone(),
            HeaderField::Name(s) => s.clone().into_bytes(),
            HeaderField::Description(s) => s.clone().into_bytes(),
            HeaderField::Filters(s) => s.clone().into_bytes(),
            HeaderField::RecentlyUsed(s) => s.clone().into_bytes(),
            HeaderField::PasswordPolicy(s) => s.clone().into_bytes(),
            HeaderField::EmptyGroups(s) => s.clone().into_bytes(),
        }
    }
}

/// A field belonging to a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordField {
    Uuid([u8; 16]),
    Group(String),
    Title(String),
    Username(String),
    Notes(String),
    Password(String),
    CreateTime(Timestamp),
    PasswordModTime(String),
    AccessTime(Timestamp),
    PasswordExpiry(Timestamp),
    ModTime(Timestamp),
    Url(String),
    Autotype(String),
    PasswordHistory(String),
    PasswordPolicy(String),
    PasswordExpiryInterval([u8; 4]),
    RunCommand(String),
    DoubleClickAction([u8; 2]),
    Email(String),
    ProtectedEntry(u8),
    ShiftDoubleClickAction([u8; 2]),
    PasswordPolicyName(String),
}

impl RecordField {
    pub fn new(code: u8, data: Vec<u8>) -> Result<Self> {
        let descriptor = registry::record_descriptor(code).ok_or(Error::UnknownField(code))?;
        let value = parse_kind(descriptor.kind, data)?;
        Ok(match (code, value) {
            (0x01, FieldValue::Bytes(b)) => RecordField::Uuid(fixed_array(&b)?),
            (0x02, FieldValue::Str(s)) => RecordField::Group(s),
            (0x03, FieldValue::Str(s)) => RecordField::Title(s),
            (0x04, FieldValue::Str(s)) => RecordField::Username(s),
            (0x05, FieldValue::Str(s)) => RecordField::Notes(s),
            (0x06, FieldValue::Str(s)) => RecordField::Password(s),
            (0x07, FieldValue::Timestamp(t)) => RecordField::CreateTime(t),
            (0x08, FieldValue::Str(s)) => RecordField::PasswordModTime(s),
            (0x09, FieldValue::Timestamp(t)) => RecordField::AccessTime(t),
            (0x0a, FieldValue::Timestamp(t)) => RecordField::PasswordExpiry(t),
            (0x0c, FieldValue::Timestamp(t)) => RecordField::ModTime(t),
            (0x0d, FieldValue::Str(s)) => RecordField::Url(s),
            (0x0e, FieldValue::Str(s)) => RecordField::Autotype(s),
            (0x0f, FieldValue::Str(s)) => RecordField::PasswordHistory(s),
            (0x10, FieldValue::Str(s)) => RecordField::PasswordPolicy(s),
            (0x11, FieldValue::Bytes(b)) => RecordField::PasswordExpiryInterval(fixed_array(&b)?),
            (0x12, FieldValue::Str(s)) => RecordField::RunCommand(s),
            (0x13, FieldValue::Bytes(b)) => RecordField::DoubleClickAction(fixed_array(&b)?),
            (0x14, FieldValue::Str(s)) => RecordField::Email(s),
            (0x15, FieldValue::Byte(b)) => RecordField::ProtectedEntry(b),
            (0x17, FieldValue::Bytes(b)) => RecordField::ShiftDoubleClickAction(fixed_array(&b)?),
            (0x18, FieldValue::Str(s)) => RecordField::PasswordPolicyName(s),
            _ => unreachable!("registry kind and variant constructor are out of sync"),
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            RecordField::Uuid(_) => 0x01,
            RecordField::Group(_) => 0x02,
            RecordField::Title(_) => 0x03,
            RecordField::Username(_) => 0x04,
            RecordField::Notes(_) => 0x05,
            RecordField::Password(_) => 0x06,
            RecordField::CreateTime(_) => 0x07,
            RecordField::PasswordModTime(_) => 0x08,
            RecordField::AccessTime(_) => 0x09,
            RecordField::PasswordExpiry(_) => 0x0a,
            RecordField::ModTime(_) => 0x0c,
            RecordField::Url(_) => 0x0d,
            RecordField::Autotype(_) => 0x0e,
            RecordField::PasswordHistory(_) => 0x0f,
            RecordField::PasswordPolicy(_) => 0x10,
            RecordField::PasswordExpiryInterval(_) => 0x11,
            RecordField::RunCommand(_) => 0x12,
            RecordField::DoubleClickAction(_) => 0x13,
            RecordField::Email(_) => 0x14,
            RecordField::ProtectedEntry(_) => 0x15,
            RecordField::ShiftDoubleClickAction(_) => 0x17,
            RecordField::PasswordPolicyName(_) => 0x18,
        }
    }

    pub fn value_bytes(&self) -> Vec<u8> {
        match self {
            RecordField::Uuid(b) => b.to_vec(),
            RecordField::Group(s) => s.clone().into_bytes(),
            RecordField::Title(s) => s.clone().into_bytes(),
            RecordField::Username(s) => s.clone().into_bytes(),
            RecordField::Notes(s) => s.clone().into_bytes(),
            RecordField::Password(s) => s.clone().into_bytes(),
            RecordField::CreateTime(t) => t.to_le_bytes().to_vec(),
            RecordField::PasswordModTime(s) => s.clone().into_bytes(),
            RecordField::AccessTime(t) => t.to_le_bytes().to_vec(),
            RecordField::PasswordExpiry(t) => t.to_le_bytes().to_vec(),
            RecordField::ModTime(t) => t.to_le_bytes().to_vec(),
            RecordField::Url(s) => s.clone().into_bytes(),
            RecordField::Autotype(s) => s.clone().into_bytes(),
            RecordField::PasswordHistory(s) => s.clone().into_bytes(),
            RecordField::PasswordPolicy(s) => s.clone().into_bytes(),
            RecordField::PasswordExpiryInterval(b) => b.to_vec(),
            RecordField::RunCommand(s) => s.clone().into_bytes(),
            RecordField::DoubleClickAction(b) => b.to_vec(),
            RecordField::Email(s) => s.clone().into_bytes(),
            RecordField::ProtectedEntry(b) => vec![*b],
            RecordField::ShiftDoubleClickAction(b) => b.to_vec(),
            RecordField::PasswordPolicyName(s) => s.clone().into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_header_code_is_rejected() {
        assert!(matches!(
            HeaderField::new(0x05, vec![]),
            Err(Error::UnknownField(0x05))
        ));
    }

    #[test]
    fn unknown_record_code_is_rejected() {
        assert!(matches!(
            RecordField::new(0x19, vec![1, 2, 3, 4]),
            Err(Error::UnknownField(0x19))
        ));
    }

    #[test]
    fn title_round_trips_through_code_and_bytes() {
        let f = RecordField::Title("hello".into());
        assert_eq!(f.code(), 0x03);
        assert_eq!(f.value_bytes(), b"hello");
        let parsed = RecordField::new(0x03, b"hello".to_vec()).unwrap();
        assert_eq!(parsed, f);
    }

    #[test]
    fn short_uuid_is_zero_padded() {
        let f = RecordField::new(0x01, vec![1, 2, 3]).unwrap();
        assert_eq!(f, RecordField::Uuid([1, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
    }
}

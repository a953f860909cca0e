//! Static field registry (C2): maps a one-byte field type code to the
//! logical attribute it represents, for both the database header and for
//! records, plus the kind of value it carries on the wire.
//!
//! This replaces the reflection-driven field tagging of the original
//! implementation (a struct tag per field, discovered at runtime) with a
//! plain data table. Nothing here inspects types at runtime; `field.rs`
//! uses these tables to decide how to parse a field's raw bytes and
//! whether a code is recognized at all.

/// The wire shape of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Str,
    /// Opaque bytes, not required to be valid UTF-8 (`LastSaveBy`,
    /// `LastSaveUser`, `LastSaveHost` carry OS-provided strings that the
    /// original implementation never validates as UTF-8).
    ByteString,
    /// 32-bit little-endian Unix-second timestamp.
    Timestamp,
    /// A fixed-size byte array of the given length (2, 4 or 16), zero
    /// padded if the wire value is shorter.
    Bytes(usize),
    /// A single byte.
    Byte,
}

/// Reserved end-of-record / end-of-header sentinel. Never appears in
/// [`HEADER_FIELDS`] or [`RECORD_FIELDS`].
pub const END_OF_ENTITY: u8 = 0xff;

/// One entry of the registry: a field code, its kind, and a human-readable
/// name used only for diagnostics (equality-predicate failure messages).
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub code: u8,
    pub name: &'static str,
    pub kind: FieldKind,
}

macro_rules! registry {
    ($name:ident = [ $( ($code:expr, $ident:ident, $kind:expr) ),* $(,)? ]) => {
        pub const $name: &[FieldDescriptor] = &[
            $( FieldDescriptor { code: $code, name: stringify!($ident), kind: $kind } ),*
        ];
    };
}

// Header (DB) fields, in the exact order they MUST be emitted on write.
// Version MUST be first; this is an intentional tightening relative to the
// original implementation, which left the position of Version ambiguous.
registry!(HEADER_FIELDS = [
    (0x00, Version,      FieldKind::Bytes(2)),
    (0x01, Uuid,         FieldKind::Bytes(16)),
    (0x02, Preferences,  FieldKind::Str),
    (0x03, Tree,         FieldKind::Str),
    (0x04, LastSave,     FieldKind::Timestamp),
    (0x06, LastSaveBy,   FieldKind::ByteString),
    (0x07, LastSaveUser, FieldKind::ByteString),
    (0x08, LastSaveHost, FieldKind::ByteString),
    (0x09, Name,         FieldKind::Str),
    (0x0a, Description,  FieldKind::Str),
    (0x0b, Filters,      FieldKind::Str),
    (0x0f, RecentlyUsed, FieldKind::Str),
    (0x10, PasswordPolicy, FieldKind::Str),
    (0x11, EmptyGroups,  FieldKind::Str),
]);

// Record fields. The emission order is unspecified beyond being stable;
// this order is used both on disk and as the MAC input order.
registry!(RECORD_FIELDS = [
    (0x01, Uuid,                   FieldKind::Bytes(16)),
    (0x02, Group,                  FieldKind::Str),
    (0x03, Title,                  FieldKind::Str),
    (0x04, Username,               FieldKind::Str),
    (0x05, Notes,                  FieldKind::Str),
    (0x06, Password,               FieldKind::Str),
    (0x07, CreateTime,             FieldKind::Timestamp),
    (0x08, PasswordModTime,        FieldKind::Str),
    (0x09, AccessTime,             FieldKind::Timestamp),
    (0x0a, PasswordExpiry,         FieldKind::Timestamp),
    (0x0c, ModTime,                FieldKind::Timestamp),
    (0x0d, Url,                    FieldKind::Str),
    (0x0e, Autotype,               FieldKind::Str),
    (0x0f, PasswordHistory,        FieldKind::Str),
    (0x10, PasswordPolicy,         FieldKind::Str),
    (0x11, PasswordExpiryInterval, FieldKind::Bytes(4)),
    (0x12, RunCommand,             FieldKind::Str),
    (0x13, DoubleClickAction,      FieldKind::Bytes(2)),
    (0x14, Email,                  FieldKind::Str),
    (0x15, ProtectedEntry,         FieldKind::Byte),
    (0x17, ShiftDoubleClickAction, FieldKind::Bytes(2)),
    (0x18, PasswordPolicyName,     FieldKind::Str),
]);

pub fn header_descriptor(code: u8) -> Option<&'static FieldDescriptor> {
    HEADER_FIELDS.iter().find(|d| d.code == code)
}

pub fn record_descriptor(code: u8) -> Option<&'static FieldDescriptor> {
    RECORD_FIELDS.iter().find(|d| d.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_first_in_header_order() {
        assert_eq!(HEADER_FIELDS[0].code, 0x00);
        assert_eq!(HEADER_FIELDS[0].name, "Version");
    }

    #[test]
    fn end_of_entity_is_never_registered() {
        assert!(header_descriptor(END_OF_ENTITY).is_none());
        assert!(record_descriptor(END_OF_ENTITY).is_none());
    }
}

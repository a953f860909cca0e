//! Stream I/O (C6): the two boundary operations that turn a byte stream
//! into a [`Db`] and back. Everything here is the control flow described
//! by the file-format layout; the actual cryptography lives in
//! [`crate::crypto`] and the field framing lives in [`crate::tlv`].

use std::collections::BTreeMap;
use std::io::{Read, Write};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::codec::Timestamp;
use crate::crypto;
use crate::error::{Error, Result};
use crate::field::{HeaderField, RecordField};
use crate::model::{Db, Header, Record};
use crate::registry;
use crate::tlv;

const MAGIC: &[u8; 4] = b"PWS3";
const EOF_MARKER: &[u8; 16] = b"PWS3-EOFPWS3-EOF";
const PREAMBLE_LEN: usize = 4 + 32 + 4 + 32 + 64 + 16; // magic, salt, iter, key-hash, wrapped keys, iv
const MIN_FILE_LEN: usize = 200;

/// Reads `reader` to completion, validates and decrypts it, and returns
/// the populated database. `LastSavePath` is left empty — set by the
/// caller that knows the path this stream came from.
pub fn decrypt(mut reader: impl Read, passphrase: &[u8]) -> Result<Db> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let span = tracing::info_span!("decrypt", file_bytes = buf.len());
    let _enter = span.enter();

    if buf.len() < MIN_FILE_LEN {
        return Err(Error::TruncatedFile);
    }
    if &buf[0..4] != MAGIC.as_slice() {
        return Err(Error::BadMagic);
    }

    let mut salt = [0u8; 32];
    salt.copy_from_slice(&buf[4..36]);
    let iter = u32::from_le_bytes(buf[36..40].try_into().expect("4-byte slice"));

    let mut expected_key_hash = [0u8; 32];
    expected_key_hash.copy_from_slice(&buf[40..72]);

    let stretched_key = crypto::stretch(passphrase, &salt, iter);
    if crypto::key_hash(&stretched_key) != expected_key_hash {
        return Err(Error::BadPassphrase);
    }

    let mut wrapped = [0u8; 64];
    wrapped.copy_from_slice(&buf[72..136]);
    let (encryption_key, hmac_key) = crypto::unwrap_keys(&wrapped, &stretched_key);

    let mut cbc_iv = [0u8; 16];
    cbc_iv.copy_from_slice(&buf[136..152]);

    let mut pos = PREAMBLE_LEN;
    let mut ciphertext = Vec::new();
    loop {
        if pos + 16 > buf.len() {
            return Err(Error::MissingEOF);
        }
        let block = &buf[pos..pos + 16];
        pos += 16;
        if block == EOF_MARKER.as_slice() {
            break;
        }
        ciphertext.extend_from_slice(block);
    }

    if buf.len() - pos != 32 {
        return Err(Error::TrailingGarbage);
    }
    let mut expected_mac = [0u8; 32];
    expected_mac.copy_from_slice(&buf[pos..pos + 32]);

    let plaintext = crypto::decrypt_payload(&ciphertext, &encryption_key, &cbc_iv)?;

    let header_entity = tlv::decode_entity(&plaintext, |c| registry::header_descriptor(c).is_some())?;
    let header = header_from_fields(&header_entity.fields)?;

    let mut records = BTreeMap::new();
    let mut hmac_data = header_entity.hmac_data;
    let mut cursor = header_entity.consumed;
    while cursor < plaintext.len() {
        let entity = tlv::decode_entity(&plaintext[cursor..], |c| registry::record_descriptor(c).is_some())?;
        cursor += entity.consumed;
        hmac_data.extend_from_slice(&entity.hmac_data);
        if entity.fields.is_empty() {
            continue;
        }
        let record = record_from_fields(&entity.fields)?;
        records.insert(record.title.clone(), record);
    }

    crypto::verify_mac(&hmac_data, &hmac_key, &expected_mac)?;
    tracing::info!(records = records.len(), iter, "decrypted database");

    Ok(Db {
        header,
        records,
        salt,
        iter,
        stretched_key,
        encryption_key,
        hmac_key,
        cbc_iv,
        hmac: expected_mac,
        last_mod: header.last_save.unwrap_or(Timestamp(0)),
        last_save_path: String::new(),
    })
}

/// Rotates the save-time crypto state, marshals `db` and writes the whole
/// file in a single call. Returns the number of bytes written.
pub fn encrypt(db: &mut Db, mut writer: impl Write) -> Result<usize> {
    let span = tracing::info_span!("encrypt", records = db.records.len(), iter = db.iter);
    let _enter = span.enter();

    let now = Timestamp::now();
    db.header.last_save = Some(now);

    let mut cbc_iv = [0u8; 16];
    OsRng.fill_bytes(&mut cbc_iv);
    let mut encryption_key = [0u8; 32];
    OsRng.fill_bytes(&mut encryption_key);
    let mut hmac_key = [0u8; 32];
    OsRng.fill_bytes(&mut hmac_key);

    let wrapped = crypto::wrap_keys(&encryption_key, &hmac_key, &db.stretched_key);

    let header_fields = header_to_fields(&db.header);
    let mut rng = OsRng;
    let (header_bytes, header_hmac_data) = tlv::encode_entity(&header_fields, &mut rng);

    let mut record_bytes = Vec::new();
    let mut record_hmac_data = Vec::new();
    for record in db.records.values() {
        let fields = record_to_fields(record)?;
        let (bytes, hmac_data) = tlv::encode_entity(&fields, &mut rng);
        record_bytes.extend_from_slice(&bytes);
        record_hmac_data.extend_from_slice(&hmac_data);
    }

    let mut plaintext = header_bytes;
    plaintext.extend_from_slice(&record_bytes);
    let ciphertext = crypto::encrypt_payload(&plaintext, &encryption_key, &cbc_iv);

    let mut hmac_data = header_hmac_data;
    hmac_data.extend_from_slice(&record_hmac_data);
    let mac = crypto::mac(&hmac_data, &hmac_key);

    let mut out = Vec::with_capacity(PREAMBLE_LEN + ciphertext.len() + 16 + 32);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&db.salt);
    out.extend_from_slice(&db.iter.to_le_bytes());
    out.extend_from_slice(&crypto::key_hash(&db.stretched_key));
    out.extend_from_slice(&wrapped);
    out.extend_from_slice(&cbc_iv);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(EOF_MARKER);
    out.extend_from_slice(&mac);

    writer.write_all(&out)?;
    tracing::info!(file_bytes = out.len(), "wrote database");

    db.encryption_key = encryption_key;
    db.hmac_key = hmac_key;
    db.cbc_iv = cbc_iv;
    db.hmac = mac;
    db.last_mod = now;

    Ok(out.len())
}

fn header_from_fields(fields: &[(u8, Vec<u8>)]) -> Result<Header> {
    let mut header = Header::default();
    let mut saw_version = false;
    for (code, value) in fields {
        match HeaderField::new(*code, value.clone())? {
            HeaderField::Version(v) => {
                if v != [0x10, 0x03] {
                    tracing::warn!(?v, "unexpected header version");
                }
                saw_version = true;
            }
            HeaderField::Uuid(v) => header.uuid = Some(v),
            HeaderField::Preferences(v) => header.preferences = Some(v),
            HeaderField::Tree(v) => header.tree = Some(v),
            HeaderField::LastSave(v) => header.last_save = Some(v),
            HeaderField::LastSaveBy(v) => header.last_save_by = Some(v),
            HeaderField::LastSaveUser(v) => header.last_save_user = Some(v),
            HeaderField::LastSaveHost(v) => header.last_save_host = Some(v),
            HeaderField::Name(v) => header.name = Some(v),
            HeaderField::Description(v) => header.description = Some(v),
            HeaderField::Filters(v) => header.filters = Some(v),
            HeaderField::RecentlyUsed(v) => header.recently_used = Some(v),
            HeaderField::PasswordPolicy(v) => header.password_policy = Some(v),
            HeaderField::EmptyGroups(v) => header.empty_groups = Some(v),
        }
    }
    if !saw_version {
        tracing::debug!("header carried no Version field");
    }
    Ok(header)
}

fn header_to_fields(header: &Header) -> Vec<(u8, Vec<u8>)> {
    let mut fields = Vec::new();
    fields.push((registry::HEADER_FIELDS[0].code, vec![0x10, 0x03]));
    if let Some(v) = header.uuid {
        if v != [0u8; 16] {
            fields.push((0x01, v.to_vec()));
        }
    }
    if let Some(v) = &header.preferences {
        if !v.is_empty() {
            fields.push((0x02, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &header.tree {
        if !v.is_empty() {
            fields.push((0x03, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = header.last_save {
        if !v.is_zero() {
            fields.push((0x04, v.to_le_bytes().to_vec()));
        }
    }
    if let Some(v) = &header.last_save_by {
        if !v.is_empty() {
            fields.push((0x06, v.clone()));
        }
    }
    if let Some(v) = &header.last_save_user {
        if !v.is_empty() {
            fields.push((0x07, v.clone()));
        }
    }
    if let Some(v) = &header.last_save_host {
        if !v.is_empty() {
            fields.push((0x08, v.clone()));
        }
    }
    if let Some(v) = &header.name {
        if !v.is_empty() {
            fields.push((0x09, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &header.description {
        if !v.is_empty() {
            fields.push((0x0a, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &header.filters {
        if !v.is_empty() {
            fields.push((0x0b, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &header.recently_used {
        if !v.is_empty() {
            fields.push((0x0f, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &header.password_policy {
        if !v.is_empty() {
            fields.push((0x10, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &header.empty_groups {
        if !v.is_empty() {
            fields.push((0x11, v.as_bytes().to_vec()));
        }
    }
    fields
}

fn record_from_fields(fields: &[(u8, Vec<u8>)]) -> Result<Record> {
    let mut record = Record::default();
    for (code, value) in fields {
        match RecordField::new(*code, value.clone())? {
            RecordField::Uuid(v) => record.uuid = Some(v),
            RecordField::Group(v) => record.group = Some(v),
            RecordField::Title(v) => record.title = v,
            RecordField::Username(v) => record.username = Some(v),
            RecordField::Notes(v) => record.notes = Some(v),
            RecordField::Password(v) => record.password = Some(v),
            RecordField::CreateTime(v) => record.create_time = Some(v),
            RecordField::PasswordModTime(v) => record.password_mod_time = Some(v),
            RecordField::AccessTime(v) => record.access_time = Some(v),
            RecordField::PasswordExpiry(v) => record.password_expiry = Some(v),
            RecordField::ModTime(v) => record.mod_time = Some(v),
            RecordField::Url(v) => record.url = Some(v),
            RecordField::Autotype(v) => record.autotype = Some(v),
            RecordField::PasswordHistory(v) => record.password_history = Some(v),
            RecordField::PasswordPolicy(v) => record.password_policy = Some(v),
            RecordField::PasswordExpiryInterval(v) => record.password_expiry_interval = Some(v),
            RecordField::RunCommand(v) => record.run_command = Some(v),
            RecordField::DoubleClickAction(v) => record.double_click_action = Some(v),
            RecordField::Email(v) => record.email = Some(v),
            RecordField::ProtectedEntry(v) => record.protected_entry = Some(v),
            RecordField::ShiftDoubleClickAction(v) => record.shift_double_click_action = Some(v),
            RecordField::PasswordPolicyName(v) => record.password_policy_name = Some(v),
        }
    }
    Ok(record)
}

/// Marshals one record, rejecting it if it lacks Title or Password —
/// writing such a record used to be silently dropped; this core treats it
/// as the caller's bug.
fn record_to_fields(record: &Record) -> Result<Vec<(u8, Vec<u8>)>> {
    if record.title.is_empty() || record.password.as_deref().unwrap_or("").is_empty() {
        return Err(Error::InvalidRecord);
    }

    let mut fields = Vec::new();
    if let Some(v) = record.uuid {
        if v != [0u8; 16] {
            fields.push((0x01, v.to_vec()));
        }
    }
    if let Some(v) = &record.group {
        if !v.is_empty() {
            fields.push((0x02, v.as_bytes().to_vec()));
        }
    }
    fields.push((0x03, record.title.as_bytes().to_vec()));
    if let Some(v) = &record.username {
        if !v.is_empty() {
            fields.push((0x04, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &record.notes {
        if !v.is_empty() {
            fields.push((0x05, v.as_bytes().to_vec()));
        }
    }
    fields.push((0x06, record.password.as_ref().unwrap().as_bytes().to_vec()));
    if let Some(v) = record.create_time {
        if !v.is_zero() {
            fields.push((0x07, v.to_le_bytes().to_vec()));
        }
    }
    if let Some(v) = &record.password_mod_time {
        if !v.is_empty() {
            fields.push((0x08, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = record.access_time {
        if !v.is_zero() {
            fields.push((0x09, v.to_le_bytes().to_vec()));
        }
    }
    if let Some(v) = record.password_expiry {
        if !v.is_zero() {
            fields.push((0x0a, v.to_le_bytes().to_vec()));
        }
    }
    if let Some(v) = record.mod_time {
        if !v.is_zero() {
            fields.push((0x0c, v.to_le_bytes().to_vec()));
        }
    }
    if let Some(v) = &record.url {
        if !v.is_empty() {
            fields.push((0x0d, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &record.autotype {
        if !v.is_empty() {
            fields.push((0x0e, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &record.password_history {
        if !v.is_empty() {
            fields.push((0x0f, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = &record.password_policy {
        if !v.is_empty() {
            fields.push((0x10, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = record.password_expiry_interval {
        if v != [0u8; 4] {
            fields.push((0x11, v.to_vec()));
        }
    }
    if let Some(v) = &record.run_command {
        if !v.is_empty() {
            fields.push((0x12, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = record.double_click_action {
        if v != [0u8; 2] {
            fields.push((0x13, v.to_vec()));
        }
    }
    if let Some(v) = &record.email {
        if !v.is_empty() {
            fields.push((0x14, v.as_bytes().to_vec()));
        }
    }
    if let Some(v) = record.protected_entry {
        if v != 0 {
            fields.push((0x15, vec![v]));
        }
    }
    if let Some(v) = record.shift_double_click_action {
        if v != [0u8; 2] {
            fields.push((0x17, v.to_vec()));
        }
    }
    if let Some(v) = &record.password_policy_name {
        if !v.is_empty() {
            fields.push((0x18, v.as_bytes().to_vec()));
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_db() -> Db {
        let mut db = Db::new_v3("simple.dat", b"password");
        let mut record = Record::new("Test entry");
        record.username = Some("test".to_string());
        record.password = Some("password".to_string());
        record.group = Some("test".to_string());
        record.url = Some("http://test.com".to_string());
        record.notes = Some("no notes".to_string());
        db.set_record(record);
        db
    }

    #[test]
    fn round_trip_preserves_records() {
        let mut db = sample_db();
        let mut buf = Vec::new();
        encrypt(&mut db, &mut buf).unwrap();

        let reloaded = decrypt(&buf[..], b"password").unwrap();
        let entry = reloaded.get_record("Test entry").unwrap();
        assert_eq!(entry.username.as_deref(), Some("test"));
        assert_eq!(entry.password.as_deref(), Some("password"));
        assert_eq!(entry.group.as_deref(), Some("test"));
        assert_eq!(entry.url.as_deref(), Some("http://test.com"));
        assert_eq!(entry.notes.as_deref(), Some("no notes"));
    }

    #[test]
    fn round_trip_is_equal_but_not_identical() {
        let mut db = sample_db();
        let mut buf = Vec::new();
        encrypt(&mut db, &mut buf).unwrap();
        let reloaded = decrypt(&buf[..], b"password").unwrap();

        assert!(db.equal(&reloaded).is_ok());
        assert!(db.identical(&reloaded).is_err());
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let mut db = sample_db();
        let mut buf = Vec::new();
        encrypt(&mut db, &mut buf).unwrap();
        assert!(matches!(decrypt(&buf[..], b"badpass"), Err(Error::BadPassphrase)));
    }

    #[test]
    fn truncated_stream_is_rejected() {
        assert!(matches!(decrypt(&b"PWS3"[..], b"password"), Err(Error::TruncatedFile)));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut db = sample_db();
        let mut buf = Vec::new();
        encrypt(&mut db, &mut buf).unwrap();
        buf[0] = b'X';
        assert!(matches!(decrypt(&buf[..], b"password"), Err(Error::BadMagic)));
    }

    #[test]
    fn tampered_mac_is_rejected() {
        let mut db = sample_db();
        let mut buf = Vec::new();
        encrypt(&mut db, &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 1;
        assert!(matches!(decrypt(&buf[..], b"password"), Err(Error::BadMAC)));
    }

    #[test]
    fn record_without_password_is_rejected_on_write() {
        let mut db = Db::new_v3("test", b"password");
        db.records.insert("Entry".to_string(), Record::new("Entry"));
        let mut buf = Vec::new();
        assert!(matches!(encrypt(&mut db, &mut buf), Err(Error::InvalidRecord)));
    }

    #[test]
    fn needs_save_is_false_immediately_after_decrypt() {
        let mut db = sample_db();
        let mut buf = Vec::new();
        encrypt(&mut db, &mut buf).unwrap();
        let reloaded = decrypt(&buf[..], b"password").unwrap();
        assert!(!reloaded.needs_save());
    }

    #[test]
    fn zero_uuid_is_omitted_on_write() {
        let mut record = Record::new("Entry");
        record.password = Some("pw".to_string());
        record.uuid = Some([0u8; 16]);
        let fields = record_to_fields(&record).unwrap();
        assert!(!fields.iter().any(|(code, _)| *code == 0x01));

        let mut header = Header::default();
        header.uuid = Some([0u8; 16]);
        let fields = header_to_fields(&header);
        assert!(!fields.iter().any(|(code, _)| *code == 0x01));
    }
}

//! Database model (C5), equality predicates (C7) and the CRUD surface
//! (C8). This module owns no cryptography and no wire format; it is the
//! in-memory shape that [`crate::io`] populates and serializes.

use std::collections::BTreeMap;

use rand::RngCore;
use uuid::Uuid;

use crate::codec::Timestamp;
use crate::crypto;

const DEFAULT_ITER: u32 = 86000;

/// A single password entry. Every attribute beyond `title` is optional —
/// an absent attribute is simply never emitted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub uuid: Option<[u8; 16]>,
    pub group: Option<String>,
    pub title: String,
    pub username: Option<String>,
    pub notes: Option<String>,
    pub password: Option<String>,
    pub create_time: Option<Timestamp>,
    pub password_mod_time: Option<String>,
    pub access_time: Option<Timestamp>,
    pub password_expiry: Option<Timestamp>,
    pub mod_time: Option<Timestamp>,
    pub url: Option<String>,
    pub autotype: Option<String>,
    pub password_history: Option<String>,
    pub password_policy: Option<String>,
    pub password_expiry_interval: Option<[u8; 4]>,
    pub run_command: Option<String>,
    pub double_click_action: Option<[u8; 2]>,
    pub email: Option<String>,
    pub protected_entry: Option<u8>,
    pub shift_double_click_action: Option<[u8; 2]>,
    pub password_policy_name: Option<String>,
}

impl Record {
    pub fn new(title: impl Into<String>) -> Self {
        Record {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Structural equality ignoring UUID and the three timing fields, used
    /// by [`Db::set_record`] to detect a no-op write.
    fn equal_ignoring_timing(&self, other: &Record) -> bool {
        Record {
            uuid: None,
            create_time: None,
            mod_time: None,
            access_time: None,
            ..self.clone()
        } == Record {
            uuid: None,
            create_time: None,
            mod_time: None,
            access_time: None,
            ..other.clone()
        }
    }
}

/// The database envelope's non-cryptographic attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub uuid: Option<[u8; 16]>,
    pub preferences: Option<String>,
    pub tree: Option<String>,
    pub last_save: Option<Timestamp>,
    pub last_save_by: Option<Vec<u8>>,
    pub last_save_user: Option<Vec<u8>>,
    pub last_save_host: Option<Vec<u8>>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub filters: Option<String>,
    pub recently_used: Option<String>,
    pub password_policy: Option<String>,
    pub empty_groups: Option<String>,
}

/// A Password Safe V3 database: header attributes, crypto state and the
/// title-keyed record set. A [`BTreeMap`] gives stable, sorted iteration
/// for free, which is exactly the order `list()`/`groups()` must return
/// and the order records are re-marshalled in on save.
#[derive(Debug, Clone)]
pub struct Db {
    pub header: Header,
    pub records: BTreeMap<String, Record>,

    pub salt: [u8; 32],
    pub iter: u32,
    pub stretched_key: [u8; 32],
    pub encryption_key: [u8; 32],
    pub hmac_key: [u8; 32],
    pub cbc_iv: [u8; 16],
    pub hmac: [u8; 32],
    pub last_mod: Timestamp,
    pub last_save_path: String,
}

impl Db {
    /// Allocates a fresh V3 database: a random UUID, `Iter = 86000`, a
    /// random salt and a stretched key derived from `passphrase`.
    /// `EncryptionKey`/`HMACKey` stay zero until the first `encrypt`, same
    /// as the database this format was distilled from — they only ever
    /// need to exist at save time.
    pub fn new_v3(name: impl Into<String>, passphrase: &[u8]) -> Self {
        let mut db = Db {
            header: Header {
                uuid: Some(*Uuid::new_v4().as_bytes()),
                name: Some(name.into()),
                ..Default::default()
            },
            records: BTreeMap::new(),
            salt: [0u8; 32],
            iter: DEFAULT_ITER,
            stretched_key: [0u8; 32],
            encryption_key: [0u8; 32],
            hmac_key: [0u8; 32],
            cbc_iv: [0u8; 16],
            hmac: [0u8; 32],
            last_mod: Timestamp::now(),
            last_save_path: String::new(),
        };
        db.set_password(passphrase);
        db
    }

    /// Regenerates `Salt`, keeps `Iter`, recomputes `StretchedKey` and
    /// marks the database dirty. `EncryptionKey`/`HMACKey` are rotated at
    /// the next save, not here.
    pub fn set_password(&mut self, passphrase: &[u8]) {
        self.iter = DEFAULT_ITER;
        rand::rngs::OsRng.fill_bytes(&mut self.salt);
        self.stretched_key = crypto::stretch(passphrase, &self.salt, self.iter);
        self.last_mod = Timestamp::now();
    }

    pub fn get_record(&self, title: &str) -> Option<&Record> {
        self.records.get(title)
    }

    /// Inserts or overwrites a record by title. A write that would leave
    /// the stored record unchanged except for UUID/timing fields is a
    /// no-op — it neither touches `ModTime` nor advances `LastMod`.
    pub fn set_record(&mut self, mut record: Record) {
        let now = Timestamp::now();

        if let Some(existing) = self.records.get(&record.title) {
            if existing.equal_ignoring_timing(&record) {
                return;
            }
        } else {
            record.create_time = Some(now);
        }

        if record.uuid.is_none() || record.uuid == Some([0u8; 16]) {
            record.uuid = Some(*Uuid::new_v4().as_bytes());
        }
        record.mod_time = Some(now);

        self.records.insert(record.title.clone(), record);
        self.last_mod = now;
    }

    /// Removes a record by title. `LastMod` always advances, whether or
    /// not `title` was present.
    pub fn delete_record(&mut self, title: &str) -> bool {
        let removed = self.records.remove(title).is_some();
        self.last_mod = Timestamp::now();
        removed
    }

    /// All titles, sorted ascending (free, courtesy of the `BTreeMap`).
    pub fn list(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    /// Distinct, sorted group values across every record. An unset group is
    /// treated as the empty group `""`, same as ungrouped records on disk.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .records
            .values()
            .map(|r| r.group.as_deref().unwrap_or("").to_string())
            .collect();
        groups.sort();
        groups.dedup();
        groups
    }

    /// Titles of records whose group is exactly `group`, sorted ascending.
    /// An unset group matches `""`.
    pub fn list_by_group(&self, group: &str) -> Vec<String> {
        let mut titles: Vec<String> = self
            .records
            .values()
            .filter(|r| r.group.as_deref().unwrap_or("") == group)
            .map(|r| r.title.clone())
            .collect();
        titles.sort();
        titles
    }

    pub fn needs_save(&self) -> bool {
        self.header.last_save.unwrap_or(Timestamp(0)) < self.last_mod
    }

    /// Header `Name` if non-empty, else the filename component of
    /// `LastSavePath`.
    pub fn name(&self) -> String {
        if let Some(name) = &self.header.name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        self.last_save_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.last_save_path)
            .to_string()
    }

    /// Structural equality ignoring header `{LastSave, LastSaveBy, UUID,
    /// Version}` and record `{UUID, AccessTime, CreateTime, ModTime}`.
    /// Returns the name of the first differing attribute on mismatch.
    pub fn equal(&self, other: &Db) -> std::result::Result<(), String> {
        macro_rules! check {
            ($name:expr, $a:expr, $b:expr) => {
                if $a != $b {
                    return Err($name.to_string());
                }
            };
        }

        check!("header.preferences", self.header.preferences, other.header.preferences);
        check!("header.tree", self.header.tree, other.header.tree);
        check!("header.last_save_user", self.header.last_save_user, other.header.last_save_user);
        check!("header.last_save_host", self.header.last_save_host, other.header.last_save_host);
        check!("header.name", self.header.name, other.header.name);
        check!("header.description", self.header.description, other.header.description);
        check!("header.filters", self.header.filters, other.header.filters);
        check!("header.recently_used", self.header.recently_used, other.header.recently_used);
        check!("header.password_policy", self.header.password_policy, other.header.password_policy);
        check!("header.empty_groups", self.header.empty_groups, other.header.empty_groups);

        check!("records.titles", self.list(), other.list());

        for (title, record) in &self.records {
            let other_record = other.records.get(title).ok_or_else(|| format!("records[{title}]"))?;
            if !record.equal_ignoring_timing(other_record) {
                return Err(format!("records[{title}]"));
            }
        }

        Ok(())
    }

    /// [`Db::equal`] plus deep equality of the crypto envelope and the
    /// header fields `equal` ignores.
    pub fn identical(&self, other: &Db) -> std::result::Result<(), String> {
        self.equal(other)?;
        macro_rules! check {
            ($name:expr, $a:expr, $b:expr) => {
                if $a != $b {
                    return Err($name.to_string());
                }
            };
        }
        check!("header.last_save_by", self.header.last_save_by, other.header.last_save_by);
        check!("header.uuid", self.header.uuid, other.header.uuid);
        check!("cbc_iv", self.cbc_iv, other.cbc_iv);
        check!("encryption_key", self.encryption_key, other.encryption_key);
        check!("hmac_key", self.hmac_key, other.hmac_key);
        check!("iter", self.iter, other.iter);
        check!("salt", self.salt, other.salt);
        check!("stretched_key", self.stretched_key, other.stretched_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_record_is_noop_when_unchanged_ignoring_timing() {
        let mut db = Db::new_v3("test", b"password");
        db.set_record(Record::new("Entry"));
        let last_mod_after_insert = db.last_mod;

        let mut same = Record::new("Entry");
        same.uuid = db.records["Entry"].uuid;
        db.set_record(same);

        assert_eq!(db.last_mod, last_mod_after_insert);
        assert!(db.records["Entry"].mod_time.is_some());
    }

    #[test]
    fn set_record_assigns_create_time_only_on_insert() {
        let mut db = Db::new_v3("test", b"password");
        db.set_record(Record::new("Entry"));
        let created = db.records["Entry"].create_time;
        assert!(created.is_some());

        let mut changed = Record::new("Entry");
        changed.username = Some("alice".to_string());
        db.set_record(changed);
        assert_eq!(db.records["Entry"].create_time, created);
    }

    #[test]
    fn delete_record_always_advances_last_mod() {
        let mut db = Db::new_v3("test", b"password");
        let before = db.last_mod;
        assert!(!db.delete_record("absent"));
        assert!(db.last_mod >= before);
    }

    #[test]
    fn list_groups_and_list_by_group_are_sorted() {
        let mut db = Db::new_v3("test", b"password");
        for (title, group) in [("b", "group1"), ("a", "group2"), ("c", "group1")] {
            let mut r = Record::new(title);
            r.group = Some(group.to_string());
            db.set_record(r);
        }
        assert_eq!(db.list(), vec!["a", "b", "c"]);
        assert_eq!(db.groups(), vec!["group1", "group2"]);
        assert_eq!(db.list_by_group("group1"), vec!["b", "c"]);
    }

    #[test]
    fn ungrouped_records_count_as_the_empty_group() {
        let mut db = Db::new_v3("test", b"password");
        db.set_record(Record::new("ungrouped"));
        let mut grouped = Record::new("grouped");
        grouped.group = Some("group1".to_string());
        db.set_record(grouped);

        assert_eq!(db.groups(), vec!["", "group1"]);
        assert_eq!(db.list_by_group(""), vec!["ungrouped"]);
    }

    #[test]
    fn needs_save_tracks_last_mod_vs_last_save() {
        let mut db = Db::new_v3("test", b"password");
        db.header.last_save = Some(Timestamp(db.last_mod.0 + 1));
        assert!(!db.needs_save());
        db.set_record(Record::new("Entry"));
        assert!(db.needs_save());
    }

    #[test]
    fn name_falls_back_to_last_save_path() {
        let mut db = Db::new_v3("", b"password");
        db.header.name = Some(String::new());
        db.last_save_path = "/home/user/simple.dat".to_string();
        assert_eq!(db.name(), "simple.dat");
    }

    #[test]
    fn equal_ignores_uuid_and_timing_but_not_content() {
        let mut a = Db::new_v3("test", b"password");
        a.set_record(Record::new("Entry"));
        let mut b = a.clone();
        b.header.uuid = Some([9u8; 16]);
        b.records.get_mut("Entry").unwrap().uuid = Some([1u8; 16]);
        assert!(a.equal(&b).is_ok());

        b.records.get_mut("Entry").unwrap().username = Some("mismatch".to_string());
        assert!(a.equal(&b).is_err());
    }

    #[test]
    fn identical_additionally_requires_crypto_state_to_match() {
        let a = Db::new_v3("test", b"password");
        let mut b = a.clone();
        assert!(a.identical(&b).is_ok());
        b.salt[0] ^= 1;
        assert!(a.identical(&b).is_err());
        assert!(a.equal(&b).is_ok());
    }
}

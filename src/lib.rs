//! Reader and writer for Password Safe V3 encrypted databases.
//!
//! This crate is the core binary codec and cryptographic envelope: key
//! derivation, key unwrapping, Twofish-CBC framing, TLV field marshalling
//! and HMAC-SHA256 integrity verification. It does not implement a
//! command-line interface, clipboard access, password prompting or any
//! other outer-surface concern — those belong to a caller that wraps this
//! crate around a terminal, a file path and a user.
//!
//! Neither [`decrypt`] nor [`encrypt`] need `std::io::Seek`: Password Safe
//! V3 files do not support random access. Blocks are chained in CBC mode
//! and the trailing HMAC covers the whole payload, so validating a
//! database requires reading it start to finish, and saving one requires
//! rewriting it start to finish.
//!
//! At this time only the V3 database format (version `{0x10, 0x03}`) is
//! supported.

mod codec;
mod crypto;
mod error;
mod field;
mod io;
mod model;
mod registry;
mod tlv;

pub use crate::codec::Timestamp;
pub use crate::error::{Error, Result};
pub use crate::io::{decrypt, encrypt};
pub use crate::model::{Db, Header, Record};

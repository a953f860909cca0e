//! Error types shared by every layer of the crate.

use std::fmt;
use std::io;

/// A specialized `Result` type used throughout the crate.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Everything that can go wrong while decoding, decrypting, mutating or
/// encrypting a Password Safe V3 database.
#[derive(Debug)]
pub enum Error {
    /// The underlying reader or writer failed.
    Io(io::Error),
    /// The file is smaller than the minimum possible V3 database (200 bytes).
    TruncatedFile,
    /// The first four bytes are not the ASCII tag `PWS3`.
    BadMagic,
    /// `SHA-256(StretchedKey)` does not match the key-hash stored in the
    /// preamble. The passphrase is wrong.
    BadPassphrase,
    /// The ciphertext region was never terminated by the
    /// `PWS3-EOFPWS3-EOF` block.
    MissingEOF,
    /// Bytes remain in the file after the 32-byte MAC that follows the EOF
    /// marker.
    TrailingGarbage,
    /// The HMAC recomputed over the decrypted fields does not match the
    /// HMAC stored on disk. The file was tampered with, truncated, or
    /// produced by a non-conformant writer.
    BadMAC,
    /// A TLV field carried a type code with no entry in the field
    /// registry.
    UnknownField(u8),
    /// The TLV stream for a header or record ran out of bytes before an
    /// end-of-record sentinel (`0xFF`) was found.
    MissingEndField,
    /// A record was about to be written without a Title or a Password.
    InvalidRecord,
    /// A TLV field's declared length does not fit the data available, or a
    /// fixed-size field (UUID, version, ...) was given a value of the
    /// wrong size.
    InvalidLength,
    /// A field declared as text did not contain valid UTF-8.
    ///
    /// Not one of the failure kinds named by the format description, but a
    /// direct consequence of representing text fields as `String` instead
    /// of `Vec<u8>`: the original implementation's host language converts
    /// bytes to strings infallibly, Rust's does not.
    InvalidUtf8,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => e.fmt(f),
            Error::TruncatedFile => write!(f, "file is smaller than the minimum Password Safe v3 database size"),
            Error::BadMagic => write!(f, "not a Password Safe v3 file"),
            Error::BadPassphrase => write!(f, "invalid passphrase"),
            Error::MissingEOF => write!(f, "no PWS3-EOF marker found before end of file"),
            Error::TrailingGarbage => write!(f, "unexpected data after the HMAC"),
            Error::BadMAC => write!(f, "calculated HMAC does not match the HMAC stored in the file"),
            Error::UnknownField(code) => write!(f, "unknown field type 0x{code:02x}"),
            Error::MissingEndField => write!(f, "no end-of-record field found while parsing"),
            Error::InvalidRecord => write!(f, "record is missing a title or a password"),
            Error::InvalidLength => write!(f, "field has an invalid length"),
            Error::InvalidUtf8 => write!(f, "field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Error {
        Error::InvalidUtf8
    }
}

//! Crypto envelope (C4): key stretching, key wrap/unwrap, CBC framing of
//! the payload, and the HMAC that binds the whole database together.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use twofish::cipher::crypto_common::generic_array::GenericArray;
use twofish::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use twofish::Twofish;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;
type TwofishCbcEncryptor = cbc::Encryptor<Twofish>;
type TwofishCbcDecryptor = cbc::Decryptor<Twofish>;

/// `SHA-256(passphrase ‖ salt)`, then `iter` further rounds of
/// `SHA-256(previous)`. The result is the key-encryption key used to wrap
/// and unwrap `EncryptionKey`/`HMACKey`.
pub fn stretch(passphrase: &[u8], salt: &[u8; 32], iter: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase);
    hasher.update(salt);
    let mut digest: [u8; 32] = hasher.finalize().into();
    for _ in 0..iter {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        digest = hasher.finalize().into();
    }
    digest
}

/// The key-hash stored in the preamble, checked before any decryption is
/// attempted: `SHA-256(StretchedKey)`.
pub fn key_hash(stretched: &[u8; 32]) -> [u8; 32] {
    Sha256::digest(stretched).into()
}

fn ecb_block(cipher: &Twofish, block: &[u8], encrypt: bool) -> [u8; 16] {
    let mut buf = GenericArray::clone_from_slice(block);
    if encrypt {
        cipher.encrypt_block(&mut buf);
    } else {
        cipher.decrypt_block(&mut buf);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&buf);
    out
}

/// Splits the 64-byte wrapped-key blob into `EncryptionKey` and `HMACKey`,
/// decrypting each of the four 16-byte halves independently under
/// Twofish-ECB with `stretched` as the key.
pub fn unwrap_keys(blob: &[u8; 64], stretched: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let cipher = Twofish::new_from_slice(stretched).expect("stretched key is exactly 32 bytes");
    let mut encryption_key = [0u8; 32];
    let mut hmac_key = [0u8; 32];
    encryption_key[0..16].copy_from_slice(&ecb_block(&cipher, &blob[0..16], false));
    encryption_key[16..32].copy_from_slice(&ecb_block(&cipher, &blob[16..32], false));
    hmac_key[0..16].copy_from_slice(&ecb_block(&cipher, &blob[32..48], false));
    hmac_key[16..32].copy_from_slice(&ecb_block(&cipher, &blob[48..64], false));
    (encryption_key, hmac_key)
}

/// Inverse of [`unwrap_keys`].
pub fn wrap_keys(encryption_key: &[u8; 32], hmac_key: &[u8; 32], stretched: &[u8; 32]) -> [u8; 64] {
    let cipher = Twofish::new_from_slice(stretched).expect("stretched key is exactly 32 bytes");
    let mut out = [0u8; 64];
    out[0..16].copy_from_slice(&ecb_block(&cipher, &encryption_key[0..16], true));
    out[16..32].copy_from_slice(&ecb_block(&cipher, &encryption_key[16..32], true));
    out[32..48].copy_from_slice(&ecb_block(&cipher, &hmac_key[0..16], true));
    out[48..64].copy_from_slice(&ecb_block(&cipher, &hmac_key[16..32], true));
    out
}

/// Decrypts the Twofish-CBC payload region. `ciphertext` must already be a
/// multiple of Twofish's 16-byte block size.
pub fn decrypt_payload(ciphertext: &[u8], encryption_key: &[u8; 32], iv: &[u8; 16]) -> Result<Vec<u8>> {
    let mut buf = ciphertext.to_vec();
    let decryptor = TwofishCbcDecryptor::new_from_slices(encryption_key, iv)
        .expect("encryption key and IV are fixed-size arrays of the right length");
    let plaintext_len = decryptor
        .decrypt_padded_mut::<block_padding::NoPadding>(&mut buf)
        .map_err(|_| Error::InvalidLength)?
        .len();
    buf.truncate(plaintext_len);
    Ok(buf)
}

/// Encrypts `plaintext` (already block-aligned) under Twofish-CBC.
pub fn encrypt_payload(plaintext: &[u8], encryption_key: &[u8; 32], iv: &[u8; 16]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    let msg_len = buf.len();
    let encryptor = TwofishCbcEncryptor::new_from_slices(encryption_key, iv)
        .expect("encryption key and IV are fixed-size arrays of the right length");
    encryptor
        .encrypt_padded_mut::<block_padding::NoPadding>(&mut buf, msg_len)
        .expect("payload is already a multiple of the Twofish block size");
    buf
}

/// `HMAC-SHA256(hmac_key, hmac_data)`.
pub fn mac(hmac_data: &[u8], hmac_key: &[u8; 32]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(hmac_key).expect("HMAC-SHA256 accepts any key length");
    mac.update(hmac_data);
    mac.finalize().into_bytes().into()
}

/// Verifies `expected` against the HMAC of `hmac_data` in constant time
/// (`hmac::Mac::verify_slice` performs a fixed-time comparison).
pub fn verify_mac(hmac_data: &[u8], hmac_key: &[u8; 32], expected: &[u8; 32]) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(hmac_key).expect("HMAC-SHA256 accepts any key length");
    mac.update(hmac_data);
    mac.verify_slice(expected).map_err(|_| Error::BadMAC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_stretching_matches_pinned_vector() {
        let salt: [u8; 32] = hex::decode("e04691083bad2ff1cb9d53d11637979d60eac2a7affbc79107dbcba806a6eef1")
            .unwrap()
            .try_into()
            .unwrap();
        let expected: [u8; 32] = hex::decode("f3c98fc28b3ababa850eeec88b992df7d7fb18311caa9db515ae81e7ea3e33cb")
            .unwrap()
            .try_into()
            .unwrap();
        let stretched = stretch(b"password", &salt, 2048);
        assert_eq!(stretched, expected);
    }

    #[test]
    fn wrap_then_unwrap_round_trips() {
        let stretched = [7u8; 32];
        let encryption_key = [1u8; 32];
        let hmac_key = [2u8; 32];
        let blob = wrap_keys(&encryption_key, &hmac_key, &stretched);
        let (got_enc, got_hmac) = unwrap_keys(&blob, &stretched);
        assert_eq!(got_enc, encryption_key);
        assert_eq!(got_hmac, hmac_key);
    }

    #[test]
    fn cbc_round_trips() {
        let key = [9u8; 32];
        let iv = [3u8; 16];
        let plaintext = b"0123456789abcdef0123456789abcdef".to_vec();
        let ciphertext = encrypt_payload(&plaintext, &key, &iv);
        assert_eq!(ciphertext.len(), plaintext.len());
        let decrypted = decrypt_payload(&ciphertext, &key, &iv).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn mac_verification_rejects_tampering() {
        let key = [4u8; 32];
        let data = b"header and record bytes";
        let good = mac(data, &key);
        assert!(verify_mac(data, &key, &good).is_ok());
        let mut bad = good;
        bad[0] ^= 1;
        assert!(matches!(verify_mac(data, &key, &bad), Err(Error::BadMAC)));
    }
}

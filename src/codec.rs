//! Primitive value codec: little-endian integers, Unix-second timestamps and
//! fixed-size byte arrays.

use byteorder::{ByteOrder, LittleEndian};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Encodes a 32-bit unsigned integer as 4 little-endian bytes.
pub fn u32_to_le_bytes(n: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, n);
    buf
}

/// Decodes 4 little-endian bytes into a 32-bit unsigned integer.
pub fn le_bytes_to_u32(bytes: &[u8]) -> Result<u32> {
    if bytes.len() != 4 {
        return Err(Error::InvalidLength);
    }
    Ok(LittleEndian::read_u32(bytes))
}

/// A point in wall-clock time, stored as whole seconds since the Unix
/// epoch. Field code `0x00` timestamps on disk are 32-bit little-endian
/// unsigned seconds; this type widens them to `i64` on decode so the value
/// round-trips even though the wire representation wraps at 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The current wall-clock time, truncated to whole seconds.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp(secs as i64)
    }

    /// A zero timestamp is treated as "unset" by the TLV marshaller.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        u32_to_le_bytes(self.0 as u32)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        le_bytes_to_u32(bytes).map(|secs| Timestamp(secs as i64))
    }
}

/// Accumulates 1 to 4 little-endian bytes into a `u32`, zero-extending any
/// bytes beyond `bytes.len()`. Unlike [`le_bytes_to_u32`] this never
/// rejects a length — it mirrors the original implementation's
/// length-agnostic accumulator, which the wire codec never actually needs
/// (TLV lengths are always exactly 4 bytes) but which is kept here for
/// parity with that helper's documented behavior.
pub fn bytes_to_u32_lenient(bytes: &[u8]) -> u32 {
    let mut acc: u32 = 0;
    for (i, b) in bytes.iter().enumerate().take(4) {
        acc |= (*b as u32) << (8 * i);
    }
    acc
}

/// Copies `value` into a fixed-size array, zero-padding on the right if
/// `value` is shorter than `N` and failing if it is longer.
pub fn fixed_array<const N: usize>(value: &[u8]) -> Result<[u8; N]> {
    if value.len() > N {
        return Err(Error::InvalidLength);
    }
    let mut out = [0u8; N];
    out[..value.len()].copy_from_slice(value);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_to_int_round_trips() {
        assert_eq!(bytes_to_u32_lenient(&[5]), 5);
        assert_eq!(bytes_to_u32_lenient(&[5, 5]), 1285);
        assert_eq!(bytes_to_u32_lenient(&[5, 5, 5]), 328965);
        assert_eq!(bytes_to_u32_lenient(&[5, 5, 5, 5]), 84215045);
        assert_eq!(bytes_to_u32_lenient(&[0xff, 0xff, 0xff, 0xff]), 4294967295);
        assert_eq!(le_bytes_to_u32(&[5, 5, 5, 5]).unwrap(), 84215045);
    }

    #[test]
    fn int_to_bytes_round_trips() {
        assert_eq!(u32_to_le_bytes(5), [5, 0, 0, 0]);
        assert_eq!(u32_to_le_bytes(1285), [5, 5, 0, 0]);
        assert_eq!(u32_to_le_bytes(4294967295), [0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn fixed_array_zero_pads_short_values() {
        let a: [u8; 4] = fixed_array(&[1, 2]).unwrap();
        assert_eq!(a, [1, 2, 0, 0]);
    }

    #[test]
    fn fixed_array_rejects_overlong_values() {
        assert!(fixed_array::<2>(&[1, 2, 3]).is_err());
    }
}

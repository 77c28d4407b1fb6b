//! Fixed-width conversions between counts/timestamps and the 8-byte
//! big-endian byte strings stored in the KV environment, plus the UTF-8
//! conversions used for identifiers and the strategy name.

use crate::error::{Error, Result};

pub const BYTE_LEN: usize = 8;

pub fn int_to_bytes(value: u64) -> [u8; BYTE_LEN] {
    value.to_be_bytes()
}

pub fn bytes_to_int(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; BYTE_LEN] = bytes
        .try_into()
        .map_err(|_| Error::Encoding(format!("expected {BYTE_LEN} bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

pub fn str_to_bytes(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

pub fn bytes_to_str(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|err| Error::Encoding(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        for value in [0u64, 1, 255, 65_536, u64::MAX] {
            let bytes = int_to_bytes(value);
            assert_eq!(bytes_to_int(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn bytes_to_int_rejects_wrong_length() {
        assert!(bytes_to_int(&[0, 1, 2]).is_err());
    }

    #[test]
    fn str_round_trip() {
        let bytes = str_to_bytes("sub-a");
        assert_eq!(bytes_to_str(&bytes).unwrap(), "sub-a");
    }

    #[test]
    fn bytes_to_str_rejects_invalid_utf8() {
        assert!(bytes_to_str(&[0xff, 0xfe]).is_err());
    }
}

//! Value codec: typed values to stored bytes and back.
//!
//! Encoding rules:
//! - raw bytes are written as given (`Txn::set`)
//! - strings are written as their UTF-8 bytes, so they are never quoted twice
//! - everything else is marshaled to compact JSON
//!
//! Stored bytes may additionally be gzip-compressed. Compression is kept
//! only when it does not grow the value. There is no flag telling the two
//! forms apart: decoding tries gunzip first and falls back to the raw bytes.
//! A raw value that happens to be a valid gzip stream would be misread; in
//! practice JSON and text never start with the gzip magic.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Leading bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Marshal a typed value. Strings pass through unquoted.
pub fn marshal<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    match serde_json::to_value(value).map_err(Error::Encode)? {
        serde_json::Value::String(s) => Ok(s.into_bytes()),
        other => serde_json::to_vec(&other).map_err(Error::Encode),
    }
}

/// Decode stored (already decompressed) bytes into `T`, naming the key on
/// failure.
pub fn unmarshal<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|source| Error::Decode {
        key: key.to_string(),
        raw: String::from_utf8_lossy(raw).into_owned(),
        source,
    })
}

/// Gzip `src`.
pub fn compress(src: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(src)?;
    Ok(encoder.finish()?)
}

/// Gunzip `src`. Fails if `src` is not a complete gzip stream.
pub fn uncompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(src);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Prepare bytes for storage: compressed if enabled and not larger.
pub fn pack(raw: &[u8], compression: bool) -> Vec<u8> {
    if compression {
        if let Ok(compressed) = compress(raw) {
            if compressed.len() <= raw.len() {
                return compressed;
            }
        }
    }
    raw.to_vec()
}

/// Recover stored bytes: gunzipped if they decode as gzip, else as stored.
pub fn unpack(stored: &[u8]) -> Vec<u8> {
    if stored.starts_with(&GZIP_MAGIC) {
        if let Ok(decoded) = uncompress(stored) {
            return decoded;
        }
    }
    stored.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_stay_raw() {
        // gzip framing alone is ~20 bytes, so tiny values never shrink.
        assert_eq!(pack(b"1", true), b"1");
        assert_eq!(pack(b"", true), b"");
    }

    #[test]
    fn repetitive_values_are_compressed() {
        let raw = vec![b'a'; 4096];
        let stored = pack(&raw, true);
        assert!(stored.len() < raw.len());
        assert!(stored.starts_with(&GZIP_MAGIC));
        assert_eq!(unpack(&stored), raw);
    }

    #[test]
    fn bad_gzip_falls_back_to_raw() {
        let stored = [0x1f, 0x8b, 0x00, 0x01];
        assert_eq!(unpack(&stored), stored);
    }
}

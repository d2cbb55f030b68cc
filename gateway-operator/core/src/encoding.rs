//! Base64 payload encoding, optionally gzip compressed.
//!
//! Decoding detects compression from the gzip magic bytes, so readers do not
//! need to know how a payload was written.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid gzip payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn encode(bytes: &[u8], compression: Compression) -> Result<String, Error> {
    match compression {
        Compression::None => Ok(STANDARD.encode(bytes)),
        Compression::Gzip => {
            let mut gz = GzEncoder::new(Vec::new(), flate2::Compression::default());
            gz.write_all(bytes)?;
            Ok(STANDARD.encode(gz.finish()?))
        }
    }
}

pub fn decode(encoded: &str) -> Result<Vec<u8>, Error> {
    let raw = STANDARD.decode(encoded.trim())?;
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(raw);
    }
    let mut out = Vec::with_capacity(raw.len() * 4);
    GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
    Ok(out)
}

pub fn encode_json<T: Serialize + ?Sized>(
    value: &T,
    compression: Compression,
) -> Result<String, Error> {
    encode(&serde_json::to_vec(value)?, compression)
}

pub fn decode_json<T: DeserializeOwned>(encoded: &str) -> Result<T, Error> {
    Ok(serde_json::from_slice(&decode(encoded)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_compression() {
        let payload = br#"{"webApiServices":[]}"#;
        let plain = encode(payload, Compression::None).unwrap();
        let gzip = encode(payload, Compression::Gzip).unwrap();
        assert_ne!(plain, gzip);
        assert_eq!(decode(&plain).unwrap(), payload);
        assert_eq!(decode(&gzip).unwrap(), payload);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode("not base64!"), Err(Error::Base64(_))));
        let truncated = STANDARD.encode([0x1f, 0x8b, 0x08]);
        assert!(matches!(decode(&truncated), Err(Error::Io(_))));
        let not_json = STANDARD.encode(b"nope");
        assert!(matches!(
            decode_json::<serde_json::Value>(&not_json),
            Err(Error::Json(_))
        ));
    }
}

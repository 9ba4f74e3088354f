//! Preimage/payment-hash codec.

use sha2::Digest;
use sha2::Sha256;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("preimage must be 64 hex characters decoding to 32 bytes")]
    InvalidPreimage,
}

/// Strips surrounding whitespace and lowercases a hex string. Does not
/// validate length or alphabet; callers that need a validated hash should go
/// through [`hash_of`].
pub fn canonicalize(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}

/// Computes the lowercase-hex SHA-256 of a hex-encoded 32-byte preimage.
///
/// Rejects anything that doesn't decode to exactly 32 bytes, matching the
/// L402 admission rule that `hash(preimage) == payment_hash` holds bit-exactly.
pub fn hash_of(preimage_hex: &str) -> Result<String, CodecError> {
    let bytes = hex::decode(canonicalize(preimage_hex)).map_err(|_| CodecError::InvalidPreimage)?;
    if bytes.len() != 32 {
        return Err(CodecError::InvalidPreimage);
    }
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_a_valid_preimage() {
        let preimage = "00".repeat(32);
        let hash = hash_of(&preimage).unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_of(&preimage.to_ascii_uppercase()).unwrap());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(hash_of("00"), Err(CodecError::InvalidPreimage)));
    }

    #[test]
    fn rejects_non_hex() {
        let bogus = "zz".repeat(32);
        assert!(matches!(hash_of(&bogus), Err(CodecError::InvalidPreimage)));
    }
}

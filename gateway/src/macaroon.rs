//! In-house HMAC-chain macaroon mint/verify.
//!
//! Deliberately not the external `macaroon` crate: the scheme only ever needs
//! first-party caveats and a single HMAC chain, so a minimal implementation
//! avoids a dependency whose third-party-caveat machinery this gateway has no
//! use for.
//!
//! Serialized form: `base64(identifier || 0x00 || caveat1 || 0x00 || ... || tag)`,
//! where `tag` is the final 32-byte HMAC-SHA256 output and every other
//! segment is UTF-8. The identifier is the payment hash. The macaroon's
//! fixed location string is folded into the initial HMAC input alongside the
//! identifier (rather than carried as a separate serialized field) since
//! every macaroon this gateway mints or verifies shares the same location —
//! there is nothing for a caller to parse it out of.

use base64::engine::general_purpose;
use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const LOCATION: &str = "gateway";
const TAG_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum MacaroonError {
    #[error("malformed macaroon encoding")]
    Malformed,
    #[error("macaroon signature verification failed")]
    BadSignature,
    #[error("duplicate required caveat: {0}")]
    DuplicateCaveat(&'static str),
    #[error("missing required caveat: {0}")]
    MissingCaveat(&'static str),
    #[error("invalid caveat value for {0}")]
    InvalidCaveatValue(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caveats {
    pub payment_hash: String,
    pub amount_sats: i64,
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Macaroon {
    pub identifier: String,
    pub caveats: Vec<String>,
    pub tag: [u8; TAG_LEN],
}

/// Binds the macaroon's fixed location into the root HMAC input alongside
/// its identifier, so two gateways minting under the same root key (if that
/// key were ever shared) would still produce non-interchangeable macaroons.
fn location_tagged_identifier(identifier: &str) -> String {
    format!("{LOCATION}|{identifier}")
}

fn hmac_once(key: &[u8], message: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

impl Macaroon {
    /// Mints a macaroon binding `payment_hash` and `amount_sats`, optionally
    /// `account_id`, under `root_key`.
    pub fn mint(root_key: &[u8; 32], payment_hash: &str, amount_sats: i64, account_id: Option<Uuid>) -> Self {
        let identifier = payment_hash.to_string();
        let mut caveats = vec![
            format!("payment_hash={payment_hash}"),
            format!("amount_sats={amount_sats}"),
        ];
        if let Some(account_id) = account_id {
            caveats.push(format!("account_id={account_id}"));
        }

        let mut tag = hmac_once(root_key, location_tagged_identifier(&identifier).as_bytes());
        for caveat in &caveats {
            tag = hmac_once(&tag, caveat.as_bytes());
        }

        Self { identifier, caveats, tag }
    }

    /// Encodes as `base64(identifier 0x00 caveat1 0x00 ... 0x00 tag)`.
    pub fn serialize(&self) -> String {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.identifier.as_bytes());
        for caveat in &self.caveats {
            buf.push(0);
            buf.extend_from_slice(caveat.as_bytes());
        }
        buf.push(0);
        buf.extend_from_slice(&self.tag);
        general_purpose::STANDARD.encode(buf)
    }

    pub fn deserialize(encoded: &str) -> Result<Self, MacaroonError> {
        let buf = general_purpose::STANDARD.decode(encoded).map_err(|_| MacaroonError::Malformed)?;
        if buf.len() < TAG_LEN {
            return Err(MacaroonError::Malformed);
        }
        let (body, tag_bytes) = buf.split_at(buf.len() - TAG_LEN);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(tag_bytes);

        let mut parts = body.split(|&b| b == 0);
        let identifier = parts
            .next()
            .ok_or(MacaroonError::Malformed)
            .and_then(|bytes| std::str::from_utf8(bytes).map_err(|_| MacaroonError::Malformed))?
            .to_string();
        let caveats = parts
            .map(|bytes| std::str::from_utf8(bytes).map(str::to_string).map_err(|_| MacaroonError::Malformed))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { identifier, caveats, tag })
    }

    /// Recomputes the HMAC chain under `root_key` and compares against the
    /// carried tag in constant time.
    pub fn verify_signature(&self, root_key: &[u8; 32]) -> Result<(), MacaroonError> {
        let mut tag = hmac_once(root_key, location_tagged_identifier(&self.identifier).as_bytes());
        for caveat in &self.caveats {
            tag = hmac_once(&tag, caveat.as_bytes());
        }
        if constant_time_eq(&tag, &self.tag) {
            Ok(())
        } else {
            Err(MacaroonError::BadSignature)
        }
    }

    /// Parses the caveat list, rejecting duplicate required caveats and
    /// non-integer amounts.
    pub fn parse_caveats(&self) -> Result<Caveats, MacaroonError> {
        let mut payment_hash: Option<String> = None;
        let mut amount_sats: Option<i64> = None;
        let mut account_id: Option<Uuid> = None;

        for caveat in &self.caveats {
            let Some((key, value)) = caveat.split_once('=') else {
                continue;
            };
            match key {
                "payment_hash" => {
                    if payment_hash.is_some() {
                        return Err(MacaroonError::DuplicateCaveat("payment_hash"));
                    }
                    payment_hash = Some(value.to_string());
                }
                "amount_sats" => {
                    if amount_sats.is_some() {
                        return Err(MacaroonError::DuplicateCaveat("amount_sats"));
                    }
                    let parsed: i64 = value.parse().map_err(|_| MacaroonError::InvalidCaveatValue("amount_sats"))?;
                    amount_sats = Some(parsed);
                }
                "account_id" => {
                    if account_id.is_some() {
                        return Err(MacaroonError::DuplicateCaveat("account_id"));
                    }
                    let parsed: Uuid = value.parse().map_err(|_| MacaroonError::InvalidCaveatValue("account_id"))?;
                    account_id = Some(parsed);
                }
                _ => {}
            }
        }

        Ok(Caveats {
            payment_hash: payment_hash.ok_or(MacaroonError::MissingCaveat("payment_hash"))?,
            amount_sats: amount_sats.ok_or(MacaroonError::MissingCaveat("amount_sats"))?,
            account_id,
        })
    }
}

/// Verifies signature and parses caveats in one call; the common case at the
/// payment gate.
pub fn verify(root_key: &[u8; 32], encoded: &str) -> Result<Caveats, MacaroonError> {
    let macaroon = Macaroon::deserialize(encoded)?;
    macaroon.verify_signature(root_key)?;
    macaroon.parse_caveats()
}

fn constant_time_eq(a: &[u8; TAG_LEN], b: &[u8; TAG_LEN]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn mint_then_verify_round_trips_caveats() {
        let payment_hash = "a".repeat(64);
        let account_id = Uuid::new_v4();
        let macaroon = Macaroon::mint(&root_key(), &payment_hash, 10, Some(account_id));
        let encoded = macaroon.serialize();

        let caveats = verify(&root_key(), &encoded).unwrap();
        assert_eq!(caveats.payment_hash, payment_hash);
        assert_eq!(caveats.amount_sats, 10);
        assert_eq!(caveats.account_id, Some(account_id));
    }

    #[test]
    fn wrong_root_key_fails_verification() {
        let macaroon = Macaroon::mint(&root_key(), &"b".repeat(64), 5, None);
        let encoded = macaroon.serialize();
        let wrong_key = [9u8; 32];
        assert!(matches!(verify(&wrong_key, &encoded), Err(MacaroonError::BadSignature)));
    }

    #[test]
    fn tampered_caveat_fails_verification() {
        let macaroon = Macaroon::mint(&root_key(), &"c".repeat(64), 5, None);
        let mut tampered = macaroon.clone();
        tampered.caveats[1] = "amount_sats=999999".to_string();
        let encoded = tampered.serialize();
        assert!(matches!(verify(&root_key(), &encoded), Err(MacaroonError::BadSignature)));
    }

    #[test]
    fn duplicate_required_caveat_is_rejected() {
        let mut macaroon = Macaroon::mint(&root_key(), &"d".repeat(64), 5, None);
        macaroon.caveats.push("payment_hash=extra".to_string());
        assert!(matches!(macaroon.parse_caveats(), Err(MacaroonError::DuplicateCaveat("payment_hash"))));
    }

    #[test]
    fn malformed_encoding_is_rejected() {
        assert!(matches!(Macaroon::deserialize("not-base64!!"), Err(MacaroonError::Malformed)));
    }
}

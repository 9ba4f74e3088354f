//! Account ledger: token-identified accounts with a sats balance.
//!
//! Token plaintext is never persisted; only its SHA-256 hex digest is stored
//! in `token_hash`. Every balance-moving operation runs inside the caller's
//! transaction and locks the account row with `SELECT ... FOR UPDATE` before
//! reading the balance it is about to write.

use diesel::prelude::*;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::usage_log;
use crate::schema::accounts;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown account token")]
    InvalidToken,
    #[error("account not found")]
    NotFound,
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },
    #[error(transparent)]
    Db(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = accounts)]
pub struct Account {
    pub id: Uuid,
    pub token_hash: String,
    pub balance_sats: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = accounts)]
struct NewAccount {
    id: Uuid,
    token_hash: String,
    balance_sats: i64,
}

/// Mints a 43-character URL-safe token (`abl_<32 random bytes, base64url>`),
/// storing only its hash, and opens a zero-balance account row.
///
/// Returns `(account_id, token_plaintext)`; the plaintext is never
/// recoverable again after this call returns.
pub fn create_account(conn: &mut PgConnection) -> Result<(Uuid, String), LedgerError> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let id = Uuid::new_v4();

    let new_account = NewAccount { id, token_hash, balance_sats: 0 };
    diesel::insert_into(accounts::table).values(&new_account).execute(conn)?;

    Ok((id, token))
}

pub fn account_id_by_token(conn: &mut PgConnection, token: &str) -> Result<Uuid, LedgerError> {
    let token_hash = hash_token(token);
    accounts::table
        .filter(accounts::token_hash.eq(token_hash))
        .select(accounts::id)
        .first(conn)
        .optional()?
        .ok_or(LedgerError::InvalidToken)
}

pub fn get_info(conn: &mut PgConnection, account_id: Uuid) -> Result<Account, LedgerError> {
    accounts::table
        .find(account_id)
        .first(conn)
        .optional()?
        .ok_or(LedgerError::NotFound)
}

/// Locks the account row, rejects if `balance < amount_sats`, writes the
/// debit and a matching usage-log entry, and returns the new balance.
pub fn debit(
    conn: &mut PgConnection,
    account_id: Uuid,
    amount_sats: i64,
    endpoint_label: &str,
) -> Result<i64, LedgerError> {
    conn.transaction(|conn| {
        let balance: i64 = accounts::table
            .find(account_id)
            .select(accounts::balance_sats)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(LedgerError::NotFound)?;

        if balance < amount_sats {
            return Err(LedgerError::InsufficientBalance { balance, required: amount_sats });
        }

        let new_balance = balance - amount_sats;
        diesel::update(accounts::table.find(account_id))
            .set((accounts::balance_sats.eq(new_balance), accounts::updated_at.eq(OffsetDateTime::now_utc())))
            .execute(conn)?;

        usage_log::insert(conn, account_id, endpoint_label, amount_sats)?;

        Ok(new_balance)
    })
}

/// Additive credit, no lower-bound check (the caller already knows the
/// source of funds is legitimate — a settled invoice or an escrow release).
pub fn credit(conn: &mut PgConnection, account_id: Uuid, amount_sats: i64) -> Result<i64, LedgerError> {
    conn.transaction(|conn| {
        let balance: i64 = accounts::table
            .find(account_id)
            .select(accounts::balance_sats)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(LedgerError::NotFound)?;

        let new_balance = balance + amount_sats;
        diesel::update(accounts::table.find(account_id))
            .set((accounts::balance_sats.eq(new_balance), accounts::updated_at.eq(OffsetDateTime::now_utc())))
            .execute(conn)?;

        Ok(new_balance)
    })
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("abl_{}", base64_url_no_pad(&bytes))
}

fn base64_url_no_pad(bytes: &[u8]) -> String {
    use base64::engine::general_purpose;
    use base64::Engine;
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_deterministic() {
        assert_eq!(hash_token("abl_xyz"), hash_token("abl_xyz"));
        assert_ne!(hash_token("abl_xyz"), hash_token("abl_abc"));
    }

    #[test]
    fn generated_tokens_are_unique_and_prefixed() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(a.starts_with("abl_"));
    }
}

//! Top-up flow: issue a Lightning invoice for account funding, then claim
//! it by revealing the preimage, crediting the resolved account.
//!
//! Account resolution on claim is a four-way branch: invoice and token may
//! each independently be present or absent.

use diesel::prelude::*;
use uuid::Uuid;

use crate::db::accounts;
use crate::db::topup_invoices;
use crate::db::topup_invoices::TopupInvoice;
use crate::payhash;
use crate::schema::accounts as accounts_table;

#[derive(Debug, thiserror::Error)]
pub enum TopupError {
    #[error("invalid preimage")]
    InvalidPreimage,
    #[error("unknown payment hash")]
    InvalidPayment,
    #[error("top-up invoice already claimed")]
    AlreadyUsed,
    #[error("unknown account token")]
    InvalidToken,
    #[error(transparent)]
    Db(#[from] diesel::result::Error),
}

pub struct ClaimResult {
    pub token: Option<String>,
    pub account_id: Uuid,
    pub balance_sats: i64,
}

/// Persists a pending invoice bound to `account_id` if a token was supplied
/// to the top-up endpoint.
pub fn create_invoice(
    conn: &mut PgConnection,
    payment_hash: &str,
    amount_sats: i64,
    account_id: Option<Uuid>,
) -> Result<TopupInvoice, TopupError> {
    Ok(topup_invoices::insert(conn, payment_hash, account_id, amount_sats)?)
}

/// Claims a top-up invoice by its preimage, resolving the target account,
/// crediting its balance, and marking the invoice `paid`. Returns the newly
/// minted token only when no account previously existed.
pub fn claim(conn: &mut PgConnection, preimage: &str, token: Option<&str>) -> Result<ClaimResult, TopupError> {
    let payment_hash = payhash::hash_of(preimage).map_err(|_| TopupError::InvalidPreimage)?;

    conn.transaction(|conn| {
        let invoice = topup_invoices::find_for_update(conn, &payment_hash)?.ok_or(TopupError::InvalidPayment)?;
        if invoice.status != topup_invoices::TopupStatus::Pending {
            return Err(TopupError::AlreadyUsed);
        }

        let token_account_id = match token {
            Some(token) if !token.trim().is_empty() => Some(accounts::account_id_by_token(conn, token.trim()).map_err(|_| TopupError::InvalidToken)?),
            _ => None,
        };

        let (account_id, issued_token) = match (invoice.account_id, token_account_id) {
            (Some(invoice_account), Some(token_account)) => {
                if invoice_account != token_account {
                    return Err(TopupError::InvalidPayment);
                }
                (invoice_account, None)
            }
            (Some(invoice_account), None) => (invoice_account, None),
            (None, Some(token_account)) => (token_account, None),
            (None, None) => {
                let (new_account_id, new_token) = accounts::create_account(conn)?;
                (new_account_id, Some(new_token))
            }
        };

        let balance: i64 = accounts_table::table.find(account_id).select(accounts_table::balance_sats).for_update().first(conn)?;
        let new_balance = balance + invoice.amount_sats;
        diesel::update(accounts_table::table.find(account_id))
            .set((accounts_table::balance_sats.eq(new_balance), accounts_table::updated_at.eq(time::OffsetDateTime::now_utc())))
            .execute(conn)?;

        topup_invoices::mark_paid(conn, &payment_hash, account_id)?;

        Ok(ClaimResult { token: issued_token, account_id, balance_sats: new_balance })
    })
}

//! Marketplace (task/quote/delivery) state machine: every mutating call is
//! one transaction, row locks acquired in the fixed order task, then quote,
//! then account.

use diesel::prelude::*;
use uuid::Uuid;

use crate::db::hire_quotes;
use crate::db::hire_quotes::QuoteStatus;
use crate::db::hire_tasks;
use crate::db::hire_tasks::TaskStatus;
use crate::db::hire_deliveries;
use crate::db::hire_messages;
use crate::db::hire_messages::Message;
use crate::db::hire_tasks::Task;
use crate::db::hire_quotes::Quote;
use crate::db::hire_deliveries::Delivery;
use crate::db::usage_log;

#[derive(Debug, thiserror::Error)]
pub enum HireError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64, account_id: Uuid },
    #[error(transparent)]
    Db(#[from] diesel::result::Error),
}

pub struct AcceptOutcome {
    pub task_id: Uuid,
    pub quote_id: Uuid,
    pub escrowed_sats: i64,
}

pub fn create_task(
    conn: &mut PgConnection,
    buyer_account_id: Uuid,
    title: &str,
    description: &str,
    budget_sats: i64,
) -> Result<Task, HireError> {
    Ok(hire_tasks::insert(conn, buyer_account_id, title, description, budget_sats)?)
}

pub fn list_tasks(conn: &mut PgConnection) -> Result<Vec<Task>, HireError> {
    Ok(hire_tasks::list(conn)?)
}

pub fn get_task(conn: &mut PgConnection, task_id: Uuid) -> Result<Task, HireError> {
    hire_tasks::find(conn, task_id)?.ok_or_else(|| HireError::NotFound("task not found".to_string()))
}

pub fn get_quote(conn: &mut PgConnection, quote_id: Uuid) -> Result<Quote, HireError> {
    hire_quotes::find(conn, quote_id)?.ok_or_else(|| HireError::NotFound("quote not found".to_string()))
}

pub fn create_quote(
    conn: &mut PgConnection,
    task_id: Uuid,
    contractor_account_id: Uuid,
    price_sats: i64,
    description: &str,
) -> Result<Quote, HireError> {
    conn.transaction(|conn| {
        let task = hire_tasks::find(conn, task_id)?.ok_or_else(|| HireError::NotFound("task not found".to_string()))?;
        if task.status != TaskStatus::Open {
            return Err(HireError::InvalidState("task is not open for quotes".to_string()));
        }
        if task.buyer_account_id == contractor_account_id {
            return Err(HireError::Forbidden("cannot quote on your own task".to_string()));
        }
        Ok(hire_quotes::insert(conn, task_id, contractor_account_id, price_sats, description)?)
    })
}

/// The core atomic escrow-lock transaction. When `skip_debit` is true (the
/// L402 path), the Lightning payment already covers the escrow and the
/// buyer's ledger balance is left untouched.
pub fn accept_quote(
    conn: &mut PgConnection,
    task_id: Uuid,
    quote_id: Uuid,
    caller_account_id: Uuid,
    skip_debit: bool,
) -> Result<AcceptOutcome, HireError> {
    conn.transaction(|conn| {
        let task =
            hire_tasks::find_for_update(conn, task_id)?.ok_or_else(|| HireError::NotFound("task not found".to_string()))?;
        if task.status != TaskStatus::Open {
            return Err(HireError::InvalidState("task is not open".to_string()));
        }
        if task.buyer_account_id != caller_account_id {
            return Err(HireError::Forbidden("only the buyer can accept quotes".to_string()));
        }

        let quote = hire_quotes::find_for_update(conn, quote_id)?
            .filter(|q| q.task_id == task_id)
            .ok_or_else(|| HireError::NotFound("quote not found".to_string()))?;
        if quote.status != QuoteStatus::Pending {
            return Err(HireError::InvalidState("quote is not pending".to_string()));
        }

        let price = quote.price_sats;

        if !skip_debit {
            let balance: i64 = crate::schema::accounts::table
                .find(caller_account_id)
                .select(crate::schema::accounts::balance_sats)
                .for_update()
                .first(conn)
                .optional()?
                .ok_or_else(|| HireError::NotFound("buyer account not found".to_string()))?;
            if balance < price {
                return Err(HireError::InsufficientBalance { balance, required: price, account_id: caller_account_id });
            }
            diesel::update(crate::schema::accounts::table.find(caller_account_id))
                .set((
                    crate::schema::accounts::balance_sats.eq(balance - price),
                    crate::schema::accounts::updated_at.eq(time::OffsetDateTime::now_utc()),
                ))
                .execute(conn)?;
        }

        usage_log::insert(conn, caller_account_id, &format!("hire:escrow_lock:{task_id}"), price)?;

        hire_quotes::set_status(conn, quote_id, QuoteStatus::Accepted)?;
        for pending in hire_quotes::pending_for_task(conn, task_id)? {
            if pending.id != quote_id {
                hire_quotes::set_status(conn, pending.id, QuoteStatus::Rejected)?;
            }
        }

        hire_tasks::set_status(conn, task_id, TaskStatus::InEscrow)?;

        Ok(AcceptOutcome { task_id, quote_id, escrowed_sats: price })
    })
}

pub fn send_quote_message(
    conn: &mut PgConnection,
    task_id: Uuid,
    quote_id: Uuid,
    sender_account_id: Uuid,
    body: &str,
) -> Result<Message, HireError> {
    let task = hire_tasks::find(conn, task_id)?.ok_or_else(|| HireError::NotFound("task not found".to_string()))?;
    let quote = hire_quotes::find(conn, quote_id)?
        .filter(|q| q.task_id == task_id)
        .ok_or_else(|| HireError::NotFound("quote not found".to_string()))?;
    if !matches!(quote.status, QuoteStatus::Pending | QuoteStatus::Accepted) {
        return Err(HireError::InvalidState("cannot message on a rejected quote".to_string()));
    }
    if sender_account_id != task.buyer_account_id && sender_account_id != quote.contractor_account_id {
        return Err(HireError::Forbidden("only the buyer or contractor can message this quote".to_string()));
    }
    Ok(hire_messages::insert(conn, task_id, quote_id, sender_account_id, body)?)
}

pub fn get_quote_messages(
    conn: &mut PgConnection,
    task_id: Uuid,
    quote_id: Uuid,
    caller_account_id: Uuid,
    since_id: i64,
) -> Result<Vec<Message>, HireError> {
    let task = hire_tasks::find(conn, task_id)?.ok_or_else(|| HireError::NotFound("task not found".to_string()))?;
    let quote = hire_quotes::find(conn, quote_id)?
        .filter(|q| q.task_id == task_id)
        .ok_or_else(|| HireError::NotFound("quote not found".to_string()))?;
    if caller_account_id != task.buyer_account_id && caller_account_id != quote.contractor_account_id {
        return Err(HireError::Forbidden("only the buyer or contractor can read this quote's messages".to_string()));
    }
    Ok(hire_messages::since(conn, quote_id, since_id)?)
}

pub fn update_quote(
    conn: &mut PgConnection,
    task_id: Uuid,
    quote_id: Uuid,
    caller_account_id: Uuid,
    price_sats: Option<i64>,
    description: Option<&str>,
) -> Result<Quote, HireError> {
    let quote = hire_quotes::find(conn, quote_id)?
        .filter(|q| q.task_id == task_id)
        .ok_or_else(|| HireError::NotFound("quote not found".to_string()))?;
    if quote.contractor_account_id != caller_account_id {
        return Err(HireError::Forbidden("only the contractor can update their quote".to_string()));
    }
    if quote.status != QuoteStatus::Pending {
        return Err(HireError::InvalidState("can only update pending quotes".to_string()));
    }
    if let Some(price) = price_sats {
        if price <= 0 {
            return Err(HireError::InvalidState("price_sats must be positive".to_string()));
        }
    }
    if price_sats.is_none() && description.is_none() {
        return Err(HireError::InvalidState("nothing to update".to_string()));
    }
    Ok(hire_quotes::update_fields(conn, quote_id, price_sats, description)?)
}

pub fn create_delivery(
    conn: &mut PgConnection,
    task_id: Uuid,
    contractor_account_id: Uuid,
    filename: &str,
    content_base64: &str,
    notes: &str,
) -> Result<Delivery, HireError> {
    conn.transaction(|conn| {
        let task = hire_tasks::find(conn, task_id)?.ok_or_else(|| HireError::NotFound("task not found".to_string()))?;
        if task.status != TaskStatus::InEscrow {
            return Err(HireError::InvalidState("task is not in escrow".to_string()));
        }
        let quote = hire_quotes::accepted_for_task(conn, task_id)?
            .filter(|q| q.contractor_account_id == contractor_account_id)
            .ok_or_else(|| HireError::Forbidden("no accepted quote for this contractor".to_string()))?;

        let delivery = hire_deliveries::insert(conn, task_id, quote.id, contractor_account_id, filename, content_base64, notes)?;
        hire_tasks::set_status(conn, task_id, TaskStatus::Delivered)?;
        Ok(delivery)
    })
}

/// The atomic escrow-release transaction.
pub fn confirm_delivery(conn: &mut PgConnection, task_id: Uuid, caller_account_id: Uuid) -> Result<Task, HireError> {
    conn.transaction(|conn| {
        let task =
            hire_tasks::find_for_update(conn, task_id)?.ok_or_else(|| HireError::NotFound("task not found".to_string()))?;
        if task.status != TaskStatus::Delivered {
            return Err(HireError::InvalidState("task is not in delivered state".to_string()));
        }
        if task.buyer_account_id != caller_account_id {
            return Err(HireError::Forbidden("only the buyer can confirm delivery".to_string()));
        }

        let quote = hire_quotes::accepted_for_task(conn, task_id)?
            .ok_or_else(|| HireError::InvalidState("no accepted quote found".to_string()))?;

        let balance: i64 = crate::schema::accounts::table
            .find(quote.contractor_account_id)
            .select(crate::schema::accounts::balance_sats)
            .for_update()
            .first(conn)?;
        diesel::update(crate::schema::accounts::table.find(quote.contractor_account_id))
            .set((
                crate::schema::accounts::balance_sats.eq(balance + quote.price_sats),
                crate::schema::accounts::updated_at.eq(time::OffsetDateTime::now_utc()),
            ))
            .execute(conn)?;

        usage_log::insert(conn, quote.contractor_account_id, &format!("hire:escrow_release:{task_id}"), quote.price_sats)?;

        hire_tasks::set_status(conn, task_id, TaskStatus::Completed)?;
        get_task(conn, task_id)
    })
}

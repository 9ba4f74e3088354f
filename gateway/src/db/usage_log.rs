//! Append-only ledger of every debit/credit against an account.

use diesel::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::schema::usage_log;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = usage_log)]
pub struct UsageLogEntry {
    pub id: i64,
    pub account_id: Uuid,
    pub endpoint: String,
    pub amount_sats: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = usage_log)]
struct NewUsageLogEntry<'a> {
    account_id: Uuid,
    endpoint: &'a str,
    amount_sats: i64,
}

pub fn insert(
    conn: &mut PgConnection,
    account_id: Uuid,
    endpoint: &str,
    amount_sats: i64,
) -> QueryResult<UsageLogEntry> {
    diesel::insert_into(usage_log::table)
        .values(&NewUsageLogEntry { account_id, endpoint, amount_sats })
        .get_result(conn)
}

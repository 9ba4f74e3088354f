//! Top-up invoice rows. See `crate::topup` for the flow that uses these.

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::AsExpression;
use diesel::FromSqlRow;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::schema::topup_invoices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize)]
#[diesel(sql_type = Text)]
pub enum TopupStatus {
    Pending,
    Paid,
    Expired,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = topup_invoices, primary_key(payment_hash))]
pub struct TopupInvoice {
    pub payment_hash: String,
    pub account_id: Option<Uuid>,
    pub amount_sats: i64,
    pub status: TopupStatus,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = topup_invoices)]
struct NewTopupInvoice<'a> {
    payment_hash: &'a str,
    account_id: Option<Uuid>,
    amount_sats: i64,
}

pub fn insert(
    conn: &mut PgConnection,
    payment_hash: &str,
    account_id: Option<Uuid>,
    amount_sats: i64,
) -> QueryResult<TopupInvoice> {
    diesel::insert_into(topup_invoices::table)
        .values(&NewTopupInvoice { payment_hash, account_id, amount_sats })
        .get_result(conn)
}

pub fn find_for_update(conn: &mut PgConnection, payment_hash: &str) -> QueryResult<Option<TopupInvoice>> {
    topup_invoices::table
        .find(payment_hash)
        .for_update()
        .first(conn)
        .optional()
}

pub fn mark_paid(conn: &mut PgConnection, payment_hash: &str, account_id: Uuid) -> QueryResult<usize> {
    diesel::update(topup_invoices::table.find(payment_hash))
        .set((topup_invoices::status.eq(TopupStatus::Paid), topup_invoices::account_id.eq(account_id)))
        .execute(conn)
}

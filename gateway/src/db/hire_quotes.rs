//! Quote rows.

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::AsExpression;
use diesel::FromSqlRow;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::schema::hire_quotes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize)]
#[diesel(sql_type = Text)]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = hire_quotes)]
pub struct Quote {
    pub id: Uuid,
    pub task_id: Uuid,
    pub contractor_account_id: Uuid,
    pub price_sats: i64,
    pub description: String,
    pub status: QuoteStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = hire_quotes)]
struct NewQuote<'a> {
    id: Uuid,
    task_id: Uuid,
    contractor_account_id: Uuid,
    price_sats: i64,
    description: &'a str,
}

pub fn insert(
    conn: &mut PgConnection,
    task_id: Uuid,
    contractor_account_id: Uuid,
    price_sats: i64,
    description: &str,
) -> QueryResult<Quote> {
    let new_quote = NewQuote { id: Uuid::new_v4(), task_id, contractor_account_id, price_sats, description };
    diesel::insert_into(hire_quotes::table).values(&new_quote).get_result(conn)
}

pub fn find(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Quote>> {
    hire_quotes::table.find(id).first(conn).optional()
}

pub fn find_for_update(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Quote>> {
    hire_quotes::table.find(id).for_update().first(conn).optional()
}

pub fn pending_for_task(conn: &mut PgConnection, task_id: Uuid) -> QueryResult<Vec<Quote>> {
    hire_quotes::table
        .filter(hire_quotes::task_id.eq(task_id))
        .filter(hire_quotes::status.eq(QuoteStatus::Pending))
        .load(conn)
}

pub fn accepted_for_task(conn: &mut PgConnection, task_id: Uuid) -> QueryResult<Option<Quote>> {
    hire_quotes::table
        .filter(hire_quotes::task_id.eq(task_id))
        .filter(hire_quotes::status.eq(QuoteStatus::Accepted))
        .first(conn)
        .optional()
}

pub fn set_status(conn: &mut PgConnection, id: Uuid, status: QuoteStatus) -> QueryResult<usize> {
    diesel::update(hire_quotes::table.find(id))
        .set((hire_quotes::status.eq(status), hire_quotes::updated_at.eq(OffsetDateTime::now_utc())))
        .execute(conn)
}

pub fn update_fields(
    conn: &mut PgConnection,
    id: Uuid,
    price_sats: Option<i64>,
    description: Option<&str>,
) -> QueryResult<Quote> {
    match (price_sats, description) {
        (Some(price), Some(desc)) => diesel::update(hire_quotes::table.find(id))
            .set((
                hire_quotes::price_sats.eq(price),
                hire_quotes::description.eq(desc),
                hire_quotes::updated_at.eq(OffsetDateTime::now_utc()),
            ))
            .get_result(conn),
        (Some(price), None) => diesel::update(hire_quotes::table.find(id))
            .set((hire_quotes::price_sats.eq(price), hire_quotes::updated_at.eq(OffsetDateTime::now_utc())))
            .get_result(conn),
        (None, Some(desc)) => diesel::update(hire_quotes::table.find(id))
            .set((hire_quotes::description.eq(desc), hire_quotes::updated_at.eq(OffsetDateTime::now_utc())))
            .get_result(conn),
        (None, None) => hire_quotes::table.find(id).get_result(conn),
    }
}

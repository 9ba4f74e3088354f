//! Quote-thread messages. Long-poll friendly: callers page with `since_id`.

use diesel::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::schema::hire_messages;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = hire_messages)]
pub struct Message {
    pub id: i64,
    pub task_id: Uuid,
    pub quote_id: Uuid,
    pub sender_account_id: Uuid,
    pub body: String,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = hire_messages)]
struct NewMessage<'a> {
    task_id: Uuid,
    quote_id: Uuid,
    sender_account_id: Uuid,
    body: &'a str,
}

pub fn insert(
    conn: &mut PgConnection,
    task_id: Uuid,
    quote_id: Uuid,
    sender_account_id: Uuid,
    body: &str,
) -> QueryResult<Message> {
    diesel::insert_into(hire_messages::table)
        .values(&NewMessage { task_id, quote_id, sender_account_id, body })
        .get_result(conn)
}

pub fn since(conn: &mut PgConnection, quote_id: Uuid, since_id: i64) -> QueryResult<Vec<Message>> {
    hire_messages::table
        .filter(hire_messages::quote_id.eq(quote_id))
        .filter(hire_messages::id.gt(since_id))
        .order(hire_messages::id.asc())
        .load(conn)
}

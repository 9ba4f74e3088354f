//! Delivery rows.

use diesel::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::schema::hire_deliveries;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = hire_deliveries)]
pub struct Delivery {
    pub id: Uuid,
    pub task_id: Uuid,
    pub quote_id: Uuid,
    pub contractor_account_id: Uuid,
    pub filename: String,
    pub content_base64: String,
    pub notes: String,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = hire_deliveries)]
struct NewDelivery<'a> {
    id: Uuid,
    task_id: Uuid,
    quote_id: Uuid,
    contractor_account_id: Uuid,
    filename: &'a str,
    content_base64: &'a str,
    notes: &'a str,
}

pub fn insert(
    conn: &mut PgConnection,
    task_id: Uuid,
    quote_id: Uuid,
    contractor_account_id: Uuid,
    filename: &str,
    content_base64: &str,
    notes: &str,
) -> QueryResult<Delivery> {
    let new_delivery = NewDelivery {
        id: Uuid::new_v4(),
        task_id,
        quote_id,
        contractor_account_id,
        filename,
        content_base64,
        notes,
    };
    diesel::insert_into(hire_deliveries::table).values(&new_delivery).get_result(conn)
}

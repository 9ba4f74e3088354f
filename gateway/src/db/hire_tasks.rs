//! Task rows.

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::AsExpression;
use diesel::FromSqlRow;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::schema::hire_tasks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize)]
#[diesel(sql_type = Text)]
pub enum TaskStatus {
    Open,
    InEscrow,
    Delivered,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = hire_tasks)]
pub struct Task {
    pub id: Uuid,
    pub buyer_account_id: Uuid,
    pub title: String,
    pub description: String,
    pub budget_sats: i64,
    pub status: TaskStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = hire_tasks)]
struct NewTask<'a> {
    id: Uuid,
    buyer_account_id: Uuid,
    title: &'a str,
    description: &'a str,
    budget_sats: i64,
}

pub fn insert(
    conn: &mut PgConnection,
    buyer_account_id: Uuid,
    title: &str,
    description: &str,
    budget_sats: i64,
) -> QueryResult<Task> {
    let new_task = NewTask { id: Uuid::new_v4(), buyer_account_id, title, description, budget_sats };
    diesel::insert_into(hire_tasks::table).values(&new_task).get_result(conn)
}

pub fn list(conn: &mut PgConnection) -> QueryResult<Vec<Task>> {
    hire_tasks::table.order(hire_tasks::created_at.desc()).load(conn)
}

pub fn find(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Task>> {
    hire_tasks::table.find(id).first(conn).optional()
}

pub fn find_for_update(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Task>> {
    hire_tasks::table.find(id).for_update().first(conn).optional()
}

pub fn set_status(conn: &mut PgConnection, id: Uuid, status: TaskStatus) -> QueryResult<usize> {
    diesel::update(hire_tasks::table.find(id))
        .set((hire_tasks::status.eq(status), hire_tasks::updated_at.eq(OffsetDateTime::now_utc())))
        .execute(conn)
}

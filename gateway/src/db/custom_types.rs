//! `ToSql`/`FromSql<Text, Pg>` impls for the status enums: one match arm
//! per variant, targeting `diesel::sql_types::Text` rather than a native
//! Postgres enum type, since the tables back status columns with `text` +
//! `check` instead of `CREATE TYPE`.

use std::io::Write;

use diesel::deserialize;
use diesel::deserialize::FromSql;
use diesel::pg::Pg;
use diesel::pg::PgValue;
use diesel::serialize;
use diesel::serialize::IsNull;
use diesel::serialize::Output;
use diesel::serialize::ToSql;
use diesel::sql_types::Text;

use crate::db::hire_quotes::QuoteStatus;
use crate::db::hire_tasks::TaskStatus;
use crate::db::topup_invoices::TopupStatus;

impl ToSql<Text, Pg> for TopupStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            TopupStatus::Pending => "pending",
            TopupStatus::Paid => "paid",
            TopupStatus::Expired => "expired",
        };
        out.write_all(s.as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for TopupStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(TopupStatus::Pending),
            b"paid" => Ok(TopupStatus::Paid),
            b"expired" => Ok(TopupStatus::Expired),
            other => Err(format!("unrecognized topup status: {}", String::from_utf8_lossy(other)).into()),
        }
    }
}

impl ToSql<Text, Pg> for TaskStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            TaskStatus::Open => "open",
            TaskStatus::InEscrow => "in_escrow",
            TaskStatus::Delivered => "delivered",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        };
        out.write_all(s.as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for TaskStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"open" => Ok(TaskStatus::Open),
            b"in_escrow" => Ok(TaskStatus::InEscrow),
            b"delivered" => Ok(TaskStatus::Delivered),
            b"completed" => Ok(TaskStatus::Completed),
            b"cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unrecognized task status: {}", String::from_utf8_lossy(other)).into()),
        }
    }
}

impl ToSql<Text, Pg> for QuoteStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
        };
        out.write_all(s.as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for QuoteStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(QuoteStatus::Pending),
            b"accepted" => Ok(QuoteStatus::Accepted),
            b"rejected" => Ok(QuoteStatus::Rejected),
            other => Err(format!("unrecognized quote status: {}", String::from_utf8_lossy(other)).into()),
        }
    }
}

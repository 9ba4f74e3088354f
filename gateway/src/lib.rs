pub mod cli;
pub mod db;
pub mod gate;
pub mod hire;
pub mod logger;
pub mod macaroon;
pub mod payhash;
pub mod price_cache;
pub mod proxy;
pub mod routes;
pub mod rules;
pub mod schema;
pub mod settings;
pub mod state;
pub mod topup;
pub mod used_hash;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use diesel::PgConnection;
use diesel_migrations::embed_migrations;
use diesel_migrations::EmbeddedMigrations;
use diesel_migrations::MigrationHarness;
use serde_json::json;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_migration(conn: &mut PgConnection) {
    conn.run_pending_migrations(MIGRATIONS).expect("migrations to succeed");
}

/// A fresh L402 challenge: the body and headers the gate attaches to every
/// 402 it returns, whether for a gated proxy call or an under-funded
/// marketplace accept.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub invoice: String,
    pub payment_hash: String,
    pub amount_sats: i64,
    pub expires_in: u64,
    pub macaroon: String,
}

impl IntoResponse for Challenge {
    fn into_response(self) -> Response {
        let header_value = format!(r#"L402 macaroon="{}", invoice="{}""#, self.macaroon, self.invoice);
        let body = Json(json!({
            "invoice": self.invoice,
            "payment_hash": self.payment_hash,
            "amount_sats": self.amount_sats,
            "expires_in": self.expires_in,
        }));

        let mut response = (StatusCode::PAYMENT_REQUIRED, body).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = header_value.parse() {
            headers.insert("WWW-Authenticate", value);
        }
        if let Ok(value) = self.invoice.parse() {
            headers.insert("X-Lightning-Invoice", value);
        }
        if let Ok(value) = self.payment_hash.parse() {
            headers.insert("X-Payment-Hash", value);
        }
        if let Ok(value) = self.amount_sats.to_string().parse() {
            headers.insert("X-Price-Sats", value);
        }
        response
    }
}

/// The app's top-level error type, mapped to the HTTP boundary exactly
/// once.
#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    InvalidPayment(String),
    PaymentAlreadyUsed(String),
    InvalidToken(String),
    InvalidL402(String),
    AccountRequired(String),
    Forbidden(String),
    NotFound(String),
    PaymentRequired(Box<Challenge>),
    InsufficientPayment(String),
    InvalidState(String),
    RequestTooLarge(String),
    DailyLimitReached(String),
    UpstreamError(String),
    ServiceUnavailable { code: &'static str, message: String },
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::PaymentRequired(challenge) = self {
            return (*challenge).into_response();
        }

        let (status, code, message) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            AppError::InvalidPayment(msg) => (StatusCode::BAD_REQUEST, "invalid_payment", msg),
            AppError::PaymentAlreadyUsed(msg) => (StatusCode::BAD_REQUEST, "payment_already_used", msg),
            AppError::InsufficientPayment(msg) => (StatusCode::PAYMENT_REQUIRED, "insufficient_payment", msg),
            AppError::InvalidToken(msg) => (StatusCode::UNAUTHORIZED, "invalid_token", msg),
            AppError::InvalidL402(msg) => (StatusCode::UNAUTHORIZED, "invalid_l402", msg),
            AppError::AccountRequired(msg) => (StatusCode::UNAUTHORIZED, "account_required", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, "invalid_state", msg),
            AppError::RequestTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "request_too_large", msg),
            AppError::DailyLimitReached(msg) => (StatusCode::TOO_MANY_REQUESTS, "daily_limit_reached", msg),
            AppError::UpstreamError(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
            AppError::ServiceUnavailable { code, message } => (StatusCode::SERVICE_UNAVAILABLE, code, message),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::PaymentRequired(_) => unreachable!("handled above"),
        };

        let body = Json(json!({
            "error": { "code": code, "message": message },
        }));

        (status, body).into_response()
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<db::accounts::LedgerError> for AppError {
    fn from(err: db::accounts::LedgerError) -> Self {
        match err {
            db::accounts::LedgerError::InvalidToken => AppError::InvalidToken("unknown account token".to_string()),
            db::accounts::LedgerError::NotFound => AppError::NotFound("account not found".to_string()),
            db::accounts::LedgerError::InsufficientBalance { .. } => {
                AppError::InternalServerError("insufficient balance not mapped to a challenge".to_string())
            }
            db::accounts::LedgerError::Db(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<hire::HireError> for AppError {
    fn from(err: hire::HireError) -> Self {
        match err {
            hire::HireError::NotFound(msg) => AppError::NotFound(msg),
            hire::HireError::Forbidden(msg) => AppError::Forbidden(msg),
            hire::HireError::InvalidState(msg) => AppError::InvalidState(msg),
            hire::HireError::InsufficientBalance { .. } => {
                AppError::InternalServerError("insufficient balance not mapped to a challenge".to_string())
            }
            hire::HireError::Db(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<lightning_client::PhoenixError> for AppError {
    fn from(err: lightning_client::PhoenixError) -> Self {
        AppError::ServiceUnavailable { code: "phoenix_unavailable", message: err.to_string() }
    }
}

//! Routes for the marketplace: account info, withdrawal, and the
//! task/quote/delivery lifecycle. Each handler resolves the caller's
//! account from `X-Token`, runs the state machine in `crate::hire`, and
//! turns any `HireError::InsufficientBalance` into a fresh L402 challenge
//! bound to the caller's account rather than a bare 402 error body, the
//! same trick `gate::debit_and_forward` uses for the gated proxy.

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::db::accounts;
use crate::db::hire_tasks::Task;
use crate::db::hire_quotes::Quote;
use crate::db::hire_messages::Message;
use crate::db::hire_deliveries::Delivery;
use crate::gate;
use crate::hire;
use crate::hire::HireError;
use crate::routes::extract_l402;
use crate::routes::extract_token;
use crate::routes::require_token;
use crate::state::Core;
use crate::AppError;

fn conn(core: &Core) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>, AppError> {
    core.pool.get().map_err(|err| AppError::InternalServerError(err.to_string()))
}

#[derive(Serialize)]
pub struct MeResponse {
    pub account_id: Uuid,
    pub balance_sats: i64,
}

/// `GET /api/v1/ai-for-hire/me`.
pub async fn me(State(core): State<Core>, headers: axum::http::HeaderMap) -> Result<Json<MeResponse>, AppError> {
    let token = require_token(&headers)?;
    let mut conn = conn(&core)?;
    let account_id = accounts::account_id_by_token(&mut conn, &token)?;
    let account = accounts::get_info(&mut conn, account_id)?;
    Ok(Json(MeResponse { account_id: account.id, balance_sats: account.balance_sats }))
}

/// `GET /api/v1/ai-for-hire/tasks`.
pub async fn list_tasks(State(core): State<Core>) -> Result<Json<Vec<Task>>, AppError> {
    let mut conn = conn(&core)?;
    Ok(Json(hire::list_tasks(&mut conn)?))
}

/// `GET /api/v1/ai-for-hire/tasks/{id}`.
pub async fn get_task(State(core): State<Core>, Path(task_id): Path<Uuid>) -> Result<Json<Task>, AppError> {
    let mut conn = conn(&core)?;
    Ok(Json(hire::get_task(&mut conn, task_id)?))
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub budget_sats: i64,
}

/// `POST /api/v1/ai-for-hire/tasks` — fixed posting fee, paid through the
/// same bearer-debit-or-L402-challenge branch the gated proxy uses.
pub async fn create_task(
    State(core): State<Core>,
    headers: axum::http::HeaderMap,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Response, AppError> {
    if request.budget_sats <= 0 {
        return Err(AppError::InvalidRequest("budget_sats must be positive".to_string()));
    }
    if request.title.trim().is_empty() {
        return Err(AppError::InvalidRequest("title must not be empty".to_string()));
    }

    let mut conn = conn(&core)?;
    let buyer_account_id = gate::debit_or_challenge(
        &core,
        &mut conn,
        require_token(&headers).ok().as_deref(),
        extract_l402(&headers).as_deref(),
        core.settings.hire_task_fee_sats,
        "hire:create_task",
    )
    .await?;

    let task = hire::create_task(&mut conn, buyer_account_id, &request.title, &request.description, request.budget_sats)?;
    Ok((axum::http::StatusCode::CREATED, Json(task)).into_response())
}

#[derive(Deserialize)]
pub struct CreateQuoteRequest {
    pub price_sats: i64,
    pub description: String,
}

/// `POST /api/v1/ai-for-hire/tasks/{id}/quotes` — 10-sat quote fee.
pub async fn create_quote(
    State(core): State<Core>,
    Path(task_id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(request): Json<CreateQuoteRequest>,
) -> Result<Response, AppError> {
    if request.price_sats <= 0 {
        return Err(AppError::InvalidRequest("price_sats must be positive".to_string()));
    }

    let mut conn = conn(&core)?;
    let contractor_account_id = gate::debit_or_challenge(
        &core,
        &mut conn,
        require_token(&headers).ok().as_deref(),
        extract_l402(&headers).as_deref(),
        core.settings.hire_quote_fee_sats,
        &format!("hire:create_quote:{task_id}"),
    )
    .await?;

    let quote = hire::create_quote(&mut conn, task_id, contractor_account_id, request.price_sats, &request.description)?;
    Ok((axum::http::StatusCode::CREATED, Json(quote)).into_response())
}

#[derive(Deserialize)]
pub struct UpdateQuoteRequest {
    pub price_sats: Option<i64>,
    pub description: Option<String>,
}

/// `PATCH /api/v1/ai-for-hire/tasks/{id}/quotes/{qid}` — contractor-only.
pub async fn update_quote(
    State(core): State<Core>,
    Path((task_id, quote_id)): Path<(Uuid, Uuid)>,
    headers: axum::http::HeaderMap,
    Json(request): Json<UpdateQuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    let token = require_token(&headers)?;
    let mut conn = conn(&core)?;
    let caller_account_id = accounts::account_id_by_token(&mut conn, &token)?;
    let quote = hire::update_quote(
        &mut conn,
        task_id,
        quote_id,
        caller_account_id,
        request.price_sats,
        request.description.as_deref(),
    )?;
    Ok(Json(quote))
}

#[derive(Serialize)]
pub struct AcceptQuoteResponse {
    pub task_id: Uuid,
    pub quote_id: Uuid,
    pub status: &'static str,
    pub escrowed_sats: i64,
}

/// `POST /api/v1/ai-for-hire/tasks/{id}/quotes/{qid}/accept` — the atomic
/// escrow-lock. An `X-Token` caller debits the ledger directly
/// (`skip_debit=false`); paying a challenge this endpoint previously issued
/// and retrying with `Authorization: L402 <macaroon>:<preimage>` redeems
/// that macaroon instead and skips the ledger debit (`skip_debit=true`) —
/// the macaroon's `account_id` caveat supplies the caller identity. Both
/// paths share this single route rather than splitting into two.
pub async fn accept_quote(
    State(core): State<Core>,
    Path((task_id, quote_id)): Path<(Uuid, Uuid)>,
    headers: axum::http::HeaderMap,
) -> Result<Response, AppError> {
    let mut conn = conn(&core)?;

    let (caller_account_id, skip_debit) = if let Some(token) = extract_token(&headers) {
        (accounts::account_id_by_token(&mut conn, &token)?, false)
    } else if let Some(l402_value) = extract_l402(&headers) {
        let quote = hire::get_quote(&mut conn, quote_id)?;
        let account_id = gate::redeem_l402(&core, &l402_value, quote.price_sats)
            .await?
            .ok_or_else(|| AppError::InvalidL402("macaroon missing an account_id caveat".to_string()))?;
        (account_id, true)
    } else {
        return Err(AppError::AccountRequired("missing X-Token or Authorization: L402 header".to_string()));
    };

    match hire::accept_quote(&mut conn, task_id, quote_id, caller_account_id, skip_debit) {
        Ok(outcome) => Ok(Json(AcceptQuoteResponse {
            task_id: outcome.task_id,
            quote_id: outcome.quote_id,
            status: "in_escrow",
            escrowed_sats: outcome.escrowed_sats,
        })
        .into_response()),
        Err(HireError::InsufficientBalance { required, account_id, .. }) => {
            let challenge = gate::mint_challenge(&core, "hire", &format!("accept_quote:{task_id}"), required, Some(account_id)).await?;
            Ok(challenge.into_response())
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

/// `POST /api/v1/ai-for-hire/tasks/{id}/quotes/{qid}/messages`.
pub async fn send_message(
    State(core): State<Core>,
    Path((task_id, quote_id)): Path<(Uuid, Uuid)>,
    headers: axum::http::HeaderMap,
    Json(request): Json<SendMessageRequest>,
) -> Result<Response, AppError> {
    if request.body.trim().is_empty() {
        return Err(AppError::InvalidRequest("body must not be empty".to_string()));
    }
    let token = require_token(&headers)?;
    let mut conn = conn(&core)?;
    let sender_account_id = accounts::account_id_by_token(&mut conn, &token)?;
    let message = hire::send_quote_message(&mut conn, task_id, quote_id, sender_account_id, &request.body)?;
    Ok((axum::http::StatusCode::CREATED, Json(message)).into_response())
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub since_id: i64,
}

/// `GET /api/v1/ai-for-hire/tasks/{id}/quotes/{qid}/messages?since_id=`.
pub async fn get_messages(
    State(core): State<Core>,
    Path((task_id, quote_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<MessagesQuery>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Vec<Message>>, AppError> {
    let token = require_token(&headers)?;
    let mut conn = conn(&core)?;
    let caller_account_id = accounts::account_id_by_token(&mut conn, &token)?;
    let messages = hire::get_quote_messages(&mut conn, task_id, quote_id, caller_account_id, query.since_id)?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct DeliverRequest {
    pub filename: String,
    pub content_base64: String,
    #[serde(default)]
    pub notes: String,
}

/// `POST /api/v1/ai-for-hire/tasks/{id}/deliver` — contractor-only.
pub async fn deliver(
    State(core): State<Core>,
    Path(task_id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(request): Json<DeliverRequest>,
) -> Result<Response, AppError> {
    let token = require_token(&headers)?;
    let mut conn = conn(&core)?;
    let contractor_account_id = accounts::account_id_by_token(&mut conn, &token)?;
    let delivery: Delivery =
        hire::create_delivery(&mut conn, task_id, contractor_account_id, &request.filename, &request.content_base64, &request.notes)?;
    Ok((axum::http::StatusCode::CREATED, Json(delivery)).into_response())
}

/// `POST /api/v1/ai-for-hire/tasks/{id}/confirm` — buyer-only, no body.
pub async fn confirm(
    State(core): State<Core>,
    Path(task_id): Path<Uuid>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Task>, AppError> {
    let token = require_token(&headers)?;
    let mut conn = conn(&core)?;
    let caller_account_id = accounts::account_id_by_token(&mut conn, &token)?;
    let task = hire::confirm_delivery(&mut conn, task_id, caller_account_id)?;
    Ok(Json(task))
}

#[derive(Deserialize)]
pub struct CollectRequest {
    pub bolt11: String,
    pub amount_sats: i64,
}

#[derive(Serialize)]
pub struct CollectResponse {
    pub balance_sats: i64,
    pub payment_preimage: String,
}

/// `POST /api/v1/ai-for-hire/collect` — withdraw ledger balance over
/// Lightning. Debits first, pays the invoice, and best-effort refunds (with
/// a logged error) if the Lightning payment fails after the debit commits.
pub async fn collect(
    State(core): State<Core>,
    headers: axum::http::HeaderMap,
    Json(request): Json<CollectRequest>,
) -> Result<Json<CollectResponse>, AppError> {
    if request.amount_sats <= 0 {
        return Err(AppError::InvalidRequest("amount_sats must be positive".to_string()));
    }
    let token = require_token(&headers)?;
    let mut conn = conn(&core)?;
    let account_id = accounts::account_id_by_token(&mut conn, &token)?;

    let balance_after_debit = accounts::debit(&mut conn, account_id, request.amount_sats, "hire:collect")?;

    match core.phoenix.pay_invoice(&request.bolt11).await {
        Ok(paid) => Ok(Json(CollectResponse { balance_sats: balance_after_debit, payment_preimage: paid.payment_preimage })),
        Err(err) => {
            tracing::error!(%account_id, amount_sats = request.amount_sats, error = %err, "collect: lightning payment failed after debit, refunding");
            let refunded_balance = accounts::credit(&mut conn, account_id, request.amount_sats)?;
            let _ = refunded_balance;
            Err(AppError::UpstreamError(format!("lightning payment failed, balance refunded: {err}")))
        }
    }
}

//! Routes for the gated upstream proxy and the top-up flow.

use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;

use crate::gate;
use crate::gate::GatedRequest;
use crate::routes::extract_token;
use crate::state::Core;
use crate::topup;
use crate::topup::TopupError;
use crate::AppError;
use crate::Challenge;

/// `POST /api/v1/{api}/{path...}` — the gated proxy.
#[tracing::instrument(skip_all, fields(api_name, endpoint_path), err(Debug))]
pub async fn proxy(
    State(core): State<Core>,
    Path((api_name, endpoint_path)): Path<(String, String)>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let request = GatedRequest {
        api_name,
        path: format!("/{}", endpoint_path.trim_start_matches('/')),
        content_type,
        body,
        token: extract_token(&headers),
        authorization: headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_string),
    };

    gate::handle(&core, request).await
}

#[derive(Deserialize)]
pub struct TopupRequest {
    pub amount_sats: i64,
}

/// `POST /api/v1/topup` — issues a Lightning invoice, optionally bound to the
/// caller's account.
pub async fn topup(
    State(core): State<Core>,
    headers: HeaderMap,
    Json(request): Json<TopupRequest>,
) -> Result<Response, AppError> {
    if request.amount_sats <= 0 {
        return Err(AppError::InvalidRequest("amount_sats must be positive".to_string()));
    }

    let account_id = match extract_token(&headers) {
        Some(token) => {
            let mut conn = core.pool.get().map_err(|err| AppError::InternalServerError(err.to_string()))?;
            Some(crate::db::accounts::account_id_by_token(&mut conn, &token)?)
        }
        None => None,
    };

    let invoice = core.phoenix.create_invoice(request.amount_sats as u64, "topup").await?;
    let payment_hash = crate::payhash::canonicalize(&invoice.payment_hash);

    let mut conn = core.pool.get().map_err(|err| AppError::InternalServerError(err.to_string()))?;
    topup::create_invoice(&mut conn, &payment_hash, request.amount_sats, account_id).map_err(map_topup_error)?;

    let macaroon = crate::macaroon::Macaroon::mint(&core.root_key, &payment_hash, request.amount_sats, account_id);
    Ok(Challenge {
        invoice: invoice.serialized,
        payment_hash,
        amount_sats: request.amount_sats,
        expires_in: core.settings.invoice_expiry_seconds,
        macaroon: macaroon.serialize(),
    }
    .into_response())
}

#[derive(Deserialize)]
pub struct TopupClaimRequest {
    pub preimage: String,
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct TopupClaimResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub balance_sats: i64,
}

/// `POST /api/v1/topup/claim` — claims a paid invoice by its preimage.
pub async fn topup_claim(
    State(core): State<Core>,
    Json(request): Json<TopupClaimRequest>,
) -> Result<Json<TopupClaimResponse>, AppError> {
    let mut conn = core.pool.get().map_err(|err| AppError::InternalServerError(err.to_string()))?;
    let result = topup::claim(&mut conn, &request.preimage, request.token.as_deref()).map_err(map_topup_error)?;

    Ok(Json(TopupClaimResponse { token: result.token, balance_sats: result.balance_sats }))
}

fn map_topup_error(err: TopupError) -> AppError {
    match err {
        TopupError::InvalidPreimage => AppError::InvalidPayment("malformed preimage".to_string()),
        TopupError::InvalidPayment => AppError::InvalidPayment("unknown payment hash".to_string()),
        TopupError::AlreadyUsed => AppError::PaymentAlreadyUsed("top-up invoice already claimed".to_string()),
        TopupError::InvalidToken => AppError::InvalidToken("unknown account token".to_string()),
        TopupError::Db(err) => AppError::InternalServerError(err.to_string()),
    }
}

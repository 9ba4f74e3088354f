//! Payment-gate middleware: the decision procedure that prices a gated
//! upstream call and chooses between a bearer-token debit, an L402
//! redemption, or minting a fresh challenge, before handing off to the
//! upstream proxy.
//!
//! Payment authorization rides on the full HMAC-chain macaroon scheme in
//! `crate::macaroon` rather than a bare preimage: a macaroon binds the
//! payment hash to an amount and, optionally, an account.

use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::db::accounts;
use crate::db::accounts::LedgerError;
use crate::macaroon;
use crate::macaroon::MacaroonError;
use crate::payhash;
use crate::proxy;
use crate::rules;
use crate::settings::ApiConfig;
use crate::settings::EndpointConfig;
use crate::state::Core;
use crate::AppError;
use crate::Challenge;

/// Paths that are always JSON-bodied — used only to reject a non-JSON
/// content type before any invoice is issued.
const JSON_REQUIRED_PATHS: &[&str] = &[
    "/v1/chat/completions",
    "/v1/responses",
    "/v1/images/generations",
    "/v1/audio/speech",
    "/v1/embeddings",
    "/v1/moderations",
    "/v1/video/generations",
];

pub struct GatedRequest {
    pub api_name: String,
    pub path: String,
    pub content_type: String,
    pub body: Bytes,
    pub token: Option<String>,
    pub authorization: Option<String>,
}

/// Runs the full payment-gate decision procedure and returns the response
/// to send the caller: either the upstream's passthrough response, or a 402
/// challenge.
pub async fn handle(core: &Core, request: GatedRequest) -> Result<axum::response::Response, AppError> {
    let (api, endpoint) = core
        .settings
        .endpoint(&request.api_name, &request.path)
        .ok_or_else(|| AppError::NotFound(format!("endpoint not configured: {}/{}", request.api_name, request.path)))?;
    let (api, endpoint) = (api.clone(), endpoint.clone());

    let max_bytes = endpoint.max_request_bytes.unwrap_or(core.settings.max_request_bytes);
    if request.body.len() > max_bytes {
        return Err(AppError::RequestTooLarge(format!("max request size: {max_bytes} bytes")));
    }

    let is_json = request.content_type.to_ascii_lowercase().contains("application/json");
    if JSON_REQUIRED_PATHS.contains(&endpoint.path.as_str()) && !is_json {
        return Err(AppError::InvalidRequest("request body must be a JSON object".to_string()));
    }

    let (parsed_body, outgoing_body, outgoing_content_type) = if is_json {
        let value: Value = if request.body.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(&request.body).map_err(|_| AppError::InvalidRequest("request body must be a JSON object".to_string()))?
        };
        if !value.is_object() {
            return Err(AppError::InvalidRequest("request body must be a JSON object".to_string()));
        }
        let rewritten = rules::apply_request_rules(&endpoint.path, &endpoint, &value)
            .map_err(|err| map_rule_error(err))?;
        let bytes = Bytes::from(serde_json::to_vec(&rewritten).expect("serde_json::Value always serializes"));
        (Some(rewritten), bytes, "application/json".to_string())
    } else {
        (None, request.body.clone(), if request.content_type.is_empty() { "application/octet-stream".to_string() } else { request.content_type.clone() })
    };

    let amount_sats = rules::price_for_request(&endpoint, parsed_body.as_ref()).map_err(map_rule_error)?;

    check_daily_cap(core, &request.api_name, &endpoint)?;

    if let Some(token) = request.token.as_deref().filter(|t| !t.trim().is_empty()) {
        return debit_and_forward(core, &request.api_name, &api, &endpoint, token, amount_sats, outgoing_body, &outgoing_content_type).await;
    }

    if let Some(authorization) = request.authorization.as_deref() {
        if let Some(value) = authorization.strip_prefix("L402 ") {
            return redeem_and_forward(core, &request.api_name, &api, &endpoint, value, amount_sats, outgoing_body, &outgoing_content_type).await;
        }
    }

    mint_challenge(core, &request.api_name, &endpoint.path, amount_sats, None)
        .await
        .map(axum::response::IntoResponse::into_response)
}

fn map_rule_error(err: rules::RuleError) -> AppError {
    match err {
        rules::RuleError::ModelNotSupported(model) => AppError::InvalidRequest(format!("model '{model}' is not available")),
    }
}

fn check_daily_cap(core: &Core, api_name: &str, endpoint: &EndpointConfig) -> Result<(), AppError> {
    let Some(cap) = endpoint.daily_call_cap else {
        return Ok(());
    };
    let key = format!("{api_name}:{}", endpoint.path);
    let mut counters = core.daily_counters.lock().expect("daily counters mutex poisoned");
    let previous = counters.increment(&key);
    if previous >= cap {
        return Err(AppError::DailyLimitReached(format!("daily call limit of {cap} reached for {key}")));
    }
    Ok(())
}

async fn debit_and_forward(
    core: &Core,
    api_name: &str,
    api: &ApiConfig,
    endpoint: &EndpointConfig,
    token: &str,
    amount_sats: i64,
    body: Bytes,
    content_type: &str,
) -> Result<axum::response::Response, AppError> {
    let mut conn = core.pool.get().map_err(|err| AppError::InternalServerError(err.to_string()))?;
    let account_id = accounts::account_id_by_token(&mut conn, token).map_err(|_| AppError::InvalidToken("unknown account token".to_string()))?;

    let label = format!("{api_name}:{}", endpoint.path);
    match accounts::debit(&mut conn, account_id, amount_sats, &label) {
        Ok(_) => forward(api_name, api, endpoint, body, content_type).await,
        Err(LedgerError::InsufficientBalance { .. }) => mint_challenge(core, api_name, &endpoint.path, amount_sats, Some(account_id))
            .await
            .map(axum::response::IntoResponse::into_response),
        Err(err) => Err(err.into()),
    }
}

async fn redeem_and_forward(
    core: &Core,
    api_name: &str,
    api: &ApiConfig,
    endpoint: &EndpointConfig,
    l402_value: &str,
    amount_sats: i64,
    body: Bytes,
    content_type: &str,
) -> Result<axum::response::Response, AppError> {
    redeem_l402(core, l402_value, amount_sats).await?;
    forward(api_name, api, endpoint, body, content_type).await
}

/// Verifies an `L402 <macaroon-b64>:<preimage-hex>` value against
/// `required_amount_sats` and marks its payment hash used. Returns the
/// macaroon's bound `account_id` caveat, if any — the caller identity for
/// flows (like
/// `accept_quote`'s `skip_debit` path) that redeem an L402 credential
/// instead of debiting the ledger directly.
pub async fn redeem_l402(core: &Core, l402_value: &str, required_amount_sats: i64) -> Result<Option<Uuid>, AppError> {
    let (macaroon_b64, preimage_hex) =
        l402_value.split_once(':').ok_or_else(|| AppError::InvalidL402("malformed L402 authorization header".to_string()))?;

    let caveats = macaroon::verify(&core.root_key, macaroon_b64).map_err(map_macaroon_error)?;

    let derived_hash = payhash::hash_of(preimage_hex).map_err(|_| AppError::InvalidL402("preimage must be 64 hex characters decoding to 32 bytes".to_string()))?;
    if derived_hash != caveats.payment_hash {
        return Err(AppError::InvalidL402("preimage does not match the macaroon's payment hash".to_string()));
    }

    // Amount is checked *before* the hash is marked used, so an honest
    // underpayment doesn't burn the hash.
    if caveats.amount_sats < required_amount_sats {
        return Err(AppError::InsufficientPayment(format!(
            "macaroon covers {} sats, {required_amount_sats} required",
            caveats.amount_sats
        )));
    }

    if core.used_hashes.is_used(&caveats.payment_hash) {
        return Err(AppError::PaymentAlreadyUsed("payment hash already redeemed".to_string()));
    }
    if !core.used_hashes.mark_used(&caveats.payment_hash) {
        return Err(AppError::PaymentAlreadyUsed("payment hash already redeemed".to_string()));
    }

    Ok(caveats.account_id)
}

fn map_macaroon_error(err: MacaroonError) -> AppError {
    AppError::InvalidL402(err.to_string())
}

async fn forward(
    api_name: &str,
    api: &ApiConfig,
    endpoint: &EndpointConfig,
    body: Bytes,
    content_type: &str,
) -> Result<axum::response::Response, AppError> {
    let body_json = if content_type.contains("application/json") { serde_json::from_slice::<Value>(&body).ok() } else { None };

    if proxy::wants_stream(&endpoint.path, body_json.as_ref()) {
        proxy::forward_streaming(api_name, api, endpoint, body, content_type).await
    } else {
        proxy::forward(api_name, api, endpoint, body, content_type).await
    }
}

/// Resolves the caller's account for a flat-fee action (posting a task,
/// quoting one) that has no upstream call to proxy: a bearer token debits
/// the ledger directly, an `Authorization: L402` header redeems a macaroon
/// bound to the paying account instead. Mirrors `debit_and_forward` and
/// `redeem_and_forward` without the trailing proxy hop.
pub async fn debit_or_challenge(
    core: &Core,
    conn: &mut diesel::PgConnection,
    token: Option<&str>,
    authorization: Option<&str>,
    amount_sats: i64,
    label: &str,
) -> Result<Uuid, AppError> {
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        let account_id = accounts::account_id_by_token(conn, token).map_err(|_| AppError::InvalidToken("unknown account token".to_string()))?;
        return match accounts::debit(conn, account_id, amount_sats, label) {
            Ok(_) => Ok(account_id),
            Err(LedgerError::InsufficientBalance { .. }) => {
                let challenge = mint_challenge(core, "hire", label, amount_sats, Some(account_id)).await?;
                Err(AppError::PaymentRequired(Box::new(challenge)))
            }
            Err(err) => Err(err.into()),
        };
    }

    if let Some(value) = authorization.and_then(|header| header.strip_prefix("L402 ")) {
        let account_id = redeem_l402(core, value, amount_sats).await?;
        return account_id.ok_or_else(|| AppError::InvalidL402("macaroon missing an account_id caveat".to_string()));
    }

    Err(AppError::AccountRequired("missing X-Token or Authorization: L402 header".to_string()))
}

/// Mints a fresh L402 challenge bound to `account_id` when given (the
/// insufficient-balance path, so the retried request can skip the ledger
/// debit) or unbound (the no-auth path).
pub async fn mint_challenge(
    core: &Core,
    api_name: &str,
    endpoint_path: &str,
    amount_sats: i64,
    account_id: Option<Uuid>,
) -> Result<Challenge, AppError> {
    let description = format!("{api_name}:{endpoint_path}");
    let invoice = core.phoenix.create_invoice(amount_sats.max(0) as u64, &description).await?;
    let payment_hash = payhash::canonicalize(&invoice.payment_hash);

    let macaroon = macaroon::Macaroon::mint(&core.root_key, &payment_hash, amount_sats, account_id);

    Ok(Challenge {
        invoice: invoice.serialized,
        payment_hash,
        amount_sats,
        expires_in: core.settings.invoice_expiry_seconds,
        macaroon: macaroon.serialize(),
    })
}

//! Pricing and request-body rewriting rules driven entirely by the
//! endpoint's TOML config. The four path names below are intrinsic to the
//! pricing/capping contract, not upstream-specific validation, so they stay
//! hardcoded rather than moving into config.

use serde_json::Value;

use crate::settings::EndpointConfig;
use crate::settings::ModelPrice;
use crate::settings::PriceType;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("model_not_supported:{0}")]
    ModelNotSupported(String),
}

/// Prices a parsed request body against an endpoint's configuration: a flat
/// price, or a per-model lookup falling back to `_default`.
pub fn price_for_request(endpoint: &EndpointConfig, body: Option<&Value>) -> Result<i64, RuleError> {
    match endpoint.price_type {
        PriceType::Flat => Ok(endpoint.price_sats.unwrap_or(0)),
        PriceType::PerModel => {
            let model_name = body
                .and_then(|b| b.get("model"))
                .and_then(Value::as_str)
                .unwrap_or("_default")
                .to_string();
            endpoint
                .price_for_model(Some(&model_name))
                .map(|m| m.price_sats)
                .ok_or(RuleError::ModelNotSupported(model_name))
        }
    }
}

fn resolve_model_config<'a>(endpoint: &'a EndpointConfig, model_name: &str) -> Option<&'a ModelPrice> {
    endpoint.price_for_model(Some(model_name))
}

/// Enforces `max_output_tokens` from the model's config on a request body,
/// reading whichever of `max_tokens` / `max_completion_tokens` /
/// `max_output_tokens` the caller sent and capping it.
fn apply_output_token_cap(endpoint: &EndpointConfig, body: &mut serde_json::Map<String, Value>) -> Result<(), RuleError> {
    let model_name = body.get("model").and_then(Value::as_str).unwrap_or("_default").to_string();
    let model_config = resolve_model_config(endpoint, &model_name).ok_or(RuleError::ModelNotSupported(model_name))?;

    if let Some(cap) = model_config.max_output_tokens {
        let requested = body
            .get("max_tokens")
            .or_else(|| body.get("max_completion_tokens"))
            .or_else(|| body.get("max_output_tokens"))
            .and_then(Value::as_u64);

        let capped = match requested {
            Some(requested) if requested <= cap => requested,
            _ => cap,
        };
        body.insert("max_output_tokens".to_string(), Value::from(capped));
    }
    body.remove("max_completion_tokens");
    body.remove("max_tokens");
    Ok(())
}

/// Applies the endpoint-specific request-body rewrites before any invoice
/// is issued.
pub fn apply_request_rules(endpoint_path: &str, endpoint: &EndpointConfig, body: &Value) -> Result<Value, RuleError> {
    let mut body = body.as_object().cloned().unwrap_or_default();

    if endpoint_path == "/v1/chat/completions" {
        apply_output_token_cap(endpoint, &mut body)?;
        if let Some(cap) = body.remove("max_output_tokens") {
            body.insert("max_tokens".to_string(), cap);
        }
    }

    if endpoint_path == "/v1/responses" {
        apply_output_token_cap(endpoint, &mut body)?;
    }

    if endpoint_path == "/v1/images/generations" || endpoint_path == "/v1/images/edits" {
        body.insert("n".to_string(), Value::from(1));
    }

    if endpoint_path == "/v1/video/generations" {
        body.insert("n".to_string(), Value::from(1));
    }

    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn endpoint_with_models() -> EndpointConfig {
        let mut models = HashMap::new();
        models.insert("gpt-4o-mini".to_string(), ModelPrice { price_sats: 10, max_output_tokens: Some(256) });
        models.insert("_default".to_string(), ModelPrice { price_sats: 5, max_output_tokens: None });
        EndpointConfig {
            path: "/v1/chat/completions".to_string(),
            method: "POST".to_string(),
            price_type: PriceType::PerModel,
            price_sats: None,
            models,
            max_request_bytes: None,
            description: None,
            daily_call_cap: None,
        }
    }

    #[test]
    fn prices_by_model_with_default_fallback() {
        let endpoint = endpoint_with_models();
        let body = serde_json::json!({"model": "gpt-4o-mini"});
        assert_eq!(price_for_request(&endpoint, Some(&body)).unwrap(), 10);

        let unknown = serde_json::json!({"model": "unknown-model"});
        assert_eq!(price_for_request(&endpoint, Some(&unknown)).unwrap(), 5);
    }

    #[test]
    fn caps_max_tokens_and_restores_key_name() {
        let endpoint = endpoint_with_models();
        let body = serde_json::json!({"model": "gpt-4o-mini", "max_tokens": 9000});
        let rewritten = apply_request_rules("/v1/chat/completions", &endpoint, &body).unwrap();
        assert_eq!(rewritten["max_tokens"], 256);
        assert!(rewritten.get("max_output_tokens").is_none());
    }

    #[test]
    fn forces_n_equals_one_for_image_endpoints() {
        let endpoint = endpoint_with_models();
        let body = serde_json::json!({"n": 4});
        let rewritten = apply_request_rules("/v1/images/generations", &endpoint, &body).unwrap();
        assert_eq!(rewritten["n"], 1);
    }
}

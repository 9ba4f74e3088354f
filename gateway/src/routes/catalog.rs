//! Catalog and liveness endpoints: the catalog annotates each priced entry
//! with a USD estimate from the BTC price cache; health reports
//! Lightning-node reachability plus used-hash set stats.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::price_cache;
use crate::state::Core;
use crate::AppError;

#[derive(Serialize)]
pub struct CatalogModelEntry {
    pub price_sats: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd_cents: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
}

#[derive(Serialize)]
pub struct CatalogEndpointEntry {
    pub path: String,
    pub method: String,
    pub price_type: &'static str,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_sats: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd_cents: Option<f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub models: HashMap<String, CatalogModelEntry>,
}

#[derive(Serialize)]
pub struct CatalogApiEntry {
    pub endpoints: Vec<CatalogEndpointEntry>,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub btc_usd: Option<f64>,
    pub apis: HashMap<String, CatalogApiEntry>,
}

pub async fn catalog(State(core): State<Core>) -> Json<CatalogResponse> {
    let btc_usd = core.price_cache.get().await;

    let apis = core
        .settings
        .apis
        .iter()
        .map(|(api_name, api_config)| {
            let endpoints = api_config
                .endpoints
                .iter()
                .map(|endpoint| {
                    let (price_type, price_sats, price_usd_cents, models) = match endpoint.price_type {
                        crate::settings::PriceType::Flat => {
                            let price = endpoint.price_sats.unwrap_or(0);
                            ("flat", Some(price), price_cache::sats_to_usd_cents(price, btc_usd), HashMap::new())
                        }
                        crate::settings::PriceType::PerModel => {
                            let models = endpoint
                                .models
                                .iter()
                                .map(|(model_name, model_price)| {
                                    (
                                        model_name.clone(),
                                        CatalogModelEntry {
                                            price_sats: model_price.price_sats,
                                            price_usd_cents: price_cache::sats_to_usd_cents(model_price.price_sats, btc_usd),
                                            max_output_tokens: model_price.max_output_tokens,
                                        },
                                    )
                                })
                                .collect();
                            ("per_model", None, None, models)
                        }
                    };

                    CatalogEndpointEntry {
                        path: endpoint.path.clone(),
                        method: endpoint.method.clone(),
                        price_type,
                        description: endpoint.description.clone().unwrap_or_default(),
                        price_sats,
                        price_usd_cents,
                        models,
                    }
                })
                .collect();
            (api_name.clone(), CatalogApiEntry { endpoints })
        })
        .collect();

    Json(CatalogResponse { btc_usd, apis })
}

pub async fn health(State(core): State<Core>) -> Result<Json<serde_json::Value>, AppError> {
    let balance = core.phoenix.get_balance().await?;
    let stats = core.used_hashes.stats();

    Ok(Json(json!({
        "status": "ok",
        "phoenix": { "ok": true, "balance_sat": balance.balance_sat },
        "used_hashes": stats,
    })))
}

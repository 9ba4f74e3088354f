//! TOML-loaded configuration: the catalog of gated upstream APIs plus the
//! handful of global tunables. `Settings::new` reads the file if present,
//! otherwise writes fresh defaults to disk for next time.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

const SETTINGS_FILE_NAME: &str = "gateway-settings.toml";

pub const DEFAULT_MAX_REQUEST_BYTES: usize = 32_768;
const DEFAULT_INVOICE_EXPIRY_SECONDS: u64 = 900;
const DEFAULT_USED_HASH_TTL_SECONDS: u64 = 3600;
const DEFAULT_USED_HASH_CLEANUP_INTERVAL_SECONDS: u64 = 300;
const DEFAULT_BTC_PRICE_CACHE_SECONDS: u64 = 60;

/// Fixed posting fee for `POST /api/v1/ai-for-hire/tasks`.
pub const DEFAULT_HIRE_TASK_FEE_SATS: i64 = 50;
/// Fixed fee for `POST .../tasks/{id}/quotes`.
pub const DEFAULT_HIRE_QUOTE_FEE_SATS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Flat,
    PerModel,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelPrice {
    pub price_sats: i64,
    pub max_output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub path: String,
    pub method: String,
    pub price_type: PriceType,
    pub price_sats: Option<i64>,
    #[serde(default)]
    pub models: HashMap<String, ModelPrice>,
    pub max_request_bytes: Option<usize>,
    pub description: Option<String>,
    /// Per-endpoint daily call cap, reset at UTC midnight. `None` means
    /// unlimited.
    pub daily_call_cap: Option<u64>,
}

impl EndpointConfig {
    /// Looks up the price for `model`, falling back to `_default`; `None` if
    /// neither is configured (the caller rejects this as "unknown model").
    pub fn price_for_model(&self, model: Option<&str>) -> Option<&ModelPrice> {
        let model = model.unwrap_or("_default");
        self.models.get(model).or_else(|| self.models.get("_default"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub upstream_base: String,
    pub api_key_env: Option<String>,
    pub auth_header: Option<String>,
    pub auth_prefix: Option<String>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BtcPriceConfig {
    pub source: Option<String>,
    pub cache_seconds: u64,
}

impl Default for BtcPriceConfig {
    fn default() -> Self {
        Self { source: None, cache_seconds: DEFAULT_BTC_PRICE_CACHE_SECONDS }
    }
}

/// Top-level settings: global tunables plus the `apis.<name>` catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub max_request_bytes: usize,
    pub invoice_expiry_seconds: u64,
    pub used_hash_ttl_seconds: u64,
    pub used_hash_cleanup_interval_seconds: u64,
    pub btc_price: BtcPriceConfig,
    #[serde(default = "default_hire_task_fee_sats")]
    pub hire_task_fee_sats: i64,
    #[serde(default = "default_hire_quote_fee_sats")]
    pub hire_quote_fee_sats: i64,
    #[serde(default)]
    pub apis: HashMap<String, ApiConfig>,

    // Special parameter, where the settings file is located.
    pub path: Option<PathBuf>,
}

fn default_hire_task_fee_sats() -> i64 {
    DEFAULT_HIRE_TASK_FEE_SATS
}

fn default_hire_quote_fee_sats() -> i64 {
    DEFAULT_HIRE_QUOTE_FEE_SATS
}

impl Settings {
    fn default_with_path(path: Option<PathBuf>) -> Self {
        Self {
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            invoice_expiry_seconds: DEFAULT_INVOICE_EXPIRY_SECONDS,
            used_hash_ttl_seconds: DEFAULT_USED_HASH_TTL_SECONDS,
            used_hash_cleanup_interval_seconds: DEFAULT_USED_HASH_CLEANUP_INTERVAL_SECONDS,
            btc_price: BtcPriceConfig::default(),
            hire_task_fee_sats: DEFAULT_HIRE_TASK_FEE_SATS,
            hire_quote_fee_sats: DEFAULT_HIRE_QUOTE_FEE_SATS,
            apis: HashMap::new(),
            path,
        }
    }

    pub async fn new(data_dir: &Path) -> Self {
        match read_settings(data_dir).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Unable to read {SETTINGS_FILE_NAME} file, using defaults: {e}");
                let new = Settings::default_with_path(Some(data_dir.join(SETTINGS_FILE_NAME)));
                if let Err(e) = new.write_to_file().await {
                    tracing::error!("Unable to write default settings to file: {e}");
                } else {
                    tracing::info!("Default settings written to file");
                }
                new
            }
        }
    }

    pub async fn write_to_file(&self) -> Result<()> {
        let data = toml::to_string_pretty(&self).context("Unable to serialize settings to TOML format")?;

        let settings_path = self.path.as_ref().context("Settings path not set")?.clone();
        tokio::fs::write(settings_path, data.as_bytes()).await?;
        Ok(())
    }

    pub fn endpoint(&self, api_name: &str, path: &str) -> Option<(&ApiConfig, &EndpointConfig)> {
        let api = self.apis.get(api_name)?;
        let endpoint = api.endpoints.iter().find(|e| e.path == path)?;
        Some((api, endpoint))
    }
}

async fn read_settings(data_dir: &Path) -> Result<Settings> {
    let settings_path = data_dir.join(SETTINGS_FILE_NAME);
    let data = tokio::fs::read_to_string(settings_path).await?;
    toml::from_str(&data).context("Unable to parse settings file")
}

use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;

/// Default request timeout for calls against the Lightning node.
///
/// The gateway's own upstream proxy uses much longer timeouts for slow AI
/// endpoints; this client only ever talks to the local Lightning node, which
/// should always answer quickly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum PhoenixError {
    #[error("phoenix request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("phoenix returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("phoenix returned non-json response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A thin HTTP bridge to a [phoenixd](https://phoenix.acinq.co) node: one
/// `reqwest::Client`, HTTP basic auth, and a handful of typed
/// request/response pairs.
#[derive(Clone)]
pub struct PhoenixClient {
    client: reqwest::Client,
    base_url: String,
    password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateInvoiceResponse {
    #[serde(rename = "amountSat")]
    pub amount_sat: u64,
    #[serde(rename = "paymentHash")]
    pub payment_hash: String,
    pub serialized: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayInvoiceResponse {
    #[serde(rename = "paymentPreimage")]
    pub payment_preimage: String,
    #[serde(rename = "paymentHash")]
    pub payment_hash: Option<String>,
    #[serde(rename = "routingFeeSat")]
    pub routing_fee_sat: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    #[serde(rename = "balanceSat")]
    pub balance_sat: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingPayment {
    #[serde(rename = "paymentHash")]
    pub payment_hash: String,
    #[serde(rename = "isPaid")]
    pub is_paid: bool,
    #[serde(rename = "preimage")]
    pub preimage: Option<String>,
}

impl PhoenixClient {
    pub fn new(base_url: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_timeout(base_url, password, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client to build");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            password: password.into(),
        }
    }

    pub async fn create_invoice(
        &self,
        amount_sats: u64,
        description: &str,
    ) -> Result<CreateInvoiceResponse, PhoenixError> {
        let form = [
            ("amountSat", amount_sats.to_string()),
            ("description", description.to_string()),
        ];
        self.post_form("/createinvoice", &form).await
    }

    pub async fn pay_invoice(&self, bolt11: &str) -> Result<PayInvoiceResponse, PhoenixError> {
        let form = [("invoice", bolt11.to_string())];
        self.post_form("/payinvoice", &form).await
    }

    pub async fn get_balance(&self) -> Result<BalanceResponse, PhoenixError> {
        self.get("/getbalance").await
    }

    pub async fn get_incoming_payment(
        &self,
        payment_hash: &str,
    ) -> Result<IncomingPayment, PhoenixError> {
        self.get(&format!("/payments/incoming/{payment_hash}")).await
    }

    async fn get<T>(&self, path: &str) -> Result<T, PhoenixError>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.request(Method::GET, path, None).await
    }

    async fn post_form<T>(&self, path: &str, form: &[(&str, String)]) -> Result<T, PhoenixError>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.request(Method::POST, path, Some(form)).await
    }

    async fn request<T>(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<T, PhoenixError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self.client.request(method, url).basic_auth("", Some(&self.password));
        if let Some(form) = form {
            builder = builder.form(form);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(200).collect();
            return Err(PhoenixError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(PhoenixError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash_from_base_url() {
        let client = PhoenixClient::new("http://localhost:9740/", "secret");
        assert_eq!(client.base_url, "http://localhost:9740");
    }
}

//! HTTP client for the transfer provider's REST API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::{
    CreateTransferRequest, ProviderClient, ProviderError, Quote, QuoteRequest, TransferReceipt,
};
use async_trait::async_trait;

/// Reqwest-backed `ProviderClient`.
///
/// All calls share one client with a hard timeout; a timed-out create call
/// is reported as `ProviderError::Timeout` so the caller knows the transfer
/// may or may not exist.
pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpProviderClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        // Fail at startup on a malformed base URL rather than on the first
        // payout.
        url::Url::parse(base_url)
            .map_err(|e| ProviderError::Network(format!("invalid provider url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(classify_transport_error)?;
        classify_status(response).await
    }
}

fn classify_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Error envelope the provider returns on 4xx.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

async fn classify_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status.is_server_error() {
        return Err(ProviderError::Server(format!("provider returned {status}")));
    }

    // 4xx: pull the provider's error code out of the body when present.
    let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody { error: None });
    let (code, message) = match body.error {
        Some(detail) => (
            detail.code.unwrap_or_default(),
            detail.message.unwrap_or_else(|| format!("provider returned {status}")),
        ),
        None => (String::new(), format!("provider returned {status}")),
    };

    Err(match code.as_str() {
        "insufficient_funds" => ProviderError::InsufficientFunds,
        "unsupported_route" | "route_not_supported" => ProviderError::UnsupportedRoute(message),
        _ => ProviderError::InvalidDestination(message),
    })
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    id: String,
    rate: Decimal,
    source_amount: Decimal,
    target_amount: Decimal,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: serde_json::Value,
    state: String,
    #[serde(default)]
    fee: Decimal,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct TransferStateResponse {
    state: String,
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn get_quote(&self, request: QuoteRequest) -> Result<Quote, ProviderError> {
        let response = self
            .send(self.client.post(self.url("/v1/quotes")).json(&json!({
                "source_currency": request.source_currency,
                "target_currency": request.target_currency,
                "source_amount": request.source_amount,
            })))
            .await?;

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Server(format!("malformed quote response: {e}")))?;
        Ok(Quote {
            quote_id: quote.id,
            rate: quote.rate,
            source_amount: quote.source_amount,
            target_amount: quote.target_amount,
            expires_at: quote.expires_at,
        })
    }

    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<TransferReceipt, ProviderError> {
        let response = self
            .send(
                self.client
                    .post(self.url("/v1/transfers"))
                    // The provider deduplicates on this header; resending the
                    // same reference can never create a second transfer.
                    .header("Idempotency-Key", &request.reference)
                    .json(&json!({
                        "reference": request.reference,
                        "quote_id": request.quote_id,
                        "source_currency": request.source_currency,
                        "source_amount": request.source_amount,
                        "target_currency": request.target_currency,
                        "target_amount": request.target_amount,
                        "destination": {
                            "account_number": request.destination.account_number,
                            "routing_number": request.destination.routing_number,
                            "account_holder_name": request.destination.account_holder_name,
                            "currency": request.destination.currency,
                            "country": request.destination.country,
                        },
                    })),
            )
            .await?;

        let transfer: TransferResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Server(format!("malformed transfer response: {e}")))?;

        let transfer_id = match transfer.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(ProviderError::Server(format!(
                    "unexpected transfer id: {other}"
                )));
            }
        };

        Ok(TransferReceipt {
            transfer_id,
            fee: transfer.fee,
            state: transfer.state,
        })
    }

    async fn get_account_balance(&self, currency: &str) -> Result<Decimal, ProviderError> {
        let response = self
            .send(self.client.get(self.url(&format!("/v1/balances/{currency}"))))
            .await?;
        let balance: BalanceResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Server(format!("malformed balance response: {e}")))?;
        Ok(balance.amount)
    }

    async fn get_transfer_state(
        &self,
        provider_transfer_id: &str,
    ) -> Result<String, ProviderError> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/v1/transfers/{provider_transfer_id}"))),
            )
            .await?;
        let state: TransferStateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Server(format!("malformed state response: {e}")))?;
        Ok(state.state)
    }
}

//! Scriptable provider client for tests and offline development.
//!
//! Honors the provider's idempotency contract: creating a transfer twice
//! with the same reference returns the original receipt instead of a second
//! transfer. Failures can be queued per create call, optionally creating
//! the transfer anyway (which is what a real timeout can do).

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{
    CreateTransferRequest, ProviderClient, ProviderError, Quote, QuoteRequest, TransferReceipt,
};

struct ScriptedFailure {
    error: ProviderError,
    create_transfer_anyway: bool,
}

#[derive(Default)]
struct MockState {
    rates: HashMap<(String, String), Decimal>,
    balances: HashMap<String, Decimal>,
    fee: Decimal,
    transfers_by_reference: HashMap<String, TransferReceipt>,
    transfer_states: HashMap<String, String>,
    scripted_failures: VecDeque<ScriptedFailure>,
    create_attempts: u32,
    next_id: u64,
}

#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_rate(&self, source: &str, target: &str, rate: Decimal) {
        self.state
            .lock()
            .await
            .rates
            .insert((source.to_string(), target.to_string()), rate);
    }

    pub async fn set_balance(&self, currency: &str, amount: Decimal) {
        self.state
            .lock()
            .await
            .balances
            .insert(currency.to_string(), amount);
    }

    pub async fn set_fee(&self, fee: Decimal) {
        self.state.lock().await.fee = fee;
    }

    /// Queue a failure for the next `create_transfer` call.
    pub async fn queue_create_failure(&self, error: ProviderError) {
        self.state.lock().await.scripted_failures.push_back(ScriptedFailure {
            error,
            create_transfer_anyway: false,
        });
    }

    /// Queue a failure that still creates the transfer under the hood,
    /// modeling a timeout where the request actually landed.
    pub async fn queue_create_failure_with_transfer(&self, error: ProviderError) {
        self.state.lock().await.scripted_failures.push_back(ScriptedFailure {
            error,
            create_transfer_anyway: true,
        });
    }

    /// Override the provider-side state of an existing transfer.
    pub async fn set_transfer_state(&self, transfer_id: &str, state: &str) {
        self.state
            .lock()
            .await
            .transfer_states
            .insert(transfer_id.to_string(), state.to_string());
    }

    /// Distinct transfers actually created (idempotent replays excluded).
    pub async fn transfer_count(&self) -> usize {
        self.state.lock().await.transfers_by_reference.len()
    }

    /// Total `create_transfer` calls, including failed and deduplicated ones.
    pub async fn create_attempts(&self) -> u32 {
        self.state.lock().await.create_attempts
    }
}

fn mint_transfer(state: &mut MockState, reference: &str) -> TransferReceipt {
    state.next_id += 1;
    let receipt = TransferReceipt {
        transfer_id: format!("trf-{}", state.next_id),
        fee: state.fee,
        state: "processing".to_string(),
    };
    state
        .transfers_by_reference
        .insert(reference.to_string(), receipt.clone());
    state
        .transfer_states
        .insert(receipt.transfer_id.clone(), "processing".to_string());
    receipt
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn get_quote(&self, request: QuoteRequest) -> Result<Quote, ProviderError> {
        let state = self.state.lock().await;
        let rate = if request.source_currency == request.target_currency {
            Decimal::ONE
        } else {
            *state
                .rates
                .get(&(request.source_currency.clone(), request.target_currency.clone()))
                .ok_or_else(|| {
                    ProviderError::UnsupportedRoute(format!(
                        "{} -> {}",
                        request.source_currency, request.target_currency
                    ))
                })?
        };
        Ok(Quote {
            quote_id: format!("quote-{}", uuid::Uuid::new_v4()),
            rate,
            source_amount: request.source_amount,
            target_amount: (request.source_amount * rate).round_dp(2),
            expires_at: Utc::now() + Duration::minutes(5),
        })
    }

    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<TransferReceipt, ProviderError> {
        let mut state = self.state.lock().await;
        state.create_attempts += 1;

        if let Some(failure) = state.scripted_failures.pop_front() {
            if failure.create_transfer_anyway
                && !state.transfers_by_reference.contains_key(&request.reference)
            {
                mint_transfer(&mut state, &request.reference);
            }
            return Err(failure.error);
        }

        // Idempotency: a reference that already created a transfer returns
        // the original receipt.
        if let Some(existing) = state.transfers_by_reference.get(&request.reference) {
            return Ok(existing.clone());
        }

        Ok(mint_transfer(&mut state, &request.reference))
    }

    async fn get_account_balance(&self, currency: &str) -> Result<Decimal, ProviderError> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(currency)
            .copied()
            .unwrap_or_else(|| Decimal::new(1_000_000, 0)))
    }

    async fn get_transfer_state(
        &self,
        provider_transfer_id: &str,
    ) -> Result<String, ProviderError> {
        self.state
            .lock()
            .await
            .transfer_states
            .get(provider_transfer_id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::Server(format!("unknown transfer {provider_transfer_id}"))
            })
    }
}

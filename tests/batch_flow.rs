//! Batch Coordinator aggregation, stop-on-error, and retry behavior.

mod common;

use std::time::Duration;

use common::{harness, seed_ngn_corridor};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use soundbridge_payouts::models::payout::{ErrorCode, PayoutRequest};
use soundbridge_payouts::provider::ProviderError;
use soundbridge_payouts::services::batch::{self, BatchOptions, RetryPolicy};

fn request(creator_id: Uuid, amount: Decimal) -> PayoutRequest {
    PayoutRequest {
        creator_id,
        amount,
        source_currency: "USD".to_string(),
        reason: Some("scheduled_payout".to_string()),
        metadata: None,
        client_reference: None,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
    }
}

/// Serial options so scripted provider failures land on a deterministic
/// item.
fn serial(stop_on_error: bool) -> BatchOptions {
    BatchOptions {
        max_concurrent: 1,
        stop_on_error,
    }
}

#[tokio::test]
async fn batch_with_one_rate_limited_item_then_successful_retry() {
    let h = harness();
    seed_ngn_corridor(&h).await;
    let a = h.seed_creator(Some("NG"), "NGN", dec!(500.00)).await;
    let b = h.seed_creator(Some("US"), "USD", dec!(500.00)).await;
    let c = h.seed_creator(Some("US"), "USD", dec!(500.00)).await;

    // First create call hits the provider rate limit.
    h.provider
        .queue_create_failure(ProviderError::RateLimited {
            retry_after_secs: Some(1),
        })
        .await;

    let result = batch::batch_payout(
        h.ctx.clone(),
        vec![
            request(a, dec!(50.00)),
            request(b, dec!(20.00)),
            request(c, dec!(30.00)),
        ],
        serial(false),
    )
    .await;

    assert_eq!(result.summary.total, 3);
    assert_eq!(result.summary.success_count, 2);
    assert_eq!(result.summary.failure_count, 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].code, Some(ErrorCode::RateLimitExceeded));
    assert!(result.failed[0].retryable);

    // The retry helper recovers it after backoff.
    let retried = batch::retry_failed_payouts(&h.ctx, result.failed, fast_retry()).await;
    assert_eq!(retried.summary.success_count, 1);
    assert_eq!(retried.summary.failure_count, 0);
}

#[tokio::test]
async fn every_item_is_accounted_for() {
    let h = harness();
    let mut items = Vec::new();
    // 4 creators that can pay, 2 that cannot.
    for _ in 0..4 {
        let id = h.seed_creator(Some("US"), "USD", dec!(100.00)).await;
        items.push(request(id, dec!(10.00)));
    }
    for _ in 0..2 {
        let id = h.seed_creator(Some("US"), "USD", dec!(1.00)).await;
        items.push(request(id, dec!(10.00)));
    }

    let result = batch::batch_payout(h.ctx.clone(), items, BatchOptions::default()).await;

    assert_eq!(result.summary.total, 6);
    assert_eq!(result.summary.success_count, 4);
    assert_eq!(result.summary.failure_count, 2);
    assert_eq!(
        result.summary.success_count + result.summary.failure_count,
        result.summary.total
    );
    for failure in &result.failed {
        assert_eq!(failure.code, Some(ErrorCode::InsufficientBalance));
        assert!(!failure.retryable);
    }
}

#[tokio::test]
async fn per_currency_totals_cover_successful_payouts() {
    let h = harness();
    let a = h.seed_creator(Some("US"), "USD", dec!(100.00)).await;
    let b = h.seed_creator(Some("US"), "USD", dec!(100.00)).await;

    let result = batch::batch_payout(
        h.ctx.clone(),
        vec![request(a, dec!(15.00)), request(b, dec!(25.00))],
        BatchOptions::default(),
    )
    .await;

    assert_eq!(result.summary.success_count, 2);
    assert_eq!(
        result.summary.totals_by_currency.get("USD"),
        Some(&dec!(40.00))
    );
}

#[tokio::test]
async fn stop_on_error_skips_unscheduled_work_but_accounts_for_it() {
    let h = harness();
    let a = h.seed_creator(Some("US"), "USD", dec!(100.00)).await;
    let b = h.seed_creator(Some("US"), "USD", dec!(100.00)).await;
    let c = h.seed_creator(Some("US"), "USD", dec!(100.00)).await;

    // First item fails at the provider; the serial pool guarantees the
    // failure is observed before items two and three are scheduled.
    h.provider
        .queue_create_failure(ProviderError::Server("boom".to_string()))
        .await;

    let result = batch::batch_payout(
        h.ctx.clone(),
        vec![
            request(a, dec!(10.00)),
            request(b, dec!(10.00)),
            request(c, dec!(10.00)),
        ],
        serial(true),
    )
    .await;

    assert_eq!(result.summary.total, 3);
    assert_eq!(result.summary.success_count, 0);
    assert_eq!(result.summary.failure_count, 3);

    let not_attempted = result
        .failed
        .iter()
        .filter(|f| f.error.contains("not attempted"))
        .count();
    assert_eq!(not_attempted, 2);
    // Skipped items keep their references, so a later retry replays them
    // idempotently.
    assert!(result.failed.iter().all(|f| f.request.client_reference.is_some()));
}

#[tokio::test]
async fn retry_helper_ignores_non_retryable_entries() {
    let h = harness();
    let broke = h.seed_creator(Some("US"), "USD", dec!(1.00)).await;

    let result = batch::batch_payout(
        h.ctx.clone(),
        vec![request(broke, dec!(10.00))],
        BatchOptions::default(),
    )
    .await;
    assert_eq!(result.summary.failure_count, 1);
    assert!(!result.failed[0].retryable);

    let attempts_before = h.provider.create_attempts().await;
    let retried = batch::retry_failed_payouts(&h.ctx, result.failed, fast_retry()).await;
    assert_eq!(retried.summary.success_count, 0);
    assert_eq!(retried.summary.failure_count, 1);
    // Nothing was re-sent to the provider.
    assert_eq!(h.provider.create_attempts().await, attempts_before);
}

#[tokio::test]
async fn retry_gives_up_after_bounded_attempts() {
    let h = harness();
    let creator = h.seed_creator(Some("US"), "USD", dec!(100.00)).await;

    // Fail the initial attempt and all three retries.
    for _ in 0..4 {
        h.provider
            .queue_create_failure(ProviderError::Server("unavailable".to_string()))
            .await;
    }

    let result = batch::batch_payout(
        h.ctx.clone(),
        vec![request(creator, dec!(10.00))],
        BatchOptions::default(),
    )
    .await;
    assert_eq!(result.summary.failure_count, 1);

    let attempts_before = h.provider.create_attempts().await;
    let retried = batch::retry_failed_payouts(&h.ctx, result.failed, fast_retry()).await;
    assert_eq!(retried.summary.failure_count, 1);
    assert_eq!(retried.summary.success_count, 0);
    // Exactly max_attempts re-invocations, no unbounded recursion.
    assert_eq!(h.provider.create_attempts().await, attempts_before + 3);
}

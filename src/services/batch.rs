//! Batch Coordinator: fans out independent payout requests with bounded
//! concurrency, plus the backoff retry helper for transient failures.
//!
//! Concurrency is a worker-pool bound (semaphore), not an unbounded
//! fan-out, to stay inside provider rate limits. Items complete in any
//! order; there is no cross-payout ordering guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::models::payout::{
    BatchPayoutResult, BatchSummary, ErrorCode, FailedPayout, PayoutRequest,
};
use crate::services::{PayoutContext, payout_service};

pub const DEFAULT_MAX_CONCURRENT: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchOptions {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Stop scheduling new work after the first failure; in-flight work
    /// still runs to completion. Unscheduled items are reported as failed
    /// (retryable) so the summary always accounts for every item.
    #[serde(default)]
    pub stop_on_error: bool,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            stop_on_error: false,
        }
    }
}

/// Backoff schedule for `retry_failed_payouts`: `base_delay * 2^(n-1)`
/// before attempt n, bounded at `max_attempts`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Run a batch of payout requests.
///
/// Every item ends up in exactly one of `successful` / `failed`, so
/// `summary.success_count + summary.failure_count == items.len()` holds for
/// every input, including `stop_on_error` runs.
pub async fn batch_payout(
    ctx: Arc<PayoutContext>,
    items: Vec<PayoutRequest>,
    options: BatchOptions,
) -> BatchPayoutResult {
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
    let stop = Arc::new(AtomicBool::new(false));

    let mut successful = Vec::new();
    let mut failed = Vec::new();
    let mut join_set: JoinSet<(PayoutRequest, Result<crate::models::payout::PayoutResult, crate::error::AppError>)> =
        JoinSet::new();

    for item in items {
        // References are pinned up front so a later retry of a failed item
        // replays the same idempotency key.
        let item = item.with_reference();

        // Waiting for a permit here is what bounds concurrency AND what
        // delays the stop_on_error decision until earlier results are in.
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");

        if options.stop_on_error && stop.load(Ordering::SeqCst) {
            drop(permit);
            failed.push(FailedPayout {
                request: item,
                code: None,
                error: "not attempted: batch stopped after earlier failure".to_string(),
                retryable: true,
            });
            continue;
        }

        let ctx = ctx.clone();
        let stop = stop.clone();
        join_set.spawn(async move {
            let result = payout_service::request_payout(&ctx, item.clone()).await;
            let failed = match &result {
                Ok(r) => !r.success,
                Err(_) => true,
            };
            if failed {
                stop.store(true, Ordering::SeqCst);
            }
            drop(permit);
            (item, result)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((request, Ok(result))) => {
                if result.success {
                    if let Some(payout) = result.payout {
                        successful.push(payout);
                    }
                } else {
                    failed.push(FailedPayout {
                        request,
                        code: result.code,
                        error: result
                            .error
                            .unwrap_or_else(|| "payout failed".to_string()),
                        retryable: result.retryable.unwrap_or(false),
                    });
                }
            }
            Ok((request, Err(e))) => {
                // Infrastructure fault on one item; the rest of the batch
                // is unaffected.
                tracing::error!(error = %e, "payout task failed");
                failed.push(FailedPayout {
                    request,
                    code: Some(ErrorCode::ServerError),
                    error: e.to_string(),
                    retryable: true,
                });
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "payout task panicked");
            }
        }
    }

    summarize(total, successful, failed)
}

fn summarize(
    total: usize,
    successful: Vec<crate::models::payout::Payout>,
    failed: Vec<FailedPayout>,
) -> BatchPayoutResult {
    let mut totals_by_currency: HashMap<String, Decimal> = HashMap::new();
    for payout in &successful {
        *totals_by_currency
            .entry(payout.source_currency.clone())
            .or_insert(Decimal::ZERO) += payout.source_amount;
    }

    BatchPayoutResult {
        summary: BatchSummary {
            total,
            success_count: successful.len(),
            failure_count: failed.len(),
            totals_by_currency,
        },
        successful,
        failed,
    }
}

/// Re-run failed batch entries flagged retryable, with exponential backoff
/// between attempts. Non-retryable entries are carried through unchanged so
/// the returned summary still accounts for every input entry.
pub async fn retry_failed_payouts(
    ctx: &PayoutContext,
    entries: Vec<FailedPayout>,
    policy: RetryPolicy,
) -> BatchPayoutResult {
    let total = entries.len();
    let mut successful = Vec::new();
    let mut failed = Vec::new();

    for entry in entries {
        if !entry.retryable {
            failed.push(entry);
            continue;
        }

        let mut last = entry;
        let mut recovered = false;
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.base_delay * 2u32.pow(attempt - 1)).await;

            match payout_service::request_payout(ctx, last.request.clone()).await {
                Ok(result) if result.success => {
                    if let Some(payout) = result.payout {
                        successful.push(payout);
                    }
                    recovered = true;
                    break;
                }
                Ok(result) => {
                    let retryable = result.retryable.unwrap_or(false);
                    last = FailedPayout {
                        request: last.request,
                        code: result.code,
                        error: result
                            .error
                            .unwrap_or_else(|| "payout failed".to_string()),
                        retryable,
                    };
                    if !retryable {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "retry attempt failed");
                    last = FailedPayout {
                        request: last.request,
                        code: Some(ErrorCode::ServerError),
                        error: e.to_string(),
                        retryable: true,
                    };
                }
            }
        }
        if !recovered {
            failed.push(last);
        }
    }

    summarize(total, successful, failed)
}

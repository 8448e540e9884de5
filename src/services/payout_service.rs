//! Transfer Initiator - Core business logic for creating payouts.
//!
//! This service handles:
//! - Route and destination resolution
//! - Balance preconditions (creator ledger and provider account)
//! - Quote consumption and fee splitting
//! - Idempotent transfer creation against the provider
//!
//! # Guarantees
//!
//! At most one provider transfer is created per logical payout request:
//! the stable `client_reference` is sent as the provider idempotency key,
//! so a retry after a transient failure resolves to the original transfer
//! instead of minting a second one. Once a `provider_transfer_id` exists,
//! status is advanced only by webhooks or the reconciliation poller, never
//! by re-creating the transfer.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payout::{
    ErrorCode, NewPayout, Payout, PayoutRequest, PayoutResult, PayoutStatus,
};
use crate::provider::{CreateTransferRequest, QuoteRequest, TransferDestination};
use crate::services::bank_accounts::{self, FetchError};
use crate::services::resolver;
use crate::services::PayoutContext;
use crate::stores::{LedgerError, StoreError, TransitionError};

/// Execute a payout request end to end, returning once the transfer is
/// initiated (status `processing`), not once money arrives.
///
/// Expected business failures come back as `Ok(PayoutResult)` with
/// `success == false` and a classified code; only infrastructure faults
/// surface as `Err`.
pub async fn request_payout(
    ctx: &PayoutContext,
    request: PayoutRequest,
) -> Result<PayoutResult, AppError> {
    if request.amount <= Decimal::ZERO {
        return Ok(PayoutResult::rejected("amount must be positive"));
    }
    if request.source_currency.len() != 3 {
        return Ok(PayoutResult::rejected("source_currency must be an ISO code"));
    }

    let reference = match request.client_reference.clone() {
        Some(reference) => reference,
        None => format!("payout-{}", Uuid::new_v4()),
    };
    let request = PayoutRequest {
        client_reference: Some(reference.clone()),
        ..request
    };

    // Replay of a reference that already produced a live payout returns
    // that payout instead of a second attempt. Failed attempts fall
    // through: retrying them with the same reference is exactly how the
    // at-most-one guarantee is meant to be used.
    if let Some(existing) = ctx.ledger.get_by_client_reference(&reference).await? {
        if existing.status != PayoutStatus::Failed {
            return Ok(PayoutResult::ok(existing));
        }
    }

    // Creator balance precondition. No ledger row is written for these
    // rejections; nothing has reached the provider yet.
    let balance = match ctx.creators.get_available_balance(request.creator_id).await? {
        Some(balance) => balance,
        None => {
            return Ok(PayoutResult::failed(
                ErrorCode::CreatorNotFound,
                format!("creator {} has no balance ledger", request.creator_id),
            ));
        }
    };
    if balance.amount < request.amount {
        return Ok(PayoutResult::failed(
            ErrorCode::InsufficientBalance,
            format!(
                "available balance {} {} cannot cover {} {}",
                balance.amount, balance.currency, request.amount, request.source_currency
            ),
        ));
    }

    // Destination.
    let destination =
        match bank_accounts::fetch_verified(ctx.creators.as_ref(), &ctx.cipher, request.creator_id)
            .await
        {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Ok(PayoutResult::failed(
                    ErrorCode::InvalidBankAccount,
                    "no verified bank account on file; add a bank account to receive payouts",
                ));
            }
            Err(FetchError::Decrypt(_)) => {
                return Ok(PayoutResult::failed(
                    ErrorCode::InvalidBankAccount,
                    "stored bank details could not be read; re-add the bank account",
                ));
            }
            Err(FetchError::Store(e)) => return Err(e.into()),
        };

    let route = resolver::resolve(ctx.creators.as_ref(), &ctx.cipher, request.creator_id).await;
    tracing::debug!(
        creator_id = %request.creator_id,
        country = %route.country_code,
        currency = %route.currency,
        method = ?route.payout_method,
        "payout route resolved"
    );

    // Provider account balance is a shared resource; this check is
    // best-effort and the provider-side rejection is the backstop.
    match ctx
        .provider
        .get_account_balance(&request.source_currency)
        .await
    {
        Ok(available) if available < request.amount => {
            return Ok(PayoutResult::failed(
                ErrorCode::InsufficientBalance,
                "provider account balance too low; operator top-up required",
            ));
        }
        Ok(_) => {}
        Err(e) => {
            return Ok(PayoutResult::failed(e.code(), e.to_string()));
        }
    }

    // Fee split, applied to the source amount before conversion.
    let platform_fee =
        (request.amount * ctx.settings.platform_fee_percent / Decimal::ONE_HUNDRED).round_dp(2);
    let net_source = request.amount - platform_fee;

    // Quote the conversion for cross-currency routes. Quotes are
    // short-lived; the transfer is created immediately after.
    let (quote_id, rate, target_amount) = if request.source_currency != route.currency {
        match ctx
            .provider
            .get_quote(QuoteRequest {
                source_currency: request.source_currency.clone(),
                target_currency: route.currency.clone(),
                source_amount: net_source,
            })
            .await
        {
            Ok(quote) => (Some(quote.quote_id), quote.rate, quote.target_amount),
            Err(e) => return Ok(PayoutResult::failed(e.code(), e.to_string())),
        }
    } else {
        (None, Decimal::ONE, net_source)
    };

    // Ledger row goes in immediately before the provider call.
    let payout = ctx
        .ledger
        .create(NewPayout {
            creator_id: request.creator_id,
            client_reference: reference.clone(),
            amount: target_amount,
            currency: route.currency.clone(),
            source_amount: request.amount,
            source_currency: request.source_currency.clone(),
            exchange_rate: rate,
            destination_ref: destination.masked_ref(),
            platform_fee,
        })
        .await?;

    let transfer = ctx
        .provider
        .create_transfer(CreateTransferRequest {
            reference,
            quote_id,
            source_currency: request.source_currency.clone(),
            source_amount: net_source,
            target_currency: route.currency.clone(),
            target_amount,
            destination: TransferDestination {
                account_number: destination.account_number.clone(),
                routing_number: destination.routing_number.clone(),
                account_holder_name: destination.account_holder_name.clone(),
                currency: destination.currency.clone(),
                country: destination.country.clone(),
            },
        })
        .await;

    match transfer {
        Ok(receipt) => {
            let processing = match ctx
                .ledger
                .mark_processing(payout.id, &receipt.transfer_id, receipt.fee)
                .await
            {
                Ok(payout) => payout,
                Err(LedgerError::DuplicateProviderTransferId(_)) => {
                    // A concurrent attempt with the same reference won the
                    // race; the provider handed both calls the same
                    // transfer. Fold this attempt into the winner.
                    let existing = ctx
                        .ledger
                        .get_by_provider_transfer_id(&receipt.transfer_id)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal(format!(
                                "transfer {} vanished during duplicate resolution",
                                receipt.transfer_id
                            ))
                        })?;
                    ctx.ledger
                        .apply_transition(
                            payout.id,
                            PayoutStatus::Cancelled,
                            Some(TransitionError::note("superseded by concurrent attempt")),
                        )
                        .await?;
                    return Ok(PayoutResult::ok(existing));
                }
                Err(e) => return Err(e.into()),
            };

            // Deduction happens only after the provider acknowledged the
            // transfer; the guarded write keeps the balance non-negative.
            match ctx
                .creators
                .deduct_balance(request.creator_id, request.amount)
                .await
            {
                Ok(_) => {}
                Err(StoreError::InsufficientBalance) => {
                    // Balance was consumed between the precondition check
                    // and here. The transfer already exists; flag the
                    // payout for operator review instead of overdrawing.
                    tracing::error!(
                        payout_id = %processing.id,
                        creator_id = %request.creator_id,
                        "balance deduction failed after transfer creation"
                    );
                    ctx.ledger
                        .flag_active_issue(processing.id, "balance deduction failed")
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }

            tracing::info!(
                payout_id = %processing.id,
                transfer_id = %receipt.transfer_id,
                amount = %processing.amount,
                currency = %processing.currency,
                "payout initiated"
            );
            Ok(PayoutResult::ok(processing))
        }
        Err(e) => {
            let code = e.code();
            let outcome = ctx
                .ledger
                .apply_transition(
                    payout.id,
                    PayoutStatus::Failed,
                    Some(TransitionError::new(code, e.to_string())),
                )
                .await?;
            tracing::warn!(
                payout_id = %payout.id,
                code = code.as_str(),
                retryable = code.retryable(),
                error = %e,
                "transfer creation failed"
            );
            Ok(PayoutResult::failed_with_payout(
                outcome.payout,
                code,
                e.to_string(),
            ))
        }
    }
}

/// Point read of current ledger state including full status history.
pub async fn get_payout_status(ctx: &PayoutContext, payout_id: Uuid) -> Result<Payout, AppError> {
    ctx.ledger
        .get(payout_id)
        .await?
        .ok_or(AppError::PayoutNotFound)
}

/// Paginated payout history for a creator, most-recent-first.
pub async fn list_payout_history(
    ctx: &PayoutContext,
    creator_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Payout>, AppError> {
    let limit = limit.clamp(1, 100);
    let offset = offset.max(0);
    Ok(ctx.ledger.list_for_creator(creator_id, limit, offset).await?)
}

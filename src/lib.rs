//! Creator payout orchestration service.
//!
//! Accepts requests to pay a creator earned funds and delivers them to the
//! creator's bank account through a third-party money-transfer provider,
//! tracking state through the provider's asynchronous confirmation process.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Provider**: Wise-like REST API behind a client trait
//! - **Authentication**: API keys for the management API, HMAC-SHA256
//!   signatures for inbound provider webhooks
//!
//! # Payout Flow
//!
//! A request resolves the creator's country/currency, fetches and decrypts
//! the verified bank destination, quotes the conversion, and creates the
//! provider transfer under a stable idempotency reference, writing a
//! `pending` -> `processing` ledger entry. The provider later calls back
//! asynchronously; the webhook reconciler verifies the callback and applies
//! the status transition. A background poller converges payouts whose
//! callbacks never arrive.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod services;
pub mod state;
pub mod stores;

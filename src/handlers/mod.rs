//! HTTP request handlers.

pub mod health;
pub mod payouts;
pub mod webhooks;

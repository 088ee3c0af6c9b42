//! Stripe integration for external unlock payments.
//!
//! Stripe handles:
//! - `PaymentIntent` creation for a priced resource
//! - `PaymentIntent` lookup when a fan confirms an unlock
//! - Signed webhooks that settle unlocks server-side

pub mod client;
pub mod types;

pub use client::{verify_webhook_signature, StripeClient, StripeError};
pub use types::*;

//! fanpay HTTP API service.
//!
//! This crate provides the HTTP API for creator monetization:
//!
//! - Wallets, tips and admin top-ups
//! - Paid unlocks by wallet, Stripe, `PayPal` or bank reference
//! - Flash drops and their inventory simulator
//! - Escrowed paid requests
//! - Revenue ingestion and monthly creator invoices
//! - Stripe webhooks
//!
//! # Authentication
//!
//! 1. **JWT bearer tokens** (HS256) - fans and creators
//! 2. **Service API key** (`X-API-Key`) - revenue ingestion from other services
//! 3. **Admin API key** (`X-Admin-Key`) - top-ups and payouts

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod paypal;
pub mod routes;
pub mod state;
pub mod stripe;
pub mod unlock;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use paypal::{PaypalClient, PaypalError};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};

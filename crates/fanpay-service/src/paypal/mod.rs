//! `PayPal` Orders v2 integration.
//!
//! Orders are created with `intent = CAPTURE`, captured after the fan approves
//! them, and re-fetched before an unlock is settled.

pub mod client;
pub mod types;

pub use client::{PaypalClient, PaypalError};
pub use types::*;

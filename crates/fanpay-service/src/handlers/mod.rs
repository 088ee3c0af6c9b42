//! API handlers.

pub mod drops;
pub mod health;
pub mod invoices;
pub mod payments;
pub mod profile;
pub mod requests;
pub mod resources;
pub mod revenue;
pub mod tips;
pub mod unlocks;
pub mod wallet;
pub mod webhooks;

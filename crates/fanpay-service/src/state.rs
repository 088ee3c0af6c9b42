//! Application state.

use std::sync::Arc;

use fanpay_core::SplitPolicy;
use fanpay_store::Store;

use crate::config::ServiceConfig;
use crate::paypal::PaypalClient;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Creator/platform split for revenue recorded by this service.
    pub split_policy: SplitPolicy,

    /// Stripe client for payments (optional).
    pub stripe: Option<Arc<StripeClient>>,

    /// `PayPal` client for payments (optional).
    pub paypal: Option<Arc<PaypalClient>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let split_policy = SplitPolicy::new(config.platform_fee_bps).unwrap_or_else(|e| {
            tracing::error!(
                error = %e,
                platform_fee_bps = %config.platform_fee_bps,
                "Invalid platform fee, using default split"
            );
            SplitPolicy::default()
        });

        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(key, &config.stripe_api_base) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - card payments will not be available");
        }

        let paypal = config
            .paypal_client_id
            .as_ref()
            .zip(config.paypal_client_secret.as_ref())
            .and_then(|(id, secret)| {
                match PaypalClient::new(id, secret, &config.paypal_api_base) {
                    Ok(client) => {
                        tracing::info!(
                            paypal_url = %config.paypal_api_base,
                            "PayPal integration enabled"
                        );
                        Some(Arc::new(client))
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create PayPal client");
                        None
                    }
                }
            });

        if paypal.is_none() {
            tracing::warn!("PayPal not configured - PayPal payments will not be available");
        }

        Self {
            store,
            config,
            split_policy,
            stripe,
            paypal,
        }
    }

    /// The Stripe client, or `ExternalService` if Stripe is not configured.
    ///
    /// # Errors
    ///
    /// `ApiError::ExternalService` when Stripe is not configured.
    pub fn stripe(&self) -> Result<&StripeClient, crate::ApiError> {
        self.stripe
            .as_deref()
            .ok_or_else(|| crate::ApiError::ExternalService("Stripe not configured".into()))
    }

    /// The `PayPal` client, or `ExternalService` if `PayPal` is not configured.
    ///
    /// # Errors
    ///
    /// `ApiError::ExternalService` when `PayPal` is not configured.
    pub fn paypal(&self) -> Result<&PaypalClient, crate::ApiError> {
        self.paypal
            .as_deref()
            .ok_or_else(|| crate::ApiError::ExternalService("PayPal not configured".into()))
    }
}

//! `PayPal` API types.

use serde::{Deserialize, Serialize};

/// Status `PayPal` reports once an order is captured.
pub const ORDER_COMPLETED: &str = "COMPLETED";

/// OAuth token response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    /// Bearer token.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
}

/// Money amount as `PayPal` encodes it (decimal string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Upper-case ISO currency code.
    pub currency_code: String,
    /// Decimal amount, e.g. `"12.50"`.
    pub value: String,
}

impl Money {
    /// Encode cents as a `PayPal` amount.
    #[must_use]
    pub fn from_cents(amount_cents: i64, currency: &str) -> Self {
        Self {
            currency_code: currency.to_uppercase(),
            value: format!("{}.{:02}", amount_cents / 100, amount_cents % 100),
        }
    }

    /// Decode the amount back into cents.
    #[must_use]
    pub fn to_cents(&self) -> Option<i64> {
        let (whole, frac) = match self.value.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (self.value.as_str(), "0"),
        };
        if frac.len() > 2 {
            return None;
        }
        let whole: i64 = whole.parse().ok()?;
        let frac: i64 = format!("{frac:0<2}").parse().ok()?;
        whole.checked_mul(100)?.checked_add(frac)
    }
}

/// One purchase unit of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseUnit {
    /// Our resource reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// The paying user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    /// Order amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
}

/// Order creation body.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Always `CAPTURE`.
    pub intent: &'static str,
    /// Purchase units (we always send one).
    pub purchase_units: Vec<PurchaseUnit>,
}

/// `PayPal` order.
#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    /// Order id.
    pub id: String,
    /// `CREATED`, `APPROVED`, `COMPLETED`, ...
    #[serde(default)]
    pub status: String,
    /// Purchase units.
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
}

impl Order {
    /// Whether the order has been captured.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ORDER_COMPLETED
    }

    /// The first purchase unit, which carries our references.
    #[must_use]
    pub fn primary_unit(&self) -> Option<&PurchaseUnit> {
        self.purchase_units.first()
    }
}

/// `PayPal` error body.
#[derive(Debug, Clone, Deserialize)]
pub struct PaypalErrorResponse {
    /// Error name, e.g. `RESOURCE_NOT_FOUND`.
    #[serde(default)]
    pub name: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

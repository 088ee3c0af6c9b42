//! Priced resources and the unlock records that grant access to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BillingError, ResourceId, RoomId, UserId};

/// The kinds of content a fan can pay to unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// An anonymous confession posted in a room.
    Confession,
    /// A paid truth-or-dare round.
    TruthOrDare,
    /// A paid post.
    Post,
}

impl ResourceKind {
    /// Stable name used in storage and payment metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confession => "confession",
            Self::TruthOrDare => "truth_or_dare",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confession" => Ok(Self::Confession),
            "truth_or_dare" | "truth-or-dare" => Ok(Self::TruthOrDare),
            "post" => Ok(Self::Post),
            other => Err(BillingError::InvalidInput(format!(
                "unknown resource type: {other}"
            ))),
        }
    }
}

/// Points at one priced resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource id.
    pub id: ResourceId,
}

impl ResourceRef {
    /// Build a reference.
    #[must_use]
    pub const fn new(kind: ResourceKind, id: ResourceId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A piece of content with a price, owned by a creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedResource {
    /// What and which.
    pub resource: ResourceRef,

    /// The creator who is paid on unlock.
    pub creator_id: UserId,

    /// Room the resource was posted in, if any.
    pub room_id: Option<RoomId>,

    /// Teaser shown to everyone.
    pub title: String,

    /// Content revealed after unlock.
    pub body: String,

    /// Unlock price in cents.
    pub price_cents: i64,

    /// When the resource was posted.
    pub created_at: DateTime<Utc>,
}

impl PricedResource {
    /// Create a new resource with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the price is not positive or the title is blank.
    pub fn new(
        kind: ResourceKind,
        creator_id: UserId,
        room_id: Option<RoomId>,
        title: String,
        body: String,
        price_cents: i64,
    ) -> Result<Self, BillingError> {
        if price_cents <= 0 {
            return Err(BillingError::InvalidInput("price must be positive".into()));
        }
        if title.trim().is_empty() {
            return Err(BillingError::InvalidInput("title is required".into()));
        }
        Ok(Self {
            resource: ResourceRef::new(kind, ResourceId::generate()),
            creator_id,
            room_id,
            title,
            body,
            price_cents,
            created_at: Utc::now(),
        })
    }
}

/// How a fan pays for an unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// In-platform wallet balance.
    Wallet,
    /// Stripe `PaymentIntent`.
    Stripe,
    /// `PayPal` order.
    Paypal,
    /// Bank transfer with a reference.
    Bank,
}

impl PaymentMethod {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
            Self::Bank => "bank",
        }
    }

    /// Whether money moves outside the wallet.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        !matches!(self, Self::Wallet)
    }
}

impl FromStr for PaymentMethod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet" => Ok(Self::Wallet),
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            "bank" => Ok(Self::Bank),
            other => Err(BillingError::InvalidInput(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// Proof that a user bought access to a resource. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRecord {
    /// The fan who unlocked.
    pub user_id: UserId,

    /// What was unlocked.
    pub resource: ResourceRef,

    /// Price at the moment of unlock, in cents.
    pub price_paid_cents: i64,

    /// How it was paid.
    pub payment_method: PaymentMethod,

    /// Provider reference (intent id, order id, bank reference).
    pub payment_reference: Option<String>,

    /// When access was granted.
    pub created_at: DateTime<Utc>,
}

impl UnlockRecord {
    /// Record an unlock of `resource` at its current price.
    #[must_use]
    pub fn new(
        user_id: UserId,
        resource: &PricedResource,
        payment_method: PaymentMethod,
        payment_reference: Option<String>,
    ) -> Self {
        Self {
            user_id,
            resource: resource.resource,
            price_paid_cents: resource.price_cents,
            payment_method,
            payment_reference,
            created_at: Utc::now(),
        }
    }
}

/// Longest accepted bank transfer reference.
pub const MAX_BANK_REFERENCE_LEN: usize = 128;

/// A fan's claim to have paid for a resource by bank transfer.
///
/// A claim grants nothing by itself. The unlock is settled only when an operator
/// confirms that the transfer arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferClaim {
    /// Transfer reference quoted by the fan.
    pub reference: String,

    /// The paying fan.
    pub user_id: UserId,

    /// What the transfer pays for.
    pub resource: ResourceRef,

    /// Price owed at claim time, in cents.
    pub amount_cents: i64,

    /// When the claim was submitted.
    pub created_at: DateTime<Utc>,
}

impl BankTransferClaim {
    /// Claim a transfer for `resource` at its current price.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the reference is blank or too long.
    pub fn new(
        user_id: UserId,
        resource: &PricedResource,
        reference: &str,
    ) -> Result<Self, BillingError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BillingError::InvalidInput(
                "bank transfer reference is required".into(),
            ));
        }
        if reference.len() > MAX_BANK_REFERENCE_LEN {
            return Err(BillingError::InvalidInput(format!(
                "bank transfer reference is limited to {MAX_BANK_REFERENCE_LEN} bytes"
            )));
        }
        Ok(Self {
            reference: reference.to_string(),
            user_id,
            resource: resource.resource,
            amount_cents: resource.price_cents,
            created_at: Utc::now(),
        })
    }

    /// Whether this claim is for the same fan and resource as `other`.
    #[must_use]
    pub fn same_purchase(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.resource == other.resource
    }
}

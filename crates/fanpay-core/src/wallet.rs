//! Wallets and the append-only ledger behind them.
//!
//! A wallet balance is only ever changed together with a [`LedgerEntry`] describing
//! the change, inside one storage transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerEntryId, UserId};

/// A user's stored balance, in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Owner of the wallet.
    pub user_id: UserId,

    /// Current balance in cents. Never negative.
    pub balance_cents: i64,

    /// When the wallet was created.
    pub created_at: DateTime<Utc>,

    /// When the balance last changed.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty wallet.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance_cents: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the wallet can cover a debit of `amount_cents`.
    #[must_use]
    pub fn can_cover(&self, amount_cents: i64) -> bool {
        self.balance_cents >= amount_cents
    }
}

/// One balance change. Positive amounts are credits, negative are debits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Entry id (ULID, time ordered).
    pub id: LedgerEntryId,

    /// Whose balance changed.
    pub user_id: UserId,

    /// Signed amount in cents.
    pub amount_cents: i64,

    /// Why the balance changed.
    pub entry_type: EntryType,

    /// Balance after applying this entry. Filled in by the store.
    pub balance_after_cents: i64,

    /// Human-readable description.
    pub description: String,

    /// Structured context (resource, room, payment reference).
    pub metadata: serde_json::Value,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build a credit entry. The amount is forced positive.
    #[must_use]
    pub fn credit(
        user_id: UserId,
        amount_cents: i64,
        entry_type: EntryType,
        description: impl Into<String>,
    ) -> Self {
        Self::new(user_id, amount_cents.abs(), entry_type, description.into())
    }

    /// Build a debit entry. The amount is forced negative.
    #[must_use]
    pub fn debit(
        user_id: UserId,
        amount_cents: i64,
        entry_type: EntryType,
        description: impl Into<String>,
    ) -> Self {
        Self::new(user_id, -amount_cents.abs(), entry_type, description.into())
    }

    /// Attach structured metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    fn new(user_id: UserId, amount_cents: i64, entry_type: EntryType, description: String) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            amount_cents,
            entry_type,
            balance_after_cents: 0,
            description,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}

/// Ledger entry categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Balance added by an administrator or a completed top-up.
    TopUp,
    /// Fan paid for an unlock from the wallet.
    UnlockPurchase,
    /// Creator earned from a wallet unlock.
    UnlockEarning,
    /// Creator earned from an unlock paid outside the wallet.
    ExternalEarning,
    /// Fan sent a tip.
    TipSent,
    /// Creator received a tip.
    TipReceived,
    /// Fan's price held while a paid request is open.
    RequestEscrow,
    /// Escrow returned to the fan after a rejection.
    RequestRefund,
    /// Escrow released to the creator after approval.
    RequestPayout,
}

impl EntryType {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TopUp => "top_up",
            Self::UnlockPurchase => "unlock_purchase",
            Self::UnlockEarning => "unlock_earning",
            Self::ExternalEarning => "external_earning",
            Self::TipSent => "tip_sent",
            Self::TipReceived => "tip_received",
            Self::RequestEscrow => "request_escrow",
            Self::RequestRefund => "request_refund",
            Self::RequestPayout => "request_payout",
        }
    }

    /// Parse a stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "top_up" => Self::TopUp,
            "unlock_purchase" => Self::UnlockPurchase,
            "unlock_earning" => Self::UnlockEarning,
            "external_earning" => Self::ExternalEarning,
            "tip_sent" => Self::TipSent,
            "tip_received" => Self::TipReceived,
            "request_escrow" => Self::RequestEscrow,
            "request_refund" => Self::RequestRefund,
            "request_payout" => Self::RequestPayout,
            _ => return None,
        })
    }
}

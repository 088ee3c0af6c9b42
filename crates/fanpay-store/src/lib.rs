//! Storage layer for fanpay.
//!
//! Every money movement and every check-then-act sequence is a single [`Store`]
//! call. Backends make each call atomic:
//!
//! - [`PgStore`]: one Postgres transaction per call, row locks on wallets, drops
//!   and requests, uniqueness constraints on unlocks and payment references.
//! - [`MemoryStore`]: one async mutex over all tables. Used by tests and local runs.
//!
//! # Example
//!
//! ```no_run
//! use fanpay_store::{MemoryStore, Store};
//! use fanpay_core::{EntryType, LedgerEntry, UserId};
//!
//! # async fn demo() -> fanpay_store::Result<()> {
//! let store = MemoryStore::new();
//! let user = UserId::generate();
//! let entry = LedgerEntry::credit(user, 5000, EntryType::TopUp, "welcome bonus");
//! let balance = store.top_up(entry).await?;
//! assert_eq!(balance, 5000);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::HashMap;

use async_trait::async_trait;
use fanpay_core::{
    ActivitySession, BankTransferClaim, DropActivity, DropId, FlashDrop, InvoiceInputs,
    LedgerEntry, MonthWindow, PaidRequest, PricedResource, RequestId, RequestTransition,
    ResourceRef, RevenueEvent, RevenueSplit, RoomId, UnlockRecord, UserId, UserProfile, Wallet,
};

/// A revenue event together with its splits, written in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueRecord {
    /// The event.
    pub event: RevenueEvent,
    /// Its splits, in the order they should be recorded.
    pub splits: Vec<RevenueSplit>,
}

/// Write set of a wallet-paid unlock.
#[derive(Debug, Clone)]
pub struct WalletUnlock {
    /// Record to insert.
    pub record: UnlockRecord,
    /// Debit from the fan.
    pub fan_debit: LedgerEntry,
    /// Credit to the creator.
    pub creator_credit: LedgerEntry,
    /// Revenue to attribute to the creator.
    pub revenue: RevenueRecord,
}

/// Write set of an unlock paid outside the wallet (Stripe, `PayPal`, bank).
#[derive(Debug, Clone)]
pub struct ExternalSettlement {
    /// Record to insert. Must carry the payment reference.
    pub record: UnlockRecord,
    /// Credit to the creator.
    pub creator_credit: LedgerEntry,
    /// Revenue to attribute to the creator.
    pub revenue: RevenueRecord,
}

/// Write set of a wallet tip.
#[derive(Debug, Clone)]
pub struct TipTransfer {
    /// Debit from the fan.
    pub fan_debit: LedgerEntry,
    /// Credit to the creator.
    pub creator_credit: LedgerEntry,
    /// Revenue to attribute to the creator.
    pub revenue: RevenueRecord,
}

/// Write set of a paid request transition.
#[derive(Debug, Clone)]
pub struct RequestUpdate {
    /// The planned transition, applied only if the status still matches.
    pub transition: RequestTransition,
    /// Refund or payout that goes with it.
    pub ledger: Option<LedgerEntry>,
    /// Revenue recorded on completion.
    pub revenue: Option<RevenueRecord>,
}

/// Result of an unlock write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// A new record was written and money moved.
    Unlocked(UnlockRecord),
    /// A record already existed; nothing was written.
    AlreadyUnlocked(UnlockRecord),
}

impl UnlockOutcome {
    /// The record, new or existing.
    #[must_use]
    pub fn record(&self) -> &UnlockRecord {
        match self {
            Self::Unlocked(r) | Self::AlreadyUnlocked(r) => r,
        }
    }

    /// Whether an earlier record was found.
    #[must_use]
    pub fn already_unlocked(&self) -> bool {
        matches!(self, Self::AlreadyUnlocked(_))
    }
}

/// Result of a conditional request transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied.
    Applied(PaidRequest),
    /// The status changed under us; this is the current row.
    Stale(PaidRequest),
}

/// Result of consuming flash-drop inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropConsumption {
    /// The drop after the update.
    pub drop: FlashDrop,
    /// Units actually consumed.
    pub actual_unlocks: i64,
}

/// The storage trait defining all database operations.
///
/// Compound operations are atomic: either every write in the set lands, or none does.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Wallets
    // =========================================================================

    /// Get a wallet. Users without one get an empty wallet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_wallet(&self, user_id: UserId) -> Result<Wallet>;

    /// List ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_ledger(&self, user_id: UserId, limit: usize, offset: usize)
        -> Result<Vec<LedgerEntry>>;

    /// Credit a wallet and write the ledger entry. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn top_up(&self, entry: LedgerEntry) -> Result<i64>;

    /// Move a tip from fan to creator. Returns the fan's new balance.
    ///
    /// # Errors
    ///
    /// `StoreError::InsufficientFunds` if the fan cannot cover the tip.
    async fn transfer_tip(&self, tip: TipTransfer) -> Result<i64>;

    // =========================================================================
    // Resources and unlocks
    // =========================================================================

    /// Insert a priced resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_resource(&self, resource: &PricedResource) -> Result<()>;

    /// Get a priced resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_resource(&self, resource: ResourceRef) -> Result<Option<PricedResource>>;

    /// Get the unlock record for (user, resource), if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_unlock(&self, user_id: UserId, resource: ResourceRef)
        -> Result<Option<UnlockRecord>>;

    /// List a user's unlocks, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_unlocks(&self, user_id: UserId) -> Result<Vec<UnlockRecord>>;

    /// Debit the fan, credit the creator, record the unlock and its revenue.
    ///
    /// # Errors
    ///
    /// `StoreError::InsufficientFunds` if the fan cannot cover the price; nothing
    /// is written in that case.
    async fn unlock_with_wallet(&self, unlock: WalletUnlock) -> Result<UnlockOutcome>;

    /// Record an externally paid unlock, credit the creator and record revenue.
    ///
    /// Settling the same reference again returns the existing unlock.
    ///
    /// # Errors
    ///
    /// `StoreError::DuplicatePaymentReference` if the reference settled another
    /// user's or another resource's unlock.
    async fn settle_external_unlock(&self, settlement: ExternalSettlement)
        -> Result<UnlockOutcome>;

    /// Record a pending bank transfer claim. No money moves and no unlock is written.
    ///
    /// Submitting the same reference again for the same fan and resource returns
    /// the stored claim.
    ///
    /// # Errors
    ///
    /// `StoreError::DuplicatePaymentReference` if the reference belongs to another
    /// claim or already settled an unlock.
    async fn submit_bank_claim(&self, claim: BankTransferClaim) -> Result<BankTransferClaim>;

    /// Get a bank transfer claim by its reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_bank_claim(&self, reference: &str) -> Result<Option<BankTransferClaim>>;

    // =========================================================================
    // Flash drops
    // =========================================================================

    /// Insert a flash drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_flash_drop(&self, drop: &FlashDrop) -> Result<()>;

    /// Get a flash drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_flash_drop(&self, drop_id: DropId) -> Result<Option<FlashDrop>>;

    /// List every drop in a room, newest first. Expiry is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_flash_drops(&self, room_id: RoomId) -> Result<Vec<FlashDrop>>;

    /// Consume up to `requested` units and append one activity row per unit.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the drop does not exist in `room_id`.
    /// - `StoreError::Billing` with `SoldOut` or `InvalidInput` from the drop rules.
    async fn consume_flash_drop(
        &self,
        drop_id: DropId,
        room_id: RoomId,
        requested: i64,
    ) -> Result<DropConsumption>;

    /// Activity rows of a drop, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_drop_activity(&self, drop_id: DropId) -> Result<Vec<DropActivity>>;

    // =========================================================================
    // Paid requests
    // =========================================================================

    /// Insert a request and hold its price from the fan's wallet.
    ///
    /// # Errors
    ///
    /// `StoreError::InsufficientFunds` if the fan cannot cover the price.
    async fn create_paid_request(&self, request: &PaidRequest, escrow: LedgerEntry)
        -> Result<()>;

    /// Get a paid request.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_paid_request(&self, request_id: RequestId) -> Result<Option<PaidRequest>>;

    /// Apply a transition if the request is still in one of its expected states,
    /// together with its ledger entry and revenue.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the request does not exist.
    async fn apply_request_transition(&self, update: RequestUpdate) -> Result<TransitionOutcome>;

    // =========================================================================
    // Revenue
    // =========================================================================

    /// Append a revenue event and its splits.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record_revenue(&self, revenue: RevenueRecord) -> Result<()>;

    /// Insert or replace an activity session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_activity_session(&self, session: &ActivitySession) -> Result<()>;

    /// Fetch everything the invoice builder needs for one creator and window:
    /// events in the window, their splits in insertion order, the fans' profiles
    /// (one batched lookup) and the linked sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn load_invoice_inputs(
        &self,
        creator_id: UserId,
        window: MonthWindow,
    ) -> Result<InvoiceInputs>;

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Insert or replace a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Batched profile lookup. Users without a profile are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_profiles(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>>;
}

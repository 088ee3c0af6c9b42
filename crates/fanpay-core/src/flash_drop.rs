//! Flash drops: time-boxed, inventory-limited offers inside a room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BillingError, DropId, RoomId, UserId};

/// Longest a drop may run.
pub const MAX_DROP_DURATION_HOURS: i64 = 72;

/// Highest price per unit, in cents.
pub const MAX_DROP_PRICE_CENTS: i64 = 1_000_000;

/// Most units a single drop may offer.
pub const MAX_DROP_INVENTORY: i64 = 100_000;

/// Most unlocks one simulation call may request.
pub const MAX_UNLOCKS_PER_CALL: i64 = 1_000;

/// A limited offer. Preview counters accumulate simulated unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashDrop {
    /// Drop id.
    pub id: DropId,
    /// Room hosting the drop.
    pub room_id: RoomId,
    /// Creator selling the drop.
    pub creator_id: UserId,
    /// Display title.
    pub title: String,
    /// Price per unlock in cents.
    pub price_cents: i64,
    /// Inventory at creation.
    pub inventory_total: i64,
    /// Units still available. Never negative.
    pub inventory_remaining: i64,
    /// Units consumed so far.
    pub unlocks_preview: i64,
    /// Running gross of consumed units, in cents.
    pub gross_preview_cents: i64,
    /// Opening time.
    pub starts_at: DateTime<Utc>,
    /// Closing time (exclusive).
    pub ends_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl FlashDrop {
    /// Create a drop with full inventory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when price or inventory is not positive or above
    /// [`MAX_DROP_PRICE_CENTS`] / [`MAX_DROP_INVENTORY`], or when the window is
    /// empty or longer than [`MAX_DROP_DURATION_HOURS`].
    pub fn new(
        room_id: RoomId,
        creator_id: UserId,
        title: String,
        price_cents: i64,
        inventory: i64,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Self, BillingError> {
        if price_cents <= 0 || price_cents > MAX_DROP_PRICE_CENTS {
            return Err(BillingError::InvalidInput(format!(
                "price must be between 1 and {MAX_DROP_PRICE_CENTS} cents"
            )));
        }
        if inventory <= 0 || inventory > MAX_DROP_INVENTORY {
            return Err(BillingError::InvalidInput(format!(
                "inventory must be between 1 and {MAX_DROP_INVENTORY}"
            )));
        }
        if ends_at <= starts_at {
            return Err(BillingError::InvalidInput(
                "drop must end after it starts".into(),
            ));
        }
        if ends_at - starts_at > chrono::Duration::hours(MAX_DROP_DURATION_HOURS) {
            return Err(BillingError::InvalidInput(format!(
                "drop cannot run longer than {MAX_DROP_DURATION_HOURS} hours"
            )));
        }

        Ok(Self {
            id: DropId::generate(),
            room_id,
            creator_id,
            title,
            price_cents,
            inventory_total: inventory,
            inventory_remaining: inventory,
            unlocks_preview: 0,
            gross_preview_cents: 0,
            starts_at,
            ends_at,
            created_at: Utc::now(),
        })
    }

    /// Whether the drop is still listed at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.ends_at > now
    }

    /// Whether inventory is exhausted.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.inventory_remaining <= 0
    }

    /// How many of `requested` unlocks can actually be served.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a request outside `1..=MAX_UNLOCKS_PER_CALL`, `SoldOut`
    /// when nothing is left.
    pub fn plan_unlocks(&self, requested: i64) -> Result<i64, BillingError> {
        if requested < 1 {
            return Err(BillingError::InvalidInput("count must be at least 1".into()));
        }
        if requested > MAX_UNLOCKS_PER_CALL {
            return Err(BillingError::InvalidInput(format!(
                "count cannot exceed {MAX_UNLOCKS_PER_CALL}"
            )));
        }
        let actual = requested.min(self.inventory_remaining);
        if actual <= 0 {
            return Err(BillingError::SoldOut);
        }
        Ok(actual)
    }

    /// Consume up to `requested` units and return how many were taken.
    ///
    /// # Errors
    ///
    /// Same as [`FlashDrop::plan_unlocks`], plus `InvalidInput` if a preview
    /// counter would overflow. The drop is untouched on error.
    pub fn apply_unlocks(&mut self, requested: i64) -> Result<i64, BillingError> {
        let actual = self.plan_unlocks(requested)?;
        let overflow = || BillingError::InvalidInput("flash drop totals out of range".into());
        let unlocks = self.unlocks_preview.checked_add(actual).ok_or_else(overflow)?;
        let gross = actual
            .checked_mul(self.price_cents)
            .and_then(|added| self.gross_preview_cents.checked_add(added))
            .ok_or_else(overflow)?;

        self.inventory_remaining -= actual;
        self.unlocks_preview = unlocks;
        self.gross_preview_cents = gross;
        Ok(actual)
    }
}

/// Audit row for one simulated unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropActivity {
    /// Drop the unlock belongs to.
    pub drop_id: DropId,
    /// Room of the drop.
    pub room_id: RoomId,
    /// 1-based position in the drop's unlock sequence.
    pub sequence: i64,
    /// Price recorded for this unit.
    pub price_cents: i64,
    /// When the unit was consumed.
    pub created_at: DateTime<Utc>,
}

impl DropActivity {
    /// Activity rows for the `actual` units just consumed from `drop`.
    ///
    /// `drop` must already reflect the consumption.
    #[must_use]
    pub fn for_batch(drop: &FlashDrop, actual: i64) -> Vec<Self> {
        let now = Utc::now();
        let first = drop.unlocks_preview - actual + 1;
        (first..=drop.unlocks_preview)
            .map(|sequence| Self {
                drop_id: drop.id,
                room_id: drop.room_id,
                sequence,
                price_cents: drop.price_cents,
                created_at: now,
            })
            .collect()
    }
}

//! PostgreSQL storage backend.
//!
//! Each compound operation runs in one transaction. Wallet, drop and request rows
//! are locked with `FOR UPDATE`; unlock uniqueness and payment references are
//! enforced by constraints.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use fanpay_core::{
    ActivitySession, BankTransferClaim, Beneficiary, DropActivity, DropId, EntryType, FlashDrop,
    InvoiceInputs, LedgerEntry, LedgerEntryId, MonthWindow, PaidRequest, PaymentMethod,
    PricedResource, RequestId, RequestStatus, ResourceId, ResourceKind, ResourceRef,
    RevenueEvent, RevenueEventId, RevenueKind, RevenueSplit, RevenueStatus, RoomId, SessionId,
    UnlockRecord, UserId, UserProfile, Wallet,
};

use crate::error::{Result, StoreError};
use crate::{
    DropConsumption, ExternalSettlement, RequestUpdate, RevenueRecord, Store, TipTransfer,
    TransitionOutcome, UnlockOutcome, WalletUnlock,
};

type PgTx<'a> = Transaction<'a, Postgres>;

const UNLOCK_COLUMNS: &str = "user_id, resource_kind, resource_id, price_paid_cents, \
                              payment_method, payment_reference, created_at";

const BANK_CLAIM_COLUMNS: &str =
    "reference, user_id, resource_kind, resource_id, amount_cents, created_at";

const DROP_COLUMNS: &str = "id, room_id, creator_id, title, price_cents, inventory_total, \
                            inventory_remaining, unlocks_preview, gross_preview_cents, \
                            starts_at, ends_at, created_at";

const REQUEST_COLUMNS: &str = "id, room_id, fan_id, creator_id, description, price_cents, \
                               status, delivery_content, created_at, updated_at";

/// Storage backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

// =============================================================================
// Row decoding
// =============================================================================

fn decode_err(column: &str, value: &str) -> StoreError {
    StoreError::Serialization(format!("unexpected {column} value: {value}"))
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet> {
    Ok(Wallet {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        balance_cents: row.try_get("balance_cents")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ledger_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let id: String = row.try_get("id")?;
    let entry_type: String = row.try_get("entry_type")?;
    Ok(LedgerEntry {
        id: id
            .parse::<LedgerEntryId>()
            .map_err(|_| decode_err("ledger id", &id))?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        amount_cents: row.try_get("amount_cents")?,
        entry_type: EntryType::parse(&entry_type)
            .ok_or_else(|| decode_err("entry_type", &entry_type))?,
        balance_after_cents: row.try_get("balance_after_cents")?,
        description: row.try_get("description")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn resource_kind(row: &PgRow) -> Result<ResourceKind> {
    let kind: String = row.try_get("resource_kind")?;
    kind.parse().map_err(|_| decode_err("resource_kind", &kind))
}

fn resource_from_row(row: &PgRow) -> Result<PricedResource> {
    Ok(PricedResource {
        resource: ResourceRef::new(
            resource_kind(row)?,
            ResourceId::from_uuid(row.try_get("resource_id")?),
        ),
        creator_id: UserId::from_uuid(row.try_get("creator_id")?),
        room_id: row
            .try_get::<Option<Uuid>, _>("room_id")?
            .map(RoomId::from_uuid),
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        price_cents: row.try_get("price_cents")?,
        created_at: row.try_get("created_at")?,
    })
}

fn unlock_from_row(row: &PgRow) -> Result<UnlockRecord> {
    let method: String = row.try_get("payment_method")?;
    Ok(UnlockRecord {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        resource: ResourceRef::new(
            resource_kind(row)?,
            ResourceId::from_uuid(row.try_get("resource_id")?),
        ),
        price_paid_cents: row.try_get("price_paid_cents")?,
        payment_method: method
            .parse::<PaymentMethod>()
            .map_err(|_| decode_err("payment_method", &method))?,
        payment_reference: row.try_get("payment_reference")?,
        created_at: row.try_get("created_at")?,
    })
}

fn bank_claim_from_row(row: &PgRow) -> Result<BankTransferClaim> {
    Ok(BankTransferClaim {
        reference: row.try_get("reference")?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        resource: ResourceRef::new(
            resource_kind(row)?,
            ResourceId::from_uuid(row.try_get("resource_id")?),
        ),
        amount_cents: row.try_get("amount_cents")?,
        created_at: row.try_get("created_at")?,
    })
}

fn drop_from_row(row: &PgRow) -> Result<FlashDrop> {
    Ok(FlashDrop {
        id: DropId::from_uuid(row.try_get("id")?),
        room_id: RoomId::from_uuid(row.try_get("room_id")?),
        creator_id: UserId::from_uuid(row.try_get("creator_id")?),
        title: row.try_get("title")?,
        price_cents: row.try_get("price_cents")?,
        inventory_total: row.try_get("inventory_total")?,
        inventory_remaining: row.try_get("inventory_remaining")?,
        unlocks_preview: row.try_get("unlocks_preview")?,
        gross_preview_cents: row.try_get("gross_preview_cents")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<PaidRequest> {
    let status: String = row.try_get("status")?;
    Ok(PaidRequest {
        id: RequestId::from_uuid(row.try_get("id")?),
        room_id: RoomId::from_uuid(row.try_get("room_id")?),
        fan_id: UserId::from_uuid(row.try_get("fan_id")?),
        creator_id: UserId::from_uuid(row.try_get("creator_id")?),
        description: row.try_get("description")?,
        price_cents: row.try_get("price_cents")?,
        status: RequestStatus::parse(&status).ok_or_else(|| decode_err("status", &status))?,
        delivery_content: row.try_get("delivery_content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<RevenueEvent> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(RevenueEvent {
        id: RevenueEventId::from_uuid(row.try_get("id")?),
        creator_id: UserId::from_uuid(row.try_get("creator_id")?),
        fan_id: UserId::from_uuid(row.try_get("fan_id")?),
        room_id: row
            .try_get::<Option<Uuid>, _>("room_id")?
            .map(RoomId::from_uuid),
        session_id: row
            .try_get::<Option<Uuid>, _>("session_id")?
            .map(SessionId::from_uuid),
        kind: RevenueKind::parse(&kind).ok_or_else(|| decode_err("kind", &kind))?,
        currency: row.try_get("currency")?,
        gross_amount_cents: row.try_get("gross_amount_cents")?,
        status: RevenueStatus::parse(&status).ok_or_else(|| decode_err("status", &status))?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn split_from_row(row: &PgRow) -> Result<RevenueSplit> {
    let beneficiary: String = row.try_get("beneficiary")?;
    Ok(RevenueSplit {
        event_id: RevenueEventId::from_uuid(row.try_get("event_id")?),
        beneficiary: Beneficiary::parse(&beneficiary)
            .ok_or_else(|| decode_err("beneficiary", &beneficiary))?,
        amount_cents: row.try_get("amount_cents")?,
        split_profile: row.try_get("split_profile")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<ActivitySession> {
    Ok(ActivitySession {
        id: SessionId::from_uuid(row.try_get("id")?),
        room_id: row
            .try_get::<Option<Uuid>, _>("room_id")?
            .map(RoomId::from_uuid),
        creator_id: UserId::from_uuid(row.try_get("creator_id")?),
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<UserProfile> {
    Ok(UserProfile {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
    })
}

// =============================================================================
// Transaction helpers
// =============================================================================

/// Lock the wallet, apply the entry's delta and append it to the ledger.
async fn post_entry(tx: &mut PgTx<'_>, mut entry: LedgerEntry) -> Result<LedgerEntry> {
    let user_id = *entry.user_id.as_uuid();

    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    let balance: i64 =
        sqlx::query_scalar("SELECT balance_cents FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut **tx)
            .await?;

    let next = balance + entry.amount_cents;
    if next < 0 {
        return Err(StoreError::InsufficientFunds {
            balance,
            required: -entry.amount_cents,
        });
    }

    sqlx::query("UPDATE wallets SET balance_cents = $2, updated_at = NOW() WHERE user_id = $1")
        .bind(user_id)
        .bind(next)
        .execute(&mut **tx)
        .await?;

    entry.balance_after_cents = next;
    sqlx::query(
        r"
        INSERT INTO ledger_entries (
            id, user_id, amount_cents, entry_type, balance_after_cents,
            description, metadata, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(entry.id.to_string())
    .bind(user_id)
    .bind(entry.amount_cents)
    .bind(entry.entry_type.as_str())
    .bind(entry.balance_after_cents)
    .bind(&entry.description)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(entry)
}

async fn insert_revenue(tx: &mut PgTx<'_>, revenue: &RevenueRecord) -> Result<()> {
    let event = &revenue.event;
    sqlx::query(
        r"
        INSERT INTO revenue_events (
            id, creator_id, fan_id, room_id, session_id, kind,
            currency, gross_amount_cents, status, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ",
    )
    .bind(*event.id.as_uuid())
    .bind(*event.creator_id.as_uuid())
    .bind(*event.fan_id.as_uuid())
    .bind(event.room_id.map(|id| *id.as_uuid()))
    .bind(event.session_id.map(|id| *id.as_uuid()))
    .bind(event.kind.as_str())
    .bind(&event.currency)
    .bind(event.gross_amount_cents)
    .bind(event.status.as_str())
    .bind(event.occurred_at)
    .execute(&mut **tx)
    .await?;

    for split in &revenue.splits {
        sqlx::query(
            r"
            INSERT INTO revenue_splits (event_id, beneficiary, amount_cents, split_profile)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(*split.event_id.as_uuid())
        .bind(split.beneficiary.as_str())
        .bind(split.amount_cents)
        .bind(&split.split_profile)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Insert the unlock row. Returns `false` if a unique constraint already holds a row.
async fn insert_unlock(tx: &mut PgTx<'_>, record: &UnlockRecord) -> Result<bool> {
    let inserted = sqlx::query(
        r"
        INSERT INTO unlocks (
            user_id, resource_kind, resource_id, price_paid_cents,
            payment_method, payment_reference, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(*record.user_id.as_uuid())
    .bind(record.resource.kind.as_str())
    .bind(*record.resource.id.as_uuid())
    .bind(record.price_paid_cents)
    .bind(record.payment_method.as_str())
    .bind(&record.payment_reference)
    .bind(record.created_at)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    Ok(inserted == 1)
}

async fn find_unlock(
    tx: &mut PgTx<'_>,
    user_id: UserId,
    resource: ResourceRef,
) -> Result<Option<UnlockRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {UNLOCK_COLUMNS} FROM unlocks \
         WHERE user_id = $1 AND resource_kind = $2 AND resource_id = $3"
    ))
    .bind(*user_id.as_uuid())
    .bind(resource.kind.as_str())
    .bind(*resource.id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?;
    row.as_ref().map(unlock_from_row).transpose()
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Wallets
    // =========================================================================

    async fn get_wallet(&self, user_id: UserId) -> Result<Wallet> {
        let row = sqlx::query(
            "SELECT user_id, balance_cents, created_at, updated_at FROM wallets WHERE user_id = $1",
        )
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => wallet_from_row(&row),
            None => Ok(Wallet::new(user_id)),
        }
    }

    async fn list_ledger(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, amount_cents, entry_type, balance_after_cents,
                   description, metadata, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(*user_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_from_row).collect()
    }

    async fn top_up(&self, entry: LedgerEntry) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let posted = post_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(posted.balance_after_cents)
    }

    async fn transfer_tip(&self, tip: TipTransfer) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let debit = post_entry(&mut tx, tip.fan_debit).await?;
        post_entry(&mut tx, tip.creator_credit).await?;
        insert_revenue(&mut tx, &tip.revenue).await?;
        tx.commit().await?;
        Ok(debit.balance_after_cents)
    }

    // =========================================================================
    // Resources and unlocks
    // =========================================================================

    async fn put_resource(&self, resource: &PricedResource) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO priced_resources (
                resource_kind, resource_id, creator_id, room_id,
                title, body, price_cents, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(resource.resource.kind.as_str())
        .bind(*resource.resource.id.as_uuid())
        .bind(*resource.creator_id.as_uuid())
        .bind(resource.room_id.map(|id| *id.as_uuid()))
        .bind(&resource.title)
        .bind(&resource.body)
        .bind(resource.price_cents)
        .bind(resource.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_resource(&self, resource: ResourceRef) -> Result<Option<PricedResource>> {
        let row = sqlx::query(
            r"
            SELECT resource_kind, resource_id, creator_id, room_id,
                   title, body, price_cents, created_at
            FROM priced_resources
            WHERE resource_kind = $1 AND resource_id = $2
            ",
        )
        .bind(resource.kind.as_str())
        .bind(*resource.id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn get_unlock(
        &self,
        user_id: UserId,
        resource: ResourceRef,
    ) -> Result<Option<UnlockRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {UNLOCK_COLUMNS} FROM unlocks \
             WHERE user_id = $1 AND resource_kind = $2 AND resource_id = $3"
        ))
        .bind(*user_id.as_uuid())
        .bind(resource.kind.as_str())
        .bind(*resource.id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(unlock_from_row).transpose()
    }

    async fn list_unlocks(&self, user_id: UserId) -> Result<Vec<UnlockRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {UNLOCK_COLUMNS} FROM unlocks WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(unlock_from_row).collect()
    }

    async fn unlock_with_wallet(&self, unlock: WalletUnlock) -> Result<UnlockOutcome> {
        let mut tx = self.pool.begin().await?;
        let record = unlock.record;

        if !insert_unlock(&mut tx, &record).await? {
            let existing = find_unlock(&mut tx, record.user_id, record.resource)
                .await?
                .ok_or_else(|| StoreError::Conflict("unlock row vanished".into()))?;
            return Ok(UnlockOutcome::AlreadyUnlocked(existing));
        }

        post_entry(&mut tx, unlock.fan_debit).await?;
        post_entry(&mut tx, unlock.creator_credit).await?;
        insert_revenue(&mut tx, &unlock.revenue).await?;
        tx.commit().await?;

        debug!(user_id = %record.user_id, resource = %record.resource, "wallet unlock committed");
        Ok(UnlockOutcome::Unlocked(record))
    }

    async fn settle_external_unlock(
        &self,
        settlement: ExternalSettlement,
    ) -> Result<UnlockOutcome> {
        let mut tx = self.pool.begin().await?;
        let record = settlement.record;
        let reference = record.payment_reference.clone().ok_or_else(|| {
            StoreError::Conflict("external settlement without a payment reference".into())
        })?;

        if !insert_unlock(&mut tx, &record).await? {
            if let Some(existing) = find_unlock(&mut tx, record.user_id, record.resource).await? {
                return Ok(UnlockOutcome::AlreadyUnlocked(existing));
            }
            return Err(StoreError::DuplicatePaymentReference { reference });
        }

        post_entry(&mut tx, settlement.creator_credit).await?;
        insert_revenue(&mut tx, &settlement.revenue).await?;
        tx.commit().await?;

        debug!(
            user_id = %record.user_id,
            resource = %record.resource,
            method = record.payment_method.as_str(),
            "external unlock settled"
        );
        Ok(UnlockOutcome::Unlocked(record))
    }

    async fn submit_bank_claim(&self, claim: BankTransferClaim) -> Result<BankTransferClaim> {
        let mut tx = self.pool.begin().await?;

        let settled: Option<String> = sqlx::query_scalar(
            "SELECT payment_reference FROM unlocks WHERE payment_reference = $1",
        )
        .bind(&claim.reference)
        .fetch_optional(&mut *tx)
        .await?;
        if settled.is_some() {
            return Err(StoreError::DuplicatePaymentReference {
                reference: claim.reference,
            });
        }

        sqlx::query(
            r"
            INSERT INTO bank_transfer_claims (
                reference, user_id, resource_kind, resource_id, amount_cents, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (reference) DO NOTHING
            ",
        )
        .bind(&claim.reference)
        .bind(*claim.user_id.as_uuid())
        .bind(claim.resource.kind.as_str())
        .bind(*claim.resource.id.as_uuid())
        .bind(claim.amount_cents)
        .bind(claim.created_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {BANK_CLAIM_COLUMNS} FROM bank_transfer_claims WHERE reference = $1"
        ))
        .bind(&claim.reference)
        .fetch_one(&mut *tx)
        .await?;
        let stored = bank_claim_from_row(&row)?;
        if !stored.same_purchase(&claim) {
            return Err(StoreError::DuplicatePaymentReference {
                reference: claim.reference,
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn get_bank_claim(&self, reference: &str) -> Result<Option<BankTransferClaim>> {
        let row = sqlx::query(&format!(
            "SELECT {BANK_CLAIM_COLUMNS} FROM bank_transfer_claims WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(bank_claim_from_row).transpose()
    }

    // =========================================================================
    // Flash drops
    // =========================================================================

    async fn put_flash_drop(&self, drop: &FlashDrop) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO flash_drops ({DROP_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(*drop.id.as_uuid())
        .bind(*drop.room_id.as_uuid())
        .bind(*drop.creator_id.as_uuid())
        .bind(&drop.title)
        .bind(drop.price_cents)
        .bind(drop.inventory_total)
        .bind(drop.inventory_remaining)
        .bind(drop.unlocks_preview)
        .bind(drop.gross_preview_cents)
        .bind(drop.starts_at)
        .bind(drop.ends_at)
        .bind(drop.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_flash_drop(&self, drop_id: DropId) -> Result<Option<FlashDrop>> {
        let row = sqlx::query(&format!("SELECT {DROP_COLUMNS} FROM flash_drops WHERE id = $1"))
            .bind(*drop_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(drop_from_row).transpose()
    }

    async fn list_flash_drops(&self, room_id: RoomId) -> Result<Vec<FlashDrop>> {
        let rows = sqlx::query(&format!(
            "SELECT {DROP_COLUMNS} FROM flash_drops WHERE room_id = $1 ORDER BY created_at DESC"
        ))
        .bind(*room_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(drop_from_row).collect()
    }

    async fn consume_flash_drop(
        &self,
        drop_id: DropId,
        room_id: RoomId,
        requested: i64,
    ) -> Result<DropConsumption> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {DROP_COLUMNS} FROM flash_drops WHERE id = $1 AND room_id = $2 FOR UPDATE"
        ))
        .bind(*drop_id.as_uuid())
        .bind(*room_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let mut drop = drop_from_row(&row)?;
        let actual_unlocks = drop.apply_unlocks(requested)?;

        sqlx::query(
            r"
            UPDATE flash_drops
            SET inventory_remaining = $2, unlocks_preview = $3, gross_preview_cents = $4
            WHERE id = $1
            ",
        )
        .bind(*drop.id.as_uuid())
        .bind(drop.inventory_remaining)
        .bind(drop.unlocks_preview)
        .bind(drop.gross_preview_cents)
        .execute(&mut *tx)
        .await?;

        let first_sequence = drop.unlocks_preview - actual_unlocks + 1;
        sqlx::query(
            r"
            INSERT INTO flash_drop_activity (drop_id, room_id, sequence, price_cents)
            SELECT $1, $2, seq, $5
            FROM generate_series($3::BIGINT, $4::BIGINT) AS seq
            ",
        )
        .bind(*drop.id.as_uuid())
        .bind(*drop.room_id.as_uuid())
        .bind(first_sequence)
        .bind(drop.unlocks_preview)
        .bind(drop.price_cents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DropConsumption {
            drop,
            actual_unlocks,
        })
    }

    async fn list_drop_activity(&self, drop_id: DropId) -> Result<Vec<DropActivity>> {
        let rows = sqlx::query(
            r"
            SELECT drop_id, room_id, sequence, price_cents, created_at
            FROM flash_drop_activity
            WHERE drop_id = $1
            ORDER BY sequence
            ",
        )
        .bind(*drop_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut activity = Vec::with_capacity(rows.len());
        for row in rows {
            activity.push(DropActivity {
                drop_id: DropId::from_uuid(row.try_get("drop_id")?),
                room_id: RoomId::from_uuid(row.try_get("room_id")?),
                sequence: row.try_get("sequence")?,
                price_cents: row.try_get("price_cents")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(activity)
    }

    // =========================================================================
    // Paid requests
    // =========================================================================

    async fn create_paid_request(&self, request: &PaidRequest, escrow: LedgerEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        post_entry(&mut tx, escrow).await?;

        sqlx::query(&format!(
            "INSERT INTO paid_requests ({REQUEST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(*request.id.as_uuid())
        .bind(*request.room_id.as_uuid())
        .bind(*request.fan_id.as_uuid())
        .bind(*request.creator_id.as_uuid())
        .bind(&request.description)
        .bind(request.price_cents)
        .bind(request.status.as_str())
        .bind(&request.delivery_content)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_paid_request(&self, request_id: RequestId) -> Result<Option<PaidRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM paid_requests WHERE id = $1"
        ))
        .bind(*request_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn apply_request_transition(&self, update: RequestUpdate) -> Result<TransitionOutcome> {
        let transition = &update.transition;
        let expected: Vec<String> = transition
            .expected
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(&format!(
            r"
            UPDATE paid_requests
            SET status = $2,
                delivery_content = COALESCE($3, delivery_content),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            RETURNING {REQUEST_COLUMNS}
            "
        ))
        .bind(*transition.request_id.as_uuid())
        .bind(transition.to.as_str())
        .bind(&transition.delivery_content)
        .bind(&expected)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            let row = sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM paid_requests WHERE id = $1"
            ))
            .bind(*transition.request_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
            return Ok(TransitionOutcome::Stale(request_from_row(&row)?));
        };
        let request = request_from_row(&row)?;

        if let Some(entry) = update.ledger {
            post_entry(&mut tx, entry).await?;
        }
        if let Some(revenue) = &update.revenue {
            insert_revenue(&mut tx, revenue).await?;
        }
        tx.commit().await?;

        debug!(
            request_id = %request.id,
            status = %request.status,
            "paid request transition committed"
        );
        Ok(TransitionOutcome::Applied(request))
    }

    // =========================================================================
    // Revenue
    // =========================================================================

    async fn record_revenue(&self, revenue: RevenueRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_revenue(&mut tx, &revenue).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn put_activity_session(&self, session: &ActivitySession) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO activity_sessions (id, room_id, creator_id, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET room_id = EXCLUDED.room_id,
                creator_id = EXCLUDED.creator_id,
                started_at = EXCLUDED.started_at,
                ended_at = EXCLUDED.ended_at
            ",
        )
        .bind(*session.id.as_uuid())
        .bind(session.room_id.map(|id| *id.as_uuid()))
        .bind(*session.creator_id.as_uuid())
        .bind(session.started_at)
        .bind(session.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_invoice_inputs(
        &self,
        creator_id: UserId,
        window: MonthWindow,
    ) -> Result<InvoiceInputs> {
        let rows = sqlx::query(
            r"
            SELECT id, creator_id, fan_id, room_id, session_id, kind,
                   currency, gross_amount_cents, status, occurred_at
            FROM revenue_events
            WHERE creator_id = $1 AND occurred_at >= $2 AND occurred_at < $3
            ORDER BY occurred_at DESC
            ",
        )
        .bind(*creator_id.as_uuid())
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        let events = rows.iter().map(event_from_row).collect::<Result<Vec<_>>>()?;
        if events.is_empty() {
            return Ok(InvoiceInputs::default());
        }

        let event_ids: Vec<Uuid> = events.iter().map(|e| *e.id.as_uuid()).collect();
        let rows = sqlx::query(
            r"
            SELECT event_id, beneficiary, amount_cents, split_profile
            FROM revenue_splits
            WHERE event_id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&event_ids)
        .fetch_all(&self.pool)
        .await?;
        let splits = rows.iter().map(split_from_row).collect::<Result<Vec<_>>>()?;

        let mut fan_ids: Vec<UserId> = events.iter().map(|e| e.fan_id).collect();
        fan_ids.sort_unstable();
        fan_ids.dedup();
        let profiles = self.get_profiles(&fan_ids).await?;

        let session_ids: Vec<Uuid> = events
            .iter()
            .filter_map(|e| e.session_id.map(|id| *id.as_uuid()))
            .collect();
        let mut sessions = HashMap::new();
        if !session_ids.is_empty() {
            let rows = sqlx::query(
                r"
                SELECT id, room_id, creator_id, started_at, ended_at
                FROM activity_sessions
                WHERE id = ANY($1)
                ",
            )
            .bind(&session_ids)
            .fetch_all(&self.pool)
            .await?;
            for row in &rows {
                let session = session_from_row(row)?;
                sessions.insert(session.id, session);
            }
        }

        Ok(InvoiceInputs {
            events,
            splits,
            profiles,
            sessions,
        })
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    async fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO user_profiles (user_id, username, full_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET username = EXCLUDED.username, full_name = EXCLUDED.full_name
            ",
        )
        .bind(*profile.user_id.as_uuid())
        .bind(&profile.username)
        .bind(&profile.full_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profiles(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<Uuid> = user_ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT user_id, username, full_name FROM user_profiles WHERE user_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut profiles = HashMap::with_capacity(rows.len());
        for row in &rows {
            let profile = profile_from_row(row)?;
            profiles.insert(profile.user_id, profile);
        }
        Ok(profiles)
    }
}

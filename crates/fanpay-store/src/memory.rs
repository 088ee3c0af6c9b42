//! In-memory storage backend.
//!
//! All tables sit behind one async mutex, so every trait call runs alone. Each
//! compound operation validates its whole write set before touching any table.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use fanpay_core::{
    ActivitySession, BankTransferClaim, DropActivity, DropId, FlashDrop, InvoiceInputs,
    LedgerEntry, MonthWindow, PaidRequest, PricedResource, RequestId, ResourceRef, RevenueEvent,
    RevenueSplit, RoomId, SessionId, UnlockRecord, UserId, UserProfile, Wallet,
};

use crate::error::{Result, StoreError};
use crate::{
    DropConsumption, ExternalSettlement, RequestUpdate, RevenueRecord, Store, TipTransfer,
    TransitionOutcome, UnlockOutcome, WalletUnlock,
};

#[derive(Default)]
struct Tables {
    wallets: HashMap<UserId, Wallet>,
    ledger: Vec<LedgerEntry>,
    resources: HashMap<ResourceRef, PricedResource>,
    unlocks: HashMap<(UserId, ResourceRef), UnlockRecord>,
    payment_references: HashMap<String, (UserId, ResourceRef)>,
    bank_claims: HashMap<String, BankTransferClaim>,
    drops: HashMap<DropId, FlashDrop>,
    drop_activity: Vec<DropActivity>,
    requests: HashMap<RequestId, PaidRequest>,
    revenue_events: Vec<RevenueEvent>,
    revenue_splits: Vec<RevenueSplit>,
    sessions: HashMap<SessionId, ActivitySession>,
    profiles: HashMap<UserId, UserProfile>,
}

impl Tables {
    fn balance_of(&self, user_id: UserId) -> i64 {
        self.wallets.get(&user_id).map_or(0, |w| w.balance_cents)
    }

    /// Check that no wallet goes negative, then apply every entry.
    fn post_entries(&mut self, entries: Vec<LedgerEntry>) -> Result<Vec<LedgerEntry>> {
        let mut projected: HashMap<UserId, i64> = HashMap::new();
        for entry in &entries {
            let current = *projected
                .entry(entry.user_id)
                .or_insert_with(|| self.balance_of(entry.user_id));
            let next = current + entry.amount_cents;
            if next < 0 {
                return Err(StoreError::InsufficientFunds {
                    balance: current,
                    required: -entry.amount_cents,
                });
            }
            projected.insert(entry.user_id, next);
        }

        let now = Utc::now();
        let mut posted = Vec::with_capacity(entries.len());
        for mut entry in entries {
            let wallet = self
                .wallets
                .entry(entry.user_id)
                .or_insert_with(|| Wallet::new(entry.user_id));
            wallet.balance_cents += entry.amount_cents;
            wallet.updated_at = now;
            entry.balance_after_cents = wallet.balance_cents;
            self.ledger.push(entry.clone());
            posted.push(entry);
        }
        Ok(posted)
    }

    fn push_revenue(&mut self, revenue: RevenueRecord) {
        self.revenue_events.push(revenue.event);
        self.revenue_splits.extend(revenue.splits);
    }
}

/// Storage backed by process memory. Data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_wallet(&self, user_id: UserId) -> Result<Wallet> {
        let tables = self.tables.lock().await;
        Ok(tables
            .wallets
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Wallet::new(user_id)))
    }

    async fn list_ledger(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn top_up(&self, entry: LedgerEntry) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        let posted = tables.post_entries(vec![entry])?;
        Ok(posted[0].balance_after_cents)
    }

    async fn transfer_tip(&self, tip: TipTransfer) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        let posted = tables.post_entries(vec![tip.fan_debit, tip.creator_credit])?;
        tables.push_revenue(tip.revenue);
        Ok(posted[0].balance_after_cents)
    }

    async fn put_resource(&self, resource: &PricedResource) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.resources.insert(resource.resource, resource.clone());
        Ok(())
    }

    async fn get_resource(&self, resource: ResourceRef) -> Result<Option<PricedResource>> {
        let tables = self.tables.lock().await;
        Ok(tables.resources.get(&resource).cloned())
    }

    async fn get_unlock(
        &self,
        user_id: UserId,
        resource: ResourceRef,
    ) -> Result<Option<UnlockRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.unlocks.get(&(user_id, resource)).cloned())
    }

    async fn list_unlocks(&self, user_id: UserId) -> Result<Vec<UnlockRecord>> {
        let tables = self.tables.lock().await;
        let mut unlocks: Vec<_> = tables
            .unlocks
            .values()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect();
        unlocks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(unlocks)
    }

    async fn unlock_with_wallet(&self, unlock: WalletUnlock) -> Result<UnlockOutcome> {
        let mut tables = self.tables.lock().await;
        let key = (unlock.record.user_id, unlock.record.resource);
        if let Some(existing) = tables.unlocks.get(&key) {
            return Ok(UnlockOutcome::AlreadyUnlocked(existing.clone()));
        }

        tables.post_entries(vec![unlock.fan_debit, unlock.creator_credit])?;
        tables.unlocks.insert(key, unlock.record.clone());
        tables.push_revenue(unlock.revenue);
        Ok(UnlockOutcome::Unlocked(unlock.record))
    }

    async fn settle_external_unlock(
        &self,
        settlement: ExternalSettlement,
    ) -> Result<UnlockOutcome> {
        let mut tables = self.tables.lock().await;
        let key = (settlement.record.user_id, settlement.record.resource);
        if let Some(existing) = tables.unlocks.get(&key) {
            return Ok(UnlockOutcome::AlreadyUnlocked(existing.clone()));
        }

        let reference = settlement.record.payment_reference.clone().ok_or_else(|| {
            StoreError::Conflict("external settlement without a payment reference".into())
        })?;
        if tables.payment_references.contains_key(&reference) {
            return Err(StoreError::DuplicatePaymentReference { reference });
        }

        tables.post_entries(vec![settlement.creator_credit])?;
        tables.payment_references.insert(reference, key);
        tables.unlocks.insert(key, settlement.record.clone());
        tables.push_revenue(settlement.revenue);
        Ok(UnlockOutcome::Unlocked(settlement.record))
    }

    async fn submit_bank_claim(&self, claim: BankTransferClaim) -> Result<BankTransferClaim> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.bank_claims.get(&claim.reference) {
            if existing.same_purchase(&claim) {
                return Ok(existing.clone());
            }
            return Err(StoreError::DuplicatePaymentReference {
                reference: claim.reference,
            });
        }
        if tables.payment_references.contains_key(&claim.reference) {
            return Err(StoreError::DuplicatePaymentReference {
                reference: claim.reference,
            });
        }

        tables.bank_claims.insert(claim.reference.clone(), claim.clone());
        Ok(claim)
    }

    async fn get_bank_claim(&self, reference: &str) -> Result<Option<BankTransferClaim>> {
        let tables = self.tables.lock().await;
        Ok(tables.bank_claims.get(reference).cloned())
    }

    async fn put_flash_drop(&self, drop: &FlashDrop) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.drops.insert(drop.id, drop.clone());
        Ok(())
    }

    async fn get_flash_drop(&self, drop_id: DropId) -> Result<Option<FlashDrop>> {
        let tables = self.tables.lock().await;
        Ok(tables.drops.get(&drop_id).cloned())
    }

    async fn list_flash_drops(&self, room_id: RoomId) -> Result<Vec<FlashDrop>> {
        let tables = self.tables.lock().await;
        let mut drops: Vec<_> = tables
            .drops
            .values()
            .filter(|d| d.room_id == room_id)
            .cloned()
            .collect();
        drops.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(drops)
    }

    async fn consume_flash_drop(
        &self,
        drop_id: DropId,
        room_id: RoomId,
        requested: i64,
    ) -> Result<DropConsumption> {
        let mut tables = self.tables.lock().await;
        let drop = tables
            .drops
            .get_mut(&drop_id)
            .filter(|d| d.room_id == room_id)
            .ok_or(StoreError::NotFound)?;

        let actual_unlocks = drop.apply_unlocks(requested)?;
        let drop = drop.clone();
        tables
            .drop_activity
            .extend(DropActivity::for_batch(&drop, actual_unlocks));

        Ok(DropConsumption {
            drop,
            actual_unlocks,
        })
    }

    async fn list_drop_activity(&self, drop_id: DropId) -> Result<Vec<DropActivity>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .drop_activity
            .iter()
            .filter(|a| a.drop_id == drop_id)
            .cloned()
            .collect())
    }

    async fn create_paid_request(&self, request: &PaidRequest, escrow: LedgerEntry) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.post_entries(vec![escrow])?;
        tables.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_paid_request(&self, request_id: RequestId) -> Result<Option<PaidRequest>> {
        let tables = self.tables.lock().await;
        Ok(tables.requests.get(&request_id).cloned())
    }

    async fn apply_request_transition(&self, update: RequestUpdate) -> Result<TransitionOutcome> {
        let mut tables = self.tables.lock().await;
        let current = tables
            .requests
            .get(&update.transition.request_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        if !update.transition.expected.contains(&current.status) {
            return Ok(TransitionOutcome::Stale(current));
        }

        if let Some(entry) = update.ledger {
            tables.post_entries(vec![entry])?;
        }
        if let Some(revenue) = update.revenue {
            tables.push_revenue(revenue);
        }

        let mut request = current;
        request.apply(&update.transition);
        tables.requests.insert(request.id, request.clone());
        Ok(TransitionOutcome::Applied(request))
    }

    async fn record_revenue(&self, revenue: RevenueRecord) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.push_revenue(revenue);
        Ok(())
    }

    async fn put_activity_session(&self, session: &ActivitySession) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_invoice_inputs(
        &self,
        creator_id: UserId,
        window: MonthWindow,
    ) -> Result<InvoiceInputs> {
        let tables = self.tables.lock().await;
        let events: Vec<RevenueEvent> = tables
            .revenue_events
            .iter()
            .filter(|e| e.creator_id == creator_id && window.contains(e.occurred_at))
            .cloned()
            .collect();

        let event_ids: HashSet<_> = events.iter().map(|e| e.id).collect();
        let splits = tables
            .revenue_splits
            .iter()
            .filter(|s| event_ids.contains(&s.event_id))
            .cloned()
            .collect();

        let fan_ids: HashSet<_> = events.iter().map(|e| e.fan_id).collect();
        let profiles = fan_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).map(|p| (*id, p.clone())))
            .collect();

        let sessions = events
            .iter()
            .filter_map(|e| e.session_id)
            .filter_map(|id| tables.sessions.get(&id).map(|s| (id, s.clone())))
            .collect();

        Ok(InvoiceInputs {
            events,
            splits,
            profiles,
            sessions,
        })
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn get_profiles(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>> {
        let tables = self.tables.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).map(|p| (*id, p.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanpay_core::{
        month_window, BillingError, EntryType, PaymentMethod, RequestAction, RequestStatus,
        ResourceKind, RevenueKind, SplitPolicy, TransitionPlan,
    };

    async fn funded(store: &MemoryStore, cents: i64) -> UserId {
        let user = UserId::generate();
        store
            .top_up(LedgerEntry::credit(user, cents, EntryType::TopUp, "seed"))
            .await
            .unwrap();
        user
    }

    fn confession(creator: UserId, price: i64) -> PricedResource {
        PricedResource::new(
            ResourceKind::Confession,
            creator,
            Some(RoomId::generate()),
            "I have a secret".into(),
            "it's pineapple pizza".into(),
            price,
        )
        .unwrap()
    }

    fn revenue(creator: UserId, fan: UserId, kind: RevenueKind, gross: i64) -> RevenueRecord {
        let event = RevenueEvent::completed(creator, fan, kind, "usd", gross);
        let splits = SplitPolicy::default().split(&event);
        RevenueRecord { event, splits }
    }

    fn wallet_unlock(fan: UserId, resource: &PricedResource) -> WalletUnlock {
        let price = resource.price_cents;
        WalletUnlock {
            record: UnlockRecord::new(fan, resource, PaymentMethod::Wallet, None),
            fan_debit: LedgerEntry::debit(fan, price, EntryType::UnlockPurchase, "unlock"),
            creator_credit: LedgerEntry::credit(
                resource.creator_id,
                price,
                EntryType::UnlockEarning,
                "unlock",
            ),
            revenue: revenue(resource.creator_id, fan, RevenueKind::Unlock, price),
        }
    }

    #[tokio::test]
    async fn wallet_unlock_moves_money_once() {
        let store = MemoryStore::new();
        let fan = funded(&store, 1000).await;
        let creator = UserId::generate();
        let resource = confession(creator, 300);
        store.put_resource(&resource).await.unwrap();

        let first = store
            .unlock_with_wallet(wallet_unlock(fan, &resource))
            .await
            .unwrap();
        assert!(!first.already_unlocked());

        let second = store
            .unlock_with_wallet(wallet_unlock(fan, &resource))
            .await
            .unwrap();
        assert!(second.already_unlocked());

        assert_eq!(store.get_wallet(fan).await.unwrap().balance_cents, 700);
        assert_eq!(store.get_wallet(creator).await.unwrap().balance_cents, 300);
        assert_eq!(store.list_unlocks(fan).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insufficient_funds_writes_nothing() {
        let store = MemoryStore::new();
        let fan = funded(&store, 100).await;
        let creator = UserId::generate();
        let resource = confession(creator, 300);

        let err = store
            .unlock_with_wallet(wallet_unlock(fan, &resource))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientFunds {
                balance: 100,
                required: 300
            }
        ));
        assert_eq!(store.get_wallet(fan).await.unwrap().balance_cents, 100);
        assert_eq!(store.get_wallet(creator).await.unwrap().balance_cents, 0);
        assert!(store.get_unlock(fan, resource.resource).await.unwrap().is_none());
        assert_eq!(store.list_ledger(creator, 10, 0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn concurrent_unlocks_charge_once() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let fan = funded(&store, 10_000).await;
        let resource = confession(UserId::generate(), 500);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let unlock = wallet_unlock(fan, &resource);
            handles.push(tokio::spawn(async move {
                store.unlock_with_wallet(unlock).await.unwrap()
            }));
        }
        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap().already_unlocked() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
        assert_eq!(store.get_wallet(fan).await.unwrap().balance_cents, 9_500);
    }

    #[tokio::test]
    async fn payment_reference_settles_one_unlock() {
        let store = MemoryStore::new();
        let creator = UserId::generate();
        let first = confession(creator, 400);
        let second = confession(creator, 400);
        let fan = UserId::generate();

        let settle = |resource: &PricedResource| ExternalSettlement {
            record: UnlockRecord::new(
                fan,
                resource,
                PaymentMethod::Stripe,
                Some("pi_123".into()),
            ),
            creator_credit: LedgerEntry::credit(creator, 400, EntryType::ExternalEarning, "stripe"),
            revenue: revenue(creator, fan, RevenueKind::Unlock, 400),
        };

        let outcome = store.settle_external_unlock(settle(&first)).await.unwrap();
        assert!(!outcome.already_unlocked());
        let again = store.settle_external_unlock(settle(&first)).await.unwrap();
        assert!(again.already_unlocked());

        let err = store.settle_external_unlock(settle(&second)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePaymentReference { .. }));
        assert_eq!(store.get_wallet(creator).await.unwrap().balance_cents, 400);
    }

    #[tokio::test]
    async fn bank_claim_is_pending_and_owns_its_reference() {
        let store = MemoryStore::new();
        let creator = UserId::generate();
        let resource = confession(creator, 400);
        let fan = UserId::generate();

        let claim = BankTransferClaim::new(fan, &resource, "SEPA-1").unwrap();
        store.submit_bank_claim(claim.clone()).await.unwrap();
        let again = BankTransferClaim::new(fan, &resource, "SEPA-1").unwrap();
        assert_eq!(store.submit_bank_claim(again).await.unwrap(), claim);

        assert!(store.get_unlock(fan, resource.resource).await.unwrap().is_none());
        assert_eq!(store.get_wallet(creator).await.unwrap().balance_cents, 0);
        assert_eq!(store.get_bank_claim("SEPA-1").await.unwrap(), Some(claim));

        let stolen = BankTransferClaim::new(UserId::generate(), &resource, "SEPA-1").unwrap();
        let err = store.submit_bank_claim(stolen).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePaymentReference { .. }));
    }

    #[tokio::test]
    async fn drop_consumption_clamps_and_records_activity() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let drop = FlashDrop::new(
            RoomId::generate(),
            UserId::generate(),
            "Backstage pass".into(),
            1000,
            3,
            now,
            now + chrono::Duration::hours(2),
        )
        .unwrap();
        store.put_flash_drop(&drop).await.unwrap();

        let consumed = store.consume_flash_drop(drop.id, drop.room_id, 5).await.unwrap();
        assert_eq!(consumed.actual_unlocks, 3);
        assert_eq!(consumed.drop.inventory_remaining, 0);
        assert_eq!(consumed.drop.gross_preview_cents, 3000);
        assert_eq!(store.list_drop_activity(drop.id).await.unwrap().len(), 3);

        let err = store.consume_flash_drop(drop.id, drop.room_id, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Billing(BillingError::SoldOut)));

        let err = store
            .consume_flash_drop(drop.id, RoomId::generate(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn rejected_request_refunds_exactly_once() {
        let store = MemoryStore::new();
        let fan = funded(&store, 2000).await;
        let creator = UserId::generate();
        let request =
            PaidRequest::new(RoomId::generate(), fan, creator, "shout-out".into(), 1500).unwrap();
        store
            .create_paid_request(
                &request,
                LedgerEntry::debit(fan, 1500, EntryType::RequestEscrow, "escrow"),
            )
            .await
            .unwrap();
        assert_eq!(store.get_wallet(fan).await.unwrap().balance_cents, 500);

        let TransitionPlan::Apply(transition) =
            request.plan(creator, RequestAction::Reject, None).unwrap()
        else {
            panic!("reject should apply");
        };
        let update = RequestUpdate {
            transition,
            ledger: Some(LedgerEntry::credit(fan, 1500, EntryType::RequestRefund, "refund")),
            revenue: None,
        };

        let applied = store.apply_request_transition(update.clone()).await.unwrap();
        assert!(matches!(
            applied,
            TransitionOutcome::Applied(ref r) if r.status == RequestStatus::Rejected
        ));

        let replay = store.apply_request_transition(update).await.unwrap();
        assert!(matches!(replay, TransitionOutcome::Stale(_)));
        assert_eq!(store.get_wallet(fan).await.unwrap().balance_cents, 2000);
    }

    #[tokio::test]
    async fn invoice_inputs_are_scoped_to_window() {
        let store = MemoryStore::new();
        let creator = UserId::generate();
        let fan = UserId::generate();
        store
            .put_profile(&UserProfile::new(fan, "fan1", None).unwrap())
            .await
            .unwrap();

        let mut inside = revenue(creator, fan, RevenueKind::Tip, 500);
        inside.event.occurred_at = "2024-03-10T10:00:00Z".parse().unwrap();
        let mut outside = revenue(creator, fan, RevenueKind::Tip, 700);
        outside.event.occurred_at = "2024-04-01T00:00:00Z".parse().unwrap();
        let inside_id = inside.event.id;
        store.record_revenue(inside).await.unwrap();
        store.record_revenue(outside).await.unwrap();

        let inputs = store
            .load_invoice_inputs(creator, month_window(2024, 3).unwrap())
            .await
            .unwrap();
        assert_eq!(inputs.events.len(), 1);
        assert_eq!(inputs.events[0].id, inside_id);
        assert!(inputs.splits.iter().all(|s| s.event_id == inside_id));
        assert!(inputs.profiles.contains_key(&fan));
    }
}

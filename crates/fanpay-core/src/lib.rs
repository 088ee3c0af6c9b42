//! Core types and pure logic for fanpay.
//!
//! - **Identifiers**: `UserId`, `RoomId`, `ResourceId`, `DropId`, `RequestId`,
//!   `RevenueEventId`, `SessionId`, `LedgerEntryId`
//! - **Wallets**: `Wallet`, `LedgerEntry`, `EntryType`
//! - **Unlocks**: `PricedResource`, `UnlockRecord`, `PaymentMethod`, `BankTransferClaim`
//! - **Flash drops**: `FlashDrop`, `DropActivity`
//! - **Paid requests**: `PaidRequest` and its state machine
//! - **Revenue**: `RevenueEvent`, `RevenueSplit`, `SplitPolicy`, `ActivitySession`
//! - **Invoices**: `build_invoice`
//!
//! # Money
//!
//! Every amount is an `i64` count of cents in the platform currency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod flash_drop;
pub mod ids;
pub mod invoice;
pub mod profile;
pub mod request;
pub mod revenue;
pub mod unlock;
pub mod wallet;

pub use error::{BillingError, Result};
pub use flash_drop::{
    DropActivity, FlashDrop, MAX_DROP_DURATION_HOURS, MAX_DROP_INVENTORY, MAX_DROP_PRICE_CENTS,
    MAX_UNLOCKS_PER_CALL,
};
pub use ids::{
    DropId, IdError, LedgerEntryId, RequestId, ResourceId, RevenueEventId, RoomId, SessionId,
    UserId,
};
pub use invoice::{
    build_invoice, month_window, Invoice, InvoiceInputs, InvoiceLine, InvoiceSummary, MonthWindow,
};
pub use profile::UserProfile;
pub use request::{
    PaidRequest, RequestAction, RequestSettlement, RequestStatus, RequestTransition,
    TransitionPlan, MAX_REQUEST_DESCRIPTION_LEN,
};
pub use revenue::{
    ActivitySession, Beneficiary, RevenueEvent, RevenueKind, RevenueSplit, RevenueStatus,
    SplitPolicy,
};
pub use unlock::{
    BankTransferClaim, PaymentMethod, PricedResource, ResourceKind, ResourceRef, UnlockRecord,
    MAX_BANK_REFERENCE_LEN,
};
pub use wallet::{EntryType, LedgerEntry, Wallet};

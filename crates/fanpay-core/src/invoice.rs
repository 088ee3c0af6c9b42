//! Monthly creator invoices built from revenue events and their splits.
//!
//! [`build_invoice`] is a pure function: the store fetches the rows for the
//! window, this module does the reconciliation.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    ActivitySession, Beneficiary, BillingError, RevenueEvent, RevenueEventId, RevenueKind,
    RevenueSplit, RevenueStatus, RoomId, SessionId, UserId, UserProfile,
};

/// Half-open UTC window `[start, end)` covering one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthWindow {
    /// First instant of the month.
    pub start: DateTime<Utc>,
    /// First instant of the following month.
    pub end: DateTime<Utc>,
}

impl MonthWindow {
    /// Whether `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Window for `year`-`month`. December rolls over into January of `year + 1`.
///
/// # Errors
///
/// `InvalidInput` if `month` is outside `1..=12` or the year is out of range.
pub fn month_window(year: i32, month: u32) -> Result<MonthWindow, BillingError> {
    if !(1..=12).contains(&month) {
        return Err(BillingError::InvalidInput(format!(
            "month must be between 1 and 12, got {month}"
        )));
    }
    let (next_year, next_month) = if month == 12 {
        let next = year
            .checked_add(1)
            .ok_or_else(|| BillingError::InvalidInput(format!("year out of range: {year}")))?;
        (next, 1)
    } else {
        (year, month + 1)
    };

    let start = first_instant(year, month)?;
    let end = first_instant(next_year, next_month)?;
    Ok(MonthWindow { start, end })
}

fn first_instant(year: i32, month: u32) -> Result<DateTime<Utc>, BillingError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| BillingError::InvalidInput(format!("year out of range: {year}")))
}

/// One reconciled revenue event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    /// Source event.
    pub event_id: RevenueEventId,
    /// When the event happened.
    pub occurred_at: DateTime<Utc>,
    /// What was sold.
    pub kind: RevenueKind,
    /// Settlement state.
    pub status: RevenueStatus,
    /// Currency code.
    pub currency: String,
    /// Gross amount.
    pub gross_amount_cents: i64,
    /// Sum of creator splits.
    pub creator_share_cents: i64,
    /// Sum of platform splits.
    pub platform_share_cents: i64,
    /// First named split profile.
    pub split_profile: Option<String>,
    /// Paying fan.
    pub fan_id: UserId,
    /// Fan handle, if the fan has a profile.
    pub fan_username: Option<String>,
    /// Fan full name, if known.
    pub fan_full_name: Option<String>,
    /// Room of the event.
    pub room_id: Option<RoomId>,
    /// Linked session.
    pub session_id: Option<SessionId>,
    /// Duration of the linked session, once ended.
    pub session_duration_seconds: Option<i64>,
}

/// Totals across every line of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    /// Sum of gross amounts.
    pub gross_collected_cents: i64,
    /// Sum of creator shares.
    pub creator_earned_cents: i64,
    /// Sum of platform shares.
    pub platform_earned_cents: i64,
    /// Number of lines.
    pub events_count: usize,
    /// Most recent event in the window.
    pub last_event_at: Option<DateTime<Utc>>,
}

/// A creator's statement for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Invoiced creator.
    pub creator_id: UserId,
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1-based.
    pub month: u32,
    /// Window start (inclusive).
    pub period_start: DateTime<Utc>,
    /// Window end (exclusive).
    pub period_end: DateTime<Utc>,
    /// Totals.
    pub summary: InvoiceSummary,
    /// Newest first.
    pub lines: Vec<InvoiceLine>,
}

/// Rows the reconciler needs, as fetched by the store.
#[derive(Debug, Clone, Default)]
pub struct InvoiceInputs {
    /// Candidate events. Events of other creators or outside the window are ignored.
    pub events: Vec<RevenueEvent>,
    /// Splits of those events, in insertion order.
    pub splits: Vec<RevenueSplit>,
    /// Fan profiles keyed by user.
    pub profiles: HashMap<UserId, UserProfile>,
    /// Sessions keyed by id.
    pub sessions: HashMap<SessionId, ActivitySession>,
}

#[derive(Default)]
struct Shares {
    creator: i64,
    platform: i64,
    profile: Option<String>,
}

/// Reconcile one creator's month.
///
/// Shares are summed per beneficiary; agency splits count towards neither total.
/// When an event has several named split profiles the first one recorded wins.
///
/// # Errors
///
/// `InvalidInput` for an invalid month or year.
pub fn build_invoice(
    creator_id: UserId,
    year: i32,
    month: u32,
    inputs: InvoiceInputs,
) -> Result<Invoice, BillingError> {
    let window = month_window(year, month)?;

    let mut shares: HashMap<RevenueEventId, Shares> = HashMap::new();
    for split in &inputs.splits {
        let entry = shares.entry(split.event_id).or_default();
        match split.beneficiary {
            Beneficiary::Creator => entry.creator += split.amount_cents,
            Beneficiary::Platform => entry.platform += split.amount_cents,
            Beneficiary::Agency => {}
        }
        if entry.profile.is_none() {
            entry.profile = split
                .split_profile
                .as_ref()
                .filter(|p| !p.trim().is_empty())
                .cloned();
        }
    }

    let mut events: Vec<RevenueEvent> = inputs
        .events
        .into_iter()
        .filter(|e| e.creator_id == creator_id && window.contains(e.occurred_at))
        .collect();
    events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

    let lines: Vec<InvoiceLine> = events
        .into_iter()
        .map(|event| {
            let share = shares.remove(&event.id).unwrap_or_default();
            let profile = inputs.profiles.get(&event.fan_id);
            let duration = event
                .session_id
                .and_then(|id| inputs.sessions.get(&id))
                .and_then(ActivitySession::duration_seconds);

            InvoiceLine {
                event_id: event.id,
                occurred_at: event.occurred_at,
                kind: event.kind,
                status: event.status,
                currency: event.currency,
                gross_amount_cents: event.gross_amount_cents,
                creator_share_cents: share.creator,
                platform_share_cents: share.platform,
                split_profile: share.profile,
                fan_id: event.fan_id,
                fan_username: profile.map(|p| p.username.clone()),
                fan_full_name: profile.and_then(|p| p.full_name.clone()),
                room_id: event.room_id,
                session_id: event.session_id,
                session_duration_seconds: duration,
            }
        })
        .collect();

    let summary = InvoiceSummary {
        gross_collected_cents: lines.iter().map(|l| l.gross_amount_cents).sum(),
        creator_earned_cents: lines.iter().map(|l| l.creator_share_cents).sum(),
        platform_earned_cents: lines.iter().map(|l| l.platform_share_cents).sum(),
        events_count: lines.len(),
        last_event_at: lines.first().map(|l| l.occurred_at),
    };

    Ok(Invoice {
        creator_id,
        year,
        month,
        period_start: window.start,
        period_end: window.end,
        summary,
        lines,
    })
}

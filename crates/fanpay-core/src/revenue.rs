//! Revenue events, their splits, and the sessions they can be tied to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BillingError, RevenueEventId, RoomId, SessionId, UserId};

/// Basis points in 100%.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// What was monetized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueKind {
    /// A tip or gift.
    Tip,
    /// A paid unlock.
    Unlock,
    /// A metered chat charge.
    ChatCharge,
    /// A completed paid request.
    Request,
    /// A flash drop sale.
    Drop,
}

impl RevenueKind {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tip => "tip",
            Self::Unlock => "unlock",
            Self::ChatCharge => "chat_charge",
            Self::Request => "request",
            Self::Drop => "drop",
        }
    }

    /// Parse a stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "tip" => Self::Tip,
            "unlock" => Self::Unlock,
            "chat_charge" => Self::ChatCharge,
            "request" => Self::Request,
            "drop" => Self::Drop,
            _ => return None,
        })
    }
}

/// Settlement state of a revenue event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueStatus {
    /// Money collected.
    Completed,
    /// Awaiting external settlement.
    Pending,
    /// Returned to the fan.
    Refunded,
}

impl RevenueStatus {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Refunded => "refunded",
        }
    }

    /// Parse a stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "completed" => Self::Completed,
            "pending" => Self::Pending,
            "refunded" => Self::Refunded,
            _ => return None,
        })
    }
}

/// One monetized occurrence attributed to a creator. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueEvent {
    /// Event id.
    pub id: RevenueEventId,
    /// Creator credited with the revenue.
    pub creator_id: UserId,
    /// Fan who paid.
    pub fan_id: UserId,
    /// Room the event happened in.
    pub room_id: Option<RoomId>,
    /// Timed session the event belongs to.
    pub session_id: Option<SessionId>,
    /// What was sold.
    pub kind: RevenueKind,
    /// ISO currency code, lower case.
    pub currency: String,
    /// Gross amount in cents.
    pub gross_amount_cents: i64,
    /// Settlement state.
    pub status: RevenueStatus,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

impl RevenueEvent {
    /// A completed event happening now.
    #[must_use]
    pub fn completed(
        creator_id: UserId,
        fan_id: UserId,
        kind: RevenueKind,
        currency: impl Into<String>,
        gross_amount_cents: i64,
    ) -> Self {
        Self {
            id: RevenueEventId::generate(),
            creator_id,
            fan_id,
            room_id: None,
            session_id: None,
            kind,
            currency: currency.into(),
            gross_amount_cents,
            status: RevenueStatus::Completed,
            occurred_at: Utc::now(),
        }
    }

    /// Attach the room.
    #[must_use]
    pub fn in_room(mut self, room_id: Option<RoomId>) -> Self {
        self.room_id = room_id;
        self
    }

    /// Attach a timed session.
    #[must_use]
    pub fn in_session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Who receives a share of a revenue event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Beneficiary {
    /// The creator.
    Creator,
    /// The platform.
    Platform,
    /// A managing agency.
    Agency,
}

impl Beneficiary {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Platform => "platform",
            Self::Agency => "agency",
        }
    }

    /// Parse a stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "creator" => Self::Creator,
            "platform" => Self::Platform,
            "agency" => Self::Agency,
            _ => return None,
        })
    }
}

/// A share of one revenue event. Splits are trusted as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSplit {
    /// The event being split.
    pub event_id: RevenueEventId,
    /// Who gets this share.
    pub beneficiary: Beneficiary,
    /// Share in cents.
    pub amount_cents: i64,
    /// Named split profile (e.g. an agency contract).
    pub split_profile: Option<String>,
}

/// Creator/platform split applied to revenue the platform records itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPolicy {
    /// Platform share in basis points.
    pub platform_fee_bps: i64,
}

impl SplitPolicy {
    /// Build a policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` unless `0 <= platform_fee_bps <= 10000`.
    pub fn new(platform_fee_bps: i64) -> Result<Self, BillingError> {
        if !(0..=BPS_DENOMINATOR).contains(&platform_fee_bps) {
            return Err(BillingError::InvalidInput(format!(
                "platform fee must be between 0 and {BPS_DENOMINATOR} bps"
            )));
        }
        Ok(Self { platform_fee_bps })
    }

    /// Split `event` into creator and platform shares. The platform share rounds
    /// down, so the shares always add up to the gross amount.
    #[must_use]
    pub fn split(&self, event: &RevenueEvent) -> Vec<RevenueSplit> {
        let platform = event.gross_amount_cents * self.platform_fee_bps / BPS_DENOMINATOR;
        let creator = event.gross_amount_cents - platform;

        let mut splits = vec![RevenueSplit {
            event_id: event.id,
            beneficiary: Beneficiary::Creator,
            amount_cents: creator,
            split_profile: None,
        }];
        if platform > 0 {
            splits.push(RevenueSplit {
                event_id: event.id,
                beneficiary: Beneficiary::Platform,
                amount_cents: platform,
                split_profile: None,
            });
        }
        splits
    }
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            platform_fee_bps: 2000,
        }
    }
}

/// A timed activity (live game round, call) that revenue can be tied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySession {
    /// Session id.
    pub id: SessionId,
    /// Room it ran in.
    pub room_id: Option<RoomId>,
    /// Hosting creator.
    pub creator_id: UserId,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time, once finished.
    pub ended_at: Option<DateTime<Utc>>,
}

impl ActivitySession {
    /// Whole seconds between start and end, if the session has ended.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_split_sums_to_gross() {
        let policy = SplitPolicy::new(3000).unwrap();
        let event = RevenueEvent::completed(
            UserId::generate(),
            UserId::generate(),
            RevenueKind::Tip,
            "usd",
            999,
        );
        let splits = policy.split(&event);
        let total: i64 = splits.iter().map(|s| s.amount_cents).sum();
        assert_eq!(total, 999);
        assert_eq!(splits[1].beneficiary, Beneficiary::Platform);
        assert_eq!(splits[1].amount_cents, 299);
    }

    #[test]
    fn zero_fee_has_no_platform_split() {
        let policy = SplitPolicy::new(0).unwrap();
        let event = RevenueEvent::completed(
            UserId::generate(),
            UserId::generate(),
            RevenueKind::Unlock,
            "usd",
            500,
        );
        let splits = policy.split(&event);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].amount_cents, 500);
    }

    #[test]
    fn fee_out_of_range_is_rejected() {
        assert!(SplitPolicy::new(-1).is_err());
        assert!(SplitPolicy::new(10_001).is_err());
    }

    #[test]
    fn session_duration_only_when_ended() {
        let start = Utc::now();
        let mut session = ActivitySession {
            id: SessionId::generate(),
            room_id: None,
            creator_id: UserId::generate(),
            started_at: start,
            ended_at: None,
        };
        assert_eq!(session.duration_seconds(), None);
        session.ended_at = Some(start + chrono::Duration::seconds(754));
        assert_eq!(session.duration_seconds(), Some(754));
    }
}

//! Paid requests: fan-commissioned tasks with an escrowed price.
//!
//! ```text
//! pending --accept--> in_progress --deliver--> delivered --approve--> completed
//!    |                    |
//!    +------reject--------+--> rejected (price refunded to the fan)
//! ```
//!
//! The creator drives `accept`, `reject` and `deliver`; the fan drives `approve`.
//! `completed` and `rejected` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BillingError, RequestId, RoomId, UserId};

/// Longest description a fan may attach.
pub const MAX_REQUEST_DESCRIPTION_LEN: usize = 2000;

/// Lifecycle state of a paid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for the creator.
    Pending,
    /// Accepted and being worked on.
    InProgress,
    /// Content delivered, awaiting fan approval.
    Delivered,
    /// Approved; the creator has been paid.
    Completed,
    /// Declined; the fan has been refunded.
    Rejected,
}

impl RequestStatus {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "delivered" => Self::Delivered,
            "completed" => Self::Completed,
            "rejected" => Self::Rejected,
            _ => return None,
        })
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action requested on a paid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    /// Creator takes the job.
    Accept,
    /// Creator declines; refund the fan.
    Reject,
    /// Creator hands over the content.
    Deliver,
    /// Fan accepts the delivery; pay the creator.
    Approve,
}

impl RequestAction {
    /// States this action may start from.
    #[must_use]
    pub const fn sources(&self) -> &'static [RequestStatus] {
        match self {
            Self::Accept => &[RequestStatus::Pending],
            Self::Reject => &[RequestStatus::Pending, RequestStatus::InProgress],
            Self::Deliver => &[RequestStatus::InProgress],
            Self::Approve => &[RequestStatus::Delivered],
        }
    }

    /// State this action leads to.
    #[must_use]
    pub const fn target(&self) -> RequestStatus {
        match self {
            Self::Accept => RequestStatus::InProgress,
            Self::Reject => RequestStatus::Rejected,
            Self::Deliver => RequestStatus::Delivered,
            Self::Approve => RequestStatus::Completed,
        }
    }

    /// Stable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Deliver => "deliver",
            Self::Approve => "approve",
        }
    }
}

impl FromStr for RequestAction {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            "deliver" => Ok(Self::Deliver),
            "approve" => Ok(Self::Approve),
            other => Err(BillingError::InvalidAction(other.to_string())),
        }
    }
}

/// A fan-to-creator task with a price held in escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidRequest {
    /// Request id.
    pub id: RequestId,
    /// Room the request was made in.
    pub room_id: RoomId,
    /// Fan who pays.
    pub fan_id: UserId,
    /// Creator who fulfils.
    pub creator_id: UserId,
    /// What the fan asked for.
    pub description: String,
    /// Escrowed price in cents.
    pub price_cents: i64,
    /// Current state.
    pub status: RequestStatus,
    /// Content attached on delivery.
    pub delivery_content: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

/// Money that moves when a transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSettlement {
    /// No balance change.
    None,
    /// Return the escrow to the fan.
    RefundFan {
        /// Fan to refund.
        user_id: UserId,
        /// Amount in cents.
        amount_cents: i64,
    },
    /// Release the escrow to the creator.
    PayCreator {
        /// Creator to pay.
        user_id: UserId,
        /// Amount in cents.
        amount_cents: i64,
    },
}

/// A validated transition, ready to be applied atomically by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTransition {
    /// Request being moved.
    pub request_id: RequestId,
    /// Action being applied.
    pub action: RequestAction,
    /// The store must only apply this if the current status is one of these.
    pub expected: &'static [RequestStatus],
    /// New status.
    pub to: RequestStatus,
    /// Delivery content to attach, if any.
    pub delivery_content: Option<String>,
    /// Balance change that goes with the transition.
    pub settlement: RequestSettlement,
}

/// Outcome of planning an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Apply this transition.
    Apply(RequestTransition),
    /// The request is already in the action's target state; nothing to do.
    AlreadyApplied,
}

impl PaidRequest {
    /// Open a new pending request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive price, blank or oversized
    /// description, and `Forbidden` when the fan is also the creator.
    pub fn new(
        room_id: RoomId,
        fan_id: UserId,
        creator_id: UserId,
        description: String,
        price_cents: i64,
    ) -> Result<Self, BillingError> {
        if fan_id == creator_id {
            return Err(BillingError::Forbidden(
                "creators cannot request from themselves".into(),
            ));
        }
        if price_cents <= 0 {
            return Err(BillingError::InvalidInput("price must be positive".into()));
        }
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(BillingError::InvalidInput("description is required".into()));
        }
        if description.len() > MAX_REQUEST_DESCRIPTION_LEN {
            return Err(BillingError::InvalidInput(format!(
                "description is limited to {MAX_REQUEST_DESCRIPTION_LEN} bytes"
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: RequestId::generate(),
            room_id,
            fan_id,
            creator_id,
            description,
            price_cents,
            status: RequestStatus::Pending,
            delivery_content: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Validate `action` by `actor` against the current state.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if `actor` is not the party that drives `action`.
    /// - `InvalidInput` when delivering without content.
    /// - `InvalidTransition` when the current state does not allow `action`.
    pub fn plan(
        &self,
        actor: UserId,
        action: RequestAction,
        delivery_content: Option<String>,
    ) -> Result<TransitionPlan, BillingError> {
        let driver = match action {
            RequestAction::Approve => self.fan_id,
            RequestAction::Accept | RequestAction::Reject | RequestAction::Deliver => {
                self.creator_id
            }
        };
        if actor != driver {
            return Err(BillingError::Forbidden(format!(
                "only the {} may {} this request",
                if action == RequestAction::Approve { "fan" } else { "creator" },
                action.as_str()
            )));
        }

        if self.status == action.target() {
            return Ok(TransitionPlan::AlreadyApplied);
        }
        if !action.sources().contains(&self.status) {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                action: action.as_str().to_string(),
            });
        }

        let delivery_content = match action {
            RequestAction::Deliver => {
                let content = delivery_content
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        BillingError::InvalidInput("deliveryContent is required".into())
                    })?;
                Some(content)
            }
            _ => None,
        };

        let settlement = match action {
            RequestAction::Reject => RequestSettlement::RefundFan {
                user_id: self.fan_id,
                amount_cents: self.price_cents,
            },
            RequestAction::Approve => RequestSettlement::PayCreator {
                user_id: self.creator_id,
                amount_cents: self.price_cents,
            },
            RequestAction::Accept | RequestAction::Deliver => RequestSettlement::None,
        };

        Ok(TransitionPlan::Apply(RequestTransition {
            request_id: self.id,
            action,
            expected: action.sources(),
            to: action.target(),
            delivery_content,
            settlement,
        }))
    }

    /// Apply a planned transition to this in-memory copy.
    pub fn apply(&mut self, transition: &RequestTransition) {
        self.status = transition.to;
        if let Some(content) = &transition.delivery_content {
            self.delivery_content = Some(content.clone());
        }
        self.updated_at = Utc::now();
    }
}

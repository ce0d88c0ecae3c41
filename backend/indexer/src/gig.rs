//! # Gig entities
//!
//! The two collections the indexer maintains:
//!
//! - [`Gig`]: current state of one escrow-backed work order; the aggregate
//!   root, keyed by the on-chain gig id.
//! - [`Activity`]: immutable record of one applied event. Activities are
//!   only ever appended.
//!
//! ## Status
//!
//! [`GigStatus`] mirrors the kind of the last event applied to the gig, so
//! a gig's `status` always equals the `kind` of its newest activity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::events::{EventKind, LogCoordinate};

/// Lifecycle status of a gig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GigStatus {
    GigCreated,
    InviteSent,
    InviteAccepted,
    DraftSubmitted,
    DraftRevised,
    DraftApproved,
    DraftRejected,
    PaymentReleased,
    PaymentRefunded,
    GigExpired,
    GigCancelled,
}

impl GigStatus {
    /// Tag stored in the database and returned by the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GigCreated => "GIG_CREATED",
            Self::InviteSent => "INVITE_SENT",
            Self::InviteAccepted => "INVITE_ACCEPTED",
            Self::DraftSubmitted => "DRAFT_SUBMITTED",
            Self::DraftRevised => "DRAFT_REVISED",
            Self::DraftApproved => "DRAFT_APPROVED",
            Self::DraftRejected => "DRAFT_REJECTED",
            Self::PaymentReleased => "PAYMENT_RELEASED",
            Self::PaymentRefunded => "PAYMENT_REFUNDED",
            Self::GigExpired => "GIG_EXPIRED",
            Self::GigCancelled => "GIG_CANCELLED",
        }
    }
}

impl fmt::Display for GigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GigStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .map(|kind| kind.status())
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown gig status: {s}"))
    }
}

/// One escrow-backed work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gig {
    /// Decimal string of the on-chain `uint256` id.
    pub id: String,
    /// Address funding the escrow.
    pub creator: String,
    /// Assigned ghostwriter, set once on acceptance.
    pub writer: Option<String>,
    /// Escrow value in the token's smallest unit, as a decimal string.
    pub amount: String,
    pub status: GigStatus,
    pub created_at: i64,
    pub last_updated: i64,
}

/// Immutable audit record of one applied event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub gig: String,
    pub kind: GigStatus,
    pub actor: Option<String>,
    pub amount: Option<String>,
    pub timestamp: i64,
    pub block_number: i64,
    pub transaction_hash: Option<String>,
    pub log_index: i64,
}

impl Activity {
    /// Activity id for a log: unique per log coordinate, so two same-kind
    /// events in one block never collide.
    pub fn id_for(gig_id: &str, coordinate: &LogCoordinate) -> String {
        format!(
            "{gig_id}-{}-{}-{}",
            coordinate.block_number, coordinate.transaction_index, coordinate.log_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_tag() {
        for kind in EventKind::ALL {
            let status = kind.status();
            assert_eq!(status.as_str().parse::<GigStatus>(), Ok(status));
        }
        assert!("FUNDED".parse::<GigStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_tag() {
        let json = serde_json::to_string(&GigStatus::DraftApproved).unwrap();
        assert_eq!(json, "\"DRAFT_APPROVED\"");
    }

    #[test]
    fn activity_id_uses_full_log_coordinate() {
        let coordinate = LogCoordinate {
            block_number: 17,
            transaction_index: 2,
            log_index: 5,
            transaction_hash: Some("0xfeed".to_string()),
        };
        assert_eq!(Activity::id_for("234", &coordinate), "234-17-2-5");
    }

    #[test]
    fn gig_serializes_camel_case() {
        let gig = Gig {
            id: "1".to_string(),
            creator: "0xabc".to_string(),
            writer: None,
            amount: "10".to_string(),
            status: GigStatus::GigCreated,
            created_at: 5,
            last_updated: 5,
        };
        let value = serde_json::to_value(&gig).unwrap();
        assert_eq!(value["createdAt"], 5);
        assert_eq!(value["lastUpdated"], 5);
        assert_eq!(value["status"], "GIG_CREATED");
        assert!(value["writer"].is_null());
    }
}

//! Canonical event types emitted by the gig escrow contract.
//!
//! The log feed tags each log with the Solidity event name; [`EventKind`]
//! is the closed set of names this indexer understands.

use serde::{Deserialize, Serialize};

use crate::gig::GigStatus;

/// All recognised event kinds from the escrow contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A creator funded a new gig escrow.
    GigCreated,
    /// The creator invited a ghostwriter.
    InviteSent,
    /// The invited ghostwriter accepted the gig.
    InviteAccepted,
    /// The writer submitted a first draft.
    DraftSubmitted,
    /// The writer submitted a revised draft.
    DraftRevised,
    /// The creator approved the current draft.
    DraftApproved,
    /// The creator rejected the current draft.
    DraftRejected,
    /// Escrowed funds were paid out to the writer.
    PaymentReleased,
    /// Escrowed funds were returned to the creator.
    PaymentRefunded,
    /// The gig deadline passed.
    GigExpired,
    /// The creator cancelled the gig.
    GigCancelled,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        Self::GigCreated,
        Self::InviteSent,
        Self::InviteAccepted,
        Self::DraftSubmitted,
        Self::DraftRevised,
        Self::DraftApproved,
        Self::DraftRejected,
        Self::PaymentReleased,
        Self::PaymentRefunded,
        Self::GigExpired,
        Self::GigCancelled,
    ];

    /// Parse the event signature name attached to a raw log.
    ///
    /// Accepts both the bare name (`GigCreated`) and the full Solidity
    /// signature (`GigCreated(uint256,address,uint256)`).
    pub fn from_signature(signature: &str) -> Option<Self> {
        let name = signature.split('(').next().unwrap_or(signature).trim();
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// The Solidity event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GigCreated => "GigCreated",
            Self::InviteSent => "InviteSent",
            Self::InviteAccepted => "InviteAccepted",
            Self::DraftSubmitted => "DraftSubmitted",
            Self::DraftRevised => "DraftRevised",
            Self::DraftApproved => "DraftApproved",
            Self::DraftRejected => "DraftRejected",
            Self::PaymentReleased => "PaymentReleased",
            Self::PaymentRefunded => "PaymentRefunded",
            Self::GigExpired => "GigExpired",
            Self::GigCancelled => "GigCancelled",
        }
    }

    /// Status a gig is left in once an event of this kind has been applied.
    pub fn status(&self) -> GigStatus {
        match self {
            Self::GigCreated => GigStatus::GigCreated,
            Self::InviteSent => GigStatus::InviteSent,
            Self::InviteAccepted => GigStatus::InviteAccepted,
            Self::DraftSubmitted => GigStatus::DraftSubmitted,
            Self::DraftRevised => GigStatus::DraftRevised,
            Self::DraftApproved => GigStatus::DraftApproved,
            Self::DraftRejected => GigStatus::DraftRejected,
            Self::PaymentReleased => GigStatus::PaymentReleased,
            Self::PaymentRefunded => GigStatus::PaymentRefunded,
            Self::GigExpired => GigStatus::GigExpired,
            Self::GigCancelled => GigStatus::GigCancelled,
        }
    }
}

/// Position of a log in the chain. Logs are delivered in ascending order
/// of `(block_number, transaction_index, log_index)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogCoordinate {
    pub block_number: i64,
    pub transaction_index: i64,
    pub log_index: i64,
    pub transaction_hash: Option<String>,
}

/// A fully decoded escrow event, ready to be projected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigEvent {
    pub kind: EventKind,
    pub gig_id: String,
    pub actor: Option<String>,
    pub amount: Option<String>,
    /// Ghostwriter address named by invite / acceptance events.
    pub writer: Option<String>,
    pub timestamp: i64,
    pub coordinate: LogCoordinate,
}

//! # Gig projector
//!
//! The single authority that turns `(current gig, event)` into
//! `(new gig, new activity)`.
//!
//! [`project`] is pure: it never touches a store, so it can be replayed and
//! tested in isolation. [`apply`] drives it against an [`EntityStore`]:
//!
//! ```text
//! has_activity? ──yes──► Duplicate
//!      │no
//!    load ──► project ──► Discarded (unknown gig / repeated creation)
//!                 │
//!                 └──► save gig ──► append activity ──► Created | Updated
//! ```
//!
//! Atomicity of the save + append pair is the store's commit boundary; the
//! SQLite store runs inside one transaction per polled page.

use tracing::{debug, warn};

use crate::errors::{IndexerError, Result};
use crate::events::{EventKind, GigEvent};
use crate::gig::{Activity, Gig};
use crate::store::EntityStore;

/// Extra field changes an event kind makes beyond `status`/`last_updated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldEffect {
    None,
    /// Set `writer` if it has not been assigned yet.
    AssignWriter,
}

fn field_effect(kind: EventKind) -> FieldEffect {
    match kind {
        EventKind::InviteAccepted => FieldEffect::AssignWriter,
        EventKind::GigCreated
        | EventKind::InviteSent
        | EventKind::DraftSubmitted
        | EventKind::DraftRevised
        | EventKind::DraftApproved
        | EventKind::DraftRejected
        | EventKind::PaymentReleased
        | EventKind::PaymentRefunded
        | EventKind::GigExpired
        | EventKind::GigCancelled => FieldEffect::None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The event references a gig that was never created.
    UnknownGig,
    /// A creation event arrived for a gig that already exists.
    AlreadyCreated,
}

/// New state produced by one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub gig: Gig,
    pub activity: Activity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projected {
    Applied(Projection),
    Discarded(DiscardReason),
}

/// Result of applying one event to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Discarded(DiscardReason),
    /// The event's activity was already recorded; nothing changed.
    Duplicate,
}

/// Compute the gig snapshot and activity for `event` given the gig's prior
/// state.
pub fn project(prior: Option<&Gig>, event: &GigEvent) -> Result<Projected> {
    let gig = match (prior, event.kind) {
        (None, EventKind::GigCreated) => create(event)?,
        (None, _) => return Ok(Projected::Discarded(DiscardReason::UnknownGig)),
        (Some(_), EventKind::GigCreated) => {
            return Ok(Projected::Discarded(DiscardReason::AlreadyCreated))
        }
        (Some(existing), kind) => {
            if event.timestamp < existing.last_updated {
                return Err(IndexerError::OutOfOrder {
                    gig_id: existing.id.clone(),
                    timestamp: event.timestamp,
                    last_updated: existing.last_updated,
                });
            }
            let mut next = existing.clone();
            next.status = kind.status();
            next.last_updated = event.timestamp;
            match field_effect(kind) {
                FieldEffect::AssignWriter if next.writer.is_none() => {
                    next.writer = event.writer.clone().or_else(|| event.actor.clone());
                }
                FieldEffect::AssignWriter | FieldEffect::None => {}
            }
            next
        }
    };

    let activity = Activity {
        id: Activity::id_for(&event.gig_id, &event.coordinate),
        gig: event.gig_id.clone(),
        kind: event.kind.status(),
        actor: event.actor.clone(),
        amount: event.amount.clone(),
        timestamp: event.timestamp,
        block_number: event.coordinate.block_number,
        transaction_hash: event.coordinate.transaction_hash.clone(),
        log_index: event.coordinate.log_index,
    };

    Ok(Projected::Applied(Projection { gig, activity }))
}

fn create(event: &GigEvent) -> Result<Gig> {
    let missing = |field: &str| {
        IndexerError::EventParse(format!(
            "GigCreated for gig {} is missing `{field}`",
            event.gig_id
        ))
    };
    Ok(Gig {
        id: event.gig_id.clone(),
        creator: event.actor.clone().ok_or_else(|| missing("creator"))?,
        writer: None,
        amount: event.amount.clone().ok_or_else(|| missing("amount"))?,
        status: EventKind::GigCreated.status(),
        created_at: event.timestamp,
        last_updated: event.timestamp,
    })
}

/// Apply one event to `store`.
pub async fn apply<S: EntityStore>(store: &mut S, event: &GigEvent) -> Result<Outcome> {
    let activity_id = Activity::id_for(&event.gig_id, &event.coordinate);
    if store.has_activity(&activity_id).await? {
        debug!("Activity {activity_id} already recorded; skipping");
        return Ok(Outcome::Duplicate);
    }

    let prior = store.load(&event.gig_id).await?;
    match project(prior.as_ref(), event)? {
        Projected::Discarded(reason) => {
            match reason {
                DiscardReason::UnknownGig => debug!(
                    "Discarding {} for unknown gig {}",
                    event.kind.as_str(),
                    event.gig_id
                ),
                DiscardReason::AlreadyCreated => {
                    warn!("Ignoring repeated GigCreated for gig {}", event.gig_id)
                }
            }
            Ok(Outcome::Discarded(reason))
        }
        Projected::Applied(Projection { gig, activity }) => {
            store.save(&gig).await?;
            store.append_activity(&activity).await?;
            Ok(if prior.is_some() {
                Outcome::Updated
            } else {
                Outcome::Created
            })
        }
    }
}

/// Per-page counters reported by the indexer loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub updated: usize,
    pub discarded: usize,
    pub duplicates: usize,
}

impl ApplyStats {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Discarded(_) => self.discarded += 1,
            Outcome::Duplicate => self.duplicates += 1,
        }
    }

    /// Events that produced an activity.
    pub fn accepted(&self) -> usize {
        self.created + self.updated
    }
}

/// Apply `events` in order, stopping at the first error.
pub async fn apply_all<S: EntityStore>(store: &mut S, events: &[GigEvent]) -> Result<ApplyStats> {
    let mut stats = ApplyStats::default();
    for event in events {
        stats.record(apply(store, event).await?);
    }
    Ok(stats)
}

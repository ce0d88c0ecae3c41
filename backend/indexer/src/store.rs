//! Entity store abstraction and its in-memory implementation.
//!
//! The projector only ever talks to an [`EntityStore`]; the indexer loop
//! hands it a [`crate::db::SqliteStore`] wrapping one SQLite transaction,
//! tests hand it a [`MemoryStore`].

use std::collections::{BTreeMap, HashSet};

use crate::errors::Result;
use crate::gig::{Activity, Gig};

/// Load/save access to gigs and the append-only activity log.
///
/// Callers invoke these strictly one at a time; implementations need no
/// internal locking.
#[allow(async_fn_in_trait)]
pub trait EntityStore {
    /// Current state of a gig, or `None` if it was never created.
    async fn load(&mut self, gig_id: &str) -> Result<Option<Gig>>;

    /// Whether an activity with this id has already been appended.
    async fn has_activity(&mut self, activity_id: &str) -> Result<bool>;

    /// Insert or replace a gig snapshot.
    async fn save(&mut self, gig: &Gig) -> Result<()>;

    /// Append one activity record.
    async fn append_activity(&mut self, activity: &Activity) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    gigs: BTreeMap<String, Gig>,
    activities: Vec<Activity>,
    activity_ids: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gig(&self, gig_id: &str) -> Option<&Gig> {
        self.gigs.get(gig_id)
    }

    pub fn gigs(&self) -> impl Iterator<Item = &Gig> {
        self.gigs.values()
    }

    /// All activities in append order.
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn activities_for<'a>(&'a self, gig_id: &'a str) -> impl Iterator<Item = &'a Activity> {
        self.activities.iter().filter(move |a| a.gig == gig_id)
    }

    pub fn is_empty(&self) -> bool {
        self.gigs.is_empty() && self.activities.is_empty()
    }
}

impl EntityStore for MemoryStore {
    async fn load(&mut self, gig_id: &str) -> Result<Option<Gig>> {
        Ok(self.gigs.get(gig_id).cloned())
    }

    async fn has_activity(&mut self, activity_id: &str) -> Result<bool> {
        Ok(self.activity_ids.contains(activity_id))
    }

    async fn save(&mut self, gig: &Gig) -> Result<()> {
        self.gigs.insert(gig.id.clone(), gig.clone());
        Ok(())
    }

    async fn append_activity(&mut self, activity: &Activity) -> Result<()> {
        self.activity_ids.insert(activity.id.clone());
        self.activities.push(activity.clone());
        Ok(())
    }
}

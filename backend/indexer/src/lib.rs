//! Gig escrow indexer.
//!
//! Projects the escrow contract's on-chain events into two collections,
//! current [`gig::Gig`] state and the append-only [`gig::Activity`] log:
//!
//! ```text
//! log feed ──► decoder ──► projector ──► entity store (gigs + activities)
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod gig;
pub mod indexer;
pub mod projector;
pub mod rpc;
pub mod store;

// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! Subscription bookkeeping shared between the connection's own subscription
//! table and the per-kind "latest wins" slots used by the Transport/Browse
//! services (spec.md §4.4.9).

use std::sync::atomic::{AtomicU64, Ordering};

/// The domain a server-push subscription belongs to, used only to decide
/// which "latest wins" slot in a service layer a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainType {
    /// `subscribe_zones`.
    Zones,
    /// `subscribe_outputs`.
    Outputs,
    /// `subscribe_queue` for a specific zone/output id.
    Queue,
    /// Any other subscription kind.
    Other,
}

/// A monotonically increasing generation counter used to guard against the
/// stale-termination bug: each time a subscription of some kind is replaced,
/// the slot's key advances, and the old subscription's termination handler
/// must check that its key is still current before tearing down state.
#[derive(Debug, Default)]
pub struct ActiveSlot {
    generation: AtomicU64,
}

impl ActiveSlot {
    /// Create a slot with no subscription installed yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the slot and return the key the newly-installed subscription
    /// should remember.
    pub fn install(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The key of whichever subscription is current right now.
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether `key` is still the active subscription for this slot.
    pub fn is_current(&self, key: u64) -> bool {
        self.current() == key
    }
}

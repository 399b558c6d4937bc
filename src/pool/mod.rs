//! Observer-driven resource pools.
//!
//! A [`Pool`] keeps the set of live resources of one kind in step with the
//! observer. Each tick its [`PoolPolicy`] proposes the candidates that should
//! exist; the pool keeps matching resources, tears down the rest, and creates
//! the missing ones, handing each creation the most recently removed resource
//! as a recycling hint.
//!
//! # Reconciliation pass
//!
//! 1. Every loaded resource starts out unwanted.
//! 2. `generate` runs; each candidate that matches a loaded resource under
//!    `compare` marks it wanted, the others are queued as missing.
//! 3. Unwanted resources go through `remove` and onto the dead stack.
//! 4. Missing candidates are turned into resources by `add`, each receiving
//!    one resource popped off the dead stack (if any).
//! 5. `after_update` sees the final loaded set.
//!
//! The pass runs to completion under `&mut self`; nothing else can touch the
//! loaded or dead lists while it runs.

mod registry;

pub use registry::{PoolRegistry, ReconcilePool};

use crate::config::PoolLimits;
use crate::math::Vec2;
use std::collections::VecDeque;
use std::fmt::Debug;

/// Everything a policy learns about the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Observer position on the ground plane (`x`, `z`)
    pub observer: Vec2,
    /// World time in seconds
    pub world_time: f64,
}

impl TickContext {
    pub fn new(observer: Vec2, world_time: f64) -> Self {
        Self {
            observer,
            world_time,
        }
    }
}

/// Identity of a candidate or resource inside its pool.
pub trait Keyed {
    type Key: PartialEq + Debug;

    fn key(&self) -> Self::Key;
}

/// Per-kind behaviour of a pool.
///
/// `Candidate` is what `generate` proposes; `Resource` is what `add` builds
/// from it. Both share the same key type so the default `compare` can match
/// them by key.
pub trait PoolPolicy {
    type Candidate: Keyed;
    type Resource: Keyed<Key = <Self::Candidate as Keyed>::Key>;

    /// Candidates that should be loaded for this tick. Must be finite.
    fn generate(&mut self, ctx: &TickContext) -> Vec<Self::Candidate>;

    /// Builds a resource for a missing candidate. `recycling` is a resource
    /// that has already been through `remove`; it may be reused or dropped.
    fn add(
        &mut self,
        candidate: Self::Candidate,
        recycling: Option<Self::Resource>,
        ctx: &TickContext,
    ) -> Self::Resource;

    /// Tears down a resource that is no longer wanted.
    fn remove(&mut self, resource: &mut Self::Resource);

    fn compare(&self, loaded: &Self::Resource, candidate: &Self::Candidate) -> bool {
        loaded.key() == candidate.key()
    }

    /// Runs after every pass with the final loaded set.
    fn after_update(&mut self, _loaded: &mut [Self::Resource], _ctx: &TickContext) {}
}

/// Counts of what a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added: usize,
    pub removed: usize,
    pub retained: usize,
}

impl ReconcileStats {
    /// True when the pass neither added nor removed anything.
    pub fn is_quiet(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    pub(crate) fn accumulate(&mut self, other: ReconcileStats) {
        self.added += other.added;
        self.removed += other.removed;
        self.retained += other.retained;
    }
}

/// A named working set of resources driven by a [`PoolPolicy`].
pub struct Pool<P: PoolPolicy> {
    name: String,
    policy: P,
    loaded: Vec<P::Resource>,
    dead: VecDeque<P::Resource>,
    limits: PoolLimits,
    last_stats: ReconcileStats,
}

impl<P: PoolPolicy> Pool<P> {
    pub fn new(name: impl Into<String>, policy: P) -> Self {
        Self::with_limits(name, policy, PoolLimits::default())
    }

    pub fn with_limits(name: impl Into<String>, policy: P, limits: PoolLimits) -> Self {
        Self {
            name: name.into(),
            policy,
            loaded: Vec::new(),
            dead: VecDeque::new(),
            limits,
            last_stats: ReconcileStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn loaded(&self) -> &[P::Resource] {
        &self.loaded
    }

    pub fn dead_len(&self) -> usize {
        self.dead.len()
    }

    pub fn last_stats(&self) -> ReconcileStats {
        self.last_stats
    }

    /// First loaded resource accepted by `predicate`.
    pub fn find(&self, predicate: impl Fn(&P::Resource) -> bool) -> Option<&P::Resource> {
        self.loaded.iter().find(|resource| predicate(resource))
    }

    /// Brings the loaded set in line with the policy for this tick.
    pub fn reconcile(&mut self, ctx: &TickContext) -> ReconcileStats {
        let mut wanted = vec![false; self.loaded.len()];
        let mut missing = Vec::new();

        for candidate in self.policy.generate(ctx) {
            let policy = &self.policy;
            match self
                .loaded
                .iter()
                .position(|resource| policy.compare(resource, &candidate))
            {
                Some(index) => wanted[index] = true,
                None => missing.push(candidate),
            }
        }

        let mut stats = ReconcileStats::default();
        let previous = std::mem::take(&mut self.loaded);
        for (mut resource, keep) in previous.into_iter().zip(wanted) {
            if keep {
                self.loaded.push(resource);
            } else {
                self.policy.remove(&mut resource);
                self.bury(resource);
                stats.removed += 1;
            }
        }
        stats.retained = self.loaded.len();

        for candidate in missing {
            // A policy may propose the same key twice in one pass.
            let policy = &self.policy;
            if self
                .loaded
                .iter()
                .any(|resource| policy.compare(resource, &candidate))
            {
                continue;
            }
            let recycling = self.dead.pop_back();
            let resource = self.policy.add(candidate, recycling, ctx);
            self.loaded.push(resource);
            stats.added += 1;
        }

        self.policy.after_update(&mut self.loaded, ctx);

        if !stats.is_quiet() {
            log::debug!(
                "Pool '{}': +{} -{} ({} retained, {} dead)",
                self.name,
                stats.added,
                stats.removed,
                stats.retained,
                self.dead.len()
            );
        }
        self.last_stats = stats;
        stats
    }

    /// Removes every loaded resource and forgets the recycling stack.
    pub fn clear(&mut self) {
        for mut resource in self.loaded.drain(..) {
            self.policy.remove(&mut resource);
        }
        self.dead.clear();
    }

    fn bury(&mut self, resource: P::Resource) {
        if self.limits.dead_capacity == 0 {
            return;
        }
        if self.dead.len() >= self.limits.dead_capacity {
            self.dead.pop_front();
        }
        self.dead.push_back(resource);
    }
}

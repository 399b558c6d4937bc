use super::{Pool, PoolPolicy, ReconcileStats, TickContext};
use crate::error::{GardenSonicError, Result};
use std::any::Any;

/// Type-erased view of a [`Pool`] so pools of different kinds can be driven
/// from one loop.
pub trait ReconcilePool: Any {
    fn name(&self) -> &str;
    fn reconcile(&mut self, ctx: &TickContext) -> ReconcileStats;
    fn loaded_len(&self) -> usize;
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: PoolPolicy + 'static> ReconcilePool for Pool<P> {
    fn name(&self) -> &str {
        Pool::name(self)
    }

    fn reconcile(&mut self, ctx: &TickContext) -> ReconcileStats {
        Pool::reconcile(self, ctx)
    }

    fn loaded_len(&self) -> usize {
        self.loaded().len()
    }

    fn clear(&mut self) {
        Pool::clear(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Every pool the orchestration loop reconciles, in registration order.
#[derive(Default)]
pub struct PoolRegistry {
    pools: Vec<Box<dyn ReconcilePool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool. Names must be unique.
    pub fn add_pool<P: PoolPolicy + 'static>(&mut self, pool: Pool<P>) -> Result<()> {
        if self.contains(pool.name()) {
            return Err(GardenSonicError::DuplicatePool(pool.name().to_string()));
        }
        log::info!("Registered resource pool '{}'", pool.name());
        self.pools.push(Box::new(pool));
        Ok(())
    }

    /// Unregisters a pool, removing everything it still has loaded.
    pub fn remove_pool(&mut self, name: &str) -> Result<()> {
        let index = self
            .pools
            .iter()
            .position(|pool| pool.name() == name)
            .ok_or_else(|| GardenSonicError::UnknownPool(name.to_string()))?;
        let mut pool = self.pools.remove(index);
        let count = pool.loaded_len();
        pool.clear();
        log::info!("Removed resource pool '{}' ({} resources released)", name, count);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pools.iter().any(|pool| pool.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.pools.iter().map(|pool| pool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Typed access to a registered pool.
    pub fn pool<P: PoolPolicy + 'static>(&self, name: &str) -> Option<&Pool<P>> {
        self.pools
            .iter()
            .find(|pool| pool.name() == name)
            .and_then(|pool| pool.as_any().downcast_ref::<Pool<P>>())
    }

    pub fn pool_mut<P: PoolPolicy + 'static>(&mut self, name: &str) -> Option<&mut Pool<P>> {
        self.pools
            .iter_mut()
            .find(|pool| pool.name() == name)
            .and_then(|pool| pool.as_any_mut().downcast_mut::<Pool<P>>())
    }

    /// Reconciles every pool against the same tick and returns the totals.
    pub fn update_all(&mut self, ctx: &TickContext) -> ReconcileStats {
        let mut total = ReconcileStats::default();
        for pool in &mut self.pools {
            total.accumulate(pool.reconcile(ctx));
        }
        total
    }
}

//! Listener registration and identifier lookup

use crate::core::ProtocolId;
use crate::error::{DispatchError, Result};
use crate::pool::BufferPool;
use crate::queue::BufferQueue;
use crate::stats::{DropCounters, ListenerStats};
use std::sync::Arc;

/// Description of where matched frames go
///
/// A route is only accepted by the dispatcher once both a pool and a queue
/// are set.
#[derive(Clone, Default)]
pub struct RouteBuilder {
    pool: Option<Arc<dyn BufferPool>>,
    queue: Option<Arc<dyn BufferQueue>>,
    drop_partial: bool,
}

impl RouteBuilder {
    /// Create an empty route
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool buffers are taken from
    pub fn with_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the queue filled buffers are pushed into
    pub fn with_queue(mut self, queue: Arc<dyn BufferQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Discard truncated frames instead of forwarding them
    pub fn with_drop_partial(mut self, drop_partial: bool) -> Self {
        self.drop_partial = drop_partial;
        self
    }

    /// Check whether both pool and queue are set
    pub fn is_complete(&self) -> bool {
        self.pool.is_some() && self.queue.is_some()
    }

    pub(crate) fn build(self) -> Result<Endpoint> {
        match (self.pool, self.queue) {
            (Some(pool), Some(queue)) => Ok(Endpoint {
                pool,
                queue,
                drop_partial: self.drop_partial,
                counters: DropCounters::default(),
            }),
            (None, _) => Err(DispatchError::incomplete_route("no buffer pool set")),
            (_, None) => Err(DispatchError::incomplete_route("no queue set")),
        }
    }
}

impl std::fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("has_pool", &self.pool.is_some())
            .field("has_queue", &self.queue.is_some())
            .field("drop_partial", &self.drop_partial)
            .finish()
    }
}

/// A validated route together with its drop counters
pub(crate) struct Endpoint {
    pub(crate) pool: Arc<dyn BufferPool>,
    pub(crate) queue: Arc<dyn BufferQueue>,
    pub(crate) drop_partial: bool,
    pub(crate) counters: DropCounters,
}

impl Endpoint {
    /// Check whether frames on this route end up in `queue`
    pub(crate) fn targets<Q: BufferQueue + ?Sized>(&self, queue: &Q) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.queue), queue as *const Q)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("block_size", &self.pool.block_size())
            .field("drop_partial", &self.drop_partial)
            .field("counters", &self.counters)
            .finish()
    }
}

#[derive(Debug)]
struct Listener<Id> {
    id: Id,
    endpoint: Endpoint,
}

/// Fixed-capacity table of up to `N` listeners plus one optional default
///
/// Backed by an inline array; registering never grows it and lookups never
/// allocate. Listeners are never removed.
#[derive(Debug)]
pub(crate) struct Registry<Id, const N: usize> {
    listeners: heapless::Vec<Listener<Id>, N>,
    default: Option<Endpoint>,
}

impl<Id: ProtocolId, const N: usize> Registry<Id, N> {
    pub(crate) fn new() -> Self {
        Registry {
            listeners: heapless::Vec::new(),
            default: None,
        }
    }

    /// Append a listener for `id`
    ///
    /// Identifiers are not checked for duplicates; the earlier registration
    /// shadows later ones.
    pub(crate) fn add(&mut self, id: Id, route: RouteBuilder) -> Result<()> {
        let endpoint = route.build()?;
        self.listeners
            .push(Listener { id, endpoint })
            .map_err(|_| DispatchError::registry_full(format!("all {} listener slots in use", N)))
    }

    /// Install the catch-all route
    pub(crate) fn set_default(&mut self, route: RouteBuilder) -> Result<()> {
        if self.default.is_some() {
            return Err(DispatchError::DefaultAlreadySet);
        }
        self.default = Some(route.build()?);
        Ok(())
    }

    /// Find the route for a frame
    ///
    /// The first listener registered for `id` wins; without an identifier or
    /// a match the default route is used, if any.
    pub(crate) fn resolve(&mut self, id: Option<Id>) -> Option<&mut Endpoint> {
        let matched = id.and_then(|id| self.listeners.iter_mut().find(|l| l.id == id));
        match matched {
            Some(listener) => Some(&mut listener.endpoint),
            None => self.default.as_mut(),
        }
    }

    /// All routes in registration order, default last
    pub(crate) fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.listeners
            .iter()
            .map(|l| &l.endpoint)
            .chain(self.default.iter())
    }

    pub(crate) fn endpoints_mut(&mut self) -> impl Iterator<Item = &mut Endpoint> {
        self.listeners
            .iter_mut()
            .map(|l| &mut l.endpoint)
            .chain(self.default.iter_mut())
    }

    /// Counters of every route, default last
    pub(crate) fn listener_stats(&self) -> Vec<ListenerStats> {
        let registered = self.listeners.iter().map(|l| ListenerStats {
            id: Some(format!("{:?}", l.id)),
            drop_partial: l.endpoint.drop_partial,
            counters: l.endpoint.counters,
        });
        let default = self.default.iter().map(|d| ListenerStats {
            id: None,
            drop_partial: d.drop_partial,
            counters: d.counters,
        });
        registered.chain(default).collect()
    }

    /// Number of registered listeners, excluding the default
    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FixedBlockPool;
    use crate::queue::BoundedQueue;

    fn route() -> RouteBuilder {
        RouteBuilder::new()
            .with_pool(Arc::new(FixedBlockPool::new(1, 16)))
            .with_queue(Arc::new(BoundedQueue::new(1)))
    }

    #[test]
    fn test_route_completeness() {
        assert!(!RouteBuilder::new().is_complete());
        assert!(route().is_complete());

        let pool_only = RouteBuilder::new().with_pool(Arc::new(FixedBlockPool::new(1, 16)));
        assert!(matches!(
            pool_only.build(),
            Err(DispatchError::IncompleteRoute(_))
        ));

        let queue_only = RouteBuilder::new().with_queue(Arc::new(BoundedQueue::new(1)));
        assert!(matches!(
            queue_only.build(),
            Err(DispatchError::IncompleteRoute(_))
        ));
    }

    #[test]
    fn test_registry_capacity() -> Result<()> {
        let mut registry = Registry::<u8, 2>::new();
        registry.add(1, route())?;
        registry.add(2, route())?;

        let err = registry.add(3, route()).unwrap_err();
        assert!(matches!(err, DispatchError::RegistryFull(_)));
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve(Some(3)).is_none());
        Ok(())
    }

    #[test]
    fn test_first_registration_wins() -> Result<()> {
        let mut registry = Registry::<u8, 4>::new();
        registry.add(7, route().with_drop_partial(true))?;
        registry.add(7, route())?;

        let endpoint = registry.resolve(Some(7)).unwrap();
        assert!(endpoint.drop_partial);
        Ok(())
    }

    #[test]
    fn test_default_resolution() -> Result<()> {
        let mut registry = Registry::<u16, 4>::new();
        registry.add(1, route())?;
        assert!(registry.resolve(Some(2)).is_none());
        assert!(registry.resolve(None).is_none());

        registry.set_default(route().with_drop_partial(true))?;
        assert!(registry.resolve(Some(2)).unwrap().drop_partial);
        assert!(registry.resolve(None).unwrap().drop_partial);
        assert!(!registry.resolve(Some(1)).unwrap().drop_partial);

        assert_eq!(
            registry.set_default(route()).unwrap_err(),
            DispatchError::DefaultAlreadySet
        );
        assert_eq!(registry.endpoints().count(), 2);
        Ok(())
    }

    #[test]
    fn test_endpoint_targets_queue() -> Result<()> {
        let shared = Arc::new(BoundedQueue::new(1));
        let other = BoundedQueue::new(1);

        let mut registry = Registry::<u8, 4>::new();
        registry.add(
            1,
            RouteBuilder::new()
                .with_pool(Arc::new(FixedBlockPool::new(1, 16)))
                .with_queue(shared.clone()),
        )?;

        let endpoint = registry.endpoints().next().unwrap();
        assert!(endpoint.targets(&*shared));
        assert!(!endpoint.targets(&other));
        Ok(())
    }

    #[test]
    fn test_listener_stats_order() -> Result<()> {
        let mut registry = Registry::<u8, 4>::new();
        registry.set_default(route())?;
        registry.add(9, route())?;

        let stats = registry.listener_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].id.as_deref(), Some("9"));
        assert_eq!(stats[1].id, None);
        Ok(())
    }
}

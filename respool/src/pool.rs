// Copyright 2025 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The bounded resource pool.
//!
//! A [`Pool`] caps the number of resources that exist at once at `max_active`. An acquire first
//! reuses an idle resource, discarding the ones that idled past `idle_timeout`; otherwise it
//! creates a new one while there is room; otherwise it joins a wait queue of at most `max_wait`
//! callers for at most `max_wait_time`.
//!
//! A single mutex guards the idle queue, the active and waiting counters, the waiter registry
//! and the lifecycle state. It is never held across the factory, the closer or an await point.

use std::collections::VecDeque;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::Weak;

use scopeguard::ScopeGuard;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::ManageResource;
use crate::PoolConfig;
use crate::PoolError;
use crate::ResourceStatus;
use crate::mutex::Mutex;

/// The lifecycle state of a [`Pool`].
///
/// The state only moves forward: `Running` → `ShuttingDown` → `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    /// The pool hands out resources.
    Running,
    /// [`Pool::shutdown`] is closing the idle resources.
    ShuttingDown,
    /// All idle resources have been closed.
    Stopped,
}

/// The current pool status.
///
/// See [`Pool::status`].
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct PoolStatus {
    /// The maximum number of resources.
    pub max_active: usize,

    /// The number of resources that exist: idle, checked out, being created in a reserved slot,
    /// or on their way to a waiting caller.
    pub current_active: usize,

    /// The number of idle resources in the pool.
    pub idle_count: usize,

    /// The number of callers waiting for a resource.
    pub wait_count: usize,
}

/// Generic async resource pool with a maximum size and a bounded wait queue.
///
/// A pool is always handed out wrapped in an [`Arc`]; checked-out resources keep a [`Weak`]
/// reference back to it.
pub struct Pool<M: ManageResource> {
    config: PoolConfig,
    manager: M,
    slots: Mutex<Slots<M::Resource>>,
}

struct Slots<T> {
    idle: VecDeque<ResourceState<T>>,
    waiters: VecDeque<Waiter<T>>,
    next_waiter_id: u64,
    current_active: usize,
    current_waiting: usize,
    state: PoolState,
}

impl<T> Slots<T> {
    /// Hands `handoff` to the longest waiting caller, or gives back the very same handoff if
    /// nobody is waiting.
    fn offer(&mut self, mut handoff: Handoff<T>) -> Result<(), Handoff<T>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(handoff) {
                Ok(()) => return Ok(()),
                Err(rejected) => handoff = rejected,
            }
        }
        Err(handoff)
    }
}

impl<T> std::fmt::Debug for Slots<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slots")
            .field("idle", &self.idle.len())
            .field("waiters", &self.waiters.len())
            .field("current_active", &self.current_active)
            .field("current_waiting", &self.current_waiting)
            .field("state", &self.state)
            .finish()
    }
}

struct Waiter<T> {
    id: u64,
    tx: oneshot::Sender<Handoff<T>>,
}

/// What a blocked acquire can be woken up with.
enum Handoff<T> {
    /// A resource that was just released.
    Resource(ResourceState<T>),
    /// A reserved creation slot, freed by a closed or evicted resource.
    Slot,
}

enum Next<T> {
    Idle(ResourceState<T>),
    Create,
    Wait(u64, oneshot::Receiver<Handoff<T>>),
}

impl<M: ManageResource> std::fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("slots", &self.slots)
            .finish()
    }
}

impl<M: ManageResource> Pool<M> {
    /// Creates a new [`Pool`] and fills it with `min_active` resources.
    ///
    /// Fails with [`PoolError::Config`] before creating anything if the configuration is invalid.
    /// If the factory fails during warm-up, the resources created so far are closed and the
    /// factory error is returned.
    pub async fn new(config: PoolConfig, manager: M) -> Result<Arc<Self>, PoolError<M::Error>> {
        config.validate()?;

        let slots = Mutex::new(Slots {
            idle: VecDeque::with_capacity(config.max_active),
            waiters: VecDeque::new(),
            next_waiter_id: 0,
            current_active: 0,
            current_waiting: 0,
            state: PoolState::Running,
        });
        let pool = Arc::new(Self {
            config,
            manager,
            slots,
        });

        for _ in 0..config.min_active {
            match pool.manager.create().await {
                Ok(resource) => {
                    let mut state = ResourceState::new(resource);
                    state.status.last_idle = Some(Instant::now());

                    let mut slots = pool.slots.lock();
                    slots.current_active += 1;
                    slots.idle.push_back(state);
                }
                Err(err) => {
                    // The pool is never handed out; close whatever was warmed so far.
                    if let Err(close_err) = pool.shutdown() {
                        tracing::warn!(
                            error = ?close_err,
                            "failed to close warmed resources after warm-up failure"
                        );
                    }
                    return Err(PoolError::Factory(err));
                }
            }
        }

        tracing::debug!(
            min_active = config.min_active,
            max_active = config.max_active,
            "resource pool is ready"
        );
        Ok(pool)
    }

    /// Retrieves a resource from this [`Pool`].
    ///
    /// This method should be called with a pool wrapped in an [`Arc`]. In order:
    ///
    /// 1. Idle resources are popped until one is found that has not idled past `idle_timeout`.
    ///    Stale ones are closed on the way.
    /// 2. If fewer than `max_active` resources exist, a slot is reserved and a new resource is
    ///    created. A factory failure releases the slot and is returned as
    ///    [`PoolError::Factory`].
    /// 3. If `max_wait` callers are already waiting, fails with
    ///    [`PoolError::WaitQueueOverflow`] without blocking.
    /// 4. Otherwise waits up to `max_wait_time` for a released resource, failing with
    ///    [`PoolError::WaitTimeout`].
    ///
    /// Dropping the returned future while it waits leaves the wait queue as it was.
    pub async fn acquire(self: &Arc<Self>) -> Result<Pooled<M>, PoolError<M::Error>> {
        loop {
            let next = {
                let mut slots = self.slots.lock();
                if slots.state != PoolState::Running {
                    return Err(PoolError::Closed);
                }

                if let Some(state) = slots.idle.pop_front() {
                    Next::Idle(state)
                } else if slots.current_active < self.config.max_active {
                    slots.current_active += 1;
                    Next::Create
                } else if slots.current_waiting >= self.config.max_wait {
                    return Err(PoolError::WaitQueueOverflow {
                        max_wait: self.config.max_wait,
                    });
                } else {
                    let id = slots.next_waiter_id;
                    slots.next_waiter_id += 1;
                    slots.current_waiting += 1;
                    let (tx, rx) = oneshot::channel();
                    slots.waiters.push_back(Waiter { id, tx });
                    Next::Wait(id, rx)
                }
            };

            match next {
                Next::Idle(state) => {
                    if state
                        .status
                        .is_idle_expired(self.config.idle_timeout, Instant::now())
                    {
                        self.evict(state);
                        continue;
                    }
                    return Ok(self.ready(state));
                }
                Next::Create => return self.create_in_reserved_slot().await,
                Next::Wait(id, rx) => return self.wait(id, rx).await,
            }
        }
    }

    /// Returns a resource to this [`Pool`].
    ///
    /// The resource goes to a waiting caller if there is one. Otherwise it is kept idle while
    /// the pool holds no more than `min_active` resources or fewer than `min_active + max_idle`
    /// are idle, and closed if not. After [`Pool::shutdown`] it is always closed.
    ///
    /// A closer error is returned, but the resource no longer counts toward the pool.
    ///
    /// # Panics
    ///
    /// Panics if `resource` was acquired from another pool.
    pub fn release(&self, mut resource: Pooled<M>) -> Result<(), M::Error> {
        let state = self.take_owned(&mut resource);
        self.recycle(state)
    }

    /// Closes a resource regardless of the idle policy, e.g. because the caller knows it is
    /// broken.
    ///
    /// # Panics
    ///
    /// Panics if `resource` was acquired from another pool.
    pub fn close(&self, mut resource: Pooled<M>) -> Result<(), M::Error> {
        let state = self.take_owned(&mut resource);
        self.retire(state.resource)
    }

    /// Shuts down this [`Pool`], closing all idle resources.
    ///
    /// Closing continues past failures; the last closer error is returned. Callers already
    /// waiting are not interrupted and time out unless a resource is released to them first.
    /// Resources released afterward are closed immediately, and [`Pool::acquire`] fails with
    /// [`PoolError::Closed`]. Calling this again has no effect.
    pub fn shutdown(&self) -> Result<(), M::Error> {
        let drained = {
            let mut slots = self.slots.lock();
            if slots.state != PoolState::Running {
                return Ok(());
            }
            slots.state = PoolState::ShuttingDown;
            std::mem::take(&mut slots.idle)
        };

        tracing::debug!(idle = drained.len(), "shutting down resource pool");
        let mut result = Ok(());
        for state in drained {
            if let Err(err) = self.retire(state.resource) {
                tracing::warn!(error = ?err, "failed to close idle resource during shutdown");
                result = Err(err);
            }
        }

        self.slots.lock().state = PoolState::Stopped;
        result
    }

    /// Returns the current status of the pool.
    pub fn status(&self) -> PoolStatus {
        let slots = self.slots.lock();
        PoolStatus {
            max_active: self.config.max_active,
            current_active: slots.current_active,
            idle_count: slots.idle.len(),
            wait_count: slots.current_waiting,
        }
    }

    /// Returns the lifecycle state of the pool.
    pub fn state(&self) -> PoolState {
        self.slots.lock().state
    }

    /// Returns the configuration of the pool.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the manager of the pool.
    pub fn manager(&self) -> &M {
        &self.manager
    }

    async fn create_in_reserved_slot(
        self: &Arc<Self>,
    ) -> Result<Pooled<M>, PoolError<M::Error>> {
        // Gives the slot back if the factory fails or the future is dropped.
        let slot = scopeguard::guard((), |()| self.free_slot());

        let resource = self.manager.create().await.map_err(PoolError::Factory)?;
        ScopeGuard::into_inner(slot);

        if self.state() != PoolState::Running {
            if let Err(err) = self.retire(resource) {
                tracing::warn!(error = ?err, "failed to close resource created during shutdown");
            }
            return Err(PoolError::Closed);
        }

        tracing::debug!("created new resource");
        Ok(Pooled {
            state: Some(ResourceState::new(resource)),
            pool: Arc::downgrade(self),
        })
    }

    async fn wait(
        self: &Arc<Self>,
        id: u64,
        rx: oneshot::Receiver<Handoff<M::Resource>>,
    ) -> Result<Pooled<M>, PoolError<M::Error>> {
        let mut rx = scopeguard::guard(rx, |mut rx| {
            if let Some(handoff) = self.leave_wait_queue(id, &mut rx) {
                self.give_back(handoff);
            }
        });
        let received = tokio::time::timeout(self.config.max_wait_time, &mut *rx).await;
        let mut rx = ScopeGuard::into_inner(rx);

        let timed_out = received.is_err();
        let handoff = match received {
            Ok(Ok(handoff)) => {
                self.slots.lock().current_waiting -= 1;
                Some(handoff)
            }
            Ok(Err(_)) | Err(_) => self.leave_wait_queue(id, &mut rx),
        };

        match handoff {
            Some(Handoff::Resource(state)) => Ok(self.ready(state)),
            Some(Handoff::Slot) => self.create_in_reserved_slot().await,
            None if timed_out => Err(PoolError::WaitTimeout(self.config.max_wait_time)),
            // the sender went away without a handoff
            None => Err(PoolError::Closed),
        }
    }

    /// Removes waiter `id` from the wait queue.
    ///
    /// Returns what was handed to it if a releaser got to it first.
    fn leave_wait_queue(
        &self,
        id: u64,
        rx: &mut oneshot::Receiver<Handoff<M::Resource>>,
    ) -> Option<Handoff<M::Resource>> {
        let mut slots = self.slots.lock();
        slots.current_waiting -= 1;
        if let Some(pos) = slots.waiters.iter().position(|w| w.id == id) {
            slots.waiters.remove(pos);
            return None;
        }
        drop(slots);

        // Handoffs are sent under the lock together with the removal, so it is already here.
        rx.try_recv().ok()
    }

    fn give_back(&self, handoff: Handoff<M::Resource>) {
        match handoff {
            Handoff::Resource(state) => {
                if let Err(err) = self.recycle(state) {
                    tracing::warn!(error = ?err, "failed to close resource of abandoned acquire");
                }
            }
            Handoff::Slot => self.free_slot(),
        }
    }

    fn ready(self: &Arc<Self>, mut state: ResourceState<M::Resource>) -> Pooled<M> {
        state.status.reuse_count += 1;
        Pooled {
            state: Some(state),
            pool: Arc::downgrade(self),
        }
    }

    fn evict(&self, state: ResourceState<M::Resource>) {
        tracing::debug!(
            reuse_count = state.status.reuse_count,
            "evicting resource idle past timeout"
        );
        if let Err(err) = self.retire(state.resource) {
            tracing::warn!(error = ?err, "failed to close evicted resource");
        }
    }

    /// Closes a resource that leaves the pool, then gives up its slot.
    ///
    /// The slot is given up even if the closer fails.
    fn retire(&self, resource: M::Resource) -> Result<(), M::Error> {
        let result = self.manager.close(resource);
        self.free_slot();
        result
    }

    /// Gives up one counted slot, handing it to a waiter while the pool is running.
    fn free_slot(&self) {
        let mut slots = self.slots.lock();
        if slots.state == PoolState::Running && slots.offer(Handoff::Slot).is_ok() {
            return;
        }
        slots.current_active -= 1;
    }

    fn recycle(&self, mut state: ResourceState<M::Resource>) -> Result<(), M::Error> {
        let mut slots = self.slots.lock();

        assert!(
            slots.current_active <= self.config.max_active,
            "invariant broken: current_active <= max_active (actual: {} <= {})",
            slots.current_active,
            self.config.max_active,
        );

        if slots.state == PoolState::Running {
            state.status.last_idle = Some(Instant::now());
            let Err(Handoff::Resource(state)) = slots.offer(Handoff::Resource(state)) else {
                return Ok(());
            };

            if slots.current_active <= self.config.min_active
                || slots.idle.len() < self.config.idle_capacity()
            {
                assert!(
                    slots.idle.len() < self.config.max_active,
                    "invariant broken: idle < max_active (actual: {} < {})",
                    slots.idle.len(),
                    self.config.max_active,
                );
                slots.idle.push_back(state);
                return Ok(());
            }

            drop(slots);
            tracing::debug!("closing surplus idle resource");
            return self.retire(state.resource);
        }

        drop(slots);
        self.retire(state.resource)
    }

    fn take_owned(&self, resource: &mut Pooled<M>) -> ResourceState<M::Resource> {
        assert!(
            std::ptr::eq(resource.pool.as_ptr(), self),
            "resource returned to a pool that does not own it"
        );
        // SAFETY: `state` is always `Some` when `Pooled` is owned.
        resource.state.take().unwrap()
    }
}

impl<M: ManageResource> Drop for Pool<M> {
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.slots.lock().idle);
        for state in idle {
            if let Err(err) = self.manager.close(state.resource) {
                tracing::warn!(error = ?err, "failed to close idle resource on pool drop");
            }
        }
    }
}

/// A resource checked out of a [`Pool`].
///
/// This guard implements [`Deref`] and [`DerefMut`]. You can use it as if it was of type
/// `M::Resource`.
///
/// Hand it back with [`Pool::release`] or discard it with [`Pool::close`] to observe closer
/// errors. Dropping the guard releases the resource as well, logging any closer error. If the
/// pool itself is gone by then, the resource is simply dropped.
pub struct Pooled<M: ManageResource> {
    state: Option<ResourceState<M::Resource>>,
    pool: Weak<Pool<M>>,
}

impl<M> std::fmt::Debug for Pooled<M>
where
    M: ManageResource,
    M::Resource: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("state", &self.state)
            .finish()
    }
}

impl<M: ManageResource> Drop for Pooled<M> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            if let Some(pool) = self.pool.upgrade() {
                if let Err(err) = pool.recycle(state) {
                    tracing::warn!(error = ?err, "failed to close dropped resource");
                }
            }
        }
    }
}

impl<M: ManageResource> Deref for Pooled<M> {
    type Target = M::Resource;
    fn deref(&self) -> &M::Resource {
        // SAFETY: `state` is always `Some` when `Pooled` is owned.
        &self.state.as_ref().unwrap().resource
    }
}

impl<M: ManageResource> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: `state` is always `Some` when `Pooled` is owned.
        &mut self.state.as_mut().unwrap().resource
    }
}

impl<M: ManageResource> AsRef<M::Resource> for Pooled<M> {
    fn as_ref(&self) -> &M::Resource {
        self
    }
}

impl<M: ManageResource> AsMut<M::Resource> for Pooled<M> {
    fn as_mut(&mut self) -> &mut M::Resource {
        self
    }
}

impl<M: ManageResource> Pooled<M> {
    /// Returns the status of the resource.
    pub fn status(&self) -> ResourceStatus {
        // SAFETY: `state` is always `Some` when `Pooled` is owned.
        self.state.as_ref().unwrap().status
    }
}

#[derive(Debug)]
struct ResourceState<T> {
    resource: T,
    status: ResourceStatus,
}

impl<T> ResourceState<T> {
    fn new(resource: T) -> Self {
        Self {
            resource,
            status: ResourceStatus::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;

    #[derive(Default, Clone)]
    struct Counter {
        created: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl ManageResource for Counter {
        type Resource = usize;
        type Error = Infallible;

        async fn create(&self) -> Result<usize, Infallible> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        fn close(&self, _: usize) -> Result<(), Infallible> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_waiter_registry_is_cleaned_on_timeout() {
        let config = PoolConfig::new(1)
            .with_max_wait(2)
            .with_max_wait_time(Duration::from_millis(10));
        let pool = Pool::new(config, Counter::default()).await.unwrap();

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::WaitTimeout(_)));

        let slots = pool.slots.lock();
        assert!(slots.waiters.is_empty());
        assert_eq!(slots.current_waiting, 0);
        assert_eq!(slots.current_active, 1);
        drop(slots);

        pool.release(held).unwrap();
        assert_eq!(pool.status().idle_count, 1);
    }

    #[test]
    fn test_offer_skips_abandoned_waiters() {
        let mut slots = Slots::<usize> {
            idle: VecDeque::new(),
            waiters: VecDeque::new(),
            next_waiter_id: 0,
            current_active: 1,
            current_waiting: 0,
            state: PoolState::Running,
        };

        let (tx, rx) = oneshot::channel();
        drop(rx);
        slots.waiters.push_back(Waiter { id: 0, tx });
        let (tx, mut rx) = oneshot::channel();
        slots.waiters.push_back(Waiter { id: 1, tx });

        assert!(slots.offer(Handoff::Slot).is_ok());
        assert!(slots.waiters.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Handoff::Slot)));
        assert!(slots.offer(Handoff::Slot).is_err());
    }

    #[tokio::test]
    async fn test_drop_closes_idle_resources() {
        let manager = Counter::default();
        let closed = manager.closed.clone();
        let pool = Pool::new(PoolConfig::new(3).with_min_active(3), manager)
            .await
            .unwrap();
        let pooled = pool.acquire().await.unwrap();

        drop(pool);
        assert_eq!(closed.load(Ordering::SeqCst), 2);

        // the pool is gone, so the guard has nowhere to return to
        drop(pooled);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}

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

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Statistics regarding a resource handed out by the pool.
#[derive(Debug, Clone, Copy)]
pub struct ResourceStatus {
    created: Instant,
    pub(crate) last_idle: Option<Instant>,
    pub(crate) reuse_count: usize,
}

impl ResourceStatus {
    pub(crate) fn new() -> Self {
        Self {
            created: Instant::now(),
            last_idle: None,
            reuse_count: 0,
        }
    }

    /// Returns the instant when this resource was created.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Returns the instant when this resource last entered the idle queue, or its creation time
    /// if it was never returned to the pool.
    pub fn last_idle(&self) -> Instant {
        self.last_idle.unwrap_or(self.created)
    }

    /// Returns the number of times the resource was handed out again after a release.
    pub fn reuse_count(&self) -> usize {
        self.reuse_count
    }

    /// Whether the resource sat idle for longer than `idle_timeout` as of `now`.
    ///
    /// A zero `idle_timeout` disables eviction.
    pub(crate) fn is_idle_expired(&self, idle_timeout: Duration, now: Instant) -> bool {
        if idle_timeout.is_zero() {
            return false;
        }
        self.last_idle() + idle_timeout < now
    }
}

/// A trait whose instance creates new resources and closes the ones the pool gives up.
///
/// The pool calls [`ManageResource::create`] without holding any lock, so creation may run
/// concurrently for several callers. [`ManageResource::close`] is synchronous: it is invoked
/// from `release`, `close`, `shutdown`, and from the drop of a [`Pooled`](crate::Pooled) guard.
pub trait ManageResource: Send + Sync {
    /// The type of resources that this instance creates and closes.
    type Resource: Send;

    /// The type of errors that this instance can return.
    type Error: Send + fmt::Debug;

    /// Creates a new resource.
    fn create(&self) -> impl Future<Output = Result<Self::Resource, Self::Error>> + Send;

    /// Releases the underlying handle of a resource that leaves the pool for good.
    fn close(&self, resource: Self::Resource) -> Result<(), Self::Error>;
}

/// A [`ManageResource`] built from a factory closure and a closer closure.
///
/// See [`manage_fn`].
#[derive(Clone)]
pub struct ManageFn<F, C> {
    factory: F,
    closer: C,
}

impl<F, C> fmt::Debug for ManageFn<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManageFn").finish_non_exhaustive()
    }
}

/// Creates a [`ManageResource`] from a factory and a closer.
///
/// ```
/// use std::convert::Infallible;
///
/// let manager = respool::manage_fn(
///     || async { Ok::<_, Infallible>(String::from("conn")) },
///     |_conn: String| Ok(()),
/// );
/// # let _ = manager;
/// ```
pub fn manage_fn<F, Fut, C, R, E>(factory: F, closer: C) -> ManageFn<F, C>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send,
    C: Fn(R) -> Result<(), E> + Send + Sync,
    R: Send,
    E: Send + fmt::Debug,
{
    ManageFn { factory, closer }
}

impl<F, Fut, C, R, E> ManageResource for ManageFn<F, C>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send,
    C: Fn(R) -> Result<(), E> + Send + Sync,
    R: Send,
    E: Send + fmt::Debug,
{
    type Resource = R;
    type Error = E;

    fn create(&self) -> impl Future<Output = Result<R, E>> + Send {
        (self.factory)()
    }

    fn close(&self, resource: R) -> Result<(), E> {
        (self.closer)(resource)
    }
}

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

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use respool::ManageResource;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TestError(pub &'static str);

#[derive(Debug)]
pub struct Conn {
    pub id: usize,
}

impl Conn {
    pub async fn doit(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// A manager that records every create and close.
#[derive(Clone, Default)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    create_delay: Duration,
    created: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    closed_ids: Mutex<Vec<usize>>,
    fail_create_from: AtomicUsize,
    fail_create: AtomicBool,
    fail_close: AtomicBool,
}

impl Tracker {
    pub fn new() -> Self {
        Self::with_create_delay(Duration::ZERO)
    }

    pub fn with_create_delay(create_delay: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                create_delay,
                fail_create_from: AtomicUsize::new(usize::MAX),
                ..TrackerInner::default()
            }),
        }
    }

    /// Makes the factory fail once `n` resources have been created.
    pub fn fail_create_from(&self, n: usize) {
        self.inner.fail_create_from.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.inner.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.inner.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed_ids().len()
    }

    pub fn closed_ids(&self) -> Vec<usize> {
        self.inner.closed_ids.lock().unwrap().clone()
    }

    /// Resources created and not closed yet.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.inner.peak_live.load(Ordering::SeqCst)
    }
}

impl ManageResource for Tracker {
    type Resource = Conn;
    type Error = TestError;

    async fn create(&self) -> Result<Conn, TestError> {
        if !self.inner.create_delay.is_zero() {
            tokio::time::sleep(self.inner.create_delay).await;
        }
        if self.inner.fail_create.load(Ordering::SeqCst)
            || self.created() >= self.inner.fail_create_from.load(Ordering::SeqCst)
        {
            return Err(TestError("factory refused"));
        }

        let id = self.inner.created.fetch_add(1, Ordering::SeqCst);
        let live = self.inner.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(Conn { id })
    }

    fn close(&self, conn: Conn) -> Result<(), TestError> {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
        self.inner.closed_ids.lock().unwrap().push(conn.id);
        if self.inner.fail_close.load(Ordering::SeqCst) {
            return Err(TestError("closer refused"));
        }
        Ok(())
    }
}

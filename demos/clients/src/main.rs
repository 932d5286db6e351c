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

//! Thirty clients share a pool of ten slow connections.
//!
//! Run with `RUST_LOG=debug` to see the pool create, hand over, trim and evict connections.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use respool::ManageResource;
use respool::Pool;
use respool::PoolConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("connection refused")]
struct ConnectError;

#[derive(Debug)]
struct Client {
    id: usize,
}

impl Client {
    async fn doit(&self) {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tracing::info!(client = self.id, "doit");
    }
}

#[derive(Default)]
struct ManageClient {
    next_id: AtomicUsize,
}

impl ManageResource for ManageClient {
    type Resource = Client;
    type Error = ConnectError;

    async fn create(&self) -> Result<Self::Resource, Self::Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(client = id, "new");
        Ok(Client { id })
    }

    fn close(&self, client: Self::Resource) -> Result<(), Self::Error> {
        tracing::info!(client = client.id, "close");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = PoolConfig::new(10)
        .with_min_active(5)
        .with_max_idle(2)
        .with_max_wait(20)
        .with_max_wait_time(Duration::from_secs(1))
        .with_idle_timeout(Duration::from_secs(5));
    let pool = Pool::new(config, ManageClient::default()).await.unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    run_clients(&pool, &done, 30).await;
    println!("{:?}", pool.status());

    // let the idle connections expire before the second wave
    tokio::time::sleep(Duration::from_secs(6)).await;
    run_clients(&pool, &done, 5).await;
    println!("{:?}", pool.status());

    if let Err(err) = pool.shutdown() {
        eprintln!("Failed to close some connections: {err}");
    }
    println!("{} calls completed", done.load(Ordering::Relaxed));
}

async fn run_clients(pool: &Arc<Pool<ManageClient>>, done: &Arc<AtomicUsize>, n: usize) {
    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let pool = pool.clone();
        let done = done.clone();
        handles.push(tokio::spawn(async move {
            let client = match pool.acquire().await {
                Ok(client) => client,
                Err(err) => {
                    eprintln!("Failed to acquire a client: {err}");
                    return;
                }
            };
            client.doit().await;
            done.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = pool.release(client) {
                eprintln!("Failed to release a client: {err}");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

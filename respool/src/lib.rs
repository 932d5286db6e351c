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

//! A bounded async resource pool.
//!
//! The pool keeps at most `max_active` resources alive, pre-creates `min_active` of them, keeps
//! up to `max_idle` spares idle on top of that, and lets at most `max_wait` callers queue for
//! `max_wait_time` when it is saturated. Resources that idled past `idle_timeout` are closed when
//! an acquire comes across them.
//!
//! # Example
//!
//! ```
//! use respool::ManageResource;
//! use respool::Pool;
//! use respool::PoolConfig;
//!
//! struct Connection;
//! impl Connection {
//!     async fn ping(&self) -> bool {
//!         true
//!     }
//! }
//!
//! struct Manager;
//! impl ManageResource for Manager {
//!     type Resource = Connection;
//!     type Error = std::io::Error;
//!
//!     async fn create(&self) -> Result<Self::Resource, Self::Error> {
//!         Ok(Connection)
//!     }
//!
//!     fn close(&self, _conn: Self::Resource) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = PoolConfig::new(16).with_min_active(2);
//! let pool = Pool::new(config, Manager).await.unwrap();
//!
//! let conn = pool.acquire().await.unwrap();
//! assert!(conn.ping().await);
//! pool.release(conn).unwrap();
//!
//! pool.shutdown().unwrap();
//! # }
//! ```

mod config;
mod error;
mod manage;
mod mutex;
mod pool;

pub use config::PoolConfig;
pub use error::ConfigError;
pub use error::PoolError;
pub use manage::ManageFn;
pub use manage::ManageResource;
pub use manage::ResourceStatus;
pub use manage::manage_fn;
pub use pool::Pool;
pub use pool::PoolState;
pub use pool::PoolStatus;
pub use pool::Pooled;

//! shellsync - keeps an offline cache of web application resources in step
//! with a versioned resource table.
//!
//! The synchronizer owns three named caches (content, staging, manifest) and
//! reacts to the lifecycle events of an offline-capable web app: `install`
//! stages the core shell, `activate` reconciles the content cache against the
//! previously activated manifest, `fetch` serves cached resources with a
//! network fallback, and control messages force activation or prefetch
//! everything for offline use.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shellsync::{DiskStorage, HttpNetwork, Request, ResourceTable, SyncConfig, Synchronizer};
//!
//! # async fn example() -> shellsync::Result<()> {
//! let config = SyncConfig::new("https://app.example.com");
//! let table = ResourceTable::from_json(r#"{"resources":{"/":"a1","main.js":"b2"},"core":["main.js"]}"#)?;
//! let network = HttpNetwork::new(&config)?;
//! let sync = Synchronizer::new(
//!     config,
//!     table,
//!     Arc::new(DiskStorage::new("/tmp/shellsync")),
//!     Arc::new(network),
//! )?;
//!
//! sync.install().await?;
//! sync.activate().await;
//!
//! let outcome = sync.fetch(&Request::get("https://app.example.com/main.js")).await?;
//! println!("{:?}", outcome.response().map(|r| r.status));
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod disk;
pub mod error;
pub mod key;
pub mod lifecycle;
pub mod message;
pub mod network;
pub mod resources;
pub mod stats;
pub mod store;
pub mod synchronizer;

// Re-export main types for convenience
pub use config::{AppConfig, CacheNames, PathConfig, SyncConfig};
pub use disk::DiskStorage;
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, WorkerState};
pub use message::ControlMessage;
pub use network::{HttpNetwork, Network, Request, Response};
pub use resources::{Fingerprints, ResourceTable};
pub use stats::{CacheReport, ManifestState, PrefetchStats};
pub use store::{CacheHandle, CacheStorage, MemoryStorage};
pub use synchronizer::{ActivationReport, ActivationState, FetchOutcome, Synchronizer};

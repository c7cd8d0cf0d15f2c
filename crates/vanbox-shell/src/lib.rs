//! vanbox-shell - Offline app-shell cache for Vanbox
//!
//! Install-time precaching of the shell assets, cache-first fetch handling
//! with an offline fallback page for navigations, and eviction of caches left
//! behind by older shell versions. Shares no state with `vanbox-core`.

pub mod error;
pub mod manifest;
pub mod network;
pub mod request;
pub mod storage;
pub mod worker;

pub use error::{ShellError, ShellResult};
pub use manifest::ShellManifest;
pub use network::{HttpNetwork, Network};
pub use request::{CachedResponse, Destination, ShellRequest};
pub use storage::{CacheStorage, MemoryCacheStorage};
pub use worker::{ShellWorker, WorkerState};

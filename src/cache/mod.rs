//! Versioned response cache for offline support.
//!
//! This module provides:
//! - A storage backend holding named buckets of request → response snapshots
//! - Version-qualified bucket handles, opened idempotently
//! - A background writer so caching never delays a response
//! - The cache-first resolution strategy with preload and offline fallback

mod bucket;
mod storage;
mod strategy;
mod traits;
mod writer;

pub use bucket::{BucketHandle, BucketName, CacheStore};
pub use storage::{CacheStorage, SqliteStorage, StoredResponse};
pub use strategy::CacheFirst;
pub use traits::{preload, PreloadResponse, Resolution, ResolutionSource};
pub use writer::{log_failures, BackgroundWriter};

//! simrun Cache - Content-addressed build artifact cache
//!
//! Build artifacts are stored in a shared [`BlobStore`] under an opaque key
//! (usually a git revision). [`BuildCache::ensure_local`] materializes an
//! artifact into a per-key local directory at most once across threads and
//! processes, and [`Builder::build_and_publish`] produces missing artifacts.

pub mod blob;
pub mod builder;
pub mod cache;
pub mod error;
pub mod lock;
pub mod tasks;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use builder::{BuildStatus, Builder};
pub use cache::{BuildCache, CacheStats, CleanStats};
pub use error::{CacheError, Result};
pub use lock::FileLock;
pub use tasks::{BuildTask, FetchTask};

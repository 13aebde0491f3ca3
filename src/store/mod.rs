//! Local persistence: key/value backends and the catalog cache built on them.

pub mod cache;
pub mod kv;

pub use cache::{CacheKeys, CachePolicy, CatalogCache};
pub use kv::{FileStore, KvStore, MemoryStore};

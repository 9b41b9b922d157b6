//! Client-local key-value storage for FeedMe.
//!
//! Plays the role of the browser's `localStorage`: a small JSON map that
//! survives between visits, used to hold the anonymous cart before a
//! shopper logs in.
//!
//! # Example
//!
//! ```rust,ignore
//! use feedme_cache::Cache;
//!
//! let cache = Cache::open("local-storage.json")?;
//! cache.set("feedme_anonymous_cart", &lines)?;
//! let lines: Option<Vec<CartLine>> = cache.get("feedme_anonymous_cart")?;
//! ```

mod error;
mod kv;

pub use error::CacheError;
pub use kv::Cache;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{Cache, CacheError};
}

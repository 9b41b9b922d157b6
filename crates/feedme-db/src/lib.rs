//! Typed table store for the FeedMe storefront.
//!
//! Stands in for the hosted Postgres tables: records are serialized to JSON
//! rows, selected with `.eq()`-style filters, and updated atomically with
//! [`Db::update_one`]. A store can be snapshotted to a JSON file.
//!
//! # Example
//!
//! ```rust,ignore
//! use feedme_db::{Db, Filter};
//!
//! let db = Db::new();
//! db.define_table("vouchers", &["code"]).await?;
//! db.insert("vouchers", &voucher).await?;
//!
//! let active: Vec<Voucher> = db
//!     .select("vouchers", &Filter::all().eq("active", true))
//!     .await?;
//! ```

mod db;
mod error;
mod types;

pub use db::Db;
pub use error::{DbError, UNIQUE_VIOLATION_CODE};
pub use types::{Filter, Row, Value};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{Db, DbError, Filter, Row, Value};
}

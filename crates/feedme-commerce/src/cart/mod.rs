//! Cart module.
//!
//! Lines kept in local storage before login, the server-side cart, and the
//! flow that merges the two when a shopper logs in.

mod anonymous;
mod line;
mod merge;
mod server;

pub use anonymous::{AnonymousCart, ANONYMOUS_CART_KEY};
pub use line::{item_count, total, CartLine};
pub use merge::{CartEvent, CartMergeFlow, CartQuery, MergeOutcome, Session};
pub use server::{CartItemRow, CartMerger, CartService, MergeReport, ServerCart, SkippedLine};

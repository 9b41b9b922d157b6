//! Checkout module.
//!
//! Orders, their lifecycle, and the service that places them.

mod order;
mod service;

pub use order::{Order, OrderItem, OrderStatus};
pub use service::{CheckoutService, PlaceOrder, PlacedOrder};

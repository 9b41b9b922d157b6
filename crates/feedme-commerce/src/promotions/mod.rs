//! Promotions module.
//!
//! Limited-slot offers, discount values and voucher codes.

mod discount;
mod offer;
mod voucher;

pub use discount::DiscountValue;
pub use offer::{ensure_available, Offer, OfferLookup, OfferPurchase, OfferService, OfferStatus};
pub use voucher::{Voucher, VoucherKind, VoucherQuote, VoucherService};

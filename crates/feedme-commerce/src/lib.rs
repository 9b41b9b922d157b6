//! Storefront logic for FeedMe, a grocery-delivery shop.
//!
//! - **Cart**: anonymous cart in local storage, server cart, login-time merge
//! - **Promotions**: limited-slot offers, discount vouchers
//! - **Rewards**: wallet credit, cashback, referral bonuses
//! - **Checkout**: orders built from the server cart
//! - **Analytics**: email campaign open and click rates
//! - **Catalog**: price list import
//!
//! # Example
//!
//! ```rust,ignore
//! use feedme_commerce::prelude::*;
//!
//! let store = Storefront::in_memory().await?;
//! let offer = store.offers.create(Offer::new("Half bag of rice", Money::from_major(25_000, Currency::NGN), 20)).await?;
//!
//! // Before login the line lives in local storage.
//! store.anonymous.add_item(CartLine::offer(offer.id.clone(), 2, offer.price), &store.offers).await?;
//!
//! // At login it is folded into the user's server cart, once.
//! let user = UserId::new("ada");
//! let current = store.carts.lines(&user).await?;
//! let outcome = store
//!     .merge_flow()
//!     .on_session_change(&Session::Authenticated(user), &CartQuery::Ready(current))
//!     .await?;
//! ```

pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod checkout;
mod codes;
pub mod config;
pub mod error;
pub mod ids;
pub mod money;
pub mod promotions;
pub mod rewards;
mod storefront;
pub mod tables;

pub use config::CommerceConfig;
pub use error::{CommerceError, ErrorBody};
pub use ids::*;
pub use money::{Currency, Money};
pub use storefront::Storefront;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::CommerceConfig;
    pub use crate::error::{CommerceError, ErrorBody};
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};
    pub use crate::storefront::Storefront;

    // Cart
    pub use crate::cart::{
        AnonymousCart, CartEvent, CartLine, CartMergeFlow, CartMerger, CartQuery, CartService,
        MergeOutcome, MergeReport, Session,
    };

    // Promotions
    pub use crate::promotions::{
        DiscountValue, Offer, OfferLookup, OfferService, OfferStatus, Voucher, VoucherKind,
        VoucherQuote, VoucherService,
    };

    // Rewards
    pub use crate::rewards::{
        Referral, ReferralService, ReferralStatus, Transaction, TransactionReason, WalletService,
    };

    // Checkout
    pub use crate::checkout::{CheckoutService, Order, OrderStatus, PlaceOrder, PlacedOrder};

    // Analytics and catalog
    pub use crate::analytics::{campaign_stats, CampaignStats, EmailEvent, EmailEventKind};
    pub use crate::catalog::{parse_price_list, PriceListService};
}

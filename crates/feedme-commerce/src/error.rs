//! Commerce error types.

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in storefront operations.
#[derive(Error, Debug)]
pub enum CommerceError {
    /// Offer not found.
    #[error("Offer not found: {0}")]
    OfferNotFound(String),

    /// Offer exists but is not open for purchase.
    #[error("Offer {0} is not active")]
    OfferInactive(String),

    /// Offer window has not opened yet.
    #[error("Offer {0} has not started yet")]
    OfferNotStarted(String),

    /// Offer window has closed.
    #[error("Offer {0} has expired")]
    OfferExpired(String),

    /// No slots left on the offer.
    #[error("Offer {0} is sold out")]
    OfferSoldOut(String),

    /// Fewer slots left than requested.
    #[error("Only {available} slot(s) left on offer {offer_id}, requested {requested}")]
    InsufficientSlots {
        offer_id: String,
        requested: i64,
        available: i64,
    },

    /// Invalid quantity.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Quantity exceeds maximum allowed.
    #[error("Quantity {0} exceeds maximum allowed ({1})")]
    QuantityExceedsLimit(i64, i64),

    /// Line not in cart.
    #[error("Item not in cart: {0}")]
    ItemNotInCart(String),

    /// Checkout attempted with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Voucher code unknown.
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    /// Voucher switched off.
    #[error("Voucher {0} is not active")]
    VoucherInactive(String),

    /// Voucher validity window has not opened.
    #[error("Voucher {0} is not valid yet")]
    VoucherNotYetValid(String),

    /// Voucher validity window has closed.
    #[error("Voucher {0} has expired")]
    VoucherExpired(String),

    /// Voucher usage limit reached.
    #[error("Voucher {0} has been fully used")]
    VoucherExhausted(String),

    /// Order subtotal below the voucher minimum.
    #[error("Voucher {code} requires a minimum order of {minimum}")]
    VoucherMinimumNotMet { code: String, minimum: String },

    /// Voucher code already exists.
    #[error("Voucher code already taken: {0}")]
    VoucherCodeTaken(String),

    /// Referral code unknown.
    #[error("Referral code not found: {0}")]
    ReferralCodeNotFound(String),

    /// User tried to use their own referral code.
    #[error("You cannot use your own referral code")]
    SelfReferral,

    /// User has already been referred.
    #[error("User {0} has already been referred")]
    AlreadyReferred(String),

    /// Referral bonus already paid out.
    #[error("Referral for user {0} is already active")]
    ReferralAlreadyActivated(String),

    /// No pending referral for the user.
    #[error("No referral found for user {0}")]
    ReferralNotFound(String),

    /// Wallet balance too low for a debit.
    #[error("Insufficient wallet balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: String, available: String },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Order cannot move to the requested status.
    #[error("Order cannot move from {from} to {to}")]
    InvalidOrderTransition { from: String, to: String },

    /// Currency mismatch.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Arithmetic overflow.
    #[error("Arithmetic overflow in money calculation")]
    Overflow,

    /// Backend call failed.
    #[error("Database error: {0}")]
    Database(#[from] feedme_db::DbError),

    /// Local storage failed.
    #[error("Local storage error: {0}")]
    Cache(#[from] feedme_cache::CacheError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl CommerceError {
    /// Check if this error means an offer cannot be bought right now.
    pub fn is_availability_error(&self) -> bool {
        matches!(
            self,
            CommerceError::OfferNotFound(_)
                | CommerceError::OfferInactive(_)
                | CommerceError::OfferNotStarted(_)
                | CommerceError::OfferExpired(_)
                | CommerceError::OfferSoldOut(_)
                | CommerceError::InsufficientSlots { .. }
        )
    }

    /// Check if the error came from an unreachable backend.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CommerceError::Database(feedme_db::DbError::Unavailable))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CommerceError::OfferNotFound(_) => "offer_not_found",
            CommerceError::OfferInactive(_) => "offer_inactive",
            CommerceError::OfferNotStarted(_) => "offer_not_started",
            CommerceError::OfferExpired(_) => "offer_expired",
            CommerceError::OfferSoldOut(_) => "offer_sold_out",
            CommerceError::InsufficientSlots { .. } => "insufficient_slots",
            CommerceError::InvalidQuantity(_) => "invalid_quantity",
            CommerceError::QuantityExceedsLimit(..) => "quantity_exceeds_limit",
            CommerceError::ItemNotInCart(_) => "item_not_in_cart",
            CommerceError::EmptyCart => "empty_cart",
            CommerceError::VoucherNotFound(_) => "voucher_not_found",
            CommerceError::VoucherInactive(_) => "voucher_inactive",
            CommerceError::VoucherNotYetValid(_) => "voucher_not_yet_valid",
            CommerceError::VoucherExpired(_) => "voucher_expired",
            CommerceError::VoucherExhausted(_) => "voucher_exhausted",
            CommerceError::VoucherMinimumNotMet { .. } => "voucher_minimum_not_met",
            CommerceError::VoucherCodeTaken(_) => "voucher_code_taken",
            CommerceError::ReferralCodeNotFound(_) => "referral_code_not_found",
            CommerceError::SelfReferral => "self_referral",
            CommerceError::AlreadyReferred(_) => "already_referred",
            CommerceError::ReferralAlreadyActivated(_) => "referral_already_activated",
            CommerceError::ReferralNotFound(_) => "referral_not_found",
            CommerceError::InsufficientBalance { .. } => "insufficient_balance",
            CommerceError::OrderNotFound(_) => "order_not_found",
            CommerceError::InvalidOrderTransition { .. } => "invalid_order_transition",
            CommerceError::CurrencyMismatch { .. } => "currency_mismatch",
            CommerceError::Overflow => "overflow",
            CommerceError::Database(e) if e.is_unique_violation() => "unique_violation",
            CommerceError::Database(_) => "database_error",
            CommerceError::Cache(_) => "storage_error",
            CommerceError::Serialization(_) => "serialization_error",
            CommerceError::Validation(_) => "validation_error",
        }
    }

    /// HTTP status an API route should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CommerceError::OfferNotFound(_)
            | CommerceError::VoucherNotFound(_)
            | CommerceError::ReferralCodeNotFound(_)
            | CommerceError::ReferralNotFound(_)
            | CommerceError::OrderNotFound(_)
            | CommerceError::ItemNotInCart(_) => StatusCode::NOT_FOUND,
            CommerceError::VoucherCodeTaken(_)
            | CommerceError::AlreadyReferred(_)
            | CommerceError::ReferralAlreadyActivated(_)
            | CommerceError::InvalidOrderTransition { .. } => StatusCode::CONFLICT,
            CommerceError::Database(e) if e.is_unique_violation() => StatusCode::CONFLICT,
            CommerceError::Database(feedme_db::DbError::Unavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CommerceError::Database(_)
            | CommerceError::Cache(_)
            | CommerceError::Serialization(_)
            | CommerceError::Overflow => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Render the error in the shared API error shape.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        }
    }
}

/// JSON error body returned by every API route.
///
/// `{ "success": false, "error": { "code": "...", "message": "..." } }`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

/// Code and message inside an [`ErrorBody`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let err = CommerceError::OfferSoldOut("offer-1".into());
        let body = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "offer_sold_out");
        assert_eq!(body["error"]["message"], "Offer offer-1 is sold out");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CommerceError::VoucherNotFound("X".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CommerceError::from(feedme_db::DbError::Unavailable).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CommerceError::VoucherExhausted("X".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_availability_classification() {
        assert!(CommerceError::OfferSoldOut("o".into()).is_availability_error());
        assert!(!CommerceError::EmptyCart.is_availability_error());
        assert!(CommerceError::from(feedme_db::DbError::Unavailable).is_unavailable());
    }
}

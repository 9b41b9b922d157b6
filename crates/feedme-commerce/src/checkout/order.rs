//! Order types.

use crate::cart::CartLine;
use crate::codes::random_code;
use crate::error::CommerceError;
use crate::ids::{BundleId, OfferId, OrderId, OrderItemId, ProductId, PurchaseId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, waiting for the payment gateway.
    #[default]
    PendingPayment,
    /// Payment received.
    Paid,
    /// Being packed.
    Processing,
    /// With the rider.
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "Pending payment",
            OrderStatus::Paid => "Paid",
            OrderStatus::Processing => "Processing",
            OrderStatus::OutForDelivery => "Out for delivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Check if order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Check if order can be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::PendingPayment | OrderStatus::Paid | OrderStatus::Processing
        )
    }

    /// Whether moving to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (PendingPayment, Paid) => true,
            (Paid, Processing) | (Processing, OutForDelivery) | (OutForDelivery, Delivered) => true,
            (_, Cancelled) => self.can_cancel(),
            _ => false,
        }
    }

    /// Check a transition, failing with `InvalidOrderTransition`.
    pub fn transition(&self, next: OrderStatus) -> Result<OrderStatus, CommerceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CommerceError::InvalidOrderTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    /// Human-readable order number, `FM-XXXXXXXX`.
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Voucher discount.
    pub discount: Money,
    /// Part paid from the wallet.
    pub wallet_used: Money,
    /// Subtotal minus discount.
    pub total: Money,
    /// Total minus wallet part, left for the payment gateway.
    pub amount_payable: Money,
    pub voucher_code: Option<String>,
    pub delivery_address: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn generate_order_number() -> String {
        random_code("FM", 8)
    }

    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }
}

/// A line of a placed order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub bundle_id: Option<BundleId>,
    pub offer_id: Option<OfferId>,
    /// Slot purchase backing an offer line.
    pub purchase_id: Option<PurchaseId>,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
    pub option: Option<serde_json::Value>,
}

impl OrderItem {
    pub fn from_line(
        order_id: &OrderId,
        line: &CartLine,
        purchase_id: Option<PurchaseId>,
    ) -> Result<Self, CommerceError> {
        Ok(Self {
            id: OrderItemId::generate(),
            order_id: order_id.clone(),
            product_id: line.product_id.clone(),
            bundle_id: line.bundle_id.clone(),
            offer_id: line.offer_id.clone(),
            purchase_id,
            quantity: line.quantity,
            unit_price: line.price,
            line_total: line.line_total()?,
            option: line.option.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    #[test]
    fn test_status_flow() {
        let status = OrderStatus::PendingPayment;
        assert_eq!(status.transition(OrderStatus::Paid).unwrap(), OrderStatus::Paid);
        assert!(matches!(
            status.transition(OrderStatus::Delivered),
            Err(CommerceError::InvalidOrderTransition { .. })
        ));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::OutForDelivery.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
    }

    #[test]
    fn test_order_item_from_line() {
        let line = CartLine::product(ProductId::new("rice"), 3, Money::new(1_500, Currency::NGN));
        let item = OrderItem::from_line(&OrderId::new("o1"), &line, None).unwrap();
        assert_eq!(item.line_total, Money::new(4_500, Currency::NGN));
        assert!(Order::generate_order_number().starts_with("FM-"));
    }
}

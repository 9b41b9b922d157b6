//! Discount values carried by vouchers.

use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Value of a discount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountValue {
    /// Whole-number percentage off (0 - 100).
    Percentage(u32),
    /// Fixed amount off.
    Fixed(Money),
}

impl DiscountValue {
    /// Calculate the discount amount for a given subtotal.
    ///
    /// Never exceeds the subtotal.
    pub fn calculate(&self, subtotal: &Money) -> Money {
        match self {
            DiscountValue::Percentage(percent) => subtotal.percentage((*percent).min(100)),
            DiscountValue::Fixed(amount) => {
                if amount.currency != subtotal.currency || amount.is_negative() {
                    Money::zero(subtotal.currency)
                } else {
                    amount.min(*subtotal)
                }
            }
        }
    }

    /// Short label such as "10% off".
    pub fn label(&self) -> String {
        match self {
            DiscountValue::Percentage(percent) => format!("{}% off", percent),
            DiscountValue::Fixed(amount) => format!("{} off", amount.display()),
        }
    }
}

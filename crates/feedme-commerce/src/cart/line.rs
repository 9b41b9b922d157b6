//! Cart line type shared by the anonymous and server carts.

use crate::error::CommerceError;
use crate::ids::{BundleId, LineItemId, OfferId, ProductId};
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// A pending cart line.
///
/// Exactly what is bought is identified by the product, bundle and offer
/// references plus the option payload (size, ripeness, pack...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartLine {
    pub id: LineItemId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub bundle_id: Option<BundleId>,
    #[serde(default)]
    pub offer_id: Option<OfferId>,
    pub quantity: i64,
    /// Unit price.
    pub price: Money,
    #[serde(default)]
    pub option: Option<serde_json::Value>,
}

impl CartLine {
    fn with_target(
        product_id: Option<ProductId>,
        bundle_id: Option<BundleId>,
        offer_id: Option<OfferId>,
        quantity: i64,
        price: Money,
    ) -> Self {
        Self {
            id: LineItemId::generate(),
            product_id,
            bundle_id,
            offer_id,
            quantity,
            price,
            option: None,
        }
    }

    /// A line for a single product.
    pub fn product(product_id: ProductId, quantity: i64, price: Money) -> Self {
        Self::with_target(Some(product_id), None, None, quantity, price)
    }

    /// A line for a product bundle.
    pub fn bundle(bundle_id: BundleId, quantity: i64, price: Money) -> Self {
        Self::with_target(None, Some(bundle_id), None, quantity, price)
    }

    /// A line for slots on a limited offer.
    pub fn offer(offer_id: OfferId, quantity: i64, price: Money) -> Self {
        Self::with_target(None, None, Some(offer_id), quantity, price)
    }

    /// Attach an option payload.
    pub fn with_option(mut self, option: serde_json::Value) -> Self {
        self.option = Some(option);
        self
    }

    /// Whether both lines buy the same thing and should be combined.
    pub fn same_target(&self, other: &CartLine) -> bool {
        self.product_id == other.product_id
            && self.bundle_id == other.bundle_id
            && self.offer_id == other.offer_id
            && self.option == other.option
    }

    /// Unit price times quantity.
    pub fn line_total(&self) -> Result<Money, CommerceError> {
        self.price
            .try_multiply(self.quantity)
            .ok_or(CommerceError::Overflow)
    }

    /// Short label for logs and listings.
    pub fn describe(&self) -> String {
        match (&self.product_id, &self.bundle_id, &self.offer_id) {
            (Some(p), _, _) => format!("product {}", p),
            (_, Some(b), _) => format!("bundle {}", b),
            (_, _, Some(o)) => format!("offer {}", o),
            _ => "unknown item".to_string(),
        }
    }
}

/// Sum of quantities.
pub fn item_count(lines: &[CartLine]) -> i64 {
    lines.iter().map(|l| l.quantity).sum()
}

/// Sum of line totals in `currency`.
pub fn total(lines: &[CartLine], currency: Currency) -> Result<Money, CommerceError> {
    let mut sum = Money::zero(currency);
    for line in lines {
        let line_total = line.line_total()?;
        sum = sum.try_add(&line_total).ok_or_else(|| {
            if line_total.currency != currency {
                CommerceError::CurrencyMismatch {
                    expected: currency.code().to_string(),
                    got: line_total.currency.code().to_string(),
                }
            } else {
                CommerceError::Overflow
            }
        })?;
    }
    Ok(sum)
}

/// Reject non-positive quantities and quantities over the per-line limit.
pub(crate) fn check_quantity(quantity: i64, max: i64) -> Result<(), CommerceError> {
    if quantity <= 0 {
        return Err(CommerceError::InvalidQuantity(quantity));
    }
    if quantity > max {
        return Err(CommerceError::QuantityExceedsLimit(quantity, max));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ngn(minor: i64) -> Money {
        Money::new(minor, Currency::NGN)
    }

    #[test]
    fn test_same_target_requires_matching_option() {
        let a = CartLine::product(ProductId::new("tomatoes"), 1, ngn(500)).with_option(json!({"size": "basket"}));
        let b = CartLine::product(ProductId::new("tomatoes"), 3, ngn(500)).with_option(json!({"size": "basket"}));
        let c = CartLine::product(ProductId::new("tomatoes"), 1, ngn(500)).with_option(json!({"size": "paint"}));
        let d = CartLine::offer(OfferId::new("tomatoes"), 1, ngn(500));

        assert!(a.same_target(&b));
        assert!(!a.same_target(&c));
        assert!(!a.same_target(&d));
    }

    #[test]
    fn test_totals() {
        let lines = vec![
            CartLine::product(ProductId::new("rice"), 2, ngn(1000)),
            CartLine::bundle(BundleId::new("soup-pack"), 1, ngn(2500)),
        ];
        assert_eq!(item_count(&lines), 3);
        assert_eq!(total(&lines, Currency::NGN).unwrap(), ngn(4500));
    }

    #[test]
    fn test_total_currency_mismatch() {
        let lines = vec![CartLine::product(ProductId::new("rice"), 1, Money::new(100, Currency::USD))];
        assert!(matches!(
            total(&lines, Currency::NGN),
            Err(CommerceError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_line_deserializes_without_optional_refs() {
        let line: CartLine = serde_json::from_value(json!({
            "id": "l1",
            "product_id": "rice",
            "quantity": 2,
            "price": { "amount_minor": 100, "currency": "NGN" }
        }))
        .unwrap();
        assert!(line.offer_id.is_none());
        assert!(line.option.is_none());
    }

    #[test]
    fn test_check_quantity() {
        assert!(check_quantity(1, 99).is_ok());
        assert!(matches!(check_quantity(0, 99), Err(CommerceError::InvalidQuantity(0))));
        assert!(matches!(
            check_quantity(100, 99),
            Err(CommerceError::QuantityExceedsLimit(100, 99))
        ));
    }
}

//! Cart kept in local storage until the shopper logs in.

use crate::cart::line::{self, check_quantity, CartLine};
use crate::config::CommerceConfig;
use crate::error::CommerceError;
use crate::ids::LineItemId;
use crate::money::{Currency, Money};
use crate::promotions::{ensure_available, OfferLookup};
use feedme_cache::Cache;
use std::future::Future;
use tracing::{debug, info, warn};

/// Local storage key holding the JSON array of anonymous cart lines.
pub const ANONYMOUS_CART_KEY: &str = "feedme_anonymous_cart";

/// Cart lines for a visitor without a session.
///
/// Offer lines are re-checked against a fresh offer record on every add
/// and quantity change. Lookup failures are returned as-is.
#[derive(Clone)]
pub struct AnonymousCart {
    store: Cache,
    currency: Currency,
    max_quantity: i64,
}

impl AnonymousCart {
    pub fn new(store: Cache, config: &CommerceConfig) -> Self {
        Self {
            store,
            currency: config.currency,
            max_quantity: config.max_quantity_per_line,
        }
    }

    /// All stored lines, oldest first.
    pub fn lines(&self) -> Result<Vec<CartLine>, CommerceError> {
        Ok(self.store.get(ANONYMOUS_CART_KEY)?.unwrap_or_default())
    }

    fn save(&self, lines: &[CartLine]) -> Result<(), CommerceError> {
        self.store.set(ANONYMOUS_CART_KEY, &lines)?;
        Ok(())
    }

    /// Add a line, combining it with an existing line for the same target.
    ///
    /// Returns the stored line.
    pub async fn add_item(
        &self,
        item: CartLine,
        offers: &dyn OfferLookup,
    ) -> Result<CartLine, CommerceError> {
        check_quantity(item.quantity, self.max_quantity)?;
        if item.price.currency != self.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                got: item.price.currency.code().to_string(),
            });
        }

        let existing_quantity = self
            .lines()?
            .iter()
            .find(|l| l.same_target(&item))
            .map_or(0, |l| l.quantity);
        let wanted = existing_quantity
            .checked_add(item.quantity)
            .ok_or(CommerceError::Overflow)?;
        check_quantity(wanted, self.max_quantity)?;

        if let Some(offer_id) = &item.offer_id {
            debug!(offer_id = %offer_id, wanted, "checking offer before add");
            ensure_available(offers, offer_id, wanted)
                .await
                .map_err(|e| {
                    warn!(offer_id = %offer_id, error = %e, "anonymous add rejected");
                    e
                })?;
        }

        let mut lines = self.lines()?;
        let stored = match lines.iter_mut().find(|l| l.same_target(&item)) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or(CommerceError::Overflow)?;
                existing.clone()
            }
            None => {
                lines.push(item.clone());
                item
            }
        };
        self.save(&lines)?;
        debug!(line_id = %stored.id, quantity = stored.quantity, "anonymous cart updated");
        Ok(stored)
    }

    /// Set a line's quantity. Zero or less removes the line.
    ///
    /// Returns the updated line, or `None` if it was removed.
    pub async fn update_quantity(
        &self,
        line_id: &LineItemId,
        quantity: i64,
        offers: &dyn OfferLookup,
    ) -> Result<Option<CartLine>, CommerceError> {
        let current = self
            .lines()?
            .into_iter()
            .find(|l| &l.id == line_id)
            .ok_or_else(|| CommerceError::ItemNotInCart(line_id.to_string()))?;

        if quantity <= 0 {
            self.remove_item(line_id)?;
            return Ok(None);
        }
        check_quantity(quantity, self.max_quantity)?;

        if let Some(offer_id) = &current.offer_id {
            ensure_available(offers, offer_id, quantity).await?;
        }

        let mut lines = self.lines()?;
        let line = lines
            .iter_mut()
            .find(|l| &l.id == line_id)
            .ok_or_else(|| CommerceError::ItemNotInCart(line_id.to_string()))?;
        line.quantity = quantity;
        let updated = line.clone();
        self.save(&lines)?;
        Ok(Some(updated))
    }

    /// Remove a line. Returns whether it was present.
    pub fn remove_item(&self, line_id: &LineItemId) -> Result<bool, CommerceError> {
        let mut lines = self.lines()?;
        let before = lines.len();
        lines.retain(|l| &l.id != line_id);
        let removed = lines.len() < before;
        if removed {
            self.save(&lines)?;
        }
        Ok(removed)
    }

    /// Drop every line.
    pub fn clear(&self) -> Result<(), CommerceError> {
        self.store.delete(ANONYMOUS_CART_KEY)?;
        Ok(())
    }

    /// Sum of quantities.
    pub fn item_count(&self) -> Result<i64, CommerceError> {
        Ok(line::item_count(&self.lines()?))
    }

    /// Sum of line totals.
    pub fn total(&self) -> Result<Money, CommerceError> {
        line::total(&self.lines()?, self.currency)
    }

    pub fn is_empty(&self) -> Result<bool, CommerceError> {
        Ok(self.lines()?.is_empty())
    }

    /// Hand every line to `f`, clearing local storage only if `f` succeeds.
    pub async fn transfer<F, Fut, T>(&self, f: F) -> Result<T, CommerceError>
    where
        F: FnOnce(Vec<CartLine>) -> Fut,
        Fut: Future<Output = Result<T, CommerceError>>,
    {
        let lines = self.lines()?;
        let count = lines.len();
        let result = f(lines).await?;
        self.clear()?;
        info!(lines = count, "anonymous cart transferred");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{OfferId, ProductId};
    use crate::promotions::{Offer, OfferService};
    use feedme_db::Db;
    use serde_json::json;

    fn ngn(minor: i64) -> Money {
        Money::new(minor, Currency::NGN)
    }

    fn cart() -> AnonymousCart {
        AnonymousCart::new(Cache::in_memory(), &CommerceConfig::default())
    }

    async fn offers_with(slots: i64) -> (OfferService, OfferId) {
        let service = OfferService::new(Db::new());
        let offer = service
            .create(Offer::new("Crate of eggs", ngn(300_000), 10))
            .await
            .unwrap();
        if slots < 10 {
            let user = crate::ids::UserId::new("someone");
            service.purchase(&user, &offer.id, 10 - slots).await.unwrap();
        }
        (service, offer.id)
    }

    #[tokio::test]
    async fn test_same_target_lines_combine() {
        let (offers, _) = offers_with(10).await;
        let cart = cart();
        let rice = ProductId::new("rice");

        cart.add_item(CartLine::product(rice.clone(), 1, ngn(1000)), &offers).await.unwrap();
        let stored = cart
            .add_item(CartLine::product(rice.clone(), 2, ngn(1000)), &offers)
            .await
            .unwrap();

        assert_eq!(stored.quantity, 3);
        assert_eq!(cart.lines().unwrap().len(), 1);
        assert_eq!(cart.item_count().unwrap(), 3);
        assert_eq!(cart.total().unwrap(), ngn(3000));

        cart.add_item(
            CartLine::product(rice, 1, ngn(1000)).with_option(json!({"bag": "50kg"})),
            &offers,
        )
        .await
        .unwrap();
        assert_eq!(cart.lines().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_offer_with_no_slots_is_rejected() {
        let (offers, offer_id) = offers_with(0).await;
        let cart = cart();

        let err = cart
            .add_item(CartLine::offer(offer_id, 1, ngn(300_000)), &offers)
            .await
            .unwrap_err();
        assert!(err.is_availability_error());
        assert!(cart.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_offer_quantity_counts_existing_line() {
        let (offers, offer_id) = offers_with(2).await;
        let cart = cart();

        cart.add_item(CartLine::offer(offer_id.clone(), 2, ngn(300_000)), &offers)
            .await
            .unwrap();
        let err = cart
            .add_item(CartLine::offer(offer_id, 1, ngn(300_000)), &offers)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientSlots { available: 2, .. }));
        assert_eq!(cart.item_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_offer_is_rejected() {
        let (offers, _) = offers_with(10).await;
        let err = cart()
            .add_item(CartLine::offer(OfferId::new("ghost"), 1, ngn(1)), &offers)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::OfferNotFound(_)));
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let db = Db::new();
        let offers = OfferService::new(db.clone());
        let offer = offers.create(Offer::new("Yam", ngn(100), 5)).await.unwrap();
        db.set_offline(true);

        let err = cart()
            .add_item(CartLine::offer(offer.id, 1, ngn(100)), &offers)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_update_quantity_to_zero_removes_line() {
        let (offers, _) = offers_with(10).await;
        let cart = cart();
        let line = cart
            .add_item(CartLine::product(ProductId::new("beans"), 2, ngn(800)), &offers)
            .await
            .unwrap();

        let updated = cart.update_quantity(&line.id, 5, &offers).await.unwrap();
        assert_eq!(updated.map(|l| l.quantity), Some(5));

        assert!(cart.update_quantity(&line.id, 0, &offers).await.unwrap().is_none());
        assert!(cart.is_empty().unwrap());

        let err = cart.update_quantity(&line.id, 1, &offers).await.unwrap_err();
        assert!(matches!(err, CommerceError::ItemNotInCart(_)));
    }

    #[tokio::test]
    async fn test_update_quantity_revalidates_offer() {
        let (offers, offer_id) = offers_with(3).await;
        let cart = cart();
        let line = cart
            .add_item(CartLine::offer(offer_id, 1, ngn(300_000)), &offers)
            .await
            .unwrap();

        let err = cart.update_quantity(&line.id, 4, &offers).await.unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientSlots { .. }));
        assert_eq!(cart.item_count().unwrap(), 1);

        assert!(cart.update_quantity(&line.id, -1, &offers).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transfer_clears_only_on_success() {
        let (offers, _) = offers_with(10).await;
        let cart = cart();
        cart.add_item(CartLine::product(ProductId::new("garri"), 1, ngn(700)), &offers)
            .await
            .unwrap();

        let failed: Result<(), _> = cart
            .transfer(|_| async { Err(CommerceError::Validation("backend said no".into())) })
            .await;
        assert!(failed.is_err());
        assert_eq!(cart.item_count().unwrap(), 1);

        let moved = cart.transfer(|lines| async move { Ok(lines.len()) }).await.unwrap();
        assert_eq!(moved, 1);
        assert!(cart.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_rejects_foreign_currency() {
        let (offers, _) = offers_with(10).await;
        let err = cart()
            .add_item(
                CartLine::product(ProductId::new("rice"), 1, Money::new(100, Currency::USD)),
                &offers,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::CurrencyMismatch { .. }));
    }
}

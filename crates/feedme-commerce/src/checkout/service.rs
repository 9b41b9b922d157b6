//! Order placement, payment and cancellation.

use crate::cart::{self, CartLine, CartService};
use crate::checkout::order::{Order, OrderItem, OrderStatus};
use crate::config::CommerceConfig;
use crate::error::CommerceError;
use crate::ids::{OrderId, PurchaseId, UserId};
use crate::money::{Currency, Money};
use crate::promotions::{OfferPurchase, OfferService, VoucherService};
use crate::rewards::{ReferralService, Transaction, TransactionReason, WalletService};
use crate::tables::{ORDERS, ORDER_ITEMS};
use chrono::Utc;
use feedme_db::{Db, Filter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Checkout request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaceOrder {
    pub voucher_code: Option<String>,
    /// Most the shopper wants to pay from their wallet.
    pub wallet_amount: Option<Money>,
    pub delivery_address: Option<String>,
    pub note: Option<String>,
}

impl PlaceOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voucher(mut self, code: impl Into<String>) -> Self {
        self.voucher_code = Some(code.into());
        self
    }

    pub fn with_wallet(mut self, amount: Money) -> Self {
        self.wallet_amount = Some(amount);
        self
    }

    pub fn deliver_to(mut self, address: impl Into<String>) -> Self {
        self.delivery_address = Some(address.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Everything written by a successful checkout.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub purchases: Vec<OfferPurchase>,
    pub referral_activated: bool,
    pub cashback: Option<Transaction>,
}

/// Side effects to undo if a later checkout step fails.
#[derive(Default)]
struct Undo {
    purchases: Vec<OfferPurchase>,
    voucher_code: Option<String>,
    wallet_debit: Option<Money>,
    order_id: Option<OrderId>,
}

/// Ties the cart, offers, vouchers, wallet and referrals into orders.
#[derive(Clone)]
pub struct CheckoutService {
    db: Db,
    carts: CartService,
    offers: OfferService,
    vouchers: VoucherService,
    wallets: WalletService,
    referrals: ReferralService,
    currency: Currency,
}

impl CheckoutService {
    pub fn new(
        db: Db,
        carts: CartService,
        offers: OfferService,
        vouchers: VoucherService,
        wallets: WalletService,
        referrals: ReferralService,
        config: &CommerceConfig,
    ) -> Self {
        Self {
            db,
            carts,
            offers,
            vouchers,
            wallets,
            referrals,
            currency: config.currency,
        }
    }

    /// Turn the user's server cart into an order.
    ///
    /// Offer slots are bought, the voucher redeemed and the wallet debited
    /// in that order. If any later step fails the earlier ones are undone.
    pub async fn place_order(
        &self,
        user_id: &UserId,
        request: PlaceOrder,
    ) -> Result<PlacedOrder, CommerceError> {
        let lines = self.carts.lines(user_id).await?;
        if lines.is_empty() {
            return Err(CommerceError::EmptyCart);
        }
        let subtotal = cart::total(&lines, self.currency)?;
        let order_number = Order::generate_order_number();

        let mut undo = Undo::default();
        let written = self
            .write_order(user_id, &lines, subtotal, order_number, &request, &mut undo)
            .await;
        match written {
            Ok((order, items)) => {
                debug!(order_id = %order.id, items = items.len(), "order rows written");
                let purchases = undo.purchases;
                self.finish(user_id, order, items, purchases).await
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "checkout failed, undoing");
                self.undo(user_id, undo).await;
                Err(e)
            }
        }
    }

    async fn write_order(
        &self,
        user_id: &UserId,
        lines: &[CartLine],
        subtotal: Money,
        order_number: String,
        request: &PlaceOrder,
        undo: &mut Undo,
    ) -> Result<(Order, Vec<OrderItem>), CommerceError> {
        let now = Utc::now();

        let mut purchase_ids = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            if let Some(offer_id) = &line.offer_id {
                let purchase = self.offers.purchase(user_id, offer_id, line.quantity).await?;
                purchase_ids.insert(index, purchase.id.clone());
                undo.purchases.push(purchase);
            }
        }

        let mut discount = Money::zero(self.currency);
        let mut voucher_code = None;
        if let Some(code) = &request.voucher_code {
            let quote = self.vouchers.redeem(code, &subtotal, now).await?;
            undo.voucher_code = Some(quote.code.clone());
            discount = quote.discount;
            voucher_code = Some(quote.code);
        }
        let total = subtotal.try_subtract(&discount).ok_or(CommerceError::Overflow)?;

        let mut wallet_used = Money::zero(self.currency);
        if let Some(requested) = request.wallet_amount {
            let amount = requested.min(total);
            if amount.is_positive() {
                self.wallets
                    .debit(user_id, amount, TransactionReason::Purchase, Some(order_number.clone()))
                    .await?;
                undo.wallet_debit = Some(amount);
                wallet_used = amount;
            }
        }
        let amount_payable = total.try_subtract(&wallet_used).ok_or(CommerceError::Overflow)?;

        let (status, paid_at) = if amount_payable.is_zero() {
            (OrderStatus::Paid, Some(now))
        } else {
            (OrderStatus::PendingPayment, None)
        };
        let order = Order {
            id: OrderId::generate(),
            order_number,
            user_id: user_id.clone(),
            status,
            subtotal,
            discount,
            wallet_used,
            total,
            amount_payable,
            voucher_code,
            delivery_address: request.delivery_address.clone(),
            note: request.note.clone(),
            created_at: now,
            updated_at: now,
            paid_at,
            cancelled_at: None,
        };

        let items = lines
            .iter()
            .enumerate()
            .map(|(i, line)| OrderItem::from_line(&order.id, line, purchase_ids.get(&i).cloned()))
            .collect::<Result<Vec<_>, _>>()?;

        self.db.insert(ORDERS, &order).await?;
        undo.order_id = Some(order.id.clone());
        for item in &items {
            self.db.insert(ORDER_ITEMS, item).await?;
        }
        Ok((order, items))
    }

    async fn finish(
        &self,
        user_id: &UserId,
        order: Order,
        items: Vec<OrderItem>,
        purchases: Vec<OfferPurchase>,
    ) -> Result<PlacedOrder, CommerceError> {
        if let Err(e) = self.carts.clear(user_id).await {
            warn!(order_id = %order.id, error = %e, "order placed but cart not cleared");
        }

        let previous = self
            .db
            .count(ORDERS, &Filter::all().eq("user_id", user_id))
            .await?;
        let mut referral_activated = false;
        if previous == 1 && self.referrals.pending_for(user_id).await?.is_some() {
            match self.referrals.activate(user_id).await {
                Ok(_) => referral_activated = true,
                Err(e) => warn!(user_id = %user_id, error = %e, "referral activation failed"),
            }
        }

        let cashback = if order.status == OrderStatus::Paid {
            self.wallets
                .award_cashback(user_id, &order.total, Some(order.order_number.clone()))
                .await?
        } else {
            None
        };

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            user_id = %user_id,
            total = %order.total.display(),
            payable = %order.amount_payable.display(),
            "order placed"
        );
        Ok(PlacedOrder {
            order,
            items,
            purchases,
            referral_activated,
            cashback,
        })
    }

    async fn undo(&self, user_id: &UserId, undo: Undo) {
        if let Some(order_id) = &undo.order_id {
            let removed = async {
                self.db
                    .delete_where(ORDER_ITEMS, &Filter::all().eq("order_id", order_id))
                    .await?;
                self.db.delete(ORDERS, order_id.as_str()).await
            }
            .await;
            if let Err(e) = removed {
                warn!(order_id = %order_id, error = %e, "could not remove partial order");
            }
        }
        if let Some(amount) = undo.wallet_debit {
            if let Err(e) = self
                .wallets
                .credit(user_id, amount, TransactionReason::Refund, None)
                .await
            {
                warn!(user_id = %user_id, error = %e, "could not refund wallet debit");
            }
        }
        if let Some(code) = &undo.voucher_code {
            if let Err(e) = self.vouchers.release(code).await {
                warn!(code = %code, error = %e, "could not release voucher");
            }
        }
        for purchase in &undo.purchases {
            if let Err(e) = self.offers.release(purchase).await {
                warn!(purchase_id = %purchase.id, error = %e, "could not release offer slots");
            }
        }
    }

    pub async fn get(&self, order_id: &OrderId) -> Result<Order, CommerceError> {
        self.db
            .get(ORDERS, order_id.as_str())
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))
    }

    async fn set_status(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order, CommerceError> {
        self.db
            .update_one(ORDERS, order_id.as_str(), |order: &mut Order| {
                order.status = order.status.transition(next)?;
                let now = Utc::now();
                order.updated_at = now;
                match next {
                    OrderStatus::Paid => order.paid_at = Some(now),
                    OrderStatus::Cancelled => order.cancelled_at = Some(now),
                    _ => {}
                }
                Ok::<_, CommerceError>(())
            })
            .await
            .map_err(|e| match e {
                CommerceError::Database(feedme_db::DbError::NotFound { .. }) => {
                    CommerceError::OrderNotFound(order_id.to_string())
                }
                other => other,
            })
    }

    /// Record payment and award cashback.
    pub async fn mark_paid(&self, order_id: &OrderId) -> Result<(Order, Option<Transaction>), CommerceError> {
        let order = self.set_status(order_id, OrderStatus::Paid).await?;
        let cashback = self
            .wallets
            .award_cashback(&order.user_id, &order.total, Some(order.order_number.clone()))
            .await?;
        info!(order_number = %order.order_number, "order paid");
        Ok((order, cashback))
    }

    /// Move a paid order along the fulfilment path.
    pub async fn advance(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order, CommerceError> {
        if matches!(next, OrderStatus::Paid | OrderStatus::Cancelled) {
            let current = self.get(order_id).await?;
            return Err(CommerceError::InvalidOrderTransition {
                from: current.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.set_status(order_id, next).await
    }

    /// Cancel an order, returning offer slots and wallet money.
    ///
    /// Cashback already paid on the order is taken back when the balance
    /// allows it. Each give-back is attempted even if an earlier one fails;
    /// the order stays cancelled and the first failure is returned.
    pub async fn cancel(&self, order_id: &OrderId) -> Result<Order, CommerceError> {
        let before = self.get(order_id).await?;
        let order = self.set_status(order_id, OrderStatus::Cancelled).await?;
        let reference = Some(order.order_number.clone());
        let mut first_error: Option<CommerceError> = None;

        match self.items_for(order_id).await {
            Ok(items) => {
                for purchase_id in items.iter().filter_map(|item| item.purchase_id.as_ref()) {
                    let released = match self.offers.find_purchase(purchase_id).await {
                        Ok(Some(purchase)) => self.offers.release(&purchase).await,
                        Ok(None) => Ok(()),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = released {
                        warn!(order_number = %order.order_number, purchase_id = %purchase_id, error = %e, "offer slots not released");
                        first_error.get_or_insert(e);
                    }
                }
            }
            Err(e) => {
                warn!(order_number = %order.order_number, error = %e, "order items not loaded, offer slots not released");
                first_error.get_or_insert(e);
            }
        }

        if order.wallet_used.is_positive() {
            if let Err(e) = self
                .wallets
                .credit(&order.user_id, order.wallet_used, TransactionReason::Refund, reference.clone())
                .await
            {
                warn!(order_number = %order.order_number, error = %e, "wallet refund failed");
                first_error.get_or_insert(e);
            }
        }

        if before.status != OrderStatus::PendingPayment {
            let cashback = self.wallets.cashback_for(&order.total);
            if cashback.is_positive() {
                if let Err(e) = self
                    .wallets
                    .debit(&order.user_id, cashback, TransactionReason::Adjustment, reference)
                    .await
                {
                    warn!(order_number = %order.order_number, error = %e, "cashback not reversed");
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        info!(order_number = %order.order_number, "order cancelled");
        Ok(order)
    }

    /// A user's orders, newest first.
    pub async fn orders_for(&self, user_id: &UserId) -> Result<Vec<Order>, CommerceError> {
        let mut orders: Vec<Order> = self
            .db
            .select(ORDERS, &Filter::all().eq("user_id", user_id))
            .await?;
        orders.reverse();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub async fn items_for(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, CommerceError> {
        Ok(self
            .db
            .select(ORDER_ITEMS, &Filter::all().eq("order_id", order_id))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProductId;
    use crate::promotions::{DiscountValue, Offer, Voucher, VoucherKind};
    use crate::tables::register_schema;

    fn ngn(major: i64) -> Money {
        Money::from_major(major, Currency::NGN)
    }

    struct Fixture {
        checkout: CheckoutService,
        carts: CartService,
        offers: OfferService,
        vouchers: VoucherService,
        wallets: WalletService,
    }

    async fn fixture() -> Fixture {
        let db = Db::new();
        register_schema(&db).await.unwrap();
        let config = CommerceConfig::default();
        let offers = OfferService::new(db.clone());
        let carts = CartService::new(db.clone(), offers.clone(), &config);
        let vouchers = VoucherService::new(db.clone(), config.clone());
        let wallets = WalletService::new(db.clone(), &config);
        let referrals = ReferralService::new(db.clone(), wallets.clone(), &config);
        let checkout = CheckoutService::new(
            db,
            carts.clone(),
            offers.clone(),
            vouchers.clone(),
            wallets.clone(),
            referrals,
            &config,
        );
        Fixture {
            checkout,
            carts,
            offers,
            vouchers,
            wallets,
        }
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let f = fixture().await;
        let err = f
            .checkout
            .place_order(&UserId::new("ada"), PlaceOrder::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::EmptyCart));
    }

    #[tokio::test]
    async fn test_place_order_with_voucher_and_wallet() {
        let f = fixture().await;
        let user = UserId::new("ada");
        f.carts
            .add_line(&user, CartLine::product(ProductId::new("rice"), 2, ngn(10_000)))
            .await
            .unwrap();
        f.vouchers
            .create(Voucher::new("SAVE10", VoucherKind::Manual, DiscountValue::Percentage(10)))
            .await
            .unwrap();
        f.wallets
            .credit(&user, ngn(3_000), TransactionReason::Adjustment, None)
            .await
            .unwrap();

        let placed = f
            .checkout
            .place_order(&user, PlaceOrder::new().with_voucher("save10").with_wallet(ngn(5_000)))
            .await
            .unwrap();

        let order = &placed.order;
        assert_eq!(order.subtotal, ngn(20_000));
        assert_eq!(order.discount, ngn(2_000));
        assert_eq!(order.wallet_used, ngn(3_000));
        assert_eq!(order.amount_payable, ngn(15_000));
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert!(f.carts.lines(&user).await.unwrap().is_empty());
        assert_eq!(f.wallets.balance(&user).await.unwrap(), ngn(0));

        let (paid, cashback) = f.checkout.mark_paid(&order.id).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(cashback.unwrap().amount, ngn(360));
    }

    #[tokio::test]
    async fn test_failure_releases_offer_slots() {
        let f = fixture().await;
        let user = UserId::new("ada");
        let offer = f.offers.create(Offer::new("Beef share", ngn(15_000), 5)).await.unwrap();
        f.carts
            .add_line(&user, CartLine::offer(offer.id.clone(), 2, ngn(15_000)))
            .await
            .unwrap();

        let err = f
            .checkout
            .place_order(&user, PlaceOrder::new().with_voucher("NOPE"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::VoucherNotFound(_)));

        assert_eq!(f.offers.get(&offer.id).await.unwrap().available_slots, 5);
        assert_eq!(f.carts.lines(&user).await.unwrap().len(), 1);
        assert!(f.checkout.orders_for(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_covering_total_pays_order() {
        let f = fixture().await;
        let user = UserId::new("ada");
        f.carts
            .add_line(&user, CartLine::product(ProductId::new("eggs"), 1, ngn(4_000)))
            .await
            .unwrap();
        f.wallets
            .credit(&user, ngn(10_000), TransactionReason::Adjustment, None)
            .await
            .unwrap();

        let placed = f
            .checkout
            .place_order(&user, PlaceOrder::new().with_wallet(ngn(10_000)))
            .await
            .unwrap();
        assert_eq!(placed.order.status, OrderStatus::Paid);
        assert_eq!(placed.order.wallet_used, ngn(4_000));
        assert_eq!(placed.cashback.unwrap().amount, ngn(80));
        assert_eq!(f.wallets.balance(&user).await.unwrap(), ngn(6_080));
    }

    #[tokio::test]
    async fn test_cancel_refunds_wallet_and_slots() {
        let f = fixture().await;
        let user = UserId::new("ada");
        let offer = f.offers.create(Offer::new("Fish crate", ngn(8_000), 3)).await.unwrap();
        f.carts
            .add_line(&user, CartLine::offer(offer.id.clone(), 3, ngn(8_000)))
            .await
            .unwrap();
        f.wallets
            .credit(&user, ngn(1_000), TransactionReason::Adjustment, None)
            .await
            .unwrap();

        let placed = f
            .checkout
            .place_order(&user, PlaceOrder::new().with_wallet(ngn(1_000)))
            .await
            .unwrap();
        assert_eq!(placed.purchases.len(), 1);
        assert_eq!(f.offers.get(&offer.id).await.unwrap().available_slots, 0);

        let cancelled = f.checkout.cancel(&placed.order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(f.wallets.balance(&user).await.unwrap(), ngn(1_000));
        assert_eq!(f.offers.get(&offer.id).await.unwrap().available_slots, 3);

        let err = f.checkout.cancel(&placed.order.id).await.unwrap_err();
        assert!(matches!(err, CommerceError::InvalidOrderTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancel_releases_slots_when_refund_fails() {
        let f = fixture().await;
        let user = UserId::new("ada");
        let offer = f.offers.create(Offer::new("Ram share", ngn(40_000), 2)).await.unwrap();
        f.carts
            .add_line(&user, CartLine::offer(offer.id.clone(), 2, ngn(40_000)))
            .await
            .unwrap();
        f.wallets
            .credit(&user, ngn(5_000), TransactionReason::Adjustment, None)
            .await
            .unwrap();
        let placed = f
            .checkout
            .place_order(&user, PlaceOrder::new().with_wallet(ngn(5_000)))
            .await
            .unwrap();
        assert_eq!(f.offers.get(&offer.id).await.unwrap().available_slots, 0);

        // Fill the wallet so the refund overflows.
        f.wallets
            .credit(&user, Money::new(i64::MAX, Currency::NGN), TransactionReason::Adjustment, None)
            .await
            .unwrap();

        let err = f.checkout.cancel(&placed.order.id).await.unwrap_err();
        assert!(matches!(err, CommerceError::Overflow));
        assert_eq!(f.offers.get(&offer.id).await.unwrap().available_slots, 2);
        assert_eq!(
            f.checkout.get(&placed.order.id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_advance_fulfilment() {
        let f = fixture().await;
        let user = UserId::new("ada");
        f.carts
            .add_line(&user, CartLine::product(ProductId::new("yam"), 1, ngn(2_000)))
            .await
            .unwrap();
        let placed = f.checkout.place_order(&user, PlaceOrder::new()).await.unwrap();
        let id = placed.order.id;

        assert!(f.checkout.advance(&id, OrderStatus::Processing).await.is_err());
        f.checkout.mark_paid(&id).await.unwrap();
        f.checkout.advance(&id, OrderStatus::Processing).await.unwrap();
        f.checkout.advance(&id, OrderStatus::OutForDelivery).await.unwrap();
        let done = f.checkout.advance(&id, OrderStatus::Delivered).await.unwrap();
        assert!(done.status.is_terminal());
        assert!(matches!(
            f.checkout.mark_paid(&OrderId::new("ghost")).await,
            Err(CommerceError::OrderNotFound(_))
        ));
    }
}

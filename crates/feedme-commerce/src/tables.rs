//! Backend table names and constraints.

use feedme_db::{Db, DbError};

pub const CARTS: &str = "carts";
pub const CART_ITEMS: &str = "cart_items";
pub const OFFERS: &str = "offers";
pub const OFFER_PURCHASES: &str = "offer_purchases";
pub const VOUCHERS: &str = "vouchers";
pub const WALLETS: &str = "wallets";
pub const TRANSACTIONS: &str = "transactions";
pub const REFERRAL_CODES: &str = "referral_codes";
pub const REFERRALS: &str = "referrals";
pub const ORDERS: &str = "orders";
pub const ORDER_ITEMS: &str = "order_items";
pub const EMAIL_EVENTS: &str = "email_events";
pub const PRODUCTS: &str = "products";

/// Create every table and its unique columns.
pub async fn register_schema(db: &Db) -> Result<(), DbError> {
    db.define_table(CARTS, &["user_id"]).await?;
    db.define_table(CART_ITEMS, &[]).await?;
    db.define_table(OFFERS, &[]).await?;
    db.define_table(OFFER_PURCHASES, &[]).await?;
    db.define_table(VOUCHERS, &["code"]).await?;
    db.define_table(WALLETS, &["user_id"]).await?;
    db.define_table(TRANSACTIONS, &[]).await?;
    db.define_table(REFERRAL_CODES, &["user_id", "code"]).await?;
    db.define_table(REFERRALS, &["referred_id"]).await?;
    db.define_table(ORDERS, &["order_number"]).await?;
    db.define_table(ORDER_ITEMS, &[]).await?;
    db.define_table(EMAIL_EVENTS, &[]).await?;
    db.define_table(PRODUCTS, &["sku"]).await?;
    Ok(())
}

//! All services wired over one backend and one local store.

use crate::analytics::EmailStatsService;
use crate::cart::{AnonymousCart, CartMergeFlow, CartService};
use crate::catalog::PriceListService;
use crate::checkout::CheckoutService;
use crate::config::CommerceConfig;
use crate::error::CommerceError;
use crate::promotions::{OfferService, VoucherService};
use crate::rewards::{ReferralService, WalletService};
use crate::tables::register_schema;
use feedme_cache::Cache;
use feedme_db::Db;
use tracing::debug;

/// The storefront's services.
///
/// Every service holds a clone of the same [`Db`] handle.
#[derive(Clone)]
pub struct Storefront {
    pub config: CommerceConfig,
    pub db: Db,
    pub anonymous: AnonymousCart,
    pub carts: CartService,
    pub offers: OfferService,
    pub vouchers: VoucherService,
    pub wallets: WalletService,
    pub referrals: ReferralService,
    pub checkout: CheckoutService,
    pub email_stats: EmailStatsService,
    pub prices: PriceListService,
}

impl Storefront {
    /// Register the table schema and build every service.
    pub async fn open(db: Db, local: Cache, config: CommerceConfig) -> Result<Self, CommerceError> {
        register_schema(&db).await?;

        let offers = OfferService::new(db.clone());
        let carts = CartService::new(db.clone(), offers.clone(), &config);
        let vouchers = VoucherService::new(db.clone(), config.clone());
        let wallets = WalletService::new(db.clone(), &config);
        let referrals = ReferralService::new(db.clone(), wallets.clone(), &config);
        let checkout = CheckoutService::new(
            db.clone(),
            carts.clone(),
            offers.clone(),
            vouchers.clone(),
            wallets.clone(),
            referrals.clone(),
            &config,
        );
        debug!(currency = config.currency.code(), "storefront ready");

        Ok(Self {
            anonymous: AnonymousCart::new(local, &config),
            email_stats: EmailStatsService::new(db.clone()),
            prices: PriceListService::new(db.clone()),
            carts,
            offers,
            vouchers,
            wallets,
            referrals,
            checkout,
            db,
            config,
        })
    }

    /// In-memory storefront with default settings.
    pub async fn in_memory() -> Result<Self, CommerceError> {
        Self::open(Db::new(), Cache::in_memory(), CommerceConfig::default()).await
    }

    /// A merge flow folding the anonymous cart into server carts.
    pub fn merge_flow(&self) -> CartMergeFlow<CartService> {
        CartMergeFlow::new(self.anonymous.clone(), self.carts.clone())
    }
}

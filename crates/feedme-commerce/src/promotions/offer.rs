//! Limited-slot offers and their purchase bookkeeping.

use crate::error::CommerceError;
use crate::ids::{OfferId, PurchaseId, UserId};
use crate::money::Money;
use crate::tables::{OFFERS, OFFER_PURCHASES};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedme_db::{Db, DbError, Filter};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Lifecycle of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// Being prepared, not visible to shoppers.
    Draft,
    /// Open for purchase.
    #[default]
    Active,
    /// Window closed.
    Expired,
    /// No slots left.
    SoldOut,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Draft => "draft",
            OfferStatus::Active => "active",
            OfferStatus::Expired => "expired",
            OfferStatus::SoldOut => "sold_out",
        }
    }
}

/// A promotional purchase unit with a finite number of slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: OfferId,
    pub title: String,
    pub description: Option<String>,
    /// Price of one slot.
    pub price: Money,
    pub total_slots: i64,
    pub available_slots: i64,
    pub status: OfferStatus,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    /// Create an active offer with all slots available.
    pub fn new(title: impl Into<String>, price: Money, slots: i64) -> Self {
        Self {
            id: OfferId::generate(),
            title: title.into(),
            description: None,
            price,
            total_slots: slots,
            available_slots: slots,
            status: OfferStatus::Active,
            starts_at: None,
            ends_at: None,
            created_at: Utc::now(),
        }
    }

    /// Restrict the offer to a purchase window.
    pub fn with_window(
        mut self,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    /// Check that `quantity` slots could be bought at `now`.
    pub fn check_availability(&self, quantity: i64, now: DateTime<Utc>) -> Result<(), CommerceError> {
        let id = || self.id.to_string();

        if quantity <= 0 {
            return Err(CommerceError::InvalidQuantity(quantity));
        }
        match self.status {
            OfferStatus::Draft => return Err(CommerceError::OfferInactive(id())),
            OfferStatus::Expired => return Err(CommerceError::OfferExpired(id())),
            OfferStatus::SoldOut => return Err(CommerceError::OfferSoldOut(id())),
            OfferStatus::Active => {}
        }
        if self.starts_at.map_or(false, |starts| now < starts) {
            return Err(CommerceError::OfferNotStarted(id()));
        }
        if self.ends_at.map_or(false, |ends| now > ends) {
            return Err(CommerceError::OfferExpired(id()));
        }
        if self.available_slots <= 0 {
            return Err(CommerceError::OfferSoldOut(id()));
        }
        if quantity > self.available_slots {
            return Err(CommerceError::InsufficientSlots {
                offer_id: id(),
                requested: quantity,
                available: self.available_slots,
            });
        }
        Ok(())
    }

    /// Whether a single slot could be bought at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.check_availability(1, now).is_ok()
    }
}

/// A confirmed slot purchase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferPurchase {
    pub id: PurchaseId,
    pub offer_id: OfferId,
    pub user_id: UserId,
    pub quantity: i64,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

/// Source of fresh offer records for availability checks.
#[async_trait]
pub trait OfferLookup: Send + Sync {
    /// Fetch the current offer record, `None` if it does not exist.
    async fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, CommerceError>;
}

/// Re-fetch an offer and check `quantity` slots against it.
pub async fn ensure_available(
    offers: &dyn OfferLookup,
    offer_id: &OfferId,
    quantity: i64,
) -> Result<Offer, CommerceError> {
    let offer = offers
        .fetch_offer(offer_id)
        .await?
        .ok_or_else(|| CommerceError::OfferNotFound(offer_id.to_string()))?;
    offer.check_availability(quantity, Utc::now())?;
    Ok(offer)
}

fn offer_missing(err: CommerceError, id: &OfferId) -> CommerceError {
    match err {
        CommerceError::Database(DbError::NotFound { .. }) => CommerceError::OfferNotFound(id.to_string()),
        other => other,
    }
}

/// Offer storage and slot purchases.
#[derive(Clone)]
pub struct OfferService {
    db: Db,
}

impl OfferService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Store a new offer.
    pub async fn create(&self, offer: Offer) -> Result<Offer, CommerceError> {
        if offer.total_slots <= 0 || offer.available_slots > offer.total_slots {
            return Err(CommerceError::Validation(format!(
                "offer slots must be positive, got {} of {}",
                offer.available_slots, offer.total_slots
            )));
        }
        self.db.insert(OFFERS, &offer).await?;
        info!(offer_id = %offer.id, slots = offer.total_slots, "offer created");
        Ok(offer)
    }

    /// Fetch an offer or fail with `OfferNotFound`.
    pub async fn get(&self, id: &OfferId) -> Result<Offer, CommerceError> {
        self.db
            .get(OFFERS, id.as_str())
            .await?
            .ok_or_else(|| CommerceError::OfferNotFound(id.to_string()))
    }

    /// Offers a shopper could buy right now.
    pub async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, CommerceError> {
        let offers: Vec<Offer> = self
            .db
            .select(OFFERS, &Filter::all().eq("status", OfferStatus::Active.as_str()))
            .await?;
        Ok(offers.into_iter().filter(|o| o.is_open(now)).collect())
    }

    /// Buy `quantity` slots.
    ///
    /// The slot check and decrement happen in one conditional update, so
    /// concurrent purchases cannot oversell. If recording the purchase
    /// fails the slots are put back.
    pub async fn purchase(
        &self,
        user_id: &UserId,
        offer_id: &OfferId,
        quantity: i64,
    ) -> Result<OfferPurchase, CommerceError> {
        let now = Utc::now();
        let offer: Offer = self
            .db
            .update_one(OFFERS, offer_id.as_str(), |offer: &mut Offer| {
                offer.check_availability(quantity, now)?;
                offer.available_slots -= quantity;
                if offer.available_slots == 0 {
                    offer.status = OfferStatus::SoldOut;
                }
                Ok::<_, CommerceError>(())
            })
            .await
            .map_err(|e| offer_missing(e, offer_id))
            .map_err(|e| {
                warn!(offer_id = %offer_id, quantity, error = %e, "offer purchase rejected");
                e
            })?;

        let amount = offer
            .price
            .try_multiply(quantity)
            .ok_or(CommerceError::Overflow)?;
        let purchase = OfferPurchase {
            id: PurchaseId::generate(),
            offer_id: offer_id.clone(),
            user_id: user_id.clone(),
            quantity,
            amount,
            created_at: now,
        };

        if let Err(e) = self.db.insert(OFFER_PURCHASES, &purchase).await {
            warn!(offer_id = %offer_id, error = %e, "recording purchase failed, restoring slots");
            self.restore_slots(offer_id, quantity).await?;
            return Err(e.into());
        }

        info!(
            offer_id = %offer_id,
            user_id = %user_id,
            quantity,
            remaining = offer.available_slots,
            "offer slots purchased"
        );
        Ok(purchase)
    }

    /// Put slots back, reopening a sold-out offer.
    pub async fn restore_slots(&self, offer_id: &OfferId, quantity: i64) -> Result<Offer, CommerceError> {
        self.db
            .update_one(OFFERS, offer_id.as_str(), |offer: &mut Offer| {
                offer.available_slots = (offer.available_slots + quantity).min(offer.total_slots);
                if offer.status == OfferStatus::SoldOut && offer.available_slots > 0 {
                    offer.status = OfferStatus::Active;
                }
                Ok::<_, CommerceError>(())
            })
            .await
            .map_err(|e| offer_missing(e, offer_id))
    }

    /// Undo a purchase: delete its record and return its slots.
    pub async fn release(&self, purchase: &OfferPurchase) -> Result<(), CommerceError> {
        self.db.delete(OFFER_PURCHASES, purchase.id.as_str()).await?;
        self.restore_slots(&purchase.offer_id, purchase.quantity).await?;
        info!(purchase_id = %purchase.id, "offer purchase released");
        Ok(())
    }

    /// Fetch a purchase record.
    pub async fn find_purchase(&self, id: &PurchaseId) -> Result<Option<OfferPurchase>, CommerceError> {
        Ok(self.db.get(OFFER_PURCHASES, id.as_str()).await?)
    }

    /// Purchases made by a user.
    pub async fn purchases_by(&self, user_id: &UserId) -> Result<Vec<OfferPurchase>, CommerceError> {
        Ok(self
            .db
            .select(OFFER_PURCHASES, &Filter::all().eq("user_id", user_id))
            .await?)
    }

    /// Mark active offers whose window has closed as expired.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize, CommerceError> {
        let active: Vec<Offer> = self
            .db
            .select(OFFERS, &Filter::all().eq("status", OfferStatus::Active.as_str()))
            .await?;
        let mut expired = 0;
        for offer in active.iter().filter(|o| o.ends_at.map_or(false, |e| now > e)) {
            self.db
                .update_one(OFFERS, offer.id.as_str(), |o: &mut Offer| {
                    o.status = OfferStatus::Expired;
                    Ok::<_, CommerceError>(())
                })
                .await?;
            expired += 1;
        }
        if expired > 0 {
            info!(count = expired, "offers expired");
        }
        Ok(expired)
    }
}

#[async_trait]
impl OfferLookup for OfferService {
    async fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, CommerceError> {
        Ok(self.db.get(OFFERS, id.as_str()).await?)
    }
}

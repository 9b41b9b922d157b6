//! Server-side cart rows for authenticated users.

use crate::cart::line::{self, check_quantity, CartLine};
use crate::config::CommerceConfig;
use crate::error::CommerceError;
use crate::ids::{BundleId, CartId, LineItemId, OfferId, ProductId, UserId};
use crate::money::{Currency, Money};
use crate::promotions::{ensure_available, OfferService};
use crate::tables::{CARTS, CART_ITEMS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedme_db::{Db, DbError, Filter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A user's cart header row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerCart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerCart {
    fn for_user(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::generate(),
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A stored cart line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItemRow {
    pub id: LineItemId,
    pub cart_id: CartId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub bundle_id: Option<BundleId>,
    #[serde(default)]
    pub offer_id: Option<OfferId>,
    pub quantity: i64,
    pub price: Money,
    #[serde(default)]
    pub option: Option<serde_json::Value>,
}

impl CartItemRow {
    /// Store `line` in `cart_id` under a fresh row id.
    fn from_line(cart_id: &CartId, line: &CartLine) -> Self {
        Self {
            id: LineItemId::generate(),
            cart_id: cart_id.clone(),
            product_id: line.product_id.clone(),
            bundle_id: line.bundle_id.clone(),
            offer_id: line.offer_id.clone(),
            quantity: line.quantity,
            price: line.price,
            option: line.option.clone(),
        }
    }

    pub fn into_line(self) -> CartLine {
        CartLine {
            id: self.id,
            product_id: self.product_id,
            bundle_id: self.bundle_id,
            offer_id: self.offer_id,
            quantity: self.quantity,
            price: self.price,
            option: self.option,
        }
    }
}

/// An incoming line left out of a merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedLine {
    pub line: CartLine,
    pub code: String,
    pub reason: String,
}

/// Result of folding anonymous lines into a server cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MergeReport {
    /// Incoming lines combined with a line already in the cart or earlier in the merge.
    pub merged: usize,
    /// Incoming lines stored as new server lines.
    pub added: usize,
    /// Lines dropped because their offer can no longer be satisfied.
    pub skipped: Vec<SkippedLine>,
}

impl MergeReport {
    /// Number of incoming lines that reached the server cart.
    pub fn applied(&self) -> usize {
        self.merged + self.added
    }
}

/// Merge function invoked when a shopper logs in.
#[async_trait]
pub trait CartMerger: Send + Sync {
    /// Fold `incoming` into the cart of `user_id`, whose loaded contents are `current`.
    async fn merge(
        &self,
        user_id: &UserId,
        current: &[CartLine],
        incoming: Vec<CartLine>,
    ) -> Result<MergeReport, CommerceError>;
}

/// A line of the merged cart as planned before any write.
struct Planned {
    line: CartLine,
    /// Already a row in the cart; otherwise inserted when the plan is applied.
    stored: bool,
    changed: bool,
}

/// Server cart storage.
#[derive(Clone)]
pub struct CartService {
    db: Db,
    offers: OfferService,
    currency: Currency,
    max_quantity: i64,
}

impl CartService {
    pub fn new(db: Db, offers: OfferService, config: &CommerceConfig) -> Self {
        Self {
            db,
            offers,
            currency: config.currency,
            max_quantity: config.max_quantity_per_line,
        }
    }

    /// The user's cart, created on first use.
    pub async fn get_or_create(&self, user_id: &UserId) -> Result<ServerCart, CommerceError> {
        let by_user = Filter::all().eq("user_id", user_id);
        if let Some(cart) = self.db.select_one(CARTS, &by_user).await? {
            return Ok(cart);
        }

        let cart = ServerCart::for_user(user_id.clone());
        match self.db.insert(CARTS, &cart).await {
            Ok(()) => {
                debug!(user_id = %user_id, cart_id = %cart.id, "server cart created");
                Ok(cart)
            }
            // Lost a race with another request creating the same cart.
            Err(e) if e.is_unique_violation() => self
                .db
                .select_one(CARTS, &by_user)
                .await?
                .ok_or(CommerceError::Database(e)),
            Err(e) => Err(e.into()),
        }
    }

    async fn rows(&self, cart_id: &CartId) -> Result<Vec<CartItemRow>, CommerceError> {
        Ok(self
            .db
            .select(CART_ITEMS, &Filter::all().eq("cart_id", cart_id))
            .await?)
    }

    async fn owned_row(
        &self,
        user_id: &UserId,
        line_id: &LineItemId,
    ) -> Result<CartItemRow, CommerceError> {
        let cart = self.get_or_create(user_id).await?;
        self.db
            .get::<CartItemRow>(CART_ITEMS, line_id.as_str())
            .await?
            .filter(|row| row.cart_id == cart.id)
            .ok_or_else(|| CommerceError::ItemNotInCart(line_id.to_string()))
    }

    async fn touch(&self, cart_id: &CartId) -> Result<(), CommerceError> {
        self.db
            .update_one(CARTS, cart_id.as_str(), |cart: &mut ServerCart| {
                cart.updated_at = Utc::now();
                Ok::<_, CommerceError>(())
            })
            .await?;
        Ok(())
    }

    async fn set_quantity(&self, row_id: &LineItemId, quantity: i64) -> Result<CartItemRow, CommerceError> {
        self.db
            .update_one(CART_ITEMS, row_id.as_str(), |row: &mut CartItemRow| {
                row.quantity = quantity;
                Ok::<_, CommerceError>(())
            })
            .await
    }

    /// Current lines of the user's cart.
    pub async fn lines(&self, user_id: &UserId) -> Result<Vec<CartLine>, CommerceError> {
        let cart = self.get_or_create(user_id).await?;
        Ok(self
            .rows(&cart.id)
            .await?
            .into_iter()
            .map(CartItemRow::into_line)
            .collect())
    }

    /// Add a line, combining it with a same-target line already in the cart.
    pub async fn add_line(&self, user_id: &UserId, item: CartLine) -> Result<CartLine, CommerceError> {
        check_quantity(item.quantity, self.max_quantity)?;
        let cart = self.get_or_create(user_id).await?;
        let existing = self
            .rows(&cart.id)
            .await?
            .into_iter()
            .map(CartItemRow::into_line)
            .find(|l| l.same_target(&item));

        let wanted = match &existing {
            Some(l) => l.quantity.checked_add(item.quantity).ok_or(CommerceError::Overflow)?,
            None => item.quantity,
        };
        check_quantity(wanted, self.max_quantity)?;
        if let Some(offer_id) = &item.offer_id {
            ensure_available(&self.offers, offer_id, wanted).await?;
        }

        let stored = match existing {
            Some(l) => self.set_quantity(&l.id, wanted).await?,
            None => {
                let row = CartItemRow::from_line(&cart.id, &item);
                self.db.insert(CART_ITEMS, &row).await?;
                row
            }
        };
        self.touch(&cart.id).await?;
        debug!(user_id = %user_id, line_id = %stored.id, quantity = stored.quantity, "server cart line stored");
        Ok(stored.into_line())
    }

    /// Set a line's quantity. Zero or less removes the line.
    pub async fn update_quantity(
        &self,
        user_id: &UserId,
        line_id: &LineItemId,
        quantity: i64,
    ) -> Result<Option<CartLine>, CommerceError> {
        let row = self.owned_row(user_id, line_id).await?;
        if quantity <= 0 {
            self.db.delete(CART_ITEMS, line_id.as_str()).await?;
            self.touch(&row.cart_id).await?;
            return Ok(None);
        }
        check_quantity(quantity, self.max_quantity)?;
        if let Some(offer_id) = &row.offer_id {
            ensure_available(&self.offers, offer_id, quantity).await?;
        }
        let updated = self.set_quantity(line_id, quantity).await?;
        self.touch(&row.cart_id).await?;
        Ok(Some(updated.into_line()))
    }

    /// Remove a line.
    pub async fn remove_line(&self, user_id: &UserId, line_id: &LineItemId) -> Result<(), CommerceError> {
        let row = self.owned_row(user_id, line_id).await?;
        self.db.delete(CART_ITEMS, line_id.as_str()).await?;
        self.touch(&row.cart_id).await
    }

    /// Remove every line. Returns how many were removed.
    pub async fn clear(&self, user_id: &UserId) -> Result<usize, CommerceError> {
        let cart = self.get_or_create(user_id).await?;
        let removed = self
            .db
            .delete_where(CART_ITEMS, &Filter::all().eq("cart_id", &cart.id))
            .await?;
        self.touch(&cart.id).await?;
        Ok(removed)
    }

    /// Sum of line totals.
    pub async fn total(&self, user_id: &UserId) -> Result<Money, CommerceError> {
        line::total(&self.lines(user_id).await?, self.currency)
    }

    /// Fold anonymous lines into the user's cart.
    ///
    /// Plans against the rows currently stored, not the caller's snapshot.
    /// Same-target lines have their quantities summed, capped at the
    /// per-line limit, including several incoming lines for one target.
    /// Offer lines are checked against the offer's current slots for the
    /// summed quantity and skipped when they no longer fit. Every line is
    /// checked before anything is written.
    pub async fn merge_lines(
        &self,
        user_id: &UserId,
        current: &[CartLine],
        incoming: Vec<CartLine>,
    ) -> Result<MergeReport, CommerceError> {
        let cart = self.get_or_create(user_id).await?;
        let stored = self.rows(&cart.id).await?;
        if stored.len() != current.len() {
            debug!(
                user_id = %user_id,
                loaded = current.len(),
                stored = stored.len(),
                "loaded cart differs from stored rows"
            );
        }

        let mut plan: Vec<Planned> = stored
            .into_iter()
            .map(|row| Planned {
                line: row.into_line(),
                stored: true,
                changed: false,
            })
            .collect();
        let mut report = MergeReport::default();

        for item in incoming {
            if item.quantity <= 0 {
                let err = CommerceError::InvalidQuantity(item.quantity);
                report.skipped.push(skipped(item, &err));
                continue;
            }
            let existing = plan.iter().position(|p| p.line.same_target(&item));
            let wanted = match existing {
                Some(i) => plan[i]
                    .line
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or(CommerceError::Overflow)?,
                None => item.quantity,
            }
            .min(self.max_quantity);

            if let Some(offer_id) = &item.offer_id {
                match ensure_available(&self.offers, offer_id, wanted).await {
                    Ok(_) => {}
                    Err(e) if e.is_availability_error() => {
                        warn!(user_id = %user_id, offer_id = %offer_id, error = %e, "skipping offer line during merge");
                        report.skipped.push(skipped(item, &e));
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            match existing {
                Some(i) => {
                    plan[i].line.quantity = wanted;
                    plan[i].changed = true;
                    report.merged += 1;
                }
                None => {
                    let mut line = item;
                    line.quantity = wanted;
                    plan.push(Planned {
                        line,
                        stored: false,
                        changed: true,
                    });
                    report.added += 1;
                }
            }
        }

        for planned in plan.into_iter().filter(|p| p.changed) {
            if planned.stored {
                match self.set_quantity(&planned.line.id, planned.line.quantity).await {
                    Ok(_) => continue,
                    // Removed since it was read; store the line fresh.
                    Err(CommerceError::Database(DbError::NotFound { .. })) => {}
                    Err(e) => return Err(e),
                }
            }
            self.db
                .insert(CART_ITEMS, &CartItemRow::from_line(&cart.id, &planned.line))
                .await?;
        }

        self.touch(&cart.id).await?;
        info!(
            user_id = %user_id,
            merged = report.merged,
            added = report.added,
            skipped = report.skipped.len(),
            "anonymous cart merged"
        );
        Ok(report)
    }
}

fn skipped(line: CartLine, err: &CommerceError) -> SkippedLine {
    SkippedLine {
        line,
        code: err.code().to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl CartMerger for CartService {
    async fn merge(
        &self,
        user_id: &UserId,
        current: &[CartLine],
        incoming: Vec<CartLine>,
    ) -> Result<MergeReport, CommerceError> {
        self.merge_lines(user_id, current, incoming).await
    }
}

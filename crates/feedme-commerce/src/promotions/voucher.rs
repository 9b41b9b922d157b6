//! Discount codes: welcome and exit-intent issuance, validation, redemption.

use crate::codes::{normalize_code, random_code, MAX_CODE_ATTEMPTS};
use crate::config::CommerceConfig;
use crate::error::CommerceError;
use crate::ids::{UserId, VoucherId};
use crate::money::Money;
use crate::promotions::DiscountValue;
use crate::tables::VOUCHERS;
use chrono::{DateTime, Duration, Utc};
use feedme_db::{Db, DbError, Filter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Why a voucher was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    /// Newsletter sign-up reward.
    Welcome,
    /// Offered when a visitor is about to leave.
    ExitIntent,
    /// Issued from a referral.
    Referral,
    /// Created by an admin.
    Manual,
}

impl VoucherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherKind::Welcome => "welcome",
            VoucherKind::ExitIntent => "exit_intent",
            VoucherKind::Referral => "referral",
            VoucherKind::Manual => "manual",
        }
    }

    fn code_prefix(&self) -> &'static str {
        match self {
            VoucherKind::Welcome => "WELCOME",
            VoucherKind::ExitIntent => "STAY",
            VoucherKind::Referral => "FRIEND",
            VoucherKind::Manual => "FEEDME",
        }
    }
}

/// A discount code record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voucher {
    pub id: VoucherId,
    /// Uppercase code the shopper types in.
    pub code: String,
    pub kind: VoucherKind,
    pub discount: DiscountValue,
    /// Minimum subtotal the voucher applies to.
    pub min_order: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub used_count: i64,
    /// `None` means unlimited.
    pub max_uses: Option<i64>,
    pub active: bool,
    /// Recipient for issued codes.
    pub email: Option<String>,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    /// Create an active, unlimited voucher valid from now.
    pub fn new(code: impl AsRef<str>, kind: VoucherKind, discount: DiscountValue) -> Self {
        let now = Utc::now();
        Self {
            id: VoucherId::generate(),
            code: normalize_code(code.as_ref()),
            kind,
            discount,
            min_order: None,
            valid_from: now,
            valid_until: None,
            used_count: 0,
            max_uses: None,
            active: true,
            email: None,
            user_id: None,
            created_at: now,
        }
    }

    pub fn with_max_uses(mut self, max_uses: i64) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn with_min_order(mut self, amount: Money) -> Self {
        self.min_order = Some(amount);
        self
    }

    pub fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }

    pub fn for_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Check if the usage cap has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.max_uses.map_or(false, |max| self.used_count >= max)
    }

    /// Check if the validity window has closed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map_or(false, |until| now > until)
    }

    /// Check the voucher against a subtotal and return the discount it gives.
    pub fn validate(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<Money, CommerceError> {
        let code = || self.code.clone();

        if !self.active {
            return Err(CommerceError::VoucherInactive(code()));
        }
        if now < self.valid_from {
            return Err(CommerceError::VoucherNotYetValid(code()));
        }
        if self.is_expired(now) {
            return Err(CommerceError::VoucherExpired(code()));
        }
        if self.is_exhausted() {
            return Err(CommerceError::VoucherExhausted(code()));
        }
        if let Some(min) = &self.min_order {
            if min.currency != subtotal.currency {
                return Err(CommerceError::CurrencyMismatch {
                    expected: min.currency.code().to_string(),
                    got: subtotal.currency.code().to_string(),
                });
            }
            if subtotal.amount_minor < min.amount_minor {
                return Err(CommerceError::VoucherMinimumNotMet {
                    code: code(),
                    minimum: min.display(),
                });
            }
        }
        Ok(self.discount.calculate(subtotal))
    }
}

/// Result of a successful voucher check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoucherQuote {
    pub voucher_id: VoucherId,
    pub code: String,
    pub discount: Money,
    pub label: String,
}

impl VoucherQuote {
    fn new(voucher: &Voucher, discount: Money) -> Self {
        Self {
            voucher_id: voucher.id.clone(),
            code: voucher.code.clone(),
            discount,
            label: voucher.discount.label(),
        }
    }
}

fn voucher_missing(err: CommerceError, code: &str) -> CommerceError {
    match err {
        CommerceError::Database(DbError::NotFound { .. }) => CommerceError::VoucherNotFound(code.to_string()),
        other => other,
    }
}

fn normalize_email(email: &str) -> Result<String, CommerceError> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(CommerceError::Validation(format!("invalid email address: {}", email))),
    }
}

/// Voucher issuance and redemption.
#[derive(Clone)]
pub struct VoucherService {
    db: Db,
    config: CommerceConfig,
}

impl VoucherService {
    pub fn new(db: Db, config: CommerceConfig) -> Self {
        Self { db, config }
    }

    /// Single-use percentage code for a newsletter sign-up.
    pub async fn issue_welcome(&self, email: &str) -> Result<Voucher, CommerceError> {
        self.issue_single_use(
            VoucherKind::Welcome,
            email,
            self.config.welcome_discount_percent,
            self.config.welcome_valid_days,
        )
        .await
    }

    /// Single-use percentage code for a visitor about to leave.
    pub async fn issue_exit_intent(&self, email: &str) -> Result<Voucher, CommerceError> {
        self.issue_single_use(
            VoucherKind::ExitIntent,
            email,
            self.config.exit_intent_discount_percent,
            self.config.exit_intent_valid_days,
        )
        .await
    }

    async fn issue_single_use(
        &self,
        kind: VoucherKind,
        email: &str,
        percent: u32,
        valid_days: i64,
    ) -> Result<Voucher, CommerceError> {
        let email = normalize_email(email)?;
        let now = Utc::now();

        let unused: Vec<Voucher> = self
            .db
            .select(
                VOUCHERS,
                &Filter::all()
                    .eq("email", email.as_str())
                    .eq("kind", kind.as_str())
                    .eq("active", true),
            )
            .await?;
        if let Some(existing) = unused
            .into_iter()
            .find(|v| !v.is_exhausted() && !v.is_expired(now))
        {
            debug!(code = %existing.code, kind = kind.as_str(), "reusing issued voucher");
            return Ok(existing);
        }

        for _ in 0..MAX_CODE_ATTEMPTS {
            let voucher = Voucher::new(
                random_code(kind.code_prefix(), 6),
                kind,
                DiscountValue::Percentage(percent),
            )
            .with_max_uses(1)
            .valid_until(now + Duration::days(valid_days))
            .for_email(email.clone());

            match self.db.insert(VOUCHERS, &voucher).await {
                Ok(()) => {
                    info!(code = %voucher.code, kind = kind.as_str(), "voucher issued");
                    return Ok(voucher);
                }
                Err(e) if e.is_unique_violation() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(CommerceError::Validation(
            "could not allocate a unique voucher code".to_string(),
        ))
    }

    /// Store an admin-defined voucher.
    pub async fn create(&self, voucher: Voucher) -> Result<Voucher, CommerceError> {
        match self.db.insert(VOUCHERS, &voucher).await {
            Ok(()) => {
                info!(code = %voucher.code, "voucher created");
                Ok(voucher)
            }
            Err(e) if e.is_unique_violation() => Err(CommerceError::VoucherCodeTaken(voucher.code)),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a voucher by code (case-insensitive).
    pub async fn find(&self, code: &str) -> Result<Option<Voucher>, CommerceError> {
        Ok(self
            .db
            .select_one(VOUCHERS, &Filter::all().eq("code", normalize_code(code)))
            .await?)
    }

    async fn require(&self, code: &str) -> Result<Voucher, CommerceError> {
        self.find(code)
            .await?
            .ok_or_else(|| CommerceError::VoucherNotFound(normalize_code(code)))
    }

    /// Check a code against a subtotal without using it.
    pub async fn validate(
        &self,
        code: &str,
        subtotal: &Money,
        now: DateTime<Utc>,
    ) -> Result<VoucherQuote, CommerceError> {
        let voucher = self.require(code).await?;
        let discount = voucher.validate(subtotal, now)?;
        Ok(VoucherQuote::new(&voucher, discount))
    }

    /// Validate and count one use, atomically.
    pub async fn redeem(
        &self,
        code: &str,
        subtotal: &Money,
        now: DateTime<Utc>,
    ) -> Result<VoucherQuote, CommerceError> {
        let voucher = self.require(code).await?;
        let mut discount = Money::zero(subtotal.currency);
        let updated: Voucher = self
            .db
            .update_one(VOUCHERS, voucher.id.as_str(), |v: &mut Voucher| {
                discount = v.validate(subtotal, now)?;
                v.used_count += 1;
                Ok::<_, CommerceError>(())
            })
            .await
            .map_err(|e| voucher_missing(e, &voucher.code))
            .map_err(|e| {
                warn!(code = %voucher.code, error = %e, "voucher redemption rejected");
                e
            })?;
        info!(code = %updated.code, used = updated.used_count, "voucher redeemed");
        Ok(VoucherQuote::new(&updated, discount))
    }

    /// Give back one use after a failed checkout.
    pub async fn release(&self, code: &str) -> Result<(), CommerceError> {
        let voucher = self.require(code).await?;
        self.db
            .update_one(VOUCHERS, voucher.id.as_str(), |v: &mut Voucher| {
                v.used_count = (v.used_count - 1).max(0);
                Ok::<_, CommerceError>(())
            })
            .await
            .map_err(|e| voucher_missing(e, &voucher.code))?;
        Ok(())
    }

    /// Switch a voucher off.
    pub async fn deactivate(&self, code: &str) -> Result<Voucher, CommerceError> {
        let voucher = self.require(code).await?;
        self.db
            .update_one(VOUCHERS, voucher.id.as_str(), |v: &mut Voucher| {
                v.active = false;
                Ok::<_, CommerceError>(())
            })
            .await
            .map_err(|e| voucher_missing(e, &voucher.code))
    }
}

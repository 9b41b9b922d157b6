//! Referral codes and referral bonuses.

use crate::codes::{normalize_code, random_code, MAX_CODE_ATTEMPTS};
use crate::config::CommerceConfig;
use crate::error::CommerceError;
use crate::ids::{ReferralId, UserId};
use crate::money::Money;
use crate::rewards::wallet::{TransactionReason, WalletService};
use crate::tables::{REFERRALS, REFERRAL_CODES};
use chrono::{DateTime, Utc};
use feedme_db::{Db, Filter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const CODE_PREFIX: &str = "FM";
const CODE_LEN: usize = 6;

/// The shareable code owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralCode {
    pub id: ReferralId,
    pub user_id: UserId,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    /// Registered, waiting for the referred user's first order.
    Pending,
    /// Bonuses paid.
    Active,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Active => "active",
        }
    }
}

/// Link between a referrer and the user they brought in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Referral {
    pub id: ReferralId,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub code: String,
    pub status: ReferralStatus,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Referral bookkeeping. Bonuses are paid into both users' wallets.
#[derive(Clone)]
pub struct ReferralService {
    db: Db,
    wallets: WalletService,
    referrer_bonus: Money,
    referred_bonus: Money,
}

impl ReferralService {
    pub fn new(db: Db, wallets: WalletService, config: &CommerceConfig) -> Self {
        Self {
            db,
            wallets,
            referrer_bonus: config.referrer_bonus(),
            referred_bonus: config.referred_bonus(),
        }
    }

    /// The user's referral code, created on first request.
    pub async fn code_for(&self, user_id: &UserId) -> Result<ReferralCode, CommerceError> {
        let by_user = Filter::all().eq("user_id", user_id);
        if let Some(existing) = self.db.select_one(REFERRAL_CODES, &by_user).await? {
            return Ok(existing);
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let record = ReferralCode {
                id: ReferralId::generate(),
                user_id: user_id.clone(),
                code: random_code(CODE_PREFIX, CODE_LEN),
                created_at: Utc::now(),
            };
            match self.db.insert(REFERRAL_CODES, &record).await {
                Ok(()) => {
                    info!(user_id = %user_id, code = %record.code, "referral code created");
                    return Ok(record);
                }
                Err(e) if e.is_unique_violation() => {
                    if let Some(existing) = self.db.select_one(REFERRAL_CODES, &by_user).await? {
                        return Ok(existing);
                    }
                    debug!(attempt, "referral code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CommerceError::Validation(
            "could not allocate a unique referral code".to_string(),
        ))
    }

    async fn owner_of(&self, code: &str) -> Result<ReferralCode, CommerceError> {
        let code = normalize_code(code);
        self.db
            .select_one(REFERRAL_CODES, &Filter::all().eq("code", code.as_str()))
            .await?
            .ok_or(CommerceError::ReferralCodeNotFound(code))
    }

    /// Record that `referred_id` signed up with `code`.
    pub async fn register(&self, referred_id: &UserId, code: &str) -> Result<Referral, CommerceError> {
        let owner = self.owner_of(code).await?;
        if &owner.user_id == referred_id {
            return Err(CommerceError::SelfReferral);
        }
        if self.referral_of(referred_id).await?.is_some() {
            return Err(CommerceError::AlreadyReferred(referred_id.to_string()));
        }

        let referral = Referral {
            id: ReferralId::generate(),
            referrer_id: owner.user_id,
            referred_id: referred_id.clone(),
            code: owner.code,
            status: ReferralStatus::Pending,
            created_at: Utc::now(),
            activated_at: None,
        };
        match self.db.insert(REFERRALS, &referral).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation() => {
                return Err(CommerceError::AlreadyReferred(referred_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            referrer_id = %referral.referrer_id,
            referred_id = %referred_id,
            "referral registered"
        );
        Ok(referral)
    }

    async fn referral_of(&self, referred_id: &UserId) -> Result<Option<Referral>, CommerceError> {
        Ok(self
            .db
            .select_one(REFERRALS, &Filter::all().eq("referred_id", referred_id))
            .await?)
    }

    /// The user's referral if it has not paid out yet.
    pub async fn pending_for(&self, referred_id: &UserId) -> Result<Option<Referral>, CommerceError> {
        Ok(self
            .referral_of(referred_id)
            .await?
            .filter(|r| r.status == ReferralStatus::Pending))
    }

    /// Pay both bonuses and mark the referral active.
    pub async fn activate(&self, referred_id: &UserId) -> Result<Referral, CommerceError> {
        let referral = self
            .referral_of(referred_id)
            .await?
            .ok_or_else(|| CommerceError::ReferralNotFound(referred_id.to_string()))?;

        let activated: Referral = self
            .db
            .update_one(REFERRALS, referral.id.as_str(), |r: &mut Referral| {
                if r.status == ReferralStatus::Active {
                    return Err(CommerceError::ReferralAlreadyActivated(r.referred_id.to_string()));
                }
                r.status = ReferralStatus::Active;
                r.activated_at = Some(Utc::now());
                Ok(())
            })
            .await?;

        if let Err(e) = self.pay_bonuses(&activated).await {
            warn!(referral_id = %activated.id, error = %e, "referral bonus failed, reverting to pending");
            self.db
                .update_one(REFERRALS, activated.id.as_str(), |r: &mut Referral| {
                    r.status = ReferralStatus::Pending;
                    r.activated_at = None;
                    Ok::<_, CommerceError>(())
                })
                .await?;
            return Err(e);
        }

        info!(
            referrer_id = %activated.referrer_id,
            referred_id = %referred_id,
            "referral activated"
        );
        Ok(activated)
    }

    async fn pay_bonuses(&self, referral: &Referral) -> Result<(), CommerceError> {
        let reference = Some(referral.id.to_string());
        if self.referrer_bonus.is_positive() {
            self.wallets
                .credit(
                    &referral.referrer_id,
                    self.referrer_bonus,
                    TransactionReason::ReferralBonus,
                    reference.clone(),
                )
                .await?;
        }
        if self.referred_bonus.is_positive() {
            self.wallets
                .credit(
                    &referral.referred_id,
                    self.referred_bonus,
                    TransactionReason::ReferralBonus,
                    reference,
                )
                .await?;
        }
        Ok(())
    }

    /// Referrals made with the user's code.
    pub async fn referrals_by(&self, referrer_id: &UserId) -> Result<Vec<Referral>, CommerceError> {
        Ok(self
            .db
            .select(REFERRALS, &Filter::all().eq("referrer_id", referrer_id))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::tables::register_schema;

    async fn services() -> (ReferralService, WalletService) {
        let db = Db::new();
        register_schema(&db).await.unwrap();
        let config = CommerceConfig::default();
        let wallets = WalletService::new(db.clone(), &config);
        (ReferralService::new(db, wallets.clone(), &config), wallets)
    }

    #[tokio::test]
    async fn test_code_is_stable_per_user() {
        let (referrals, _) = services().await;
        let ada = UserId::new("ada");
        let first = referrals.code_for(&ada).await.unwrap();
        let second = referrals.code_for(&ada).await.unwrap();
        assert_eq!(first.code, second.code);
        assert!(first.code.starts_with("FM-"));
        assert_eq!(first.code.len(), 9);
    }

    #[tokio::test]
    async fn test_register_and_activate_pays_both() {
        let (referrals, wallets) = services().await;
        let ada = UserId::new("ada");
        let bola = UserId::new("bola");
        let code = referrals.code_for(&ada).await.unwrap().code;

        let referral = referrals.register(&bola, &code.to_lowercase()).await.unwrap();
        assert_eq!(referral.referrer_id, ada);
        assert_eq!(referral.status, ReferralStatus::Pending);
        assert!(referrals.pending_for(&bola).await.unwrap().is_some());

        let active = referrals.activate(&bola).await.unwrap();
        assert_eq!(active.status, ReferralStatus::Active);
        assert!(active.activated_at.is_some());
        assert!(referrals.pending_for(&bola).await.unwrap().is_none());

        assert_eq!(wallets.balance(&ada).await.unwrap(), Money::from_major(1000, Currency::NGN));
        assert_eq!(wallets.balance(&bola).await.unwrap(), Money::from_major(500, Currency::NGN));
        assert_eq!(referrals.referrals_by(&ada).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_double_activation_rejected() {
        let (referrals, wallets) = services().await;
        let ada = UserId::new("ada");
        let bola = UserId::new("bola");
        let code = referrals.code_for(&ada).await.unwrap().code;
        referrals.register(&bola, &code).await.unwrap();
        referrals.activate(&bola).await.unwrap();

        let err = referrals.activate(&bola).await.unwrap_err();
        assert!(matches!(err, CommerceError::ReferralAlreadyActivated(_)));
        assert_eq!(wallets.history(&ada).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let (referrals, _) = services().await;
        let ada = UserId::new("ada");
        let bola = UserId::new("bola");
        let code = referrals.code_for(&ada).await.unwrap().code;

        assert!(matches!(
            referrals.register(&ada, &code).await,
            Err(CommerceError::SelfReferral)
        ));
        assert!(matches!(
            referrals.register(&bola, "FM-NOPE00").await,
            Err(CommerceError::ReferralCodeNotFound(_))
        ));

        referrals.register(&bola, &code).await.unwrap();
        let chidi_code = referrals.code_for(&UserId::new("chidi")).await.unwrap().code;
        assert!(matches!(
            referrals.register(&bola, &chidi_code).await,
            Err(CommerceError::AlreadyReferred(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_without_referral() {
        let (referrals, _) = services().await;
        assert!(matches!(
            referrals.activate(&UserId::new("nobody")).await,
            Err(CommerceError::ReferralNotFound(_))
        ));
    }
}

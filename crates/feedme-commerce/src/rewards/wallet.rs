//! Wallet balances and their transaction ledger.

use crate::config::CommerceConfig;
use crate::error::CommerceError;
use crate::ids::{TransactionId, UserId, WalletId};
use crate::money::{Currency, Money};
use crate::tables::{TRANSACTIONS, WALLETS};
use chrono::{DateTime, Utc};
use feedme_db::{Db, Filter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A user's store credit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }
}

/// Why the balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionReason {
    Cashback,
    ReferralBonus,
    Purchase,
    Refund,
    Adjustment,
}

impl TransactionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionReason::Cashback => "cashback",
            TransactionReason::ReferralBonus => "referral_bonus",
            TransactionReason::Purchase => "purchase",
            TransactionReason::Refund => "refund",
            TransactionReason::Adjustment => "adjustment",
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub reason: TransactionReason,
    /// Order number, referral id or similar.
    pub reference: Option<String>,
    pub balance_after: Money,
    pub created_at: DateTime<Utc>,
}

/// Wallet storage.
///
/// Balance changes are conditional updates on the wallet row followed by a
/// ledger insert. A failed insert reverses the balance change.
#[derive(Clone)]
pub struct WalletService {
    db: Db,
    currency: Currency,
    cashback_percent: u32,
}

impl WalletService {
    pub fn new(db: Db, config: &CommerceConfig) -> Self {
        Self {
            db,
            currency: config.currency,
            cashback_percent: config.cashback_percent,
        }
    }

    /// The user's wallet, created empty on first use.
    pub async fn wallet(&self, user_id: &UserId) -> Result<Wallet, CommerceError> {
        let by_user = Filter::all().eq("user_id", user_id);
        if let Some(wallet) = self.db.select_one(WALLETS, &by_user).await? {
            return Ok(wallet);
        }

        let now = Utc::now();
        let wallet = Wallet {
            id: WalletId::generate(),
            user_id: user_id.clone(),
            balance: Money::zero(self.currency),
            created_at: now,
            updated_at: now,
        };
        match self.db.insert(WALLETS, &wallet).await {
            Ok(()) => {
                debug!(user_id = %user_id, "wallet created");
                Ok(wallet)
            }
            Err(e) if e.is_unique_violation() => self
                .db
                .select_one(WALLETS, &by_user)
                .await?
                .ok_or(CommerceError::Database(e)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn balance(&self, user_id: &UserId) -> Result<Money, CommerceError> {
        Ok(self.wallet(user_id).await?.balance)
    }

    fn check_amount(&self, amount: &Money) -> Result<(), CommerceError> {
        if amount.currency != self.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                got: amount.currency.code().to_string(),
            });
        }
        if !amount.is_positive() {
            return Err(CommerceError::Validation(format!(
                "wallet amount must be positive, got {}",
                amount.display()
            )));
        }
        Ok(())
    }

    async fn apply(
        &self,
        user_id: &UserId,
        kind: TransactionKind,
        amount: Money,
        reason: TransactionReason,
        reference: Option<String>,
    ) -> Result<Transaction, CommerceError> {
        self.check_amount(&amount)?;
        let wallet = self.wallet(user_id).await?;

        let updated: Wallet = self
            .db
            .update_one(WALLETS, wallet.id.as_str(), |w: &mut Wallet| {
                w.balance = shift(&w.balance, &amount, kind)?;
                w.updated_at = Utc::now();
                Ok::<_, CommerceError>(())
            })
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, kind = kind.as_str(), amount = %amount.display(), error = %e, "wallet change rejected");
                e
            })?;

        let tx = Transaction {
            id: TransactionId::generate(),
            wallet_id: wallet.id.clone(),
            user_id: user_id.clone(),
            kind,
            amount,
            reason,
            reference,
            balance_after: updated.balance,
            created_at: Utc::now(),
        };
        if let Err(e) = self.db.insert(TRANSACTIONS, &tx).await {
            warn!(user_id = %user_id, error = %e, "recording transaction failed, reversing balance");
            let reverse = match kind {
                TransactionKind::Credit => TransactionKind::Debit,
                TransactionKind::Debit => TransactionKind::Credit,
            };
            self.db
                .update_one(WALLETS, wallet.id.as_str(), |w: &mut Wallet| {
                    w.balance = shift(&w.balance, &amount, reverse)?;
                    Ok::<_, CommerceError>(())
                })
                .await?;
            return Err(e.into());
        }

        info!(
            user_id = %user_id,
            kind = kind.as_str(),
            reason = reason.as_str(),
            amount = %amount.display(),
            balance = %tx.balance_after.display(),
            "wallet updated"
        );
        Ok(tx)
    }

    /// Add to the balance.
    pub async fn credit(
        &self,
        user_id: &UserId,
        amount: Money,
        reason: TransactionReason,
        reference: Option<String>,
    ) -> Result<Transaction, CommerceError> {
        self.apply(user_id, TransactionKind::Credit, amount, reason, reference)
            .await
    }

    /// Take from the balance. Fails without writing anything if the balance is too low.
    pub async fn debit(
        &self,
        user_id: &UserId,
        amount: Money,
        reason: TransactionReason,
        reference: Option<String>,
    ) -> Result<Transaction, CommerceError> {
        self.apply(user_id, TransactionKind::Debit, amount, reason, reference)
            .await
    }

    /// Ledger entries, newest first.
    pub async fn history(&self, user_id: &UserId) -> Result<Vec<Transaction>, CommerceError> {
        let mut txs: Vec<Transaction> = self
            .db
            .select(TRANSACTIONS, &Filter::all().eq("user_id", user_id))
            .await?;
        txs.reverse();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    /// Cashback due on an order total, rounded down.
    pub fn cashback_for(&self, order_total: &Money) -> Money {
        order_total.percentage(self.cashback_percent)
    }

    /// Credit the configured cashback share of a paid order.
    ///
    /// Returns `None` when the cashback rounds down to zero.
    pub async fn award_cashback(
        &self,
        user_id: &UserId,
        order_total: &Money,
        reference: Option<String>,
    ) -> Result<Option<Transaction>, CommerceError> {
        let cashback = self.cashback_for(order_total);
        if !cashback.is_positive() {
            debug!(user_id = %user_id, "no cashback due");
            return Ok(None);
        }
        self.credit(user_id, cashback, TransactionReason::Cashback, reference)
            .await
            .map(Some)
    }
}

fn shift(balance: &Money, amount: &Money, kind: TransactionKind) -> Result<Money, CommerceError> {
    match kind {
        TransactionKind::Credit => balance.try_add(amount).ok_or(CommerceError::Overflow),
        TransactionKind::Debit => match balance.try_subtract(amount) {
            Some(next) if !next.is_negative() => Ok(next),
            Some(_) => Err(CommerceError::InsufficientBalance {
                requested: amount.display(),
                available: balance.display(),
            }),
            None => Err(CommerceError::Overflow),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::register_schema;

    fn ngn(minor: i64) -> Money {
        Money::new(minor, Currency::NGN)
    }

    async fn service() -> (WalletService, Db) {
        let db = Db::new();
        register_schema(&db).await.unwrap();
        (WalletService::new(db.clone(), &CommerceConfig::default()), db)
    }

    #[tokio::test]
    async fn test_new_wallet_is_empty() {
        let (wallets, _) = service().await;
        let user = UserId::new("ada");
        assert_eq!(wallets.balance(&user).await.unwrap(), ngn(0));
        assert_eq!(wallets.wallet(&user).await.unwrap().id, wallets.wallet(&user).await.unwrap().id);
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let (wallets, _) = service().await;
        let user = UserId::new("ada");

        let credit = wallets
            .credit(&user, ngn(50_000), TransactionReason::Adjustment, None)
            .await
            .unwrap();
        assert_eq!(credit.balance_after, ngn(50_000));

        let debit = wallets
            .debit(&user, ngn(20_000), TransactionReason::Purchase, Some("FM-ORDER".into()))
            .await
            .unwrap();
        assert_eq!(debit.balance_after, ngn(30_000));
        assert_eq!(wallets.balance(&user).await.unwrap(), ngn(30_000));

        let history = wallets.history(&user).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransactionKind::Debit);
    }

    #[tokio::test]
    async fn test_overdraft_fails_without_transaction() {
        let (wallets, _) = service().await;
        let user = UserId::new("ada");
        wallets
            .credit(&user, ngn(1_000), TransactionReason::Adjustment, None)
            .await
            .unwrap();

        let err = wallets
            .debit(&user, ngn(1_001), TransactionReason::Purchase, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientBalance { .. }));
        assert_eq!(wallets.balance(&user).await.unwrap(), ngn(1_000));
        assert_eq!(wallets.history(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_and_foreign_amounts() {
        let (wallets, _) = service().await;
        let user = UserId::new("ada");
        assert!(matches!(
            wallets.credit(&user, ngn(0), TransactionReason::Adjustment, None).await,
            Err(CommerceError::Validation(_))
        ));
        assert!(matches!(
            wallets
                .credit(&user, Money::new(100, Currency::USD), TransactionReason::Adjustment, None)
                .await,
            Err(CommerceError::CurrencyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_cashback_rounds_down() {
        let (wallets, _) = service().await;
        let user = UserId::new("ada");

        let tx = wallets
            .award_cashback(&user, &ngn(1_234_567), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.amount, ngn(24_691));
        assert_eq!(tx.reason, TransactionReason::Cashback);

        assert!(wallets.award_cashback(&user, &ngn(49), None).await.unwrap().is_none());
        assert_eq!(wallets.history(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let (wallets, _) = service().await;
        let user = UserId::new("ada");
        wallets
            .credit(&user, ngn(5_000), TransactionReason::Adjustment, None)
            .await
            .unwrap();

        let debits = (0..10).map(|_| wallets.debit(&user, ngn(1_000), TransactionReason::Purchase, None));
        let results = futures::future::join_all(debits).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
        assert_eq!(wallets.balance(&user).await.unwrap(), ngn(0));
    }
}

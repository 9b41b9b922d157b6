//! Wallet credit, cashback and referral bonuses.

mod referral;
mod wallet;

pub use referral::{Referral, ReferralCode, ReferralService, ReferralStatus};
pub use wallet::{Transaction, TransactionKind, TransactionReason, Wallet, WalletService};

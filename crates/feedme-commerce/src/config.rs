//! Business settings shared by the services.

use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// Storefront business rules.
///
/// Every field has a default, so a partial `[commerce]` table in a config
/// file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommerceConfig {
    /// Currency for all prices.
    pub currency: Currency,
    /// Upper bound on the quantity of a single cart line.
    pub max_quantity_per_line: i64,
    /// Percentage off granted by a welcome voucher.
    pub welcome_discount_percent: u32,
    /// Days a welcome voucher stays valid.
    pub welcome_valid_days: i64,
    /// Percentage off granted by an exit-intent voucher.
    pub exit_intent_discount_percent: u32,
    /// Days an exit-intent voucher stays valid.
    pub exit_intent_valid_days: i64,
    /// Wallet credit for the user who shared a referral code, in major units.
    pub referrer_bonus: i64,
    /// Wallet credit for the newly referred user, in major units.
    pub referred_bonus: i64,
    /// Percentage of a paid order returned to the wallet.
    pub cashback_percent: u32,
}

impl CommerceConfig {
    /// Referrer bonus as money.
    pub fn referrer_bonus(&self) -> Money {
        Money::from_major(self.referrer_bonus, self.currency)
    }

    /// Referred-user bonus as money.
    pub fn referred_bonus(&self) -> Money {
        Money::from_major(self.referred_bonus, self.currency)
    }
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            currency: Currency::NGN,
            max_quantity_per_line: 99,
            welcome_discount_percent: 10,
            welcome_valid_days: 30,
            exit_intent_discount_percent: 5,
            exit_intent_valid_days: 3,
            referrer_bonus: 1000,
            referred_bonus: 500,
            cashback_percent: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CommerceConfig = serde_json::from_str(r#"{ "cashback_percent": 5 }"#).unwrap();
        assert_eq!(config.cashback_percent, 5);
        assert_eq!(config.max_quantity_per_line, 99);
        assert_eq!(config.referrer_bonus().amount_minor, 100_000);
    }
}

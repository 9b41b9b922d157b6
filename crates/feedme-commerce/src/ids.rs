//! Newtype IDs for type-safe identifiers.
//!
//! Using newtypes prevents accidentally mixing up different ID types,
//! e.g., passing an OfferId where a ProductId is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate newtype ID structs.
macro_rules! define_id {
    ($name:ident) => {
        /// A unique identifier.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new random ID.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&$name> for feedme_db::Value {
            fn from(id: &$name) -> Self {
                feedme_db::Value::Text(id.0.clone())
            }
        }
    };
}

define_id!(ProductId);
define_id!(BundleId);
define_id!(OfferId);
define_id!(PurchaseId);
define_id!(CartId);
define_id!(LineItemId);
define_id!(OrderId);
define_id!(OrderItemId);
define_id!(VoucherId);
define_id!(WalletId);
define_id!(TransactionId);
define_id!(ReferralId);
define_id!(UserId);
define_id!(CampaignId);
define_id!(EventId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = OfferId::new("offer-123");
        assert_eq!(id.as_str(), "offer-123");
    }

    #[test]
    fn test_id_generation() {
        let id1 = LineItemId::generate();
        let id2 = LineItemId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 36);
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = UserId::new("user-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user-1\"");
    }

    #[test]
    fn test_id_as_filter_value() {
        let id = ProductId::new("rice-5kg");
        assert_eq!(
            feedme_db::Value::from(&id),
            feedme_db::Value::Text("rice-5kg".to_string())
        );
    }
}

//! Data models for ledger accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::Currency;
use crate::core_types::{AccountId, MinorUnits};

/// Ledger account
///
/// `balance` is denominated in `currency` and only changes inside a
/// committed transfer or on the creation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: MinorUnits,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn can_cover(&self, amount: MinorUnits) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_cover() {
        let account = Account {
            id: 1,
            owner: "alice".to_string(),
            balance: 700,
            currency: Currency::usd(),
            created_at: Utc::now(),
        };

        assert!(account.can_cover(700));
        assert!(account.can_cover(1));
        assert!(!account.can_cover(800));
    }

    #[test]
    fn test_account_json_shape() {
        let account = Account {
            id: 7,
            owner: "bob".to_string(),
            balance: 500,
            currency: Currency::eur(),
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&account).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["owner"], "bob");
        assert_eq!(value["balance"], 500);
        assert_eq!(value["currency"], "EUR");
    }
}

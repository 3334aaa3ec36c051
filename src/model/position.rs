use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::util::decimal::GreaterEqualZeroDecimal;

use super::account::AccountId;
use super::security::SecurityId;

/// Derived cache for one `(security, account)` series' terminal state.
/// Exactly one row per series that has ever had a transaction; never
/// deleted, since shares returning to zero is a valid terminal state, not
/// an absent one (I3).
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub shares: GreaterEqualZeroDecimal,
    pub total_acb: GreaterEqualZeroDecimal,
}

impl Position {
    pub fn empty(security_id: SecurityId, account_id: AccountId) -> Self {
        Self {
            security_id,
            account_id,
            shares: GreaterEqualZeroDecimal::zero(),
            total_acb: GreaterEqualZeroDecimal::zero(),
        }
    }

    pub fn per_share_acb(&self) -> Decimal {
        crate::util::decimal::safe_divide(*self.total_acb, *self.shares)
    }
}

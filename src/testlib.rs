//! Test builders in the style of the teacher's `TPSS`/`TTx` fixtures: a
//! plain struct with a `::d()` default and an `.x()` method that
//! produces the real target type, so a test only spells out the fields
//! that differ from the common case. Compiled for `#[cfg(test)]` or the
//! `testlib` feature, the same gating the teacher uses for its own
//! `testlib` module.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::{Date, Month};

use crate::algebra::{self, AlgebraEvent, AlgebraState};
use crate::model::account::{Account, AccountId, RegistrationKind};
use crate::model::security::{Security, SecurityId, SecurityKind, CAD};
use crate::model::transaction::{Transaction, TxFlags, TxParams, TxType};
use crate::util::decimal::GreaterEqualZeroDecimal;

pub fn default_security_id() -> SecurityId {
    "XYZ".to_string()
}

pub fn default_account_id() -> AccountId {
    "default".to_string()
}

pub fn mk_date(year: i32, month: u8, day: u8) -> Date {
    let month = Month::try_from(month).expect("valid month");
    Date::from_calendar_date(year, month, day).expect("valid date")
}

fn gez(d: Decimal) -> GreaterEqualZeroDecimal {
    GreaterEqualZeroDecimal::try_from(d).unwrap()
}

#[derive(Debug, Clone)]
pub struct TSec {
    pub id: SecurityId,
    pub symbol: String,
    pub currency: String,
    pub kind: SecurityKind,
}

impl TSec {
    pub fn d() -> Self {
        Self::default()
    }

    pub fn x(&self) -> Security {
        Security {
            id: self.id.clone(),
            symbol: self.symbol.clone(),
            long_name: self.symbol.clone(),
            currency: self.currency.clone(),
            kind: self.kind,
            exchange: None,
        }
    }
}

impl Default for TSec {
    fn default() -> Self {
        Self {
            id: default_security_id(),
            symbol: "XYZ".to_string(),
            currency: CAD.to_string(),
            kind: SecurityKind::Stock,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TAcc {
    pub id: AccountId,
    pub display_name: String,
    pub registration: RegistrationKind,
}

impl TAcc {
    pub fn d() -> Self {
        Self::default()
    }

    pub fn x(&self) -> Account {
        Account {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            registration: self.registration,
        }
    }
}

impl Default for TAcc {
    fn default() -> Self {
        Self {
            id: default_account_id(),
            display_name: "Default".to_string(),
            registration: RegistrationKind::NonRegistered,
        }
    }
}

/// Transaction builder. `t_day` is a day-of-month shorthand fixed to
/// January 2024, the way the teacher's `TTx::t_day` pins everything to
/// one synthetic month so scenarios read as a short timeline of
/// integers. `shares_before`/`acb_before` set the pre-state the fixture
/// runs the real Algebra against, so `shares_after`/`acb_after`/
/// `capital_gain` can never drift from what `apply` actually computes.
#[derive(Debug, Clone)]
pub struct TTx {
    pub t_day: u8,
    pub tx_type: TxType,
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub shares: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub fx_rate: Decimal,
    pub shares_before: Decimal,
    pub acb_before: Decimal,
    pub params: TxParams,
}

impl TTx {
    pub fn d() -> Self {
        Self::default()
    }

    pub fn x(&self) -> Transaction {
        let state = AlgebraState {
            shares: gez(self.shares_before),
            total_acb: Some(gez(self.acb_before)),
        };
        let event = AlgebraEvent {
            tx_type: self.tx_type,
            quantity: self.shares,
            price_per_share: self.price,
            fee_cad: self.fee,
            fx_rate: self.fx_rate,
            ratio: self.params.ratio,
            roc_per_share: self.params.roc_per_share,
            cash_per_share: self.params.cash_per_share,
            new_security_acb_percent: self.params.new_security_acb_percent,
        };
        let outcome = algebra::apply(state, &event).expect("fixture must produce a valid outcome");
        Transaction {
            id: format!("t{}", self.t_day),
            trade_date: mk_date(2024, 1, self.t_day),
            settlement_date: mk_date(2024, 1, self.t_day),
            created_at: self.t_day as i64,
            tx_type: self.tx_type,
            security_id: self.security_id.clone(),
            account_id: self.account_id.clone(),
            quantity: gez(self.shares),
            price_per_share: self.price,
            fee_cad: self.fee,
            fx_rate: self.fx_rate,
            shares_before: gez(self.shares_before),
            shares_after: outcome.shares_after,
            acb_before: gez(self.acb_before),
            acb_after: outcome.acb_after.unwrap_or_else(GreaterEqualZeroDecimal::zero),
            capital_gain: outcome.capital_gain,
            params: self.params.clone(),
            notes: String::new(),
            flags: TxFlags::default(),
            audit: Some(outcome.audit),
        }
    }
}

impl Default for TTx {
    fn default() -> Self {
        Self {
            t_day: 1,
            tx_type: TxType::Buy,
            security_id: default_security_id(),
            account_id: default_account_id(),
            shares: dec!(0),
            price: dec!(0),
            fee: dec!(0),
            fx_rate: dec!(1),
            shares_before: dec!(0),
            acb_before: dec!(0),
            params: TxParams::default(),
        }
    }
}

/// Pretty-diff assertion for big structs, generalizing the teacher's
/// plain `assert_eq!` on fixture output — formats both sides with
/// `{:#?}` so a failing test shows the field that actually diverged.
pub fn assert_big_struct_eq<T: std::fmt::Debug + PartialEq>(actual: &T, expected: &T) {
    assert!(
        actual == expected,
        "structs differ:\n--- actual ---\n{:#?}\n--- expected ---\n{:#?}",
        actual, expected
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttx_builder_runs_real_algebra() {
        let buy = TTx {
            t_day: 10,
            tx_type: TxType::Buy,
            shares: dec!(100),
            price: dec!(50),
            fee: dec!(10),
            ..TTx::d()
        }
        .x();
        assert_eq!(*buy.acb_after, dec!(5010.00));

        let sell = TTx {
            t_day: 11,
            tx_type: TxType::Sell,
            shares: dec!(100),
            price: dec!(60),
            fee: dec!(10),
            shares_before: dec!(100),
            acb_before: dec!(5010),
            ..TTx::d()
        }
        .x();
        assert_eq!(sell.capital_gain.unwrap(), dec!(980.00));
    }

    #[test]
    fn test_assert_big_struct_eq_passes_on_equal() {
        let a = TSec::d().x();
        let b = TSec::d().x();
        assert_big_struct_eq(&a, &b);
    }
}

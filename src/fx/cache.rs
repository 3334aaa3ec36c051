use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::{Date, Duration};

use crate::error::LedgerError;
use crate::model::security::CAD;

use super::oracle::FxOracle;

/// Write-through cache oracle, generalizing the teacher's `RateLoader` +
/// `RemoteRateLoader` pair into one type: `insert_or_ignore` is the
/// "insert-or-ignore" write path spec §5 asks of the FX cache, and `rate`
/// performs the 10-day look-back with CAD pivoting spec §6 asks of the
/// oracle itself. There's no real remote fetch here — the network FX
/// source is an external collaborator per spec §1, so this is the
/// workable reference implementation the core is exercised against,
/// analogous to the teacher shipping both `JsonRemoteRateLoader` and
/// `MockRemoteRateLoader` behind the same `RemoteRateLoader` trait.
pub struct CachedFxOracle {
    rates: RwLock<BTreeMap<(Date, String, String), Decimal>>,
    look_back_days: i64,
}

impl Default for CachedFxOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl CachedFxOracle {
    pub fn new() -> Self {
        Self::with_lookback_days(10)
    }

    pub fn with_lookback_days(look_back_days: i64) -> Self {
        Self {
            rates: RwLock::new(BTreeMap::new()),
            look_back_days,
        }
    }

    pub fn insert_or_ignore(&self, date: Date, from: &str, to: &str, rate: Decimal) {
        let mut rates = self.rates.write().unwrap();
        rates
            .entry((date, from.to_uppercase(), to.to_uppercase()))
            .or_insert(rate);
    }

    fn lookback(&self, date: Date, from: &str, to: &str) -> Option<Decimal> {
        let rates = self.rates.read().unwrap();
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        for offset in 0..=self.look_back_days {
            let d = date.saturating_sub(Duration::days(offset));
            if let Some(r) = rates.get(&(d, from.clone(), to.clone())) {
                return Some(*r);
            }
            if let Some(r) = rates.get(&(d, to.clone(), from.clone())) {
                return Some(Decimal::ONE / *r);
            }
        }
        None
    }
}

#[async_trait]
impl FxOracle for CachedFxOracle {
    async fn rate(&self, date: Date, from: &str, to: &str) -> Result<Decimal, LedgerError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(Decimal::ONE);
        }
        if let Some(r) = self.lookback(date, from, to) {
            return Ok(r);
        }
        if !from.eq_ignore_ascii_case(CAD) && !to.eq_ignore_ascii_case(CAD) {
            if let (Some(from_cad), Some(to_cad)) =
                (self.lookback(date, from, CAD), self.lookback(date, to, CAD))
            {
                return Ok(from_cad / to_cad);
            }
        }
        Err(LedgerError::FxUnavailable(format!(
            "no {}->{} rate within {} days of {}",
            from, to, self.look_back_days, date
        )))
    }
}

/// Fixed-rate test double, ignoring the date entirely. Parallel to the
/// teacher's `MockRemoteRateLoader`.
#[derive(Default)]
pub struct StaticFxOracle {
    rates: BTreeMap<(String, String), Decimal>,
}

impl StaticFxOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.rates
            .insert((from.to_uppercase(), to.to_uppercase()), rate);
        self
    }
}

#[async_trait]
impl FxOracle for StaticFxOracle {
    async fn rate(&self, _date: Date, from: &str, to: &str) -> Result<Decimal, LedgerError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(Decimal::ONE);
        }
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if let Some(r) = self.rates.get(&(from.clone(), to.clone())) {
            return Ok(*r);
        }
        if let Some(r) = self.rates.get(&(to, from)) {
            return Ok(Decimal::ONE / *r);
        }
        Err(LedgerError::FxUnavailable(format!(
            "no static rate configured for {}->{}",
            from, to
        )))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::{Date, Month};

    use super::*;

    fn d(day: u8) -> Date {
        Date::from_calendar_date(2024, Month::January, day).unwrap()
    }

    #[async_std::test]
    async fn test_cached_oracle_lookback() {
        let oracle = CachedFxOracle::new();
        oracle.insert_or_ignore(d(10), "USD", "CAD", dec!(1.35));

        let rate = oracle.rate(d(15), "USD", "CAD").await.unwrap();
        assert_eq!(rate, dec!(1.35));
    }

    #[async_std::test]
    async fn test_cached_oracle_unavailable_outside_lookback() {
        let oracle = CachedFxOracle::new();
        oracle.insert_or_ignore(d(1), "USD", "CAD", dec!(1.35));
        let err = oracle.rate(d(20), "USD", "CAD").await.unwrap_err();
        assert!(matches!(err, LedgerError::FxUnavailable(_)));
    }

    #[async_std::test]
    async fn test_static_oracle_same_currency() {
        let oracle = StaticFxOracle::new();
        assert_eq!(oracle.rate(d(1), "CAD", "CAD").await.unwrap(), dec!(1));
    }

    #[async_std::test]
    async fn test_static_oracle_inverse() {
        let oracle = StaticFxOracle::new().with_rate("USD", "CAD", dec!(1.25));
        let inverse = oracle.rate(d(1), "CAD", "USD").await.unwrap();
        assert_eq!(inverse, Decimal::ONE / dec!(1.25));
    }
}

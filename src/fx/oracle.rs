//! §6 FX oracle contract. Collapses the teacher's `fx::io` trio
//! (`RateLoader` orchestrating a `RemoteRateLoader`, gap-filled by
//! `fill_in_unknown_day_rates`) into a single async trait: an oracle
//! mapping `(date, from, to) -> Decimal`, CAD-pivoting, with a 10-day
//! look-back fallback to the nearest prior observation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::Date;

use crate::error::LedgerError;

#[async_trait]
pub trait FxOracle: Send + Sync {
    /// Fails with `FxUnavailable` if no observation exists within a
    /// 10-day look-back window ending at `date`. Idempotent; safe to
    /// retry (spec §6).
    async fn rate(&self, date: Date, from: &str, to: &str) -> Result<Decimal, LedgerError>;
}

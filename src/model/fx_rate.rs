use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

/// `(date, from, to)` keyed FX observation, unique on the triple, the way
/// the teacher's `fx::model::DailyRate` pairs one date with one
/// `foreign_to_local_rate` (there always USD->CAD; generalized here to an
/// arbitrary currency pair so the oracle contract in §6 is honoured
/// exactly).
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
pub struct FxRateRecord {
    pub date: Date,
    pub from_currency: String,
    pub to_currency: String,
    pub rate: Decimal,
    pub source: String,
}

use std::fmt::Display;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::util::decimal::GreaterEqualZeroDecimal;

use super::account::AccountId;
use super::audit::AuditTrail;
use super::security::SecurityId;

pub type TransactionId = String;

/// The eleven event kinds from the ACB algebra table. Generalizes the
/// teacher's four-variant `TxAction` (`Buy`/`Sell`/`Roc`/`Sfla`) — `Sfla`
/// itself isn't kept as a user-facing type here: the superficial-loss ACB
/// adjustment is written directly onto the repurchasing transaction's
/// `acb_after` by the orchestrator rather than modeled as its own ledger
/// row, per spec's "surfaced on the audit of the repurchasing
/// transaction(s)" rule.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Buy,
    Sell,
    Dividend,
    Drip,
    Roc,
    Split,
    Consolidation,
    Merger,
    Spinoff,
    TransferIn,
    TransferOut,
}

impl TxType {
    fn pretty_str(&self) -> &str {
        match self {
            TxType::Buy => "Buy",
            TxType::Sell => "Sell",
            TxType::Dividend => "Dividend",
            TxType::Drip => "DRIP",
            TxType::Roc => "RoC",
            TxType::Split => "Split",
            TxType::Consolidation => "Consolidation",
            TxType::Merger => "Merger",
            TxType::Spinoff => "Spinoff",
            TxType::TransferIn => "TransferIn",
            TxType::TransferOut => "TransferOut",
        }
    }

    /// Acquiring events per spec §4.3 rule 2: buy and drip. Used by the
    /// superficial-loss detector's window search.
    pub fn is_acquiring(&self) -> bool {
        matches!(self, TxType::Buy | TxType::Drip)
    }

    /// Types that reduce the share balance and must pass the `q <=
    /// shares_before` feasibility check (I4).
    pub fn is_disposing(&self) -> bool {
        matches!(self, TxType::Sell | TxType::TransferOut)
    }
}

impl Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pretty_str())
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TxFlags {
    pub superficial_loss: bool,
}

/// Corporate-action parameters that only some `TxType`s use. Kept as one
/// struct of options on `Transaction` rather than a per-type enum payload,
/// matching how the teacher keeps `Tx` a single flat struct with fields
/// that are only meaningful for some `TxAction` variants (e.g.
/// `specified_superficial_loss` only applies to `Sell`).
#[derive(PartialEq, Eq, Clone, Debug, Default, Serialize, Deserialize)]
pub struct TxParams {
    /// `split`/`consolidation`/`merger`: shares-after / shares-before factor.
    pub ratio: Option<Decimal>,
    /// `roc`: return-of-capital amount per share, in the security's currency.
    pub roc_per_share: Option<Decimal>,
    /// `spinoff`: the fraction of `acb_before` retained by the original
    /// security; the remainder becomes the spun-off security's opening ACB.
    pub new_security_acb_percent: Option<Decimal>,
    /// `merger`: cash-in-lieu per share, in the security's currency.
    pub cash_per_share: Option<Decimal>,
    /// `spinoff`/`merger`: identity of the security shares are exchanged into.
    pub new_security_id: Option<SecurityId>,
}

/// The ledger row. Trade date and settlement date are calendar dates, no
/// time-of-day, per spec §9's date-semantics note.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,

    pub trade_date: Date,
    pub settlement_date: Date,
    /// Breaks ties between transactions sharing a trade date; a
    /// backdated insert gets a fresh (larger) timestamp and so sorts
    /// after existing same-day rows. Generalizes the teacher's
    /// `Tx::read_index`, but carries wall-clock creation order rather
    /// than file-read order, since there's no import file here.
    pub created_at: i64,

    pub tx_type: TxType,
    pub security_id: SecurityId,
    pub account_id: AccountId,

    pub quantity: GreaterEqualZeroDecimal,
    pub price_per_share: Decimal,
    pub fee_cad: Decimal,
    pub fx_rate: Decimal,

    pub shares_before: GreaterEqualZeroDecimal,
    pub shares_after: GreaterEqualZeroDecimal,
    pub acb_before: GreaterEqualZeroDecimal,
    pub acb_after: GreaterEqualZeroDecimal,
    pub capital_gain: Option<Decimal>,

    pub params: TxParams,

    pub notes: String,
    pub flags: TxFlags,
    pub audit: Option<AuditTrail>,
}

impl Transaction {
    pub fn is_loss(&self) -> bool {
        matches!(self.capital_gain, Some(g) if g.is_sign_negative() && !g.is_zero())
    }

    pub fn acb_after_per_share(&self) -> Option<Decimal> {
        if *self.shares_after == Decimal::ZERO {
            return None;
        }
        Some(crate::util::decimal::safe_divide(*self.acb_after, *self.shares_after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_type_classification() {
        assert!(TxType::Buy.is_acquiring());
        assert!(TxType::Drip.is_acquiring());
        assert!(!TxType::Sell.is_acquiring());

        assert!(TxType::Sell.is_disposing());
        assert!(TxType::TransferOut.is_disposing());
        assert!(!TxType::Buy.is_disposing());
    }
}

//! Request/response record types for the `/api/...` surface named in
//! spec §6 — `securities`, `accounts`, `transactions` (with
//! `securityId`/`accountId` filters), `positions`,
//! `fx-rates/rate?date&from&to`, `export/csv`, `export/json`. No network
//! listener lives here: the HTTP surface is an external collaborator, so
//! this module only fixes the wire schema a thin framework adapter would
//! bolt the Orchestrator onto, the same split the teacher keeps between
//! its `portfolio` core and `cmd`-layer report printing.

pub mod csv_export;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::model::account::{Account, AccountId};
use crate::model::audit::AuditTrail;
use crate::model::fx_rate::FxRateRecord;
use crate::model::position::Position;
use crate::model::security::{Security, SecurityId};
use crate::model::transaction::{Transaction, TransactionId, TxParams, TxType};
use crate::orchestrator::CreateTransactionInput;

pub use csv_export::write_csv;

/// The wire payload `POST /api/transactions` accepts, matching spec §3's
/// Transaction creation fields. Converts 1:1 into
/// [`CreateTransactionInput`] — kept as a distinct type so the wire
/// schema and the orchestrator's internal input can evolve independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub trade_date: Date,
    pub settlement_date: Option<Date>,
    pub tx_type: TxType,
    pub quantity: Decimal,
    pub price_per_share: Decimal,
    #[serde(default)]
    pub fee_cad: Decimal,
    pub fx_rate: Option<Decimal>,
    #[serde(default)]
    pub params: TxParams,
    #[serde(default)]
    pub notes: String,
}

impl From<CreateTransactionRequest> for CreateTransactionInput {
    fn from(r: CreateTransactionRequest) -> Self {
        CreateTransactionInput {
            security_id: r.security_id,
            account_id: r.account_id,
            trade_date: r.trade_date,
            settlement_date: r.settlement_date,
            tx_type: r.tx_type,
            quantity: r.quantity,
            price_per_share: r.price_per_share,
            fee_cad: r.fee_cad,
            fx_rate: r.fx_rate,
            params: r.params,
            notes: r.notes,
        }
    }
}

/// The persisted record as returned from `transactions`, including the
/// computed audit trail, per spec §6's "returns the persisted record
/// including the computed audit trail".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub trade_date: Date,
    pub settlement_date: Date,
    pub tx_type: TxType,
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub quantity: Decimal,
    pub price_per_share: Decimal,
    pub fee_cad: Decimal,
    pub fx_rate: Decimal,
    pub shares_before: Decimal,
    pub shares_after: Decimal,
    pub acb_before: Decimal,
    pub acb_after: Decimal,
    pub capital_gain: Option<Decimal>,
    pub superficial_loss: bool,
    pub notes: String,
    pub audit: Option<AuditTrail>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id.clone(),
            trade_date: t.trade_date,
            settlement_date: t.settlement_date,
            tx_type: t.tx_type,
            security_id: t.security_id.clone(),
            account_id: t.account_id.clone(),
            quantity: *t.quantity,
            price_per_share: t.price_per_share,
            fee_cad: t.fee_cad,
            fx_rate: t.fx_rate,
            shares_before: *t.shares_before,
            shares_after: *t.shares_after,
            acb_before: *t.acb_before,
            acb_after: *t.acb_after,
            capital_gain: t.capital_gain,
            superficial_loss: t.flags.superficial_loss,
            notes: t.notes.clone(),
            audit: t.audit.clone(),
        }
    }
}

/// `GET /api/transactions?securityId&accountId` query filter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub security_id: Option<SecurityId>,
    pub account_id: Option<AccountId>,
}

impl TransactionFilter {
    pub fn matches(&self, t: &Transaction) -> bool {
        self.security_id.as_ref().is_none_or(|s| s == &t.security_id)
            && self.account_id.as_ref().is_none_or(|a| a == &t.account_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionResponse {
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub shares: Decimal,
    pub total_acb: Decimal,
    pub per_share_acb: Decimal,
}

impl From<&Position> for PositionResponse {
    fn from(p: &Position) -> Self {
        Self {
            security_id: p.security_id.clone(),
            account_id: p.account_id.clone(),
            shares: *p.shares,
            total_acb: *p.total_acb,
            per_share_acb: p.per_share_acb(),
        }
    }
}

/// `GET /api/fx-rates/rate?date&from&to`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FxRateQuery {
    pub date: Date,
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FxRateResponse {
    pub date: Date,
    pub from: String,
    pub to: String,
    pub rate: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityResponse {
    pub security: Security,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account: Account,
}

/// `GET /api/export/json`: every transaction plus the terminal position
/// of every series it touched, the JSON sibling of [`csv_export::write_csv`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerExport {
    pub transactions: Vec<TransactionResponse>,
    pub positions: Vec<PositionResponse>,
}

pub fn export_json(transactions: &[Transaction], positions: &[Position]) -> LedgerExport {
    LedgerExport {
        transactions: transactions.iter().map(TransactionResponse::from).collect(),
        positions: positions.iter().map(PositionResponse::from).collect(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FxRateRecordResponse(pub FxRateRecord);

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::{Date, Month};

    use super::*;
    use crate::model::transaction::{TxFlags, TxParams};
    use crate::util::decimal::GreaterEqualZeroDecimal;

    fn gez(v: Decimal) -> GreaterEqualZeroDecimal {
        GreaterEqualZeroDecimal::try_from(v).unwrap()
    }

    fn sample_tx(security_id: &str, account_id: &str) -> Transaction {
        let d = Date::from_calendar_date(2024, Month::January, 10).unwrap();
        Transaction {
            id: "t1".to_string(),
            trade_date: d,
            settlement_date: d,
            created_at: 1,
            tx_type: TxType::Buy,
            security_id: security_id.to_string(),
            account_id: account_id.to_string(),
            quantity: gez(dec!(100)),
            price_per_share: dec!(10),
            fee_cad: dec!(0),
            fx_rate: dec!(1),
            shares_before: gez(dec!(0)),
            shares_after: gez(dec!(100)),
            acb_before: gez(dec!(0)),
            acb_after: gez(dec!(1000)),
            capital_gain: None,
            params: TxParams::default(),
            notes: String::new(),
            flags: TxFlags::default(),
            audit: None,
        }
    }

    #[test]
    fn test_transaction_filter_matches() {
        let filter = TransactionFilter {
            security_id: Some("XYZ".to_string()),
            account_id: None,
        };
        assert!(filter.matches(&sample_tx("XYZ", "acc1")));
        assert!(!filter.matches(&sample_tx("ABC", "acc1")));
    }
}

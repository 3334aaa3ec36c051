//! CSV export, column order fixed by spec §6: Date, Settlement Date,
//! Type, Security (symbol), Account (name), Quantity, Price, Currency,
//! FX Rate, ACB Before, ACB After, Shares Before, Shares After, Capital
//! Gain/Loss, Flags (semicolon-joined), Notes. Uses the `csv` crate the
//! way the teacher's CSV-reading tooling does, rather than hand-joining
//! strings.

use std::collections::HashMap;
use std::io::Write;

use crate::error::{LedgerError, LedgerResult};
use crate::model::account::{Account, AccountId};
use crate::model::security::{Security, SecurityId};
use crate::model::transaction::Transaction;

fn flags_str(t: &Transaction) -> String {
    let mut flags = Vec::new();
    if t.flags.superficial_loss {
        flags.push("superficial_loss");
    }
    flags.join(";")
}

/// Writes `transactions` (already in the caller's desired row order) as
/// CSV to `out`. `securities`/`accounts` resolve ids to the symbol/name
/// columns the export wants instead of raw ids.
pub fn write_csv<W: Write>(
    out: W,
    transactions: &[Transaction],
    securities: &HashMap<SecurityId, Security>,
    accounts: &HashMap<AccountId, Account>,
) -> LedgerResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(out);

    writer
        .write_record([
            "Date",
            "Settlement Date",
            "Type",
            "Security",
            "Account",
            "Quantity",
            "Price",
            "Currency",
            "FX Rate",
            "ACB Before",
            "ACB After",
            "Shares Before",
            "Shares After",
            "Capital Gain/Loss",
            "Flags",
            "Notes",
        ])
        .map_err(|e| LedgerError::PersistenceFailure(format!("csv header write failed: {e}")))?;

    for t in transactions {
        let security = securities.get(&t.security_id);
        let account = accounts.get(&t.account_id);
        let symbol = security.map(|s| s.symbol.as_str()).unwrap_or(&t.security_id);
        let currency = security.map(|s| s.currency.as_str()).unwrap_or("CAD");
        let account_name = account.map(|a| a.display_name.as_str()).unwrap_or(&t.account_id);

        writer
            .write_record([
                t.trade_date.to_string(),
                t.settlement_date.to_string(),
                t.tx_type.to_string(),
                symbol.to_string(),
                account_name.to_string(),
                t.quantity.to_string(),
                t.price_per_share.to_string(),
                currency.to_string(),
                t.fx_rate.to_string(),
                t.acb_before.to_string(),
                t.acb_after.to_string(),
                t.shares_before.to_string(),
                t.shares_after.to_string(),
                t.capital_gain.map(|g| g.to_string()).unwrap_or_default(),
                flags_str(t),
                t.notes.clone(),
            ])
            .map_err(|e| LedgerError::PersistenceFailure(format!("csv row write failed: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| LedgerError::PersistenceFailure(format!("csv flush failed: {e}")))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::{Date, Month};

    use super::*;
    use crate::model::account::RegistrationKind;
    use crate::model::security::SecurityKind;
    use crate::model::transaction::{TxFlags, TxParams, TxType};
    use crate::util::decimal::GreaterEqualZeroDecimal;

    fn gez(v: rust_decimal::Decimal) -> GreaterEqualZeroDecimal {
        GreaterEqualZeroDecimal::try_from(v).unwrap()
    }

    #[test]
    fn test_csv_column_order_and_quoting() {
        let d = Date::from_calendar_date(2024, Month::January, 15).unwrap();
        let tx = Transaction {
            id: "t1".to_string(),
            trade_date: d,
            settlement_date: d,
            created_at: 1,
            tx_type: TxType::Sell,
            security_id: "xyz".to_string(),
            account_id: "acc1".to_string(),
            quantity: gez(dec!(100)),
            price_per_share: dec!(60),
            fee_cad: dec!(10),
            fx_rate: dec!(1),
            shares_before: gez(dec!(100)),
            shares_after: gez(dec!(0)),
            acb_before: gez(dec!(5010)),
            acb_after: gez(dec!(0)),
            capital_gain: Some(dec!(980.00)),
            params: TxParams::default(),
            notes: "closed position".to_string(),
            flags: TxFlags { superficial_loss: true },
            audit: None,
        };

        let mut securities = HashMap::new();
        securities.insert(
            "xyz".to_string(),
            Security {
                id: "xyz".to_string(),
                symbol: "XYZ".to_string(),
                long_name: "XYZ Corp".to_string(),
                currency: "CAD".to_string(),
                kind: SecurityKind::Stock,
                exchange: None,
            },
        );
        let mut accounts = HashMap::new();
        accounts.insert(
            "acc1".to_string(),
            Account {
                id: "acc1".to_string(),
                display_name: "Non-Registered".to_string(),
                registration: RegistrationKind::NonRegistered,
            },
        );

        let mut buf = Vec::new();
        write_csv(&mut buf, &[tx], &securities, &accounts).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert_eq!(
            header,
            "\"Date\",\"Settlement Date\",\"Type\",\"Security\",\"Account\",\"Quantity\",\"Price\",\"Currency\",\"FX Rate\",\"ACB Before\",\"ACB After\",\"Shares Before\",\"Shares After\",\"Capital Gain/Loss\",\"Flags\",\"Notes\""
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"XYZ\""));
        assert!(row.contains("\"Non-Registered\""));
        assert!(row.contains("\"superficial_loss\""));
        assert!(row.contains("\"980.00\""));
    }
}

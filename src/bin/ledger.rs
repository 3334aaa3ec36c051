//! `ledger`: replays one or more CSV-described transaction files through
//! the Orchestrator and prints the resulting ledger, the CLI-driven
//! report-printing role the teacher's `acb` binary plays over
//! `command_main`.

use std::collections::HashMap;
use std::sync::Arc;

use acb_ledger::api;
use acb_ledger::cmd::{AppConfig, Args};
use acb_ledger::fx::CachedFxOracle;
use acb_ledger::model::account::{Account, RegistrationKind};
use acb_ledger::model::security::{Security, SecurityKind};
use acb_ledger::model::transaction::{TxParams, TxType};
use acb_ledger::orchestrator::{CreateTransactionInput, Orchestrator};
use acb_ledger::persistence::{InMemoryLedgerStore, LedgerStore};
use clap::Parser;
use rust_decimal::Decimal;
use tabled::{Table, Tabled};
use time::Date;

#[derive(serde::Deserialize)]
struct CsvRow {
    trade_date: String,
    settlement_date: Option<String>,
    tx_type: String,
    security: String,
    currency: String,
    account: String,
    registered: Option<String>,
    quantity: Decimal,
    price: Decimal,
    #[serde(default)]
    fee: Decimal,
    fx_rate: Option<Decimal>,
}

#[derive(Tabled)]
struct Row {
    date: String,
    #[tabled(rename = "Type")]
    tx_type: String,
    security: String,
    account: String,
    quantity: String,
    #[tabled(rename = "ACB After")]
    acb_after: String,
    #[tabled(rename = "Gain/Loss")]
    capital_gain: String,
    flags: String,
}

fn parse_date(s: &str) -> Date {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(s, &format).unwrap_or_else(|e| panic!("invalid date {s:?}: {e}"))
}

fn parse_tx_type(s: &str) -> TxType {
    match s.to_lowercase().as_str() {
        "buy" => TxType::Buy,
        "sell" => TxType::Sell,
        "dividend" => TxType::Dividend,
        "drip" => TxType::Drip,
        "roc" => TxType::Roc,
        "split" => TxType::Split,
        "consolidation" => TxType::Consolidation,
        "merger" => TxType::Merger,
        "spinoff" => TxType::Spinoff,
        "transfer_in" => TxType::TransferIn,
        "transfer_out" => TxType::TransferOut,
        other => panic!("unknown transaction type: {other}"),
    }
}

fn parse_registration(s: Option<&str>) -> RegistrationKind {
    match s.map(|v| v.to_lowercase()).as_deref() {
        Some("tfsa") => RegistrationKind::Tfsa,
        Some("rrsp") => RegistrationKind::Rrsp,
        Some("resp") => RegistrationKind::Resp,
        Some("lira") => RegistrationKind::Lira,
        Some("rrif") => RegistrationKind::Rrif,
        _ => RegistrationKind::NonRegistered,
    }
}

#[async_std::main]
async fn main() {
    acb_ledger::tracing::setup_tracing();
    let args = Args::parse();
    let config = AppConfig::from(&args);
    acb_ledger::log::set_verbose(config.verbose);
    acb_ledger::verboseln!("{:#?}", args);

    let store = Arc::new(InMemoryLedgerStore::new());
    let fx = Arc::new(CachedFxOracle::with_lookback_days(config.fx_lookback_days));
    let orchestrator = Orchestrator::new(store.clone(), fx);

    let mut seen_securities: HashMap<String, ()> = HashMap::new();
    let mut seen_accounts: HashMap<String, ()> = HashMap::new();

    for path in &args.csv_files {
        let mut reader = csv::Reader::from_path(path)
            .unwrap_or_else(|e| panic!("failed to open {path}: {e}"));
        for record in reader.deserialize() {
            let row: CsvRow = record.unwrap_or_else(|e| panic!("malformed row in {path}: {e}"));

            if seen_securities.insert(row.security.clone(), ()).is_none() {
                store
                    .put_security(Security {
                        id: row.security.clone(),
                        symbol: row.security.clone(),
                        long_name: row.security.clone(),
                        currency: row.currency.clone(),
                        kind: SecurityKind::Stock,
                        exchange: None,
                    })
                    .await
                    .expect("put_security failed");
            }
            if seen_accounts.insert(row.account.clone(), ()).is_none() {
                store
                    .put_account(Account {
                        id: row.account.clone(),
                        display_name: row.account.clone(),
                        registration: parse_registration(row.registered.as_deref()),
                    })
                    .await
                    .expect("put_account failed");
            }

            let input = CreateTransactionInput {
                security_id: row.security.clone(),
                account_id: row.account.clone(),
                trade_date: parse_date(&row.trade_date),
                settlement_date: row.settlement_date.as_deref().map(parse_date),
                tx_type: parse_tx_type(&row.tx_type),
                quantity: row.quantity,
                price_per_share: row.price,
                fee_cad: row.fee,
                fx_rate: row.fx_rate,
                params: TxParams::default(),
                notes: String::new(),
            };
            orchestrator
                .create(input)
                .await
                .unwrap_or_else(|e| panic!("failed to create transaction: {e}"));
        }
    }

    let transactions = store.all_transactions().await.expect("all_transactions failed");

    let rows: Vec<Row> = transactions
        .iter()
        .map(|t| Row {
            date: t.trade_date.to_string(),
            tx_type: t.tx_type.to_string(),
            security: t.security_id.clone(),
            account: t.account_id.clone(),
            quantity: t.quantity.to_string(),
            acb_after: t.acb_after.to_string(),
            capital_gain: t.capital_gain.map(|g| g.to_string()).unwrap_or_default(),
            flags: if t.flags.superficial_loss { "SFL".to_string() } else { String::new() },
        })
        .collect();

    println!("{}", Table::new(rows));

    if let Some(out_path) = &args.csv_output {
        let securities: HashMap<_, _> = {
            let mut m = HashMap::new();
            for sec_id in seen_securities.keys() {
                if let Some(sec) = store.get_security(sec_id).await.expect("get_security failed") {
                    m.insert(sec_id.clone(), sec);
                }
            }
            m
        };
        let accounts: HashMap<_, _> = {
            let mut m = HashMap::new();
            for acc_id in seen_accounts.keys() {
                if let Some(acc) = store.get_account(acc_id).await.expect("get_account failed") {
                    m.insert(acc_id.clone(), acc);
                }
            }
            m
        };
        let file = std::fs::File::create(out_path)
            .unwrap_or_else(|e| panic!("failed to create {out_path}: {e}"));
        api::write_csv(file, &transactions, &securities, &accounts)
            .expect("csv export failed");
    }
}

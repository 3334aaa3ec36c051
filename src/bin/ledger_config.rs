//! `ledger-config`: validates a manual FX-rate override file and reports
//! the effective lookup table, the secondary inspection/debugging role
//! the teacher's `acb-config` binary plays alongside the main `acb` tool.

use std::sync::Arc;

use acb_ledger::fx::{CachedFxOracle, FxOracle};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

#[derive(Parser, Debug)]
#[command(
    version = acb_ledger::app::LEDGER_APP_VERSION,
    about = "Inspect and validate manual FX rate override files for the ledger engine"
)]
struct Args {
    /// JSON file of FX rate overrides: a list of
    /// {"date": "YYYY-MM-DD", "from": "USD", "to": "CAD", "rate": 1.35}.
    fx_overrides_file: String,

    /// Print verbose output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Deserialize, Debug)]
struct FxOverrideRow {
    date: String,
    from: String,
    to: String,
    rate: Decimal,
}

fn parse_date(s: &str) -> Date {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(s, &format).unwrap_or_else(|e| panic!("invalid date {s:?}: {e}"))
}

#[async_std::main]
async fn main() {
    acb_ledger::tracing::setup_tracing();
    let args = Args::parse();
    acb_ledger::log::set_verbose(args.verbose);

    let contents = std::fs::read_to_string(&args.fx_overrides_file)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", args.fx_overrides_file));
    let rows: Vec<FxOverrideRow> = serde_json::from_str(&contents)
        .unwrap_or_else(|e| panic!("failed to parse {}: {e}", args.fx_overrides_file));

    let oracle = Arc::new(CachedFxOracle::new());
    for row in &rows {
        acb_ledger::verboseln!("loading override {} {}->{} = {}", row.date, row.from, row.to, row.rate);
        oracle.insert_or_ignore(parse_date(&row.date), &row.from, &row.to, row.rate);
    }

    println!("loaded {} fx override(s):", rows.len());
    for row in &rows {
        let date = parse_date(&row.date);
        match oracle.rate(date, &row.from, &row.to).await {
            Ok(rate) => println!("  {} {} -> {}: {}", row.date, row.from, row.to, rate),
            Err(e) => println!("  {} {} -> {}: ERROR {}", row.date, row.from, row.to, e),
        }
    }
}

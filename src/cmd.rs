//! CLI argument parsing, in the shape of the teacher's `cmd::Args` /
//! `command_main`. `ledger` (the renamed `acb` binary) parses [`Args`],
//! derives an [`AppConfig`], and drives the Orchestrator against the CSV
//! files given on the command line.

use clap::Parser;

const ABOUT: &str = "Adjusted cost base (ACB) ledger engine";

fn get_long_about() -> String {
    "\
A CLI tool for computing Adjusted Cost Base (ACB) and capital gains/losses
on Canadian investment transactions, per CRA rules including the
superficial-loss 30-day window.

Each CSV file should have a header with these columns: trade_date,
settlement_date, tx_type, security, currency, account, registered,
quantity, price, fee, fx_rate. settlement_date, registered, fee and
fx_rate may be left blank."
        .to_string()
}

#[derive(Parser, Debug)]
#[command(version = crate::app::LEDGER_APP_VERSION, about = ABOUT, long_about = get_long_about())]
pub struct Args {
    /// CSV file(s) describing transactions to replay through the ledger,
    /// in the order they should be applied.
    #[arg(required = true)]
    pub csv_files: Vec<String>,

    /// Print verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Number of days the FX oracle looks back for a cached rate.
    #[arg(long, default_value_t = 10)]
    pub fx_lookback_days: i64,

    /// Write a CSV export of the computed ledger to this path, in
    /// addition to the console table.
    #[arg(short = 'o', long)]
    pub csv_output: Option<String>,
}

/// Resolved run configuration, kept distinct from [`Args`] so the
/// Orchestrator and its collaborators never depend on `clap` types.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub verbose: bool,
    pub fx_lookback_days: i64,
}

impl From<&Args> for AppConfig {
    fn from(args: &Args) -> Self {
        Self {
            verbose: args.verbose,
            fx_lookback_days: args.fx_lookback_days,
        }
    }
}

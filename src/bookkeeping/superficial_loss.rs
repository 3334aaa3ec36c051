//! Generalizes
//! `bookkeeping::superficial_loss::get_superficial_loss_info` /
//! `calc_superficial_loss_ratio`: the teacher's per-affiliate window walk
//! (tracking split-adjusted share counts per affiliate across a ±30-day
//! window) becomes a per-account window walk here, since spec §4.3's
//! "any account" rule is exactly the multi-affiliate axis the teacher
//! already modeled, with `Account` standing in for `Affiliate`.
//!
//! This module is a pure function: the Orchestrator is responsible for
//! gathering the window's acquisitions and the all-accounts share
//! balance 30 days out (via the persistence layer's `find_in_window` /
//! `find_all_for_security` calls) and handing them in as plain data, the
//! same way the teacher's detector works off an already-loaded
//! `&Vec<Tx>` rather than querying a store itself.

use rust_decimal::Decimal;
use time::{Date, Duration};

use crate::error::LedgerError;
use crate::model::account::AccountId;
use crate::model::transaction::TransactionId;
use crate::util::decimal::{round_money, GreaterEqualZeroDecimal, PosDecimal};

pub fn first_day_in_window(trade_date: Date) -> Date {
    trade_date.saturating_sub(Duration::days(30))
}

pub fn last_day_in_window(trade_date: Date) -> Date {
    trade_date.saturating_add(Duration::days(30))
}

/// One acquiring transaction (`buy` or `drip`, per `TxType::is_acquiring`)
/// found in the ±30-day window, in any account.
#[derive(Clone, Debug)]
pub struct WindowAcquisition {
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub trade_date: Date,
    pub quantity: PosDecimal,
}

pub struct SflInput<'a> {
    /// `D`: used to re-derive `[D-30, D+30]` and filter
    /// `acquisitions_in_window` down to what actually falls in it,
    /// rather than trusting the caller's query to already be bounded
    /// correctly.
    pub sell_trade_date: Date,
    pub sell_shares: PosDecimal,
    pub registered: bool,
    /// Candidate acquisitions of the same security, in any account,
    /// excluding the sell transaction itself. Need not be pre-sorted or
    /// pre-filtered to the window; `detect` does that itself.
    pub acquisitions_in_window: &'a [WindowAcquisition],
    /// Shares of the security held across all accounts as of the latest
    /// transaction on or before `D+30`.
    pub shares_held_at_window_end: GreaterEqualZeroDecimal,
}

/// The denied-loss portion attributed to one repurchasing transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SflAllocation {
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub denied_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SflResult {
    pub is_superficial: bool,
    pub denied_amount: Decimal,
    pub allocations: Vec<SflAllocation>,
    pub related_transaction_ids: Vec<TransactionId>,
    pub explanation: String,
    pub adjustment_required: String,
}

impl SflResult {
    fn not_superficial(explanation: impl Into<String>) -> Self {
        Self {
            is_superficial: false,
            denied_amount: Decimal::ZERO,
            allocations: Vec::new(),
            related_transaction_ids: Vec::new(),
            explanation: explanation.into(),
            adjustment_required: "none".to_string(),
        }
    }
}

/// Applies the §4.3 denial test and, if denied, the proportional
/// distribution chosen for the Open Question (ordered by acquisition
/// date ascending, prorated by acquired quantity; see DESIGN.md).
///
/// `capital_gain` must be the raw (pre-denial) result of `algebra::apply`
/// for the sell, and must be negative — callers only invoke the detector
/// on a realized loss, per spec §4.3's "Invoked ... whenever a sell
/// produces capital_gain < 0".
pub fn detect(input: &SflInput, capital_gain: Decimal) -> Result<SflResult, LedgerError> {
    debug_assert!(capital_gain.is_sign_negative() && !capital_gain.is_zero());
    let loss = -capital_gain;

    if input.registered {
        return Ok(SflResult::not_superficial(
            "account is registered; superficial-loss denial does not apply",
        ));
    }

    // Re-derive the window from `sell_trade_date` rather than trusting
    // the caller's `acquisitions_in_window` slice to already be
    // correctly bounded; a caller that widens its own query (or passes
    // a stale window from before a date edit) shouldn't silently deny
    // more, or less, than the ±30-day rule actually allows.
    let window_start = first_day_in_window(input.sell_trade_date);
    let window_end = last_day_in_window(input.sell_trade_date);
    let in_window: Vec<&WindowAcquisition> = input
        .acquisitions_in_window
        .iter()
        .filter(|a| a.trade_date >= window_start && a.trade_date <= window_end)
        .collect();

    let total_acquired: Decimal = in_window.iter().map(|a| *a.quantity).sum();
    if total_acquired.is_zero() {
        return Ok(SflResult::not_superficial(
            "no acquisitions of this security in any account within the 30-day window",
        ));
    }

    if input.shares_held_at_window_end.is_zero() {
        return Ok(SflResult::not_superficial(
            "no shares of this security remained held 30 days after the sale",
        ));
    }

    let sold = *input.sell_shares;
    let repurchased_considered = total_acquired.min(sold);
    let denied_amount = round_money(loss * repurchased_considered / sold);

    let mut ordered: Vec<&WindowAcquisition> = in_window;
    ordered.sort_by(|a, b| {
        a.trade_date
            .cmp(&b.trade_date)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });

    let mut allocations = Vec::with_capacity(ordered.len());
    let mut allocated_so_far = Decimal::ZERO;
    for (i, acq) in ordered.iter().enumerate() {
        let share = if i + 1 == ordered.len() {
            // Last allocation absorbs the rounding remainder so the
            // allocations sum exactly to denied_amount.
            round_money(denied_amount - allocated_so_far)
        } else {
            round_money(denied_amount * (*acq.quantity / total_acquired))
        };
        allocated_so_far += share;
        allocations.push(SflAllocation {
            account_id: acq.account_id.clone(),
            transaction_id: acq.transaction_id.clone(),
            denied_amount: share,
        });
    }

    let related_transaction_ids = ordered.iter().map(|a| a.transaction_id.clone()).collect();

    Ok(SflResult {
        is_superficial: true,
        denied_amount,
        allocations,
        related_transaction_ids,
        explanation: format!(
            "{} of {} sold shares were reacquired within 30 days in one or more accounts; \
             the loss is denied in proportion ({}/{})",
            repurchased_considered, sold, repurchased_considered, sold
        ),
        adjustment_required: "add the denied amount to the ACB of the repurchasing transaction(s)"
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::{Date, Month};

    use super::*;

    fn d(y: i32, m: Month, day: u8) -> Date {
        Date::from_calendar_date(y, m, day).unwrap()
    }

    fn pdec(v: Decimal) -> PosDecimal {
        PosDecimal::try_from(v).unwrap()
    }

    fn gez(v: Decimal) -> GreaterEqualZeroDecimal {
        GreaterEqualZeroDecimal::try_from(v).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let sell_date = d(2024, Month::February, 15);
        assert_eq!(first_day_in_window(sell_date), d(2024, Month::January, 16));
        assert_eq!(last_day_in_window(sell_date), d(2024, Month::March, 16));
    }

    #[test]
    fn test_full_denial_scenario_6() {
        let acqs = vec![WindowAcquisition {
            account_id: "acc1".to_string(),
            transaction_id: "buy2".to_string(),
            trade_date: d(2024, Month::January, 20),
            quantity: pdec(dec!(100)),
        }];
        let input = SflInput {
            sell_trade_date: d(2024, Month::January, 15),
            sell_shares: pdec(dec!(100)),
            registered: false,
            acquisitions_in_window: &acqs,
            shares_held_at_window_end: gez(dec!(100)),
        };
        let result = detect(&input, dec!(-1000.00)).unwrap();
        assert!(result.is_superficial);
        assert_eq!(result.denied_amount, dec!(1000.00));
        assert_eq!(result.allocations.len(), 1);
        assert_eq!(result.allocations[0].denied_amount, dec!(1000.00));
    }

    #[test]
    fn test_proportional_denial_p8() {
        // Sold 100 at a loss of 500; only 40 shares reacquired in-window.
        let acqs = vec![WindowAcquisition {
            account_id: "acc1".to_string(),
            transaction_id: "buy2".to_string(),
            trade_date: d(2024, Month::January, 20),
            quantity: pdec(dec!(40)),
        }];
        let input = SflInput {
            sell_trade_date: d(2024, Month::January, 15),
            sell_shares: pdec(dec!(100)),
            registered: false,
            acquisitions_in_window: &acqs,
            shares_held_at_window_end: gez(dec!(40)),
        };
        let result = detect(&input, dec!(-500.00)).unwrap();
        assert_eq!(result.denied_amount, dec!(200.00));
    }

    #[test]
    fn test_proration_across_multiple_repurchases() {
        let acqs = vec![
            WindowAcquisition {
                account_id: "acc1".to_string(),
                transaction_id: "buyA".to_string(),
                trade_date: d(2024, Month::January, 18),
                quantity: pdec(dec!(30)),
            },
            WindowAcquisition {
                account_id: "acc2".to_string(),
                transaction_id: "buyB".to_string(),
                trade_date: d(2024, Month::January, 20),
                quantity: pdec(dec!(70)),
            },
        ];
        let input = SflInput {
            sell_trade_date: d(2024, Month::January, 15),
            sell_shares: pdec(dec!(100)),
            registered: false,
            acquisitions_in_window: &acqs,
            shares_held_at_window_end: gez(dec!(100)),
        };
        let result = detect(&input, dec!(-1000.00)).unwrap();
        assert_eq!(result.denied_amount, dec!(1000.00));
        assert_eq!(result.allocations[0].denied_amount, dec!(300.00));
        assert_eq!(result.allocations[1].denied_amount, dec!(700.00));
        let sum: Decimal = result.allocations.iter().map(|a| a.denied_amount).sum();
        assert_eq!(sum, result.denied_amount);
    }

    #[test]
    fn test_registered_account_never_denied() {
        let acqs = vec![WindowAcquisition {
            account_id: "acc1".to_string(),
            transaction_id: "buy2".to_string(),
            trade_date: d(2024, Month::January, 20),
            quantity: pdec(dec!(100)),
        }];
        let input = SflInput {
            sell_trade_date: d(2024, Month::January, 15),
            sell_shares: pdec(dec!(100)),
            registered: true,
            acquisitions_in_window: &acqs,
            shares_held_at_window_end: gez(dec!(100)),
        };
        let result = detect(&input, dec!(-1000.00)).unwrap();
        assert!(!result.is_superficial);
    }

    #[test]
    fn test_no_shares_remaining_at_window_end_not_superficial() {
        let acqs = vec![WindowAcquisition {
            account_id: "acc1".to_string(),
            transaction_id: "buy2".to_string(),
            trade_date: d(2024, Month::January, 20),
            quantity: pdec(dec!(100)),
        }];
        let input = SflInput {
            sell_trade_date: d(2024, Month::January, 15),
            sell_shares: pdec(dec!(100)),
            registered: false,
            acquisitions_in_window: &acqs,
            shares_held_at_window_end: gez(dec!(0)),
        };
        let result = detect(&input, dec!(-1000.00)).unwrap();
        assert!(!result.is_superficial);
    }
}

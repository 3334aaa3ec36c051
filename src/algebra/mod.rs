//! The ACB Algebra: a pure function over `(shares_before, acb_before)` and
//! a transaction event, generalizing
//! `bookkeeping::delta_list::delta_for_tx` (which only switched over
//! `Buy`/`Sell`/`Roc`/`Sfla`) to the full eleven-kind table in spec §4.2.
//! No I/O, no persistence, no knowledge of other transactions — the
//! superficial-loss adjustment this produces for a `sell` is the *raw*,
//! un-denied capital gain; the Orchestrator consults the Detector
//! separately and folds the denial in afterwards.

use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::model::audit::{AuditStep, AuditTrail};
use crate::model::transaction::TxType;
use crate::util::decimal::{round_money, round_shares, safe_divide, GreaterEqualZeroDecimal};

/// `(shares, total_acb)` — `None` ACB models a registered account, the
/// same way the teacher's `PortfolioSecurityStatus.total_acb: Option<..>`
/// is `None` for a registered affiliate.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct AlgebraState {
    pub shares: GreaterEqualZeroDecimal,
    pub total_acb: Option<GreaterEqualZeroDecimal>,
}

impl AlgebraState {
    pub fn zero(registered: bool) -> Self {
        Self {
            shares: GreaterEqualZeroDecimal::zero(),
            total_acb: if registered {
                None
            } else {
                Some(GreaterEqualZeroDecimal::zero())
            },
        }
    }

    pub fn per_share_acb(&self) -> Option<Decimal> {
        self.total_acb.map(|acb| safe_divide(*acb, *self.shares))
    }
}

/// The inputs the Algebra needs for one event. Mirrors the fields stored
/// on `Transaction` that the `TxType` in question actually uses; unused
/// fields for a given type are simply ignored (e.g. `ratio` on a `buy`).
#[derive(Clone, Copy, Debug)]
pub struct AlgebraEvent {
    pub tx_type: TxType,
    pub quantity: Decimal,
    pub price_per_share: Decimal,
    pub fee_cad: Decimal,
    pub fx_rate: Decimal,
    pub ratio: Option<Decimal>,
    pub roc_per_share: Option<Decimal>,
    pub cash_per_share: Option<Decimal>,
    pub new_security_acb_percent: Option<Decimal>,
}

#[derive(Debug)]
pub struct AlgebraOutcome {
    pub shares_after: GreaterEqualZeroDecimal,
    pub acb_after: Option<GreaterEqualZeroDecimal>,
    pub capital_gain: Option<Decimal>,
    pub audit: AuditTrail,
    /// For `spinoff`: the opening ACB (CAD) carried into the spun-off
    /// security's series, which the Orchestrator turns into a synthetic
    /// `transfer_in` per spec §4.2.
    pub spinoff_opening_acb: Option<Decimal>,
}

fn require_ratio(event: &AlgebraEvent) -> Result<Decimal, LedgerError> {
    let ratio = event
        .ratio
        .ok_or_else(|| LedgerError::InvalidRatio("ratio is required".to_string()))?;
    if ratio <= Decimal::ZERO {
        return Err(LedgerError::InvalidRatio(format!(
            "ratio must be > 0, got {}",
            ratio
        )));
    }
    Ok(ratio)
}

fn gez(d: Decimal) -> Result<GreaterEqualZeroDecimal, LedgerError> {
    GreaterEqualZeroDecimal::try_from(d)
        .map_err(|e| LedgerError::InvariantViolation(format!("expected non-negative: {}", e)))
}

pub fn apply(state: AlgebraState, event: &AlgebraEvent) -> Result<AlgebraOutcome, LedgerError> {
    let registered = state.total_acb.is_none();
    let mut audit = AuditTrail::new(event.tx_type);
    let shares_before = state.shares;
    let acb_before = state.total_acb;

    let (shares_after, acb_after, capital_gain, spinoff_opening_acb) = match event.tx_type {
        TxType::Buy => {
            let new_shares = gez(round_shares(*shares_before + event.quantity))?;
            let cost = event.price_per_share * event.quantity * event.fx_rate + event.fee_cad;
            audit.push(
                AuditStep::new("compute acquisition cost in CAD")
                    .with_formula("price_per_share * quantity * fx_rate + fee_cad")
                    .with_value("price_per_share", event.price_per_share)
                    .with_value("quantity", event.quantity)
                    .with_value("fx_rate", event.fx_rate)
                    .with_value("fee_cad", event.fee_cad)
                    .with_result(round_money(cost)),
            );
            let new_acb = acb_before.map(|a| round_money(*a + cost));
            (new_shares, new_acb.map(gez).transpose()?, None, None)
        }

        TxType::Sell => {
            let diff = *shares_before - event.quantity;
            if diff.is_sign_negative() {
                return Err(LedgerError::InsufficientShares(format!(
                    "sell of {} exceeds shares_before {}",
                    event.quantity, shares_before
                )));
            }
            let new_shares = gez(round_shares(diff))?;
            let (new_acb, gain) = match acb_before {
                None => (None, None),
                Some(acb) => {
                    let per_share = safe_divide(*acb, *shares_before);
                    let disposed_acb = per_share * event.quantity;
                    let new_acb = round_money(*acb - disposed_acb);
                    let proceeds =
                        event.price_per_share * event.quantity * event.fx_rate - event.fee_cad;
                    let gain = round_money(proceeds - disposed_acb);
                    audit.push(
                        AuditStep::new("compute disposed ACB and capital gain")
                            .with_formula("proceeds - (acb_before/shares_before)*quantity")
                            .with_value("acb_per_share", per_share)
                            .with_value("disposed_acb", disposed_acb)
                            .with_value("proceeds", proceeds)
                            .with_result(gain),
                    );
                    (Some(gez(new_acb)?), Some(gain))
                }
            };
            (new_shares, new_acb, gain, None)
        }

        TxType::Dividend => {
            let cash = round_money(event.price_per_share * *shares_before * event.fx_rate);
            audit.push(
                AuditStep::new("informational dividend cash received")
                    .with_formula("price_per_share * shares_before * fx_rate")
                    .with_result(cash),
            );
            (shares_before, acb_before, None, None)
        }

        TxType::Drip => {
            let new_shares = gez(round_shares(*shares_before + event.quantity))?;
            let reinvested =
                event.price_per_share * *shares_before * event.fx_rate + event.fee_cad;
            audit.push(
                AuditStep::new("compute reinvested amount added to ACB")
                    .with_formula("dividend_rate_per_share * shares_before * fx_rate + fee_cad")
                    .with_result(round_money(reinvested)),
            );
            let new_acb = acb_before.map(|a| round_money(*a + reinvested));
            (new_shares, new_acb.map(gez).transpose()?, None, None)
        }

        TxType::Roc => {
            let acb = acb_before.ok_or_else(|| {
                LedgerError::InvariantViolation(
                    "roc tx on a registered account has no ACB to adjust".to_string(),
                )
            })?;
            let roc_per_share = event.roc_per_share.ok_or_else(|| {
                LedgerError::MissingRequiredField("roc_per_share is required for roc".to_string())
            })?;
            let reduction = roc_per_share * *shares_before * event.fx_rate;
            let remaining = *acb - reduction;
            let (new_acb, gain) = if remaining.is_sign_negative() {
                (Decimal::ZERO, round_money(-remaining))
            } else {
                (round_money(remaining), Decimal::ZERO)
            };
            audit.push(
                AuditStep::new("reduce ACB by return of capital, clamp at zero")
                    .with_formula("max(0, acb_before - roc_per_share*shares_before*fx_rate)")
                    .with_value("reduction", reduction)
                    .with_result(new_acb),
            );
            (shares_before, Some(gez(new_acb)?), Some(gain), None)
        }

        TxType::Split | TxType::Consolidation => {
            let ratio = require_ratio(event)?;
            let new_shares = gez(round_shares(*shares_before * ratio))?;
            audit.push(
                AuditStep::new("scale share balance by ratio, ACB unchanged")
                    .with_formula("shares_before * ratio")
                    .with_value("ratio", ratio)
                    .with_result(new_shares),
            );
            (new_shares, acb_before, None, None)
        }

        TxType::Merger => {
            let ratio = require_ratio(event)?;
            let new_shares = gez(round_shares(*shares_before * ratio))?;
            let cash_per_share = event.cash_per_share.unwrap_or(Decimal::ZERO);
            let (new_acb, gain) = match acb_before {
                None => (None, None),
                Some(acb) => {
                    if cash_per_share.is_zero() {
                        (Some(acb), None)
                    } else {
                        let cash_total = cash_per_share * *shares_before * event.fx_rate;
                        let new_share_value =
                            *new_shares * event.price_per_share * event.fx_rate;
                        let cash_prop = safe_divide(cash_total, cash_total + new_share_value);
                        let acb_reduction = *acb * cash_prop;
                        let new_acb = round_money(*acb - acb_reduction);
                        let gain = round_money(cash_total - acb_reduction);
                        audit.push(
                            AuditStep::new("split merger proceeds between cash and new shares")
                                .with_formula("cash_prop = cash_total / (cash_total + new_shares*price*fx_rate)")
                                .with_value("cash_total", cash_total)
                                .with_value("cash_prop", cash_prop)
                                .with_result(gain),
                        );
                        (Some(gez(new_acb)?), Some(gain))
                    }
                }
            };
            (new_shares, new_acb, gain, None)
        }

        TxType::Spinoff => {
            let pct = event.new_security_acb_percent.ok_or_else(|| {
                LedgerError::MissingRequiredField(
                    "new_security_acb_percent is required for spinoff".to_string(),
                )
            })?;
            let (new_acb, spun_off) = match acb_before {
                None => (None, None),
                Some(acb) => {
                    let retained = round_money(*acb * (Decimal::ONE - pct));
                    let spun_off = round_money(*acb * pct);
                    audit.push(
                        AuditStep::new("allocate ACB between retained and spun-off security")
                            .with_formula("acb_before * (1 - new_security_acb_percent)")
                            .with_value("retained", retained)
                            .with_value("spun_off_opening_acb", spun_off)
                            .with_result(retained),
                    );
                    (Some(gez(retained)?), Some(spun_off))
                }
            };
            (shares_before, new_acb, None, spun_off)
        }

        TxType::TransferIn => {
            let new_shares = gez(round_shares(*shares_before + event.quantity))?;
            let incoming_acb = event.price_per_share * event.quantity;
            audit.push(
                AuditStep::new("carry incoming per-share ACB from source account")
                    .with_formula("price_per_share * quantity")
                    .with_result(round_money(incoming_acb)),
            );
            let new_acb = acb_before.map(|a| round_money(*a + incoming_acb));
            (new_shares, new_acb.map(gez).transpose()?, None, None)
        }

        TxType::TransferOut => {
            let diff = *shares_before - event.quantity;
            if diff.is_sign_negative() {
                return Err(LedgerError::InsufficientShares(format!(
                    "transfer_out of {} exceeds shares_before {}",
                    event.quantity, shares_before
                )));
            }
            let new_shares = gez(round_shares(diff))?;
            let new_acb = match acb_before {
                None => None,
                Some(acb) => {
                    let per_share = safe_divide(*acb, *shares_before);
                    let disposed_acb = per_share * event.quantity;
                    Some(gez(round_money(*acb - disposed_acb))?)
                }
            };
            (new_shares, new_acb, None, None)
        }
    };

    let summary = format!(
        "{} {} shares: {} -> {}",
        event.tx_type, event.quantity, shares_before, shares_after
    );
    audit.summary = summary;
    if registered {
        debug_assert!(acb_after.is_none());
    }

    tracing::debug!(
        tx_type = %event.tx_type,
        shares_before = %shares_before,
        shares_after = %shares_after,
        "applied ACB algebra event"
    );

    Ok(AlgebraOutcome {
        shares_after,
        acb_after,
        capital_gain,
        audit,
        spinoff_opening_acb,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::gezdec;

    fn state(shares: Decimal, acb: Option<Decimal>) -> AlgebraState {
        AlgebraState {
            shares: gezdec_from(shares),
            total_acb: acb.map(gezdec_from),
        }
    }

    fn gezdec_from(d: Decimal) -> GreaterEqualZeroDecimal {
        GreaterEqualZeroDecimal::try_from(d).unwrap()
    }

    fn base_event(tx_type: TxType) -> AlgebraEvent {
        AlgebraEvent {
            tx_type,
            quantity: Decimal::ZERO,
            price_per_share: Decimal::ZERO,
            fee_cad: Decimal::ZERO,
            fx_rate: Decimal::ONE,
            ratio: None,
            roc_per_share: None,
            cash_per_share: None,
            new_security_acb_percent: None,
        }
    }

    #[test]
    fn test_buy_then_sell_scenario_1() {
        let s0 = state(dec!(0), Some(dec!(0)));
        let buy = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(50),
            fee_cad: dec!(10),
            ..base_event(TxType::Buy)
        };
        let out = apply(s0, &buy).unwrap();
        assert_eq!(*out.acb_after.unwrap(), dec!(5010.00));

        let s1 = AlgebraState {
            shares: out.shares_after,
            total_acb: out.acb_after,
        };
        let sell = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(60),
            fee_cad: dec!(10),
            ..base_event(TxType::Sell)
        };
        let out2 = apply(s1, &sell).unwrap();
        assert_eq!(out2.capital_gain.unwrap(), dec!(980.00));
        assert_eq!(*out2.acb_after.unwrap(), dec!(0));
        assert_eq!(*out2.shares_after, dec!(0));
    }

    #[test]
    fn test_same_day_double_buy_scenario_2() {
        let s0 = state(dec!(0), Some(dec!(0)));
        let buy1 = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(50),
            ..base_event(TxType::Buy)
        };
        let out1 = apply(s0, &buy1).unwrap();
        assert_eq!(*out1.acb_after.unwrap(), dec!(5000.00));

        let s1 = AlgebraState {
            shares: out1.shares_after,
            total_acb: out1.acb_after,
        };
        let buy2 = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(51),
            ..base_event(TxType::Buy)
        };
        let out2 = apply(s1, &buy2).unwrap();
        assert_eq!(*out2.acb_after.unwrap(), dec!(10100.00));
        assert_eq!(
            safe_divide(*out2.acb_after.unwrap(), *out2.shares_after),
            dec!(50.50)
        );
    }

    #[test]
    fn test_usd_fx_scenario_3() {
        let s0 = state(dec!(0), Some(dec!(0)));
        let buy = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(50),
            fx_rate: dec!(1.35),
            ..base_event(TxType::Buy)
        };
        let out1 = apply(s0, &buy).unwrap();
        assert_eq!(*out1.acb_after.unwrap(), dec!(6750.00));

        let s1 = AlgebraState {
            shares: out1.shares_after,
            total_acb: out1.acb_after,
        };
        let sell = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(60),
            fx_rate: dec!(1.30),
            ..base_event(TxType::Sell)
        };
        let out2 = apply(s1, &sell).unwrap();
        assert_eq!(out2.capital_gain.unwrap(), dec!(1050.00));
    }

    #[test]
    fn test_roc_clamp_scenario_4() {
        let s0 = state(dec!(0), Some(dec!(0)));
        let buy = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(8),
            ..base_event(TxType::Buy)
        };
        let out1 = apply(s0, &buy).unwrap();
        let s1 = AlgebraState {
            shares: out1.shares_after,
            total_acb: out1.acb_after,
        };
        let roc = AlgebraEvent {
            roc_per_share: Some(dec!(10)),
            ..base_event(TxType::Roc)
        };
        let out2 = apply(s1, &roc).unwrap();
        assert_eq!(*out2.acb_after.unwrap(), dec!(0));
        assert_eq!(out2.capital_gain.unwrap(), dec!(200.00));
    }

    #[test]
    fn test_split_scenario_5() {
        let s0 = state(dec!(0), Some(dec!(0)));
        let buy = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(50),
            ..base_event(TxType::Buy)
        };
        let out1 = apply(s0, &buy).unwrap();
        let s1 = AlgebraState {
            shares: out1.shares_after,
            total_acb: out1.acb_after,
        };
        let split = AlgebraEvent {
            ratio: Some(dec!(2)),
            ..base_event(TxType::Split)
        };
        let out2 = apply(s1, &split).unwrap();
        assert_eq!(*out2.shares_after, dec!(200));
        assert_eq!(*out2.acb_after.unwrap(), dec!(5000.00));
        assert_eq!(
            safe_divide(*out2.acb_after.unwrap(), *out2.shares_after),
            dec!(25.00)
        );
    }

    #[test]
    fn test_sell_insufficient_shares() {
        let s0 = state(dec!(10), Some(dec!(100)));
        let sell = AlgebraEvent {
            quantity: dec!(20),
            price_per_share: dec!(5),
            ..base_event(TxType::Sell)
        };
        let err = apply(s0, &sell).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientShares(_)));
    }

    #[test]
    fn test_split_invalid_ratio() {
        let s0 = state(dec!(10), Some(dec!(100)));
        let split = AlgebraEvent {
            ratio: Some(dec!(0)),
            ..base_event(TxType::Split)
        };
        let err = apply(s0, &split).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRatio(_)));
    }

    #[test]
    fn test_registered_account_has_no_acb() {
        let s0 = AlgebraState::zero(true);
        let buy = AlgebraEvent {
            quantity: dec!(100),
            price_per_share: dec!(50),
            ..base_event(TxType::Buy)
        };
        let out = apply(s0, &buy).unwrap();
        assert!(out.acb_after.is_none());
        let _ = gezdec!(1); // exercise macro import
    }
}

//! The Ledger Orchestrator: create/update/delete/replay, owning the
//! global chain-continuity invariant (I1). Generalizes the coordination
//! the teacher's CLI `command_main` performs by hand (load txs, compute
//! deltas via `delta_for_tx`, write a report) into a reusable service
//! that can be driven by any caller (CLI, tests, an eventual HTTP
//! adapter) and actually persists the resulting ledger state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_std::sync::Mutex as AsyncMutex;
use rust_decimal::Decimal;
use time::Date;

use crate::algebra::{self, AlgebraEvent, AlgebraState};
use crate::bookkeeping::superficial_loss::{self, SflInput, WindowAcquisition};
use crate::error::{LedgerError, LedgerResult};
use crate::fx::FxOracle;
use crate::model::account::AccountId;
use crate::model::audit::SuperficialLossAudit;
use crate::model::position::Position;
use crate::model::security::SecurityId;
use crate::model::transaction::{Transaction, TransactionId, TxFlags, TxParams, TxType};
use crate::persistence::{LedgerStore, SeriesOrder};
use crate::util::decimal::{round_money, round_rate, GreaterEqualZeroDecimal, PosDecimal};

type SeriesKey = (SecurityId, AccountId);

/// Input to [`Orchestrator::create`]. `settlement_date` defaults to
/// `trade_date`, and `fx_rate` defaults to the FX oracle's rate (or `1`
/// for CAD securities) when omitted, matching spec §4.4 step 2.
#[derive(Clone, Debug)]
pub struct CreateTransactionInput {
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub trade_date: Date,
    pub settlement_date: Option<Date>,
    pub tx_type: TxType,
    pub quantity: Decimal,
    pub price_per_share: Decimal,
    pub fee_cad: Decimal,
    pub fx_rate: Option<Decimal>,
    pub params: TxParams,
    pub notes: String,
}

/// A partial update; `None` fields keep the original transaction's value.
/// `update` is implemented as delete-then-create with these fields
/// merged in, per spec §4.4.
#[derive(Clone, Debug, Default)]
pub struct UpdateTransactionPatch {
    pub trade_date: Option<Date>,
    pub settlement_date: Option<Date>,
    pub tx_type: Option<TxType>,
    pub quantity: Option<Decimal>,
    pub price_per_share: Option<Decimal>,
    pub fee_cad: Option<Decimal>,
    pub fx_rate: Option<Decimal>,
    pub params: Option<TxParams>,
    pub notes: Option<String>,
}

fn merge_patch(original: &Transaction, patch: UpdateTransactionPatch) -> CreateTransactionInput {
    CreateTransactionInput {
        security_id: original.security_id.clone(),
        account_id: original.account_id.clone(),
        trade_date: patch.trade_date.unwrap_or(original.trade_date),
        settlement_date: Some(patch.settlement_date.unwrap_or(original.settlement_date)),
        tx_type: patch.tx_type.unwrap_or(original.tx_type),
        quantity: patch.quantity.unwrap_or(*original.quantity),
        price_per_share: patch.price_per_share.unwrap_or(original.price_per_share),
        fee_cad: patch.fee_cad.unwrap_or(original.fee_cad),
        fx_rate: Some(patch.fx_rate.unwrap_or(original.fx_rate)),
        params: patch.params.unwrap_or_else(|| original.params.clone()),
        notes: patch.notes.unwrap_or_else(|| original.notes.clone()),
    }
}

pub struct Orchestrator<S: LedgerStore, F: FxOracle> {
    store: Arc<S>,
    fx: Arc<F>,
    locks: StdMutex<HashMap<SeriesKey, Arc<AsyncMutex<()>>>>,
    fx_deadline: Option<Duration>,
    id_gen: StdMutex<u64>,
}

impl<S: LedgerStore, F: FxOracle> Orchestrator<S, F> {
    pub fn new(store: Arc<S>, fx: Arc<F>) -> Self {
        Self {
            store,
            fx,
            locks: StdMutex::new(HashMap::new()),
            fx_deadline: None,
            id_gen: StdMutex::new(0),
        }
    }

    pub fn with_fx_deadline(mut self, deadline: Duration) -> Self {
        self.fx_deadline = Some(deadline);
        self
    }

    fn series_lock(&self, key: &SeriesKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    fn next_id(&self) -> TransactionId {
        let mut n = self.id_gen.lock().unwrap();
        *n += 1;
        format!("tx-{}-{}", *n, uuid::Uuid::new_v4())
    }

    /// Resolves the FX rate for a transaction. MUST happen before the
    /// per-series lock is acquired (spec §5), so a slow oracle never
    /// stalls unrelated writes.
    async fn resolve_fx_rate(
        &self,
        explicit: Option<Decimal>,
        currency: &str,
        is_cad: bool,
        date: Date,
    ) -> LedgerResult<Decimal> {
        if let Some(rate) = explicit {
            return Ok(round_rate(rate));
        }
        if is_cad {
            return Ok(Decimal::ONE);
        }
        let fetch = self.fx.rate(date, currency, crate::model::security::CAD);
        let rate = match self.fx_deadline {
            Some(d) => async_std::future::timeout(d, fetch)
                .await
                .map_err(|_| LedgerError::FxUnavailable(format!("fx oracle timed out after {:?}", d)))??,
            None => fetch.await?,
        };
        Ok(round_rate(rate))
    }

    /// `(shares_after, acb_after)` of the latest transaction of the
    /// series strictly before `date`, or the zero state if none exists.
    /// Used to seed `replay`: everything from `date` onward is part of
    /// the recomputed suffix, so even same-day rows must be excluded
    /// from the seed.
    async fn state_before(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        date: Date,
        registered: bool,
    ) -> LedgerResult<AlgebraState> {
        match self
            .store
            .find_prev_before(security_id, account_id, date)
            .await?
        {
            Some(prev) => Ok(AlgebraState {
                shares: prev.shares_after,
                total_acb: if registered { None } else { Some(prev.acb_after) },
            }),
            None => Ok(AlgebraState::zero(registered)),
        }
    }

    /// The pre-state for a brand-new transaction being inserted at
    /// `date`: the latest existing row with trade date `<= date`
    /// (spec §4.4 `create` step 3). Same-day rows count as predecessors
    /// here — unlike `state_before`, because a freshly inserted row
    /// always receives a larger `created_at` than anything already
    /// persisted, so it sorts after same-day siblings regardless.
    ///
    /// This is only a starting point: [`Self::resolve_affected_series`]
    /// runs right after the row is inserted and may trigger a full
    /// replay starting earlier than `date`, overwriting the values
    /// computed from this pre-state.
    async fn state_before_new_insert(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        date: Date,
        registered: bool,
    ) -> LedgerResult<AlgebraState> {
        let series = self
            .store
            .find_series(security_id, account_id, SeriesOrder::DateAscCreatedAtAsc)
            .await?;
        match series.into_iter().filter(|t| t.trade_date <= date).last() {
            Some(prev) => Ok(AlgebraState {
                shares: prev.shares_after,
                total_acb: if registered { None } else { Some(prev.acb_after) },
            }),
            None => Ok(AlgebraState::zero(registered)),
        }
    }

    fn build_event(input: &CreateTransactionInput, fx_rate: Decimal) -> AlgebraEvent {
        AlgebraEvent {
            tx_type: input.tx_type,
            quantity: input.quantity,
            price_per_share: input.price_per_share,
            fee_cad: input.fee_cad,
            fx_rate,
            ratio: input.params.ratio,
            roc_per_share: input.params.roc_per_share,
            cash_per_share: input.params.cash_per_share,
            new_security_acb_percent: input.params.new_security_acb_percent,
        }
    }

    /// Builds the persisted `Transaction` row for `input`, applying the
    /// Algebra at `pre_state`. Does not consult the superficial-loss
    /// detector or write the Position cache — `create_locked` hands the
    /// inserted row off to `resolve_affected_series`/`replay_locked` for
    /// that, since the final values depend on whatever full suffix ends
    /// up needing replay around this insert.
    async fn build_transaction(
        &self,
        id: TransactionId,
        input: &CreateTransactionInput,
        pre_state: AlgebraState,
    ) -> LedgerResult<(Transaction, AlgebraState, Option<Decimal>)> {
        let security = self
            .store
            .get_security(&input.security_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("security {}", input.security_id)))?;
        let fx_rate = self
            .resolve_fx_rate(
                input.fx_rate,
                &security.currency,
                security.is_cad(),
                input.settlement_date.unwrap_or(input.trade_date),
            )
            .await?;

        let event = Self::build_event(input, fx_rate);
        let outcome = algebra::apply(pre_state, &event)?;

        let quantity = GreaterEqualZeroDecimal::try_from(input.quantity)
            .map_err(|e| LedgerError::MissingRequiredField(format!("quantity: {}", e)))?;

        let tx = Transaction {
            id,
            trade_date: input.trade_date,
            settlement_date: input.settlement_date.unwrap_or(input.trade_date),
            created_at: 0,
            tx_type: input.tx_type,
            security_id: input.security_id.clone(),
            account_id: input.account_id.clone(),
            quantity,
            price_per_share: input.price_per_share,
            fee_cad: input.fee_cad,
            fx_rate,
            shares_before: pre_state.shares,
            shares_after: outcome.shares_after,
            acb_before: pre_state.total_acb.unwrap_or_else(GreaterEqualZeroDecimal::zero),
            acb_after: outcome.acb_after.unwrap_or_else(GreaterEqualZeroDecimal::zero),
            capital_gain: outcome.capital_gain,
            params: input.params.clone(),
            notes: input.notes.clone(),
            flags: TxFlags::default(),
            audit: Some(outcome.audit),
        };

        let post_state = AlgebraState {
            shares: outcome.shares_after,
            total_acb: outcome.acb_after,
        };
        Ok((tx, post_state, outcome.spinoff_opening_acb))
    }

    /// Emits the paired synthetic `transfer_in` a `spinoff` opens on the
    /// new security's own series, carrying `opening_acb` as its total
    /// incoming ACB (spec §4.2 `spinoff` row). `spinoff.quantity` is
    /// repurposed to mean "shares of the new security received" — the
    /// algebra never reads it for the original security's share count,
    /// since a spinoff leaves `shares_after == shares_before` there.
    ///
    /// Only called from the initial `create` path, not from replay: the
    /// paired transfer_in lives on a different series, so replaying the
    /// original security's suffix has no way to find and update it
    /// in place without risking duplicate opens on every replay.
    async fn spawn_spinoff_transfer(&self, tx: &Transaction, opening_acb: Decimal) -> LedgerResult<()> {
        let Some(new_security_id) = tx.params.new_security_id.clone() else {
            return Ok(());
        };
        if tx.quantity.is_zero() {
            return Ok(());
        }
        let per_share = crate::util::decimal::safe_divide(opening_acb, *tx.quantity);
        let input = CreateTransactionInput {
            security_id: new_security_id,
            account_id: tx.account_id.clone(),
            trade_date: tx.trade_date,
            settlement_date: Some(tx.settlement_date),
            tx_type: TxType::TransferIn,
            quantity: *tx.quantity,
            price_per_share: per_share,
            fee_cad: Decimal::ZERO,
            fx_rate: Some(Decimal::ONE),
            params: TxParams::default(),
            notes: format!("opening ACB from spinoff of {}", tx.security_id),
        };
        self.create(input).await?;
        Ok(())
    }

    async fn write_position(&self, security_id: &SecurityId, account_id: &AccountId, state: AlgebraState) -> LedgerResult<()> {
        self.store
            .upsert_position(Position {
                security_id: security_id.clone(),
                account_id: account_id.clone(),
                shares: state.shares,
                total_acb: state.total_acb.unwrap_or_else(GreaterEqualZeroDecimal::zero),
            })
            .await
    }

    /// Applies the superficial-loss check to a sell transaction that
    /// realized a loss, and writes the denied-amount ACB adjustment into
    /// each repurchasing transaction's `acb_after`, per spec §4.3.
    ///
    /// A repurchase that is itself part of the suffix currently being
    /// replayed (`suffix_positions` maps its id to an index greater than
    /// `sell_index`) hasn't been recomputed yet this pass — writing to
    /// it now would just be clobbered when the loop reaches its own
    /// turn. Such allocations are stashed in `pending_adjustments`
    /// instead, and `replay_locked` folds them in when it reaches that
    /// row. A repurchase outside the current suffix (already committed,
    /// or on an account not being replayed this pass) is adjusted in the
    /// store directly, as before.
    async fn apply_superficial_loss(
        &self,
        sell: &mut Transaction,
        suffix_positions: &HashMap<TransactionId, usize>,
        sell_index: usize,
        pending_adjustments: &mut HashMap<TransactionId, Decimal>,
    ) -> LedgerResult<()> {
        let Some(gain) = sell.capital_gain else { return Ok(()) };
        if !(gain.is_sign_negative() && !gain.is_zero()) {
            return Ok(());
        }
        let account = self
            .store
            .get_account(&sell.account_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", sell.account_id)))?;

        let window_start = superficial_loss::first_day_in_window(sell.trade_date);
        let window_end = superficial_loss::last_day_in_window(sell.trade_date);

        let in_window = self
            .store
            .find_in_window(&sell.security_id, window_start, window_end, &[TxType::Buy, TxType::Drip])
            .await?;
        let acquisitions: Vec<WindowAcquisition> = in_window
            .into_iter()
            .filter(|t| t.id != sell.id)
            .filter_map(|t| {
                PosDecimal::try_from(*t.quantity).ok().map(|q| WindowAcquisition {
                    account_id: t.account_id,
                    transaction_id: t.id,
                    trade_date: t.trade_date,
                    quantity: q,
                })
            })
            .collect();

        let all_for_security = self.store.find_all_for_security(&sell.security_id).await?;
        let mut latest_per_account: HashMap<AccountId, &Transaction> = HashMap::new();
        for t in all_for_security.iter().filter(|t| t.trade_date <= window_end) {
            latest_per_account
                .entry(t.account_id.clone())
                .and_modify(|existing| {
                    if (t.trade_date, t.created_at) > (existing.trade_date, existing.created_at) {
                        *existing = t;
                    }
                })
                .or_insert(t);
        }
        let shares_held_at_window_end: Decimal =
            latest_per_account.values().map(|t| *t.shares_after).sum();
        let shares_held_at_window_end = GreaterEqualZeroDecimal::try_from(shares_held_at_window_end)
            .unwrap_or_else(|_| GreaterEqualZeroDecimal::zero());

        let Ok(sell_shares) = PosDecimal::try_from(*sell.quantity) else {
            return Ok(());
        };

        let input = SflInput {
            sell_trade_date: sell.trade_date,
            sell_shares,
            registered: account.is_registered(),
            acquisitions_in_window: &acquisitions,
            shares_held_at_window_end,
        };

        let result = superficial_loss::detect(&input, gain)?;
        if !result.is_superficial {
            return Ok(());
        }

        sell.flags.superficial_loss = true;
        sell.audit.get_or_insert_with(|| {
            crate::model::audit::AuditTrail::new(sell.tx_type)
        }).superficial_loss = Some(SuperficialLossAudit {
            is_superficial: true,
            loss_amount: result.denied_amount.to_string(),
            related_transaction_ids: result.related_transaction_ids.clone(),
            explanation: result.explanation.clone(),
            adjustment_required: result.adjustment_required.clone(),
        });

        for allocation in &result.allocations {
            match suffix_positions.get(&allocation.transaction_id) {
                Some(&pos) if pos > sell_index => {
                    pending_adjustments
                        .entry(allocation.transaction_id.clone())
                        .and_modify(|d| *d += allocation.denied_amount)
                        .or_insert(allocation.denied_amount);
                }
                _ => {
                    if let Some(mut repurchase) = self.store.get_transaction(&allocation.transaction_id).await? {
                        let adjusted = round_money(*repurchase.acb_after + allocation.denied_amount);
                        repurchase.acb_after = GreaterEqualZeroDecimal::try_from(adjusted).map_err(|e| {
                            LedgerError::InvariantViolation(format!("sfl adjustment produced negative ACB: {}", e))
                        })?;
                        self.store.upsert_transaction(repurchase).await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Finds every loss-realizing sell of `security_id` (any account)
    /// whose ±30-day window could be affected by a transaction landing
    /// on `trade_date`, and replays each affected account's series from
    /// the earlier of the sell's date and `trade_date` — so a loss sell
    /// recorded before its repurchase existed gets re-evaluated once the
    /// repurchase (or any other change in its window) shows up, not just
    /// transactions inserted after it chronologically within its own
    /// series (spec §4.3's "any account" rule, §4.4's replay contract).
    ///
    /// `account_id`'s own series is always replayed from `trade_date`
    /// (or earlier, if an affected sell pulls it back), since that's the
    /// series the caller just wrote to. The caller must already hold
    /// `account_id`'s series lock; this method acquires the lock for any
    /// other affected account itself.
    async fn resolve_affected_series(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        trade_date: Date,
    ) -> LedgerResult<()> {
        let mut replay_from: HashMap<AccountId, Date> = HashMap::new();
        replay_from.insert(account_id.clone(), trade_date);

        let window_start = superficial_loss::first_day_in_window(trade_date);
        let window_end = superficial_loss::last_day_in_window(trade_date);
        let sells = self
            .store
            .find_in_window(security_id, window_start, window_end, &[TxType::Sell])
            .await?;
        for sell in sells {
            if !matches!(sell.capital_gain, Some(g) if g.is_sign_negative() && !g.is_zero()) {
                continue;
            }
            let from = sell.trade_date.min(trade_date);
            replay_from
                .entry(sell.account_id.clone())
                .and_modify(|d| *d = (*d).min(from))
                .or_insert(from);
        }

        if let Some(from) = replay_from.remove(account_id) {
            let registered = self
                .store
                .get_account(account_id)
                .await?
                .map(|a| a.is_registered())
                .unwrap_or(false);
            self.replay_locked(security_id, account_id, from, registered).await?;
        }

        for (other_account, from) in replay_from {
            let key: SeriesKey = (security_id.clone(), other_account.clone());
            let lock = self.series_lock(&key);
            let _guard = lock.lock().await;
            let registered = self
                .store
                .get_account(&other_account)
                .await?
                .map(|a| a.is_registered())
                .unwrap_or(false);
            self.replay_locked(security_id, &other_account, from, registered).await?;
        }

        Ok(())
    }

    /// spec §4.4 `create`.
    pub async fn create(&self, input: CreateTransactionInput) -> LedgerResult<Transaction> {
        let security = self
            .store
            .get_security(&input.security_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("security {}", input.security_id)))?;
        let account = self
            .store
            .get_account(&input.account_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", input.account_id)))?;

        let mut input = input;
        if input.settlement_date.is_none() {
            input.settlement_date = Some(input.trade_date);
        }

        let resolved_fx = self
            .resolve_fx_rate(
                input.fx_rate,
                &security.currency,
                security.is_cad(),
                input.settlement_date.unwrap(),
            )
            .await?;
        input.fx_rate = Some(resolved_fx);

        let key: SeriesKey = (input.security_id.clone(), input.account_id.clone());
        let lock = self.series_lock(&key);
        let _guard = lock.lock().await;

        let snapshot = self.store.snapshot().await?;
        match self.create_locked(input, account.is_registered()).await {
            Ok(tx) => Ok(tx),
            Err(e) => {
                self.store.restore(snapshot).await?;
                Err(e)
            }
        }
    }

    async fn create_locked(
        &self,
        input: CreateTransactionInput,
        registered: bool,
    ) -> LedgerResult<Transaction> {
        let pre_state = self
            .state_before_new_insert(&input.security_id, &input.account_id, input.trade_date, registered)
            .await?;

        let id = self.next_id();
        let created_at = self.next_created_at();
        let (mut tx, _post_state, spinoff_opening_acb) =
            self.build_transaction(id.clone(), &input, pre_state).await?;
        tx.created_at = created_at;

        self.store.upsert_transaction(tx.clone()).await?;

        self.resolve_affected_series(&input.security_id, &input.account_id, input.trade_date)
            .await?;

        if tx.tx_type == TxType::Spinoff {
            if let Some(opening_acb) = spinoff_opening_acb {
                self.spawn_spinoff_transfer(&tx, opening_acb).await?;
            }
        }

        self.store
            .get_transaction(&id)
            .await?
            .ok_or_else(|| LedgerError::InvariantViolation("transaction vanished after create".to_string()))
    }

    fn next_created_at(&self) -> i64 {
        let mut n = self.id_gen.lock().unwrap();
        *n += 1;
        *n as i64
    }

    /// spec §4.4 `update`: delete-then-create with merged fields, inside
    /// one atomic step.
    pub async fn update(&self, id: &TransactionId, patch: UpdateTransactionPatch) -> LedgerResult<Transaction> {
        let original = self
            .store
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;
        let security = self
            .store
            .get_security(&original.security_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("security {}", original.security_id)))?;

        let mut merged = merge_patch(&original, patch);
        let resolved_fx = self
            .resolve_fx_rate(
                merged.fx_rate,
                &security.currency,
                security.is_cad(),
                merged.settlement_date.unwrap_or(merged.trade_date),
            )
            .await?;
        merged.fx_rate = Some(resolved_fx);

        let key: SeriesKey = (original.security_id.clone(), original.account_id.clone());
        let lock = self.series_lock(&key);
        let _guard = lock.lock().await;

        let snapshot = self.store.snapshot().await?;
        let registered = self
            .store
            .get_account(&original.account_id)
            .await?
            .map(|a| a.is_registered())
            .unwrap_or(false);

        // `merged`'s new trade_date drives the forward-looking
        // replay/superficial-loss resolution inside `create_locked`. The
        // *original* date also needs its own pass afterward: if the edit
        // moved this transaction out of a sell's window (or changed the
        // quantity/date enough to change an existing denial), the sell
        // recorded against the old date must be re-evaluated too.
        let result: LedgerResult<Transaction> = async {
            self.store.delete_transaction(id).await?;
            let tx = self.create_locked(merged, registered).await?;
            self.resolve_affected_series(&original.security_id, &original.account_id, original.trade_date)
                .await?;
            Ok(tx)
        }
        .await;

        match result {
            Ok(tx) => Ok(tx),
            Err(e) => {
                self.store.restore(snapshot).await?;
                Err(e)
            }
        }
    }

    /// spec §4.4 `delete`.
    pub async fn delete(&self, id: &TransactionId) -> LedgerResult<()> {
        let original = self
            .store
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;

        let key: SeriesKey = (original.security_id.clone(), original.account_id.clone());
        let lock = self.series_lock(&key);
        let _guard = lock.lock().await;

        let snapshot = self.store.snapshot().await?;

        // Removing a row can free a previously-denied sell (if this was
        // its repurchase) or change a sell's own outcome (if this was
        // the sell itself), so the whole affected-window resolution
        // runs here too, not just a plain same-series replay.
        let result: LedgerResult<()> = async {
            self.store.delete_transaction(id).await?;
            self.resolve_affected_series(&original.security_id, &original.account_id, original.trade_date)
                .await
        }
        .await;

        if let Err(e) = result {
            self.store.restore(snapshot).await?;
            return Err(e);
        }
        Ok(())
    }

    /// spec §4.4 `replay`: re-derives the suffix of a series from
    /// `from_date` inclusive, maintaining chain continuity (I1).
    pub async fn replay(&self, security_id: &SecurityId, account_id: &AccountId, from_date: Date) -> LedgerResult<()> {
        let key: SeriesKey = (security_id.clone(), account_id.clone());
        let lock = self.series_lock(&key);
        let _guard = lock.lock().await;
        let registered = self
            .store
            .get_account(account_id)
            .await?
            .map(|a| a.is_registered())
            .unwrap_or(false);
        self.replay_locked(security_id, account_id, from_date, registered).await
    }

    async fn replay_locked(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        from_date: Date,
        registered: bool,
    ) -> LedgerResult<()> {
        let mut state = self.state_before(security_id, account_id, from_date, registered).await?;

        let all_series = self
            .store
            .find_series(security_id, account_id, SeriesOrder::DateAscCreatedAtAsc)
            .await?;
        let suffix: Vec<Transaction> = all_series
            .into_iter()
            .filter(|t| t.trade_date >= from_date)
            .collect();

        // Index of each row's position in this pass, so a sell partway
        // through the suffix knows whether a repurchase it's about to
        // deny has already been written this pass (adjust the store
        // directly) or is still ahead of it (stash the adjustment and
        // let the repurchase's own turn below pick it up — otherwise
        // that turn's `algebra::apply` recompute would clobber it).
        let suffix_positions: HashMap<TransactionId, usize> =
            suffix.iter().enumerate().map(|(i, t)| (t.id.clone(), i)).collect();
        let mut pending_adjustments: HashMap<TransactionId, Decimal> = HashMap::new();

        for (i, mut tx) in suffix.into_iter().enumerate() {
            let event = AlgebraEvent {
                tx_type: tx.tx_type,
                quantity: *tx.quantity,
                price_per_share: tx.price_per_share,
                fee_cad: tx.fee_cad,
                fx_rate: tx.fx_rate,
                ratio: tx.params.ratio,
                roc_per_share: tx.params.roc_per_share,
                cash_per_share: tx.params.cash_per_share,
                new_security_acb_percent: tx.params.new_security_acb_percent,
            };

            if tx.tx_type.is_disposing() && *state.shares < *tx.quantity {
                return Err(LedgerError::InsufficientShares(format!(
                    "replay: {} of {} on {} exceeds available shares {}",
                    tx.tx_type, tx.quantity, tx.trade_date, state.shares
                )));
            }

            let outcome = algebra::apply(state, &event)?;

            tx.shares_before = state.shares;
            tx.acb_before = state.total_acb.unwrap_or_else(GreaterEqualZeroDecimal::zero);
            tx.shares_after = outcome.shares_after;
            tx.acb_after = outcome.acb_after.unwrap_or_else(GreaterEqualZeroDecimal::zero);
            tx.capital_gain = outcome.capital_gain;
            tx.audit = Some(outcome.audit);
            tx.flags = TxFlags::default();

            if let Some(adjustment) = pending_adjustments.remove(&tx.id) {
                let adjusted = round_money(*tx.acb_after + adjustment);
                tx.acb_after = GreaterEqualZeroDecimal::try_from(adjusted).map_err(|e| {
                    LedgerError::InvariantViolation(format!("sfl adjustment produced negative ACB: {}", e))
                })?;
            }

            state = AlgebraState {
                shares: outcome.shares_after,
                total_acb: if registered { None } else { Some(tx.acb_after) },
            };

            if tx.tx_type == TxType::Sell {
                self.apply_superficial_loss(&mut tx, &suffix_positions, i, &mut pending_adjustments)
                    .await?;
            }

            self.store.upsert_transaction(tx).await?;
        }

        self.write_position(security_id, account_id, state).await
    }
}

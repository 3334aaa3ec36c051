//! `InMemoryLedgerStore`: a `BTreeMap`-backed reference implementation of
//! [`LedgerStore`]. `BTreeMap` (rather than `HashMap`) is used for the
//! transaction table because range/secondary queries (`find_in_window`,
//! ordered series iteration) fall out of ordered iteration for free, the
//! way the teacher's `fx::io::RateLoader::year_rates` keys an ordered map
//! by year to get cheap range behaviour.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::Date;

use crate::error::{LedgerError, LedgerResult};
use crate::model::account::{Account, AccountId};
use crate::model::position::Position;
use crate::model::security::{Security, SecurityId};
use crate::model::transaction::{Transaction, TransactionId, TxType};

use super::{LedgerStore, SeriesOrder, StoreSnapshot};

#[derive(Clone, Default)]
struct StoreData {
    transactions: BTreeMap<TransactionId, Transaction>,
    positions: BTreeMap<(SecurityId, AccountId), Position>,
    securities: BTreeMap<SecurityId, Security>,
    accounts: BTreeMap<AccountId, Account>,
}

pub struct InMemoryLedgerStore {
    data: RwLock<StoreData>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
        }
    }

    fn sort_key(tx: &Transaction) -> (Date, i64) {
        (tx.trade_date, tx.created_at)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_series(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        order: SeriesOrder,
    ) -> LedgerResult<Vec<Transaction>> {
        let data = self.data.read().unwrap();
        let mut txs: Vec<Transaction> = data
            .transactions
            .values()
            .filter(|t| &t.security_id == security_id && &t.account_id == account_id)
            .cloned()
            .collect();
        match order {
            SeriesOrder::DateAscCreatedAtAsc => txs.sort_by_key(Self::sort_key),
            SeriesOrder::DateDesc => {
                txs.sort_by_key(Self::sort_key);
                txs.reverse();
            }
        }
        Ok(txs)
    }

    async fn find_prev_before(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        date: Date,
    ) -> LedgerResult<Option<Transaction>> {
        let data = self.data.read().unwrap();
        let mut candidates: Vec<&Transaction> = data
            .transactions
            .values()
            .filter(|t| {
                &t.security_id == security_id
                    && &t.account_id == account_id
                    && t.trade_date < date
            })
            .collect();
        candidates.sort_by_key(|t| Self::sort_key(t));
        Ok(candidates.last().map(|t| (*t).clone()))
    }

    async fn find_in_window(
        &self,
        security_id: &SecurityId,
        date_start: Date,
        date_end: Date,
        type_set: &[TxType],
    ) -> LedgerResult<Vec<Transaction>> {
        let data = self.data.read().unwrap();
        let mut txs: Vec<Transaction> = data
            .transactions
            .values()
            .filter(|t| {
                &t.security_id == security_id
                    && t.trade_date >= date_start
                    && t.trade_date <= date_end
                    && (type_set.is_empty() || type_set.contains(&t.tx_type))
            })
            .cloned()
            .collect();
        txs.sort_by_key(|t| Self::sort_key(t));
        Ok(txs)
    }

    async fn find_all_for_security(&self, security_id: &SecurityId) -> LedgerResult<Vec<Transaction>> {
        let data = self.data.read().unwrap();
        let mut txs: Vec<Transaction> = data
            .transactions
            .values()
            .filter(|t| &t.security_id == security_id)
            .cloned()
            .collect();
        txs.sort_by_key(|t| Self::sort_key(t));
        Ok(txs)
    }

    async fn upsert_transaction(&self, tx: Transaction) -> LedgerResult<()> {
        let mut data = self.data.write().unwrap();
        data.transactions.insert(tx.id.clone(), tx);
        Ok(())
    }

    async fn delete_transaction(&self, id: &TransactionId) -> LedgerResult<Option<Transaction>> {
        let mut data = self.data.write().unwrap();
        Ok(data.transactions.remove(id))
    }

    async fn get_transaction(&self, id: &TransactionId) -> LedgerResult<Option<Transaction>> {
        let data = self.data.read().unwrap();
        Ok(data.transactions.get(id).cloned())
    }

    async fn all_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let data = self.data.read().unwrap();
        let mut txs: Vec<Transaction> = data.transactions.values().cloned().collect();
        txs.sort_by_key(|t| Self::sort_key(t));
        Ok(txs)
    }

    async fn upsert_position(&self, position: Position) -> LedgerResult<()> {
        let mut data = self.data.write().unwrap();
        data.positions
            .insert((position.security_id.clone(), position.account_id.clone()), position);
        Ok(())
    }

    async fn get_position(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
    ) -> LedgerResult<Option<Position>> {
        let data = self.data.read().unwrap();
        Ok(data
            .positions
            .get(&(security_id.clone(), account_id.clone()))
            .cloned())
    }

    async fn all_positions(&self) -> LedgerResult<Vec<Position>> {
        let data = self.data.read().unwrap();
        Ok(data.positions.values().cloned().collect())
    }

    async fn get_security(&self, id: &SecurityId) -> LedgerResult<Option<Security>> {
        let data = self.data.read().unwrap();
        Ok(data.securities.get(id).cloned())
    }

    async fn get_account(&self, id: &AccountId) -> LedgerResult<Option<Account>> {
        let data = self.data.read().unwrap();
        Ok(data.accounts.get(id).cloned())
    }

    async fn put_security(&self, security: Security) -> LedgerResult<()> {
        let mut data = self.data.write().unwrap();
        data.securities.insert(security.id.clone(), security);
        Ok(())
    }

    async fn put_account(&self, account: Account) -> LedgerResult<()> {
        let mut data = self.data.write().unwrap();
        data.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn snapshot(&self) -> LedgerResult<StoreSnapshot> {
        let data = self.data.read().unwrap();
        Ok(StoreSnapshot(Box::new(data.clone())))
    }

    async fn restore(&self, snapshot: StoreSnapshot) -> LedgerResult<()> {
        let restored = snapshot
            .0
            .downcast::<StoreData>()
            .map_err(|_| LedgerError::PersistenceFailure("snapshot type mismatch".to_string()))?;
        let mut data = self.data.write().unwrap();
        *data = *restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::{Date, Month};

    use super::*;
    use crate::model::transaction::{TxFlags, TxParams};
    use crate::util::decimal::GreaterEqualZeroDecimal;

    fn gez(v: rust_decimal::Decimal) -> GreaterEqualZeroDecimal {
        GreaterEqualZeroDecimal::try_from(v).unwrap()
    }

    fn sample_tx(id: &str, date: Date, created_at: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            trade_date: date,
            settlement_date: date,
            created_at,
            tx_type: TxType::Buy,
            security_id: "XYZ".to_string(),
            account_id: "acc1".to_string(),
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

    #[async_std::test]
    async fn test_upsert_and_find_series_ordering() {
        let store = InMemoryLedgerStore::new();
        let d1 = Date::from_calendar_date(2024, Month::January, 10).unwrap();
        let d2 = Date::from_calendar_date(2024, Month::January, 15).unwrap();
        store.upsert_transaction(sample_tx("t2", d2, 2)).await.unwrap();
        store.upsert_transaction(sample_tx("t1", d1, 1)).await.unwrap();

        let series = store
            .find_series(
                &"XYZ".to_string(),
                &"acc1".to_string(),
                SeriesOrder::DateAscCreatedAtAsc,
            )
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].id, "t1");
        assert_eq!(series[1].id, "t2");
    }

    #[async_std::test]
    async fn test_all_transactions_spans_every_series() {
        let store = InMemoryLedgerStore::new();
        let d1 = Date::from_calendar_date(2024, Month::January, 10).unwrap();
        let mut other = sample_tx("t2", d1, 2);
        other.security_id = "ABC".to_string();
        store.upsert_transaction(sample_tx("t1", d1, 1)).await.unwrap();
        store.upsert_transaction(other).await.unwrap();

        let all = store.all_transactions().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[async_std::test]
    async fn test_snapshot_restore_roundtrip() {
        let store = InMemoryLedgerStore::new();
        let d1 = Date::from_calendar_date(2024, Month::January, 10).unwrap();
        store.upsert_transaction(sample_tx("t1", d1, 1)).await.unwrap();

        let snap = store.snapshot().await.unwrap();
        store.delete_transaction(&"t1".to_string()).await.unwrap();
        assert!(store.get_transaction(&"t1".to_string()).await.unwrap().is_none());

        store.restore(snap).await.unwrap();
        assert!(store.get_transaction(&"t1".to_string()).await.unwrap().is_some());
    }
}

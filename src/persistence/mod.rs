pub mod memory;

use async_trait::async_trait;

use crate::error::LedgerResult;
use crate::model::account::AccountId;
use crate::model::position::Position;
use crate::model::security::SecurityId;
use crate::model::transaction::{Transaction, TransactionId, TxType};
use time::Date;

pub use memory::InMemoryLedgerStore;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SeriesOrder {
    DateAscCreatedAtAsc,
    DateDesc,
}

/// §6 persistence contract. The core never depends on any query
/// vocabulary beyond this trait (spec §9's "decorator-based ORM entities
/// map to plain record types plus a thin store adapter" note).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_series(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        order: SeriesOrder,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Latest transaction of the series strictly before `date`.
    async fn find_prev_before(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
        date: Date,
    ) -> LedgerResult<Option<Transaction>>;

    /// Transactions of `security_id`, across every account, with trade
    /// date in `[date_start, date_end]` and a type in `type_set` (an
    /// empty set means "any type"). Used by the superficial-loss
    /// detector's "any account" search.
    async fn find_in_window(
        &self,
        security_id: &SecurityId,
        date_start: Date,
        date_end: Date,
        type_set: &[TxType],
    ) -> LedgerResult<Vec<Transaction>>;

    /// Every transaction of `security_id`, across every account. Backs
    /// the superficial-loss detector's "shares of `Sec` still held 30
    /// days after `D`, in any account" query (spec §4.3 rule 3).
    async fn find_all_for_security(&self, security_id: &SecurityId) -> LedgerResult<Vec<Transaction>>;

    async fn upsert_transaction(&self, tx: Transaction) -> LedgerResult<()>;

    async fn delete_transaction(&self, id: &TransactionId) -> LedgerResult<Option<Transaction>>;

    async fn get_transaction(&self, id: &TransactionId) -> LedgerResult<Option<Transaction>>;

    /// Every transaction in the store, across every series. Backs
    /// reporting surfaces (the CLI table, `export/csv`, `export/json`)
    /// that need the whole ledger rather than one series at a time.
    async fn all_transactions(&self) -> LedgerResult<Vec<Transaction>>;

    async fn upsert_position(&self, position: Position) -> LedgerResult<()>;

    async fn get_position(
        &self,
        security_id: &SecurityId,
        account_id: &AccountId,
    ) -> LedgerResult<Option<Position>>;

    async fn all_positions(&self) -> LedgerResult<Vec<Position>>;

    async fn get_security(
        &self,
        id: &SecurityId,
    ) -> LedgerResult<Option<crate::model::security::Security>>;

    async fn get_account(&self, id: &AccountId) -> LedgerResult<Option<crate::model::account::Account>>;

    async fn put_security(&self, security: crate::model::security::Security) -> LedgerResult<()>;

    async fn put_account(&self, account: crate::model::account::Account) -> LedgerResult<()>;

    /// Captures the full store state so a failed multi-step mutation
    /// (delete-then-create, a replay) can be rolled back, giving the
    /// orchestrator the atomic `run(f)` semantics of §5/§6 without this
    /// trait needing a generic (non-object-safe) transaction closure.
    async fn snapshot(&self) -> LedgerResult<StoreSnapshot>;

    async fn restore(&self, snapshot: StoreSnapshot) -> LedgerResult<()>;
}

/// Opaque handle returned by [`LedgerStore::snapshot`]. Only the store
/// implementation that produced it knows how to interpret it; passing a
/// snapshot from a different store implementation to `restore` is a
/// caller bug, not something this trait tries to prevent structurally.
pub struct StoreSnapshot(pub Box<dyn std::any::Any + Send + Sync>);

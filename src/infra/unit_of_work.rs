//! Unit of work: one scope of tracked changes over one connection.
//!
//! Hands out cached repositories per entity type, flushes staged mutations
//! atomically, owns the ambient transaction, and exposes the bulk entry
//! points. A unit of work is a short-lived, single-owner object; create one
//! per logical operation and drop it when done.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sea_orm::{DatabaseConnection, TransactionTrait};

use crate::config::DEFAULT_BULK_TIMEOUT_SECS;
use crate::errors::{AccessError, AccessResult};
use crate::infra::bulk::builder;
use crate::infra::bulk::executor;
use crate::infra::bulk::{
    BulkDeleteByCompositeKey, BulkDeleteByIdentityKey, BulkInsert, BulkInsertOnConflict,
    BulkUpdateByCompositeKey, BulkUpdateByIdentityKey,
};
use crate::infra::context::PersistenceContext;
use crate::infra::repositories::{EntityRepository, Repository, TrackedEntity};

/// Coordinates repositories, the change tracker and bulk execution over one
/// database connection.
pub struct UnitOfWork {
    ctx: Arc<PersistenceContext>,
    repositories: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    bulk_timeout: Duration,
}

impl UnitOfWork {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            ctx: Arc::new(PersistenceContext::new(db)),
            repositories: Mutex::new(HashMap::new()),
            bulk_timeout: Duration::from_secs(DEFAULT_BULK_TIMEOUT_SECS),
        }
    }

    /// Cap each bulk statement's execution time.
    pub fn with_bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    /// The repository for `E`. One instance per entity type per unit of work;
    /// repeated calls hand back the same instance. When `has_custom` is set
    /// and a custom repository was registered for `E`, it supersedes the
    /// generic one.
    pub fn repository<E: TrackedEntity>(&self, has_custom: bool) -> Arc<dyn EntityRepository<E>> {
        if has_custom {
            if let Some(custom) = self.ctx.custom_repository::<E>() {
                return custom;
            }
        }
        let mut cache = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache
            .get(&TypeId::of::<E>())
            .and_then(|repo| repo.downcast_ref::<Arc<dyn EntityRepository<E>>>())
        {
            return Arc::clone(cached);
        }
        let repository: Arc<dyn EntityRepository<E>> =
            Arc::new(Repository::<E>::new(Arc::clone(&self.ctx)));
        cache.insert(TypeId::of::<E>(), Box::new(Arc::clone(&repository)));
        repository
    }

    /// Register a custom repository for `E`, superseding the generic one for
    /// callers that ask for it.
    pub fn register_custom_repository<E: TrackedEntity>(
        &self,
        repository: Arc<dyn EntityRepository<E>>,
    ) {
        self.ctx.register_custom_repository(repository);
    }

    /// Number of staged mutations awaiting the next flush.
    pub fn pending_changes(&self) -> usize {
        self.ctx.pending_changes()
    }

    pub fn auto_detect_changes(&self) -> bool {
        self.ctx.auto_detect_changes()
    }

    pub fn set_auto_detect_changes(&self, enabled: bool) {
        self.ctx.set_auto_detect_changes(enabled);
    }

    /// Flush every staged mutation, in staging order, and return the summed
    /// affected row count. With an ambient transaction open the mutations
    /// apply inside it and its fate stays with the caller; otherwise a
    /// flush-scoped transaction wraps them, committed on success and rolled
    /// back on the first failure. Staged mutations are consumed either way.
    pub async fn save_changes(&self) -> AccessResult<u64> {
        self.ctx.ensure_live()?;
        let mut ops = self.ctx.take_ops()?;
        if ops.is_empty() {
            return Ok(0);
        }
        tracing::debug!(pending = ops.len(), "flushing tracked changes");

        let slot = self.ctx.txn_slot().lock().await;
        match slot.as_ref() {
            Some(txn) => {
                let mut total = 0u64;
                for op in ops.iter_mut() {
                    total += op.apply(txn).await?;
                }
                Ok(total)
            }
            None => {
                let txn = self.ctx.connection().begin().await?;
                let mut total = 0u64;
                for op in ops.iter_mut() {
                    match op.apply(&txn).await {
                        Ok(affected) => total += affected,
                        Err(err) => {
                            tracing::error!(kind = op.kind(), error = %err, "flush failed, rolling back");
                            if let Err(rollback_err) = txn.rollback().await {
                                tracing::error!(error = %rollback_err, "rollback failed");
                            }
                            return Err(err);
                        }
                    }
                }
                txn.commit().await?;
                Ok(total)
            }
        }
    }

    /// Open the ambient transaction. Until the returned handle commits or
    /// rolls back, every lookup, flush and bulk statement on this unit of
    /// work runs inside it. Only one can be open at a time.
    pub async fn begin_transaction(&self) -> AccessResult<Transaction> {
        self.ctx.ensure_live()?;
        let mut slot = self.ctx.txn_slot().lock().await;
        if slot.is_some() {
            return Err(AccessError::TransactionInProgress);
        }
        *slot = Some(self.ctx.connection().begin().await?);
        Ok(Transaction {
            ctx: Arc::clone(&self.ctx),
            state: TxState::Open,
        })
    }

    /// Insert many rows in one statement; returns the affected row count.
    pub async fn bulk_insert(
        &self,
        request: &BulkInsert,
        timeout: Option<Duration>,
    ) -> AccessResult<u64> {
        self.ctx.ensure_live()?;
        let generated = builder::bulk_insert(request, false)?;
        executor::execute(&self.ctx, &generated, Some(timeout.unwrap_or(self.bulk_timeout)))
            .await
            .map_err(AccessError::BulkInsertFailed)
    }

    /// Insert many rows in one statement and return the generated ids, in
    /// insertion order.
    pub async fn bulk_insert_returning_ids(
        &self,
        request: &BulkInsert,
        timeout: Option<Duration>,
    ) -> AccessResult<Vec<i64>> {
        self.ctx.ensure_live()?;
        let generated = builder::bulk_insert(request, true)?;
        executor::query_generated_ids(
            &self.ctx,
            &generated,
            request.rows.len(),
            Some(timeout.unwrap_or(self.bulk_timeout)),
        )
        .await
        .map_err(AccessError::BulkInsertFailed)
    }

    /// Insert many rows, resolving key collisions per the request's conflict
    /// arm instead of failing.
    pub async fn bulk_insert_on_conflict(
        &self,
        request: &BulkInsertOnConflict,
        timeout: Option<Duration>,
    ) -> AccessResult<u64> {
        self.ctx.ensure_live()?;
        let generated = builder::bulk_insert_on_conflict(request)?;
        executor::execute(&self.ctx, &generated, Some(timeout.unwrap_or(self.bulk_timeout)))
            .await
            .map_err(AccessError::BulkInsertFailed)
    }

    /// Update many rows in one statement, keyed by a single column.
    pub async fn bulk_update_by_identity_key(
        &self,
        request: &BulkUpdateByIdentityKey,
        timeout: Option<Duration>,
    ) -> AccessResult<u64> {
        self.ctx.ensure_live()?;
        let generated = builder::bulk_update_by_identity_key(request)?;
        executor::execute(&self.ctx, &generated, Some(timeout.unwrap_or(self.bulk_timeout)))
            .await
            .map_err(AccessError::BulkUpdateFailed)
    }

    /// Update many rows in one statement, keyed by multiple columns.
    pub async fn bulk_update_by_composite_key(
        &self,
        request: &BulkUpdateByCompositeKey,
        timeout: Option<Duration>,
    ) -> AccessResult<u64> {
        self.ctx.ensure_live()?;
        let generated = builder::bulk_update_by_composite_key(request)?;
        executor::execute(&self.ctx, &generated, Some(timeout.unwrap_or(self.bulk_timeout)))
            .await
            .map_err(AccessError::BulkUpdateFailed)
    }

    /// Delete many rows in one statement by a single key column.
    pub async fn bulk_delete_by_identity_key(
        &self,
        request: &BulkDeleteByIdentityKey,
        timeout: Option<Duration>,
    ) -> AccessResult<u64> {
        self.ctx.ensure_live()?;
        let generated = builder::bulk_delete_by_identity_key(request)?;
        executor::execute(&self.ctx, &generated, Some(timeout.unwrap_or(self.bulk_timeout)))
            .await
            .map_err(AccessError::BulkDeleteFailed)
    }

    /// Delete many rows in one statement by composite key.
    pub async fn bulk_delete_by_composite_key(
        &self,
        request: &BulkDeleteByCompositeKey,
        timeout: Option<Duration>,
    ) -> AccessResult<u64> {
        self.ctx.ensure_live()?;
        let generated = builder::bulk_delete_by_composite_key(request)?;
        executor::execute(&self.ctx, &generated, Some(timeout.unwrap_or(self.bulk_timeout)))
            .await
            .map_err(AccessError::BulkDeleteFailed)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.ctx.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// Handle over the ambient transaction. Exactly one commit or rollback is
/// allowed; a handle dropped while open rolls the transaction back.
pub struct Transaction {
    ctx: Arc<PersistenceContext>,
    state: TxState,
}

impl Transaction {
    pub async fn commit(&mut self) -> AccessResult<()> {
        if self.state != TxState::Open {
            return Err(AccessError::TransactionClosed);
        }
        let txn = {
            let mut slot = self.ctx.txn_slot().lock().await;
            slot.take().ok_or(AccessError::TransactionClosed)?
        };
        txn.commit().await?;
        self.state = TxState::Committed;
        Ok(())
    }

    pub async fn rollback(&mut self) -> AccessResult<()> {
        if self.state != TxState::Open {
            return Err(AccessError::TransactionClosed);
        }
        let txn = {
            let mut slot = self.ctx.txn_slot().lock().await;
            slot.take().ok_or(AccessError::TransactionClosed)?
        };
        txn.rollback().await?;
        self.state = TxState::RolledBack;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TxState::Open {
            return;
        }
        // Dropping the inner transaction rolls it back.
        if let Ok(mut slot) = self.ctx.txn_slot().try_lock() {
            if slot.take().is_some() {
                tracing::warn!("transaction handle dropped while open, rolling back");
            }
        }
    }
}

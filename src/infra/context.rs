//! Persistence context: the shared state one unit of work owns.
//!
//! Holds the connection, the ambient transaction slot, the change tracker of
//! staged entity mutations, and the registry of custom repositories. A context
//! belongs to exactly one unit of work and is not meant for concurrent use
//! from multiple tasks; interior locks only sequence interleaved borrows
//! within that single owner.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DatabaseTransaction, DbErr,
};
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::{AccessError, AccessResult};
use crate::infra::repositories::{EntityRepository, PrimaryKeyOf, TrackedEntity};

/// One staged entity mutation, applied during a flush.
///
/// Object-safe so heterogeneous entity types can share one tracker. Apply
/// always runs inside a transaction: either the ambient one or a flush-scoped
/// one the unit of work opens itself.
#[async_trait]
pub(crate) trait PendingOp: Send {
    async fn apply(&mut self, txn: &DatabaseTransaction) -> AccessResult<u64>;

    fn kind(&self) -> &'static str;
}

pub(crate) struct InsertOp<E: TrackedEntity> {
    model: Option<E::Active>,
}

impl<E: TrackedEntity> InsertOp<E> {
    pub(crate) fn new(model: E::Active) -> Self {
        Self { model: Some(model) }
    }
}

#[async_trait]
impl<E: TrackedEntity> PendingOp for InsertOp<E> {
    async fn apply(&mut self, txn: &DatabaseTransaction) -> AccessResult<u64> {
        let model = self
            .model
            .take()
            .ok_or_else(|| AccessError::internal("insert op applied twice"))?;
        model.insert(txn).await?;
        Ok(1)
    }

    fn kind(&self) -> &'static str {
        "insert"
    }
}

pub(crate) struct UpdateOp<E: TrackedEntity> {
    model: Option<E::Active>,
}

impl<E: TrackedEntity> UpdateOp<E> {
    pub(crate) fn new(model: E::Active) -> Self {
        Self { model: Some(model) }
    }
}

#[async_trait]
impl<E: TrackedEntity> PendingOp for UpdateOp<E> {
    async fn apply(&mut self, txn: &DatabaseTransaction) -> AccessResult<u64> {
        let model = self
            .model
            .take()
            .ok_or_else(|| AccessError::internal("update op applied twice"))?;
        match model.update(txn).await {
            Ok(_) => Ok(1),
            // The row vanished between staging and flush.
            Err(DbErr::RecordNotUpdated) => Err(AccessError::Concurrency {
                expected: 1,
                affected: 0,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn kind(&self) -> &'static str {
        "update"
    }
}

pub(crate) struct DeleteOp<E: TrackedEntity> {
    model: Option<E::Active>,
}

impl<E: TrackedEntity> DeleteOp<E> {
    pub(crate) fn new(model: E::Active) -> Self {
        Self { model: Some(model) }
    }
}

#[async_trait]
impl<E: TrackedEntity> PendingOp for DeleteOp<E> {
    async fn apply(&mut self, txn: &DatabaseTransaction) -> AccessResult<u64> {
        let model = self
            .model
            .take()
            .ok_or_else(|| AccessError::internal("delete op applied twice"))?;
        let res = model.delete(txn).await?;
        if res.rows_affected == 0 {
            return Err(AccessError::Concurrency {
                expected: 1,
                affected: 0,
            });
        }
        Ok(res.rows_affected)
    }

    fn kind(&self) -> &'static str {
        "delete"
    }
}

pub(crate) struct DeleteByKeyOp<E: TrackedEntity> {
    key: PrimaryKeyOf<E>,
}

impl<E: TrackedEntity> DeleteByKeyOp<E> {
    pub(crate) fn new(key: PrimaryKeyOf<E>) -> Self {
        Self { key }
    }
}

#[async_trait]
impl<E: TrackedEntity> PendingOp for DeleteByKeyOp<E> {
    async fn apply(&mut self, txn: &DatabaseTransaction) -> AccessResult<u64> {
        let res = E::delete_by_id(self.key.clone()).exec(txn).await?;
        if res.rows_affected == 0 {
            return Err(AccessError::Concurrency {
                expected: 1,
                affected: 0,
            });
        }
        Ok(res.rows_affected)
    }

    fn kind(&self) -> &'static str {
        "delete"
    }
}

#[derive(Default)]
struct ChangeTracker {
    ops: Vec<Box<dyn PendingOp>>,
}

/// Shared persistence state of one unit of work.
pub struct PersistenceContext {
    db: DatabaseConnection,
    /// Ambient transaction. While occupied, every store-facing operation on
    /// this context joins it. The async mutex also sequences statements on
    /// the shared connection.
    txn: AsyncMutex<Option<DatabaseTransaction>>,
    tracker: Mutex<ChangeTracker>,
    custom_repositories: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    auto_detect_changes: AtomicBool,
    disposed: AtomicBool,
}

impl PersistenceContext {
    pub(crate) fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            txn: AsyncMutex::new(None),
            tracker: Mutex::new(ChangeTracker::default()),
            custom_repositories: Mutex::new(HashMap::new()),
            auto_detect_changes: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub(crate) fn txn_slot(&self) -> &AsyncMutex<Option<DatabaseTransaction>> {
        &self.txn
    }

    pub(crate) fn ensure_live(&self) -> AccessResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(AccessError::Disposed);
        }
        Ok(())
    }

    /// Stage one mutation for the next flush.
    pub(crate) fn stage(&self, op: Box<dyn PendingOp>) -> AccessResult<()> {
        self.ensure_live()?;
        let mut tracker = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.auto_detect_changes() {
            tracing::trace!(
                kind = op.kind(),
                pending = tracker.ops.len(),
                "change detection scan"
            );
        }
        tracker.ops.push(op);
        Ok(())
    }

    /// Drain every staged mutation, in staging order.
    pub(crate) fn take_ops(&self) -> AccessResult<Vec<Box<dyn PendingOp>>> {
        self.ensure_live()?;
        let mut tracker = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(std::mem::take(&mut tracker.ops))
    }

    pub(crate) fn pending_changes(&self) -> usize {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ops
            .len()
    }

    pub(crate) fn auto_detect_changes(&self) -> bool {
        self.auto_detect_changes.load(Ordering::Acquire)
    }

    pub(crate) fn set_auto_detect_changes(&self, enabled: bool) {
        self.auto_detect_changes.store(enabled, Ordering::Release);
    }

    /// Register a custom repository that supersedes the generic one for `E`.
    pub(crate) fn register_custom_repository<E: TrackedEntity>(
        &self,
        repository: Arc<dyn EntityRepository<E>>,
    ) {
        self.custom_repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<E>(), Box::new(repository));
    }

    pub(crate) fn custom_repository<E: TrackedEntity>(
        &self,
    ) -> Option<Arc<dyn EntityRepository<E>>> {
        self.custom_repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .and_then(|repo| repo.downcast_ref::<Arc<dyn EntityRepository<E>>>())
            .cloned()
    }

    /// Mark the context released and abandon ambient state. Dropping an
    /// uncommitted transaction rolls it back.
    pub(crate) fn release(&self) {
        self.disposed.store(true, Ordering::Release);
        if let Ok(mut slot) = self.txn.try_lock() {
            if slot.take().is_some() {
                tracing::warn!("unit of work disposed with an open transaction; rolling back");
            }
        }
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ops
            .clear();
    }
}

/// Temporarily disables change detection, restoring the prior state on drop.
/// Drop-based so the restore survives early returns and panics.
pub(crate) struct DetectChangesGuard<'a> {
    ctx: &'a PersistenceContext,
    prior: bool,
}

impl<'a> DetectChangesGuard<'a> {
    pub(crate) fn disable(ctx: &'a PersistenceContext) -> Self {
        let prior = ctx.auto_detect_changes();
        ctx.set_auto_detect_changes(false);
        Self { ctx, prior }
    }
}

impl Drop for DetectChangesGuard<'_> {
    fn drop(&mut self) {
        self.ctx.set_auto_detect_changes(self.prior);
    }
}

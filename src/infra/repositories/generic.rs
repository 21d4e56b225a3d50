//! Generic repository over a single entity type.
//!
//! Backed by the owning unit of work's change tracker: staging operations
//! never touch the store, lookups run against the shared connection (or the
//! ambient transaction while one is open).

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Iterable, PaginatorTrait, Select};

use crate::errors::{AccessError, AccessResult};
use crate::infra::context::{
    DeleteByKeyOp, DeleteOp, DetectChangesGuard, InsertOp, PersistenceContext, UpdateOp,
};
use crate::infra::repositories::{EntityRepository, PrimaryKeyOf, TrackedEntity};
use crate::types::{Paginated, PaginationParams};

/// Generic repository, one instance per entity type per unit of work.
pub struct Repository<E: TrackedEntity> {
    ctx: Arc<PersistenceContext>,
    _entity: PhantomData<E>,
}

impl<E: TrackedEntity> Repository<E> {
    pub(crate) fn new(ctx: Arc<PersistenceContext>) -> Self {
        Self {
            ctx,
            _entity: PhantomData,
        }
    }

    /// Convert a model into an active model with every column marked dirty,
    /// so the whole row participates in the statement.
    fn dirty_all(entity: E::Model) -> E::Active {
        let mut active = entity.into_active_model();
        for col in E::Column::iter() {
            if let Some(value) = active.get(col).into_value() {
                active.set(col, value);
            }
        }
        active
    }

    fn stage_inserts(&self, entities: Vec<E::Model>) -> AccessResult<()> {
        if entities.is_empty() {
            return Err(AccessError::InvalidArgument("entities must not be empty"));
        }
        for entity in entities {
            self.ctx
                .stage(Box::new(InsertOp::<E>::new(Self::dirty_all(entity))))?;
        }
        Ok(())
    }
}

#[async_trait]
impl<E: TrackedEntity> EntityRepository<E> for Repository<E> {
    async fn find_by_id(&self, key: PrimaryKeyOf<E>) -> AccessResult<Option<E::Model>> {
        self.ctx.ensure_live()?;
        let slot = self.ctx.txn_slot().lock().await;
        let found = match slot.as_ref() {
            Some(txn) => E::find_by_id(key).one(txn).await?,
            None => E::find_by_id(key).one(self.ctx.connection()).await?,
        };
        Ok(found)
    }

    fn all(&self) -> Select<E> {
        E::find()
    }

    async fn find_page(&self, params: PaginationParams) -> AccessResult<Paginated<E::Model>> {
        self.ctx.ensure_live()?;
        let page = params.page.max(1);
        let per_page = params.limit();
        let slot = self.ctx.txn_slot().lock().await;
        let (data, total) = match slot.as_ref() {
            Some(txn) => {
                let paginator = E::find().paginate(txn, per_page);
                let total = paginator.num_items().await?;
                (paginator.fetch_page(page - 1).await?, total)
            }
            None => {
                let paginator = E::find().paginate(self.ctx.connection(), per_page);
                let total = paginator.num_items().await?;
                (paginator.fetch_page(page - 1).await?, total)
            }
        };
        Ok(Paginated::new(data, page, per_page, total))
    }

    fn add(&self, entity: E::Model) -> AccessResult<()> {
        self.ctx
            .stage(Box::new(InsertOp::<E>::new(Self::dirty_all(entity))))
    }

    fn add_range(&self, entities: Vec<E::Model>, auto_detect_changes: bool) -> AccessResult<()> {
        if auto_detect_changes {
            self.stage_inserts(entities)
        } else {
            let _guard = DetectChangesGuard::disable(&self.ctx);
            self.stage_inserts(entities)
        }
    }

    fn update(&self, entity: E::Model) -> AccessResult<()> {
        self.ctx
            .stage(Box::new(UpdateOp::<E>::new(Self::dirty_all(entity))))
    }

    fn update_range(&self, entities: Vec<E::Model>) -> AccessResult<()> {
        if entities.is_empty() {
            return Err(AccessError::InvalidArgument("entities must not be empty"));
        }
        for entity in entities {
            self.update(entity)?;
        }
        Ok(())
    }

    async fn delete_by_id(&self, key: PrimaryKeyOf<E>) -> AccessResult<()> {
        self.ctx.ensure_live()?;
        let found = {
            let slot = self.ctx.txn_slot().lock().await;
            match slot.as_ref() {
                Some(txn) => E::find_by_id(key.clone()).one(txn).await?,
                None => E::find_by_id(key.clone()).one(self.ctx.connection()).await?,
            }
        };
        if found.is_none() {
            return Err(AccessError::InvalidArgument(
                "cannot delete by a key that matches no row",
            ));
        }
        self.ctx.stage(Box::new(DeleteByKeyOp::<E>::new(key)))
    }

    fn delete(&self, entity: E::Model) -> AccessResult<()> {
        // Deleting needs only the key columns; the rest ride along unchanged.
        self.ctx
            .stage(Box::new(DeleteOp::<E>::new(entity.into_active_model())))
    }

    fn delete_range(&self, entities: Vec<E::Model>) -> AccessResult<()> {
        if entities.is_empty() {
            return Err(AccessError::InvalidArgument("entities must not be empty"));
        }
        for entity in entities {
            self.delete(entity)?;
        }
        Ok(())
    }
}

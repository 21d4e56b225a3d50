//! Base repository abstractions.
//!
//! `EntityRepository` is the polymorphic CRUD surface one unit of work hands
//! out per entity type; it is object-safe so custom implementations can
//! transparently substitute for the generic one.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, IntoActiveModel, PrimaryKeyTrait, Select,
};

use crate::errors::AccessResult;
use crate::types::{Paginated, PaginationParams};

/// Primary-key value type of an entity.
pub type PrimaryKeyOf<E> = <<E as EntityTrait>::PrimaryKey as PrimaryKeyTrait>::ValueType;

/// Links an entity to its active model so a single type parameter drives
/// repository creation and caching.
pub trait TrackedEntity:
    EntityTrait<
        Model: IntoActiveModel<Self::Active> + Send + Sync,
        PrimaryKey: PrimaryKeyTrait<ValueType: Clone + Send + Sync>,
    > + Send
    + Sync
    + 'static
{
    type Active: ActiveModelTrait<Entity = Self> + ActiveModelBehavior + Send + 'static;
}

/// CRUD surface over one entity type.
///
/// Staging operations (`add`, `update`, `delete`, and the range variants) are
/// synchronous: they only record the mutation on the change tracker. Store
/// I/O happens in the async lookups and in the unit of work's
/// `save_changes`.
#[async_trait]
pub trait EntityRepository<E>: Send + Sync
where
    E: TrackedEntity,
{
    /// Look up one row by primary key. Joins the ambient transaction when one
    /// is open. Absent rows are `None`, not an error.
    async fn find_by_id(&self, key: PrimaryKeyOf<E>) -> AccessResult<Option<E::Model>>;

    /// Composable, unexecuted query source over all rows.
    fn all(&self) -> Select<E>;

    /// Offset/limit page plus total count.
    async fn find_page(&self, params: PaginationParams) -> AccessResult<Paginated<E::Model>>;

    /// Stage one entity for insertion.
    fn add(&self, entity: E::Model) -> AccessResult<()>;

    /// Stage many entities for insertion. When `auto_detect_changes` is
    /// false the caller asserts no other tracked mutation is pending, and
    /// change detection is suspended around the staging (restored afterwards
    /// on every path).
    fn add_range(&self, entities: Vec<E::Model>, auto_detect_changes: bool) -> AccessResult<()>;

    /// Mark an entity modified for the next flush (every column dirty).
    fn update(&self, entity: E::Model) -> AccessResult<()>;

    fn update_range(&self, entities: Vec<E::Model>) -> AccessResult<()>;

    /// Look the row up, then stage its removal. A key that matches no row is
    /// a usage error, not a silent no-op.
    async fn delete_by_id(&self, key: PrimaryKeyOf<E>) -> AccessResult<()>;

    /// Stage removal by value; detached instances are adopted as-is.
    fn delete(&self, entity: E::Model) -> AccessResult<()>;

    fn delete_range(&self, entities: Vec<E::Model>) -> AccessResult<()>;
}

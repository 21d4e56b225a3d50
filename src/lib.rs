//! Data-access layer built on sea-orm: a generic repository / unit-of-work
//! abstraction layered under a bulk-statement engine that synthesizes
//! parameterized SQL for multi-row insert, update and delete operations the
//! mapper cannot express in one round trip.
//!
//! # Architecture Layers
//!
//! - **config**: Settings loaded from the environment, plus constants
//! - **errors**: Centralized error handling
//! - **infra**: Persistence context, repositories, unit of work, bulk engine
//! - **types**: Shared types (pagination)
//!
//! # Usage
//!
//! ```ignore
//! let uow = UnitOfWork::new(connection);
//! let movies = uow.repository::<movie::Entity>(false);
//!
//! let mut tx = uow.begin_transaction().await?;
//! movies.add(new_movie)?;
//! uow.bulk_delete_by_identity_key(&stale_rows, None).await?;
//! uow.save_changes().await?;
//! tx.commit().await?;
//! ```

pub mod config;
pub mod errors;
pub mod infra;
pub mod types;

// Re-export commonly used types at crate root
pub use config::Config;
pub use errors::{AccessError, AccessResult, ExecCause};
pub use infra::bulk::{
    BoundParam, BulkDeleteByCompositeKey, BulkDeleteByIdentityKey, BulkInsert, BulkInsertOnConflict,
    BulkUpdateByCompositeKey, BulkUpdateByIdentityKey, ColumnMapping, GeneratedStatement,
    ParamType, RowValues,
};
pub use infra::repositories::{EntityRepository, PrimaryKeyOf, Repository, TrackedEntity};
pub use infra::{Database, Transaction, UnitOfWork};
pub use types::{Paginated, PaginationParams};

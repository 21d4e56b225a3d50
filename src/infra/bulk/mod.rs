//! Bulk mutation engine.
//!
//! Synthesizes single parameterized statements for multi-row insert, update
//! and delete operations the mapper cannot express in one round trip, and
//! executes them against the unit of work's connection, joining the ambient
//! transaction when one is open.

pub mod builder;
pub(crate) mod executor;
mod model;

pub use model::{
    BoundParam, BulkDeleteByCompositeKey, BulkDeleteByIdentityKey, BulkInsert, BulkInsertOnConflict,
    BulkUpdateByCompositeKey, BulkUpdateByIdentityKey, ColumnMapping, GeneratedStatement,
    ParamType, RowValues,
};

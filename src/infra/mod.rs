//! Infrastructure layer - persistence concerns
//!
//! - Persistence context: connection, ambient transaction, change tracker
//! - Repositories: generic CRUD over one entity type
//! - Unit of Work: repository cache, flush, transaction boundaries
//! - Bulk engine: multi-row statement synthesis and execution

pub mod bulk;
pub(crate) mod context;
mod db;
pub mod repositories;
pub mod unit_of_work;

pub use db::Database;
pub use unit_of_work::{Transaction, UnitOfWork};

//! Repository layer - Data access abstraction
//!
//! Repositories provide an abstraction over entity persistence, staging
//! mutations on the owning unit of work's change tracker.

mod base;
mod generic;

pub use base::{EntityRepository, PrimaryKeyOf, TrackedEntity};
pub use generic::Repository;

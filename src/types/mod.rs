//! Shared types used across the data-access surface.

mod pagination;

pub use pagination::{Paginated, PaginationMeta, PaginationParams};

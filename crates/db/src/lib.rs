//! Postgres storage for reviews, listings, properties and review categories.
//!
//! Callers program against the traits in [`repositories`]; [`pg::PgDatabase`] is the
//! production implementation.

pub mod errors;
pub mod models;
pub mod pg;
pub mod repositories;

pub use errors::DbError;
pub use models::*;
pub use pg::{run_migrations, PgDatabase};
pub use repositories::*;

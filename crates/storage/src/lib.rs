//! PostgreSQL persistence for the alerting engine.
//!
//! [`PgStore`] implements every repository trait from `carewatch-rules`
//! over the tables in `migrations/`.

pub mod db;
pub mod error;
mod pg;
mod rows;

pub use db::init_pg_pool;
pub use error::StorageError;
pub use pg::PgStore;

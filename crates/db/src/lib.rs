//! SQLite persistence for helplane: connection pool, embedded migrations,
//! tenant-scoped repositories, and the tenant configuration loader cache.

pub mod connection;
pub mod loader;
pub mod migrations;
pub mod repositories;

pub use connection::{begin_write, connect, connect_with_settings, DbPool};
pub use loader::{LoaderError, TenantConfigLoader};

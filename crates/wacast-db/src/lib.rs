//! WaCast Database Layer
//!
//! Database connectivity, SeaORM entity models, repositories and the
//! Postgres implementation of the core store trait.

pub mod connection;
pub mod entities;
pub mod error;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::{establish_connection, DatabaseOptions};
pub use error::{DatabaseError, Result};
pub use migration::{run_migrations, Migrator};
pub use store::PgMessageStore;

// Re-export SeaORM types boundary crates commonly need
pub use sea_orm::{Database, DatabaseConnection};

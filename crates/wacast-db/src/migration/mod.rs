//! Database migration management

pub mod m20250801_000001_create_schema;

use crate::error::{DatabaseError, Result};
use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;

/// WaCast database migrator
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250801_000001_create_schema::Migration)]
    }
}

/// Run all pending migrations
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    tracing::info!("database migrations completed");
    Ok(())
}

/// Rollback migrations
pub async fn rollback_migrations(db: &DatabaseConnection, steps: Option<u32>) -> Result<()> {
    Migrator::down(db, steps)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    tracing::info!("database migrations rolled back");
    Ok(())
}

//! Database connection management

use crate::error::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

/// Connection pool tuning; the defaults match the deployment profile
/// (bounded pool, 50 open / 20 idle).
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub sql_logging: bool,
}

impl DatabaseOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 50,
            min_connections: 20,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            sql_logging: false,
        }
    }
}

/// Establish a pooled database connection
pub async fn establish_connection(options: &DatabaseOptions) -> Result<DatabaseConnection> {
    let mut connect_options = ConnectOptions::new(&options.url);
    connect_options
        .max_connections(options.max_connections)
        .min_connections(options.min_connections)
        .connect_timeout(options.connect_timeout)
        .acquire_timeout(options.connect_timeout)
        .idle_timeout(options.idle_timeout)
        .sqlx_logging(options.sql_logging);

    tracing::info!("establishing database connection pool");

    let connection = Database::connect(connect_options).await?;

    tracing::info!("database connection pool ready");
    Ok(connection)
}

/// Verify the connection answers
pub async fn ping(connection: &DatabaseConnection) -> Result<()> {
    connection.ping().await?;
    Ok(())
}

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is missing")]
    MissingVariable(String),
    #[error("failed to parse environment variable {variable}: {message}")]
    ParseError { variable: String, message: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub app: AppSettings,
    pub campaign: CampaignConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, `host:port`
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Empty means no Redis: events stay in-process
    pub url: String,
    pub password: Option<String>,
}

impl RedisConfig {
    /// Connection URL with the password folded in when one is configured
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                match url::Url::parse(&self.url) {
                    Ok(mut parsed) => {
                        let _ = parsed.set_password(Some(password));
                        parsed.to_string()
                    }
                    Err(_) => self.url.clone(),
                }
            }
            _ => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Symmetric key for webhook verify-token ciphertext
    pub encryption_key: String,
    /// Credential signing key for the live stream
    pub jwt_secret: String,
    pub is_production: bool,
    pub is_community_edition: bool,
    pub is_frontend_separately_hosted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub messages_per_second: f64,
    pub batch_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

fn parse_env<T: std::str::FromStr>(variable: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    env::var(variable)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e: T::Err| ConfigError::ParseError {
            variable: variable.to_string(),
            message: e.to_string(),
        })
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env if present
        let _ = dotenv();

        let server = ServerConfig {
            address: env::var("APP_ADDRESS").unwrap_or_else(|_| "localhost:8000".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "50")?,
            min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "20")?,
        };

        let redis = RedisConfig {
            url: env::var("REDIS_URL").unwrap_or_default(),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
        };

        let app = AppSettings {
            encryption_key: env::var("APP_ENCRYPTION_KEY")
                .map_err(|_| ConfigError::MissingVariable("APP_ENCRYPTION_KEY".to_string()))?,
            jwt_secret: env::var("APP_JWT_SECRET")
                .map_err(|_| ConfigError::MissingVariable("APP_JWT_SECRET".to_string()))?,
            is_production: parse_env("APP_IS_PRODUCTION", "false")?,
            is_community_edition: parse_env("APP_IS_COMMUNITY_EDITION", "true")?,
            is_frontend_separately_hosted: parse_env("APP_IS_FRONTEND_SEPARATELY_HOSTED", "false")?,
        };

        let campaign = CampaignConfig {
            messages_per_second: parse_env("CAMPAIGN_MESSAGES_PER_SECOND", "10")?,
            batch_size: parse_env("CAMPAIGN_BATCH_SIZE", "100")?,
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            },
        };

        Ok(AppConfig {
            server,
            database,
            redis,
            app,
            campaign,
            logging,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database url cannot be empty".to_string(),
            ));
        }

        if self.app.encryption_key.len() < 16 {
            return Err(ConfigError::InvalidConfig(
                "encryption key must be at least 16 characters".to_string(),
            ));
        }

        if self.app.jwt_secret.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "jwt secret cannot be empty".to_string(),
            ));
        }

        if self.campaign.messages_per_second <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "campaign rate must be positive".to_string(),
            ));
        }

        if self.app.is_production && self.redis.url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "production deployments require redis".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_address(&self) -> &str {
        &self.server.address
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                address: "localhost:8000".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/wacast".to_string(),
                max_connections: 50,
                min_connections: 20,
            },
            redis: RedisConfig {
                url: String::new(),
                password: None,
            },
            app: AppSettings {
                encryption_key: "change-me-change-me".to_string(),
                jwt_secret: "change-me".to_string(),
                is_production: false,
                is_community_edition: true,
                is_frontend_separately_hosted: false,
            },
            campaign: CampaignConfig {
                messages_per_second: 10.0,
                batch_size: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

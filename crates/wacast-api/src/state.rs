use crate::config::AppConfig;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use wacast_core::crypto::EncryptionService;
use wacast_core::events::{EventBus, InMemoryEventBus, RedisEventBus};
use wacast_core::store::{BusinessAccountCache, MessageStore};
use wacast_db::{establish_connection, DatabaseOptions, PgMessageStore};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: Arc<wacast_db::DatabaseConnection>,
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Persistence seam
    pub store: Arc<dyn MessageStore>,
    /// Event bus (Redis when configured, in-process otherwise)
    pub bus: Arc<dyn EventBus>,
    /// 12h business-account resolution cache
    pub account_cache: Arc<BusinessAccountCache>,
    /// Webhook verify-token cipher
    pub encryption: EncryptionService,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

/// Identity a live-stream credential resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub active: bool,
}

/// Claims carried by a stream credential
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamClaims {
    /// User id
    pub sub: Uuid,
    /// Organization id
    pub org: Uuid,
    /// Account status at issue time
    pub status: String,
    pub exp: usize,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let mut options = DatabaseOptions::new(&config.database.url);
        options.max_connections = config.database.max_connections;
        options.min_connections = config.database.min_connections;

        let db = Arc::new(establish_connection(&options).await?);

        let store: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(db.clone()));

        let bus: Arc<dyn EventBus> = if config.redis.url.is_empty() {
            tracing::warn!("redis not configured, events stay in-process");
            Arc::new(InMemoryEventBus::new())
        } else {
            Arc::new(RedisEventBus::connect(&config.redis.connection_url()).await?)
        };

        let account_cache = Arc::new(BusinessAccountCache::new(store.clone()));
        let encryption = EncryptionService::new(&config.app.encryption_key);

        Ok(Self {
            db,
            config: Arc::new(config),
            store,
            bus,
            account_cache,
            encryption,
            startup_time: chrono::Utc::now(),
        })
    }

    /// Resolve a live-stream bearer credential to a session identity
    pub fn verify_stream_token(&self, token: &str) -> Result<StreamSession, StreamAuthError> {
        let key = DecodingKey::from_secret(self.config.app.jwt_secret.as_bytes());
        let data = decode::<StreamClaims>(token, &key, &Validation::default())
            .map_err(|_| StreamAuthError::InvalidToken)?;

        Ok(StreamSession {
            user_id: data.claims.sub,
            organization_id: data.claims.org,
            active: data.claims.status.eq_ignore_ascii_case("active"),
        })
    }

    pub fn uptime_seconds(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.startup_time)
            .num_seconds()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamAuthError {
    #[error("invalid stream credential")]
    InvalidToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn state_for_jwt(secret: &str) -> AppState {
        let mut config = AppConfig::default();
        config.app.jwt_secret = secret.to_string();

        // Only the pieces token verification touches need to be real.
        let store: Arc<dyn MessageStore> =
            Arc::new(wacast_core::store::memory::InMemoryStore::new());
        AppState {
            db: Arc::new(wacast_db::DatabaseConnection::Disconnected),
            config: Arc::new(config.clone()),
            store: store.clone(),
            bus: Arc::new(InMemoryEventBus::new()),
            account_cache: Arc::new(BusinessAccountCache::new(store)),
            encryption: EncryptionService::new(&config.app.encryption_key),
            startup_time: chrono::Utc::now(),
        }
    }

    fn token(secret: &str, status: &str, exp_offset: i64) -> String {
        let claims = StreamClaims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            status: status.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_resolves_to_an_active_session() {
        let state = state_for_jwt("secret");
        let session = state
            .verify_stream_token(&token("secret", "active", 3600))
            .unwrap();
        assert!(session.active);
    }

    #[test]
    fn inactive_user_is_flagged() {
        let state = state_for_jwt("secret");
        let session = state
            .verify_stream_token(&token("secret", "suspended", 3600))
            .unwrap();
        assert!(!session.active);
    }

    #[test]
    fn wrong_secret_or_expired_tokens_fail() {
        let state = state_for_jwt("secret");
        assert!(state
            .verify_stream_token(&token("other-secret", "active", 3600))
            .is_err());
        assert!(state
            .verify_stream_token(&token("secret", "active", -3600))
            .is_err());
    }
}

use std::str::FromStr;

use crate::error::AppError;
use crate::manager::order_manager::StatusPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub session_expiry_hours: i64,
    pub session_cleanup_interval_secs: u64,
    pub order_status_policy: StatusPolicy,
    pub ws_outbound_buffer: usize,
    pub secure_cookies: bool,
}

fn env_or<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {key}: {e}")))
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Config {
            server_host: env_or("SERVER_HOST", "127.0.0.1")?,
            server_port: env_or("SERVER_PORT", "8000")?,
            database_url: env_or("DATABASE_URL", "sqlite://service_desk.db")?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", "10")?,
            session_expiry_hours: env_or("SESSION_EXPIRY_HOURS", "24")?,
            session_cleanup_interval_secs: env_or("SESSION_CLEANUP_INTERVAL_SECS", "3600")?,
            order_status_policy: env_or("ORDER_STATUS_POLICY", "permissive")?,
            ws_outbound_buffer: env_or("WS_OUTBOUND_BUFFER", "64")?,
            secure_cookies: env_or("SECURE_COOKIES", "false")?,
        };

        if config.session_expiry_hours <= 0 {
            return Err(AppError::Config(
                "SESSION_EXPIRY_HOURS must be positive".to_string(),
            ));
        }
        if config.ws_outbound_buffer == 0 {
            return Err(AppError::Config(
                "WS_OUTBOUND_BUFFER must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_keys_fall_back_to_defaults() {
        let port: u16 = env_or("SERVICE_DESK_TEST_UNSET_PORT", "8000").unwrap();
        assert_eq!(port, 8000);
        let policy: StatusPolicy = env_or("SERVICE_DESK_TEST_UNSET_POLICY", "strict").unwrap();
        assert_eq!(policy, StatusPolicy::Strict);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        std::env::set_var("SERVICE_DESK_TEST_BAD_PORT", "eighty");
        let err = env_or::<u16>("SERVICE_DESK_TEST_BAD_PORT", "8000").unwrap_err();
        assert!(matches!(err, AppError::Config(ref msg) if msg.contains("SERVICE_DESK_TEST_BAD_PORT")));
    }

    #[test]
    fn server_address_joins_host_and_port() {
        let config = Config {
            server_host: "0.0.0.0".to_string(),
            server_port: 9000,
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            session_expiry_hours: 24,
            session_cleanup_interval_secs: 3600,
            order_status_policy: StatusPolicy::Permissive,
            ws_outbound_buffer: 64,
            secure_cookies: false,
        };
        assert_eq!(config.server_address(), "0.0.0.0:9000");
    }
}

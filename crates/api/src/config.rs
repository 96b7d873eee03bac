//! Server configuration
//!
//! Gateway credentials and price ids are read by `BillingService::from_env`.

use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// Base URL of the web app, used for checkout and portal redirects
    pub app_url: String,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_expiry_hours = match env::var("JWT_EXPIRY_HOURS") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("JWT_EXPIRY_HOURS", v))?,
            Err(_) => 24,
        };

        let run_migrations = match env::var("RUN_MIGRATIONS") {
            Ok(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue("RUN_MIGRATIONS", v))?,
            Err(_) => true,
        };

        let app_url = env::var("NEXT_PUBLIC_APP_URL")
            .or_else(|_| env::var("APP_URL"))
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_hours,
            app_url: app_url.trim_end_matches('/').to_string(),
            run_migrations,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingEnvVar(key))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

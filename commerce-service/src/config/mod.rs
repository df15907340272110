use secrecy::SecretString;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct CommerceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub jwt: JwtConfig,
    pub urls: UrlConfig,
    pub storage: StorageConfig,
    pub smtp: SmtpConfig,
    pub security: SecurityConfig,
    pub events: EventConfig,
    pub login: LoginConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub expires_in_seconds: i64,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlConfig {
    /// Origins allowed to call the store API; the first one doubles as the storefront URL.
    pub store_cors: Vec<String>,
    pub storefront_url: Option<String>,
    pub admin_backend_url: String,
    pub admin_path: String,
    pub admin_order_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub mongodb_uri: String,
    pub mongodb_database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub admin_api_key: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    pub queue_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    /// Create a customer during login when only the auth identity exists.
    pub allow_customer_backfill: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub verification_attempts: u32,
    pub verification_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

const DEFAULT_STOREFRONT_URL: &str = "https://storefront.com";
const LOCAL_BACKEND_URL: &str = "http://localhost:9000";

impl UrlConfig {
    /// Base URL of the storefront used in customer-facing links.
    pub fn storefront_url(&self) -> String {
        self.store_cors
            .iter()
            .map(|origin| origin.trim())
            .find(|origin| !origin.is_empty())
            .or_else(|| {
                self.storefront_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
            })
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_STOREFRONT_URL.to_string())
    }

    /// Prefix for links into the admin dashboard.
    pub fn admin_url(&self) -> String {
        let backend = match self.admin_backend_url.trim() {
            "" | "/" => LOCAL_BACKEND_URL,
            url => url.trim_end_matches('/'),
        };
        format!("{}{}", backend, self.admin_path)
    }
}

impl CommerceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = CommerceConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("commerce-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
            jwt: JwtConfig {
                secret: SecretString::new(get_env("JWT_SECRET", Some("supersecret"), is_prod)?),
                expires_in_seconds: parse_env("JWT_EXPIRES_IN_SECONDS", "86400", is_prod)?,
                issuer: optional_env("JWT_ISSUER"),
            },
            urls: UrlConfig {
                store_cors: get_env("STORE_CORS", Some("http://localhost:8000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                storefront_url: optional_env("STOREFRONT_URL"),
                admin_backend_url: get_env("ADMIN_BACKEND_URL", Some("/"), false)?,
                admin_path: get_env("ADMIN_PATH", Some("/app"), false)?,
                admin_order_email: optional_env("ADMIN_ORDER_EMAIL"),
            },
            storage: StorageConfig {
                backend: get_env("STORAGE_BACKEND", Some("memory"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                mongodb_uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), false)?,
                mongodb_database: get_env("MONGODB_DATABASE", Some("commerce"), false)?,
            },
            smtp: SmtpConfig {
                enabled: parse_env("SMTP_ENABLED", "false", false)?,
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), false)?,
                port: parse_env("SMTP_PORT", "587", false)?,
                user: get_env("SMTP_USER", Some(""), false)?,
                password: SecretString::new(get_env("SMTP_PASSWORD", Some(""), false)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), false)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Store"), false)?,
            },
            security: SecurityConfig {
                admin_api_key: admin_api_key(is_prod)?,
            },
            events: EventConfig {
                queue_size: parse_env("EVENT_QUEUE_SIZE", "1024", false)?,
            },
            login: LoginConfig {
                allow_customer_backfill: parse_env("ALLOW_LOGIN_CUSTOMER_BACKFILL", "true", false)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "10", false)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", false)?,
                verification_attempts: parse_env("RATE_LIMIT_VERIFICATION_ATTEMPTS", "5", false)?,
                verification_window_seconds: parse_env(
                    "RATE_LIMIT_VERIFICATION_WINDOW_SECONDS",
                    "3600",
                    false,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", false)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    false,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        use secrecy::ExposeSecret;

        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.expires_in_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_EXPIRES_IN_SECONDS must be positive"
            )));
        }

        if self.events.queue_size == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "EVENT_QUEUE_SIZE must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod {
            if self.jwt.secret.expose_secret() == "supersecret" {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be changed in production"
                )));
            }

            if self.urls.store_cors.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.storage.backend == StorageBackend::Memory {
                tracing::warn!("In-memory storage selected in production, data will not survive restarts");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// Required in prod. Dev falls back to an empty key, which the admin middleware never accepts.
fn admin_api_key(is_prod: bool) -> Result<SecretString, AppError> {
    let key = get_env("ADMIN_API_KEY", Some(""), is_prod)?;
    if key.trim().is_empty() {
        tracing::warn!("ADMIN_API_KEY not set, admin endpoints will reject every request");
    }
    Ok(SecretString::new(key))
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "mongodb" | "mongo" => Ok(StorageBackend::Mongodb),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(store_cors: &[&str], storefront_url: Option<&str>) -> UrlConfig {
        UrlConfig {
            store_cors: store_cors.iter().map(|s| s.to_string()).collect(),
            storefront_url: storefront_url.map(str::to_string),
            admin_backend_url: "/".to_string(),
            admin_path: "/app".to_string(),
            admin_order_email: None,
        }
    }

    #[test]
    fn storefront_url_prefers_first_cors_origin() {
        let config = urls(
            &["https://shop.example.com/", "https://other.example.com"],
            Some("https://ignored.example.com"),
        );
        assert_eq!(config.storefront_url(), "https://shop.example.com");
    }

    #[test]
    fn storefront_url_falls_back_to_configured_then_default() {
        assert_eq!(
            urls(&[], Some("https://store.example.com/")).storefront_url(),
            "https://store.example.com"
        );
        assert_eq!(urls(&[], None).storefront_url(), "https://storefront.com");
    }

    #[test]
    fn admin_url_uses_local_backend_for_root() {
        assert_eq!(urls(&[], None).admin_url(), "http://localhost:9000/app");

        let mut config = urls(&[], None);
        config.admin_backend_url = "https://admin.example.com/".to_string();
        assert_eq!(config.admin_url(), "https://admin.example.com/app");
    }

    #[test]
    fn admin_api_key_is_optional_in_dev_only() {
        use secrecy::ExposeSecret;

        env::remove_var("ADMIN_API_KEY");
        let key = admin_api_key(false).unwrap();
        assert_eq!(key.expose_secret(), "");

        let err = admin_api_key(true).unwrap_err();
        assert!(err.to_string().contains("ADMIN_API_KEY is required in production"));

        env::set_var("ADMIN_API_KEY", "configured-key");
        assert_eq!(admin_api_key(true).unwrap().expose_secret(), "configured-key");
        env::remove_var("ADMIN_API_KEY");
    }

    #[test]
    fn parses_storage_backend() {
        assert_eq!("MongoDB".parse::<StorageBackend>(), Ok(StorageBackend::Mongodb));
        assert!("redis".parse::<StorageBackend>().is_err());
    }
}

use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub allowed_origins: Vec<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub lockout: LockoutConfig,
    pub password: PasswordConfig,
    pub claims_cache: ClaimsCacheConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Either `secret` (HS256) or both key paths (RS256) must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub remember_me_expiry_days: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub threshold: i32,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub reset_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimsCacheConfig {
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            private_key_path: None,
            public_key_path: None,
            issuer: "identity-service".to_string(),
            access_token_expiry_minutes: 60,
            remember_me_expiry_days: 7,
            refresh_token_expiry_days: 7,
        }
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            lockout_minutes: 15,
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            reset_token_expiry_minutes: 60,
        }
    }
}

impl Default for ClaimsCacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").ok(),
                private_key_path: env::var("JWT_PRIVATE_KEY_PATH").ok(),
                public_key_path: env::var("JWT_PUBLIC_KEY_PATH").ok(),
                issuer: get_env("JWT_ISSUER", Some("identity-service"), is_prod)?,
                access_token_expiry_minutes: parse_env("ACCESS_TOKEN_EXPIRY_MINUTES", "60")?,
                remember_me_expiry_days: parse_env("REMEMBER_ME_EXPIRY_DAYS", "7")?,
                refresh_token_expiry_days: parse_env("REFRESH_TOKEN_EXPIRY_DAYS", "7")?,
            },
            lockout: LockoutConfig {
                threshold: parse_env("LOCKOUT_THRESHOLD", "5")?,
                lockout_minutes: parse_env("LOCKOUT_MINUTES", "15")?,
            },
            password: PasswordConfig {
                reset_token_expiry_minutes: parse_env("RESET_TOKEN_EXPIRY_MINUTES", "60")?,
            },
            claims_cache: ClaimsCacheConfig {
                ttl_seconds: parse_env("CLAIMS_CACHE_TTL_SECONDS", "3600")?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from: get_env("SMTP_FROM", Some("no-reply@localhost"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        let durations = [
            ("ACCESS_TOKEN_EXPIRY_MINUTES", self.jwt.access_token_expiry_minutes),
            ("REMEMBER_ME_EXPIRY_DAYS", self.jwt.remember_me_expiry_days),
            ("REFRESH_TOKEN_EXPIRY_DAYS", self.jwt.refresh_token_expiry_days),
            ("LOCKOUT_MINUTES", self.lockout.lockout_minutes),
            ("RESET_TOKEN_EXPIRY_MINUTES", self.password.reset_token_expiry_minutes),
            ("LOCKOUT_THRESHOLD", i64::from(self.lockout.threshold)),
        ];
        for (key, value) in durations {
            if value <= 0 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be positive",
                    key
                )));
            }
        }

        if self.claims_cache.ttl_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CLAIMS_CACHE_TTL_SECONDS must be positive"
            )));
        }

        let has_rsa = self.jwt.private_key_path.is_some() && self.jwt.public_key_path.is_some();
        if self.jwt.secret.is_none() && !has_rsa {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET or JWT_PRIVATE_KEY_PATH/JWT_PUBLIC_KEY_PATH must be set"
            )));
        }

        if self.environment == Environment::Prod {
            if let Some(secret) = &self.jwt.secret {
                if secret.len() < 32 {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "JWT_SECRET must be at least 32 bytes in production"
                    )));
                }
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

/// Tunables fall back to their default in every environment.
fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
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

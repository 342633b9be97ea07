//! Connection settings.
//!
//! Every value is resolved with the same precedence: a non-blank environment
//! variable wins over the `db.properties` file, which wins over the built-in
//! default. The properties file is optional.
//!
//! User and password fall back to credentials embedded in the URL before the
//! built-in defaults, so `DB_URL=mysql://app:secret@db/library` works alone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;

use crate::error::{DbError, DbResult};
use crate::pool::StatementCache;
use crate::url::DatabaseUrl;

pub const PROPERTIES_FILE: &str = "db.properties";

pub const DEFAULT_URL: &str =
    "mysql://localhost:3306/library?createDatabaseIfNotExist=true&ssl-mode=disabled&timezone=%2B00:00";
pub const DEFAULT_USER: &str = "library";
pub const DEFAULT_PASSWORD: &str = "library";
pub const DEFAULT_POOL_SIZE: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POOL_NAME: &str = "LibraryPool";

/// Environment variable naming an alternative properties file.
pub const PROPERTIES_ENV: &str = "DB_PROPERTIES";

/// (environment variable, properties key) for every setting.
const KEYS: &[(&str, &str)] = &[
    ("DB_URL", "url"),
    ("DB_USER", "user"),
    ("DB_PASSWORD", "password"),
    ("DB_POOL", "maximumPoolSize"),
    ("DB_CONNECT_TIMEOUT", "connectTimeout"),
    ("DB_POOL_NAME", "poolName"),
];

// Keys may come back lowercased from the config layer, hence the aliases.
#[derive(Deserialize)]
struct RawSettings {
    url: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(rename = "maximumPoolSize", alias = "maximumpoolsize")]
    maximum_pool_size: String,
    #[serde(rename = "connectTimeout", alias = "connecttimeout")]
    connect_timeout: String,
    #[serde(rename = "poolName", alias = "poolname")]
    pool_name: String,
}

#[derive(Clone)]
pub struct Settings {
    pub url: DatabaseUrl,
    /// Explicitly configured user; `None` defers to the URL, then the default.
    pub user: Option<String>,
    pub password: Option<String>,
    pub maximum_pool_size: u32,
    pub connect_timeout: Duration,
    pub pool_name: String,
    pub statement_cache: StatementCache,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("url", &self.url.redacted())
            .field("user", &self.effective_user())
            .field("password", &"***")
            .field("maximum_pool_size", &self.maximum_pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("pool_name", &self.pool_name)
            .field("statement_cache", &self.statement_cache)
            .finish()
    }
}

impl Settings {
    /// Load settings from the process environment and `db.properties`.
    ///
    /// A `.env` file in the working directory is loaded into the environment
    /// first. `DB_PROPERTIES` overrides the properties file location.
    pub fn load() -> DbResult<Self> {
        dotenvy::dotenv().ok();

        let properties = non_blank(std::env::var(PROPERTIES_ENV).ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(PROPERTIES_FILE));

        Self::load_with(&properties, |key| std::env::var(key).ok())
    }

    /// Load settings from `properties` with `env` standing in for the process environment.
    pub fn load_with<F>(properties: &Path, env: F) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .set_default("url", DEFAULT_URL)?
            .set_default("maximumPoolSize", DEFAULT_POOL_SIZE.to_string())?
            .set_default("connectTimeout", DEFAULT_CONNECT_TIMEOUT_SECS.to_string())?
            .set_default("poolName", DEFAULT_POOL_NAME)?
            .add_source(
                File::from(properties)
                    .format(FileFormat::Ini)
                    .required(false),
            );

        for (var, key) in KEYS {
            builder = builder.set_override_option(*key, non_blank(env(*var)))?;
        }

        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> DbResult<Self> {
        let maximum_pool_size = parse_pool_size(&raw.maximum_pool_size)?;
        let connect_timeout = parse_timeout(&raw.connect_timeout)?;

        Ok(Self {
            url: DatabaseUrl::parse(&raw.url)?,
            user: non_blank(raw.user),
            password: non_blank(raw.password),
            maximum_pool_size,
            connect_timeout,
            pool_name: raw.pool_name,
            statement_cache: StatementCache::default(),
        })
    }

    /// The user the pool connects as.
    pub fn effective_user(&self) -> &str {
        self.user
            .as_deref()
            .or_else(|| self.url.username())
            .unwrap_or(DEFAULT_USER)
    }

    /// Connect options for the pool, with credentials resolved.
    pub fn connect_options(&self) -> DbResult<MySqlConnectOptions> {
        let (user, password) = self.credential_overrides();
        self.url.connect_options(user, password)
    }

    /// Connect options without a selected database.
    pub fn server_options(&self) -> DbResult<MySqlConnectOptions> {
        let (user, password) = self.credential_overrides();
        self.url.server_options(user, password)
    }

    /// Values that replace the URL's credentials. Explicit settings always
    /// win; the defaults apply only when the URL carries no credentials.
    fn credential_overrides(&self) -> (Option<&str>, Option<&str>) {
        let fallback = |default: &'static str| (!self.url.has_credentials()).then_some(default);
        (
            self.user.as_deref().or_else(|| fallback(DEFAULT_USER)),
            self.password.as_deref().or_else(|| fallback(DEFAULT_PASSWORD)),
        )
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_pool_size(value: &str) -> DbResult<u32> {
    let size: u32 = value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| DbError::InvalidPoolSize {
            value: value.to_string(),
            reason: e.to_string(),
        })?;

    if size == 0 {
        return Err(DbError::InvalidPoolSize {
            value: value.to_string(),
            reason: "pool size must be at least 1".to_string(),
        });
    }
    Ok(size)
}

fn parse_timeout(value: &str) -> DbResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| DbError::InvalidTimeout {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

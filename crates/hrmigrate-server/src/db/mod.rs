use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use hrmigrate_common::env;

/// Database setup errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connection parameters are invalid or missing
    #[error("Database configuration error: {0}. Check the PG_* connection settings.")]
    Config(String),
}

impl DbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<hrmigrate_common::HrError> for DbError {
    fn from(err: hrmigrate_common::HrError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Where the relational store lives and who to log in as
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl ConnectParams {
    /// Build parameters from a parameter-store style listing.
    ///
    /// Names are matched on their last `/` segment, so
    /// `/RDS/test-migration-db/user` and `user` are equivalent. Recognized
    /// segments: `host`, `port`, `databasename`, `user`, `password`.
    /// Unknown names are ignored.
    pub fn from_parameters<I, K, V>(parameters: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let (mut host, mut port, mut database, mut user, mut password) =
            (None, None, None, None, None);

        for (name, value) in parameters {
            let segment = name.as_ref().rsplit('/').next().unwrap_or_default();
            match segment {
                "host" => host = Some(value.into()),
                "port" => port = Some(value.into()),
                "databasename" => database = Some(value.into()),
                "user" => user = Some(value.into()),
                "password" => password = Some(value.into()),
                _ => {},
            }
        }

        let missing = |name: &str| DbError::config(format!("parameter '{}' is missing", name));
        let port: String = port.ok_or_else(|| missing("port"))?;

        Ok(Self {
            host: host.ok_or_else(|| missing("host"))?,
            port: port
                .trim()
                .parse()
                .map_err(|_| DbError::config(format!("parameter 'port' is not a port: {port}")))?,
            database: database.ok_or_else(|| missing("databasename"))?,
            user: user.ok_or_else(|| missing("user"))?,
            password: password.ok_or_else(|| missing("password"))?,
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

/// Resolves connection parameters from some external source.
///
/// Resolution happens once per batch group; the resulting pool is reused for
/// every batch in it.
#[async_trait]
pub trait ConnectParamsSource: Send + Sync {
    async fn resolve(&self) -> DbResult<ConnectParams>;
}

/// Reads `PG_HOST`, `PG_PORT`, `PG_DATABASE`, `PG_USER` and `PG_PASSWORD`
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConnectParams;

#[async_trait]
impl ConnectParamsSource for EnvConnectParams {
    async fn resolve(&self) -> DbResult<ConnectParams> {
        Ok(ConnectParams {
            host: env::var_or("PG_HOST", "localhost"),
            port: env::parse_or("PG_PORT", 5432)?,
            database: env::parse_required("PG_DATABASE")?,
            user: env::parse_required("PG_USER")?,
            password: env::var_opt("PG_PASSWORD").unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ConnectParamsSource for ConnectParams {
    async fn resolve(&self) -> DbResult<ConnectParams> {
        Ok(self.clone())
    }
}

/// Pool sizing and timeouts
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: Some(600),
        }
    }
}

impl DbConfig {
    pub fn from_env() -> DbResult<Self> {
        let defaults = Self::default();
        let config = Self {
            max_connections: env::parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: env::parse_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
            connect_timeout_secs: env::parse_or(
                "DB_CONNECT_TIMEOUT",
                defaults.connect_timeout_secs,
            )?,
            idle_timeout_secs: env::var_opt("DB_IDLE_TIMEOUT")
                .map(|raw| {
                    raw.trim()
                        .parse()
                        .map_err(|_| DbError::config(format!("DB_IDLE_TIMEOUT invalid: {raw}")))
                })
                .transpose()?
                .or(defaults.idle_timeout_secs),
        };

        if config.max_connections == 0 {
            return Err(DbError::config("DB_MAX_CONNECTIONS must be greater than 0"));
        }
        if config.min_connections > config.max_connections {
            return Err(DbError::config(format!(
                "DB_MIN_CONNECTIONS ({}) cannot be greater than DB_MAX_CONNECTIONS ({})",
                config.min_connections, config.max_connections
            )));
        }

        Ok(config)
    }
}

/// Resolve parameters and open a pool.
///
/// The caller owns the pool for the lifetime of a batch group and should
/// `close()` it afterwards.
pub async fn create_pool(source: &dyn ConnectParamsSource, config: &DbConfig) -> DbResult<PgPool> {
    let params = source.resolve().await?;

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    let pool = options.connect_with(params.connect_options()).await?;

    tracing::info!(
        host = %params.host,
        database = %params.database,
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}

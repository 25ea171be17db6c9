//! Privilege-separated connection pools.
//!
//! The sandbox only ever sees a [`ReadOnlyPool`]. The privileged
//! [`WritePool`] belongs to trusted code and is never handed to the
//! executor; the two are distinct types so that cannot happen by accident.

use crate::backend::ExecutionLimits;
use crate::config::{AppConfig, DatabaseConfig, PoolConfig};
use crate::error::SandboxError;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode, Postgres};
use sqlx::{Executor, Row, Transaction};
use std::time::Duration;
use tracing::{info, warn};

const READ_ONLY_APP_NAME: &str = "sqlsandbox-readonly";
const WRITE_APP_NAME: &str = "sqlsandbox-write";

fn connect_options(db: &DatabaseConfig, pool: &PoolConfig, app_name: &str) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .database(&db.database)
        .username(&pool.user)
        .password(pool.password.expose_secret())
        .application_name(app_name)
        .ssl_mode(if db.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        })
}

fn pool_options(pool: &PoolConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(pool.max_connections)
        .idle_timeout(Some(Duration::from_millis(pool.idle_timeout_ms)))
        .acquire_timeout(Duration::from_millis(pool.connect_timeout_ms))
}

/// Pool backed by the restricted identity. Every connection is pinned to
/// read-only transactions and a statement timeout as it is opened.
#[derive(Debug, Clone)]
pub struct ReadOnlyPool {
    pool: PgPool,
}

/// Role attributes that would let the sandbox identity write despite the
/// session flag.
const ROLE_PRIVILEGES: &str = r"
SELECT r.rolsuper,
       has_database_privilege(current_database(), 'CREATE') AS can_create,
       EXISTS (
           SELECT 1
           FROM pg_catalog.pg_class c
           JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
           WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
             AND n.nspname <> 'information_schema'
             AND n.nspname NOT LIKE 'pg\_%'
             AND has_table_privilege(c.oid, 'INSERT, UPDATE, DELETE, TRUNCATE')
       ) AS can_write
FROM pg_catalog.pg_roles r
WHERE r.rolname = current_user
";

impl ReadOnlyPool {
    pub async fn connect(
        db: &DatabaseConfig,
        pool: &PoolConfig,
        limits: &ExecutionLimits,
    ) -> Result<Self, SandboxError> {
        let ro = Self::connect_with(connect_options(db, pool, READ_ONLY_APP_NAME), pool, limits)
            .await?;
        info!(
            host = %db.host,
            database = %db.database,
            user = %pool.user,
            max_connections = pool.max_connections,
            "read-only pool connected"
        );
        Ok(ro)
    }

    /// Connect with prepared options, e.g. parsed from a database URL.
    /// Only the sizing fields of `pool` are used.
    pub async fn connect_with(
        options: PgConnectOptions,
        pool: &PoolConfig,
        limits: &ExecutionLimits,
    ) -> Result<Self, SandboxError> {
        let timeout = format!("{}ms", limits.timeout_ms);
        let pg = pool_options(pool)
            .after_connect(move |conn, _meta| {
                let timeout = timeout.clone();
                Box::pin(async move {
                    conn.execute("SET default_transaction_read_only = ON").await?;
                    sqlx::query("SELECT set_config('statement_timeout', $1, false)")
                        .bind(timeout)
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| SandboxError::from_sqlx("read-only pool", e))?;
        Ok(Self { pool: pg })
    }

    /// Start a transaction on a read-only connection.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, SandboxError> {
        self.pool
            .begin()
            .await
            .map_err(|e| SandboxError::from_sqlx("acquire sandbox connection", e))
    }

    /// Refuse to continue unless this identity really cannot write.
    ///
    /// The session flag is checked first, then the role itself: a superuser
    /// or a role with CREATE on the database or write grants on any table
    /// fails, since the flag alone can be turned off by the session.
    pub async fn verify(&self) -> Result<(), SandboxError> {
        let row = sqlx::query("SHOW default_transaction_read_only")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SandboxError::from_sqlx("read-only verification", e))?;
        let setting: String = row.try_get(0).map_err(|e| SandboxError::Privilege {
            message: format!("cannot read default_transaction_read_only: {e}"),
        })?;
        if !setting.eq_ignore_ascii_case("on") {
            return Err(SandboxError::Privilege {
                message: format!(
                    "sandbox sessions are not read-only (default_transaction_read_only = {setting})"
                ),
            });
        }

        let row = sqlx::query(ROLE_PRIVILEGES)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SandboxError::from_sqlx("read-only role check", e))?
            .ok_or_else(|| SandboxError::Privilege {
                message: "sandbox role not found in pg_roles".to_string(),
            })?;
        let flags = (
            row.try_get::<bool, _>("rolsuper"),
            row.try_get::<bool, _>("can_create"),
            row.try_get::<bool, _>("can_write"),
        );
        let (superuser, can_create, can_write) = match flags {
            (Ok(s), Ok(c), Ok(w)) => (s, c, w),
            _ => {
                return Err(SandboxError::Privilege {
                    message: "cannot read sandbox role privileges".to_string(),
                });
            }
        };

        if superuser {
            return Err(SandboxError::Privilege {
                message: "sandbox role is a superuser".to_string(),
            });
        }
        if can_create {
            return Err(SandboxError::Privilege {
                message: "sandbox role can CREATE in the database".to_string(),
            });
        }
        if can_write {
            return Err(SandboxError::Privilege {
                message: "sandbox role holds write privileges on at least one table".to_string(),
            });
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), SandboxError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::from_sqlx("read-only ping", e))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Pool backed by the privileged identity, for trusted server code only.
#[derive(Debug, Clone)]
pub struct WritePool {
    pool: PgPool,
}

impl WritePool {
    pub async fn connect(db: &DatabaseConfig, pool: &PoolConfig) -> Result<Self, SandboxError> {
        let pg = pool_options(pool)
            .connect_with(connect_options(db, pool, WRITE_APP_NAME))
            .await
            .map_err(|e| SandboxError::from_sqlx("write pool", e))?;
        info!(host = %db.host, database = %db.database, "write pool connected");
        Ok(Self { pool: pg })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), SandboxError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::from_sqlx("write ping", e))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Both pools, constructed at startup and closed at shutdown.
#[derive(Debug, Clone)]
pub struct Pools {
    pub read_only: ReadOnlyPool,
    pub write: Option<WritePool>,
}

impl Pools {
    /// Connect both pools and verify the read-only one. Fails closed: a
    /// read-only pool that cannot be verified aborts startup instead of
    /// degrading to the write identity.
    pub async fn init(config: &AppConfig) -> Result<Self, SandboxError> {
        if let Some(write) = &config.write
            && write.user == config.read_only.user
        {
            warn!(
                user = %write.user,
                "read-only and write pools share a database user; verification will refuse it"
            );
        }

        let read_only =
            ReadOnlyPool::connect(&config.database, &config.read_only, &config.limits).await?;
        read_only.verify().await?;

        let write = match &config.write {
            Some(write) => Some(WritePool::connect(&config.database, write).await?),
            None => None,
        };

        Ok(Self { read_only, write })
    }

    pub async fn close(&self) {
        self.read_only.close().await;
        if let Some(write) = &self.write {
            write.close().await;
        }
        info!("database pools closed");
    }
}

use crate::backend::ExecutionLimits;
use crate::cli::{ConnectionArgs, ServeArgs};
use crate::error::SandboxError;
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_READONLY_POOL_MAX: u32 = 10;
pub const DEFAULT_WRITE_POOL_MAX: u32 = 20;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub read_only: PoolConfig,
    pub write: Option<PoolConfig>,
    pub limits: ExecutionLimits,
    pub server: ServerConfig,
    /// Reference solutions keyed by assignment id.
    pub solutions: HashMap<String, String>,
    pub verbose: bool,
    pub show_secrets: bool,
}

/// Where the sandbox database lives.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub ssl: bool,
}

/// Identity and sizing for one connection pool.
#[derive(Debug)]
pub struct PoolConfig {
    pub user: String,
    pub password: SecretString,
    pub max_connections: u32,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub dev_errors: bool,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            dev_errors: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    database: TomlDatabase,
    #[serde(default)]
    read_only: TomlPool,
    #[serde(default)]
    write: TomlPool,
    #[serde(default)]
    server: TomlServer,
    #[serde(default)]
    solutions: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    max_rows: Option<usize>,
    timeout_ms: Option<u64>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDatabase {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    ssl: Option<bool>,
    idle_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlPool {
    user: Option<String>,
    password: Option<String>,
    password_env: Option<String>,
    pool_max: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServer {
    bind: Option<SocketAddr>,
    dev_errors: Option<bool>,
    max_body_bytes: Option<usize>,
}

/// Config path resolution result; records whether the path was asked for explicitly.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if user explicitly specified via --config or SQLSANDBOX_CONFIG
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath {
            path: path.clone(),
            explicit: true,
        });
    }
    if let Some(path) = env_non_empty("SQLSANDBOX_CONFIG") {
        return Some(ResolvedConfigPath {
            path: PathBuf::from(path),
            explicit: true,
        });
    }
    ProjectDirs::from("", "", "sqlsandbox").map(|dirs| ResolvedConfigPath {
        path: dirs.config_dir().join("config.toml"),
        explicit: false,
    })
}

/// Load and parse the TOML config file (if it exists).
fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, SandboxError> {
    let resolved = match resolved {
        Some(r) => r,
        None => return Ok(TomlConfig::default()),
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(SandboxError::Config {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| SandboxError::Config {
        message: format!("cannot read config file {}: {}", resolved.path.display(), e),
    })?;

    toml::from_str(&content).map_err(|e| SandboxError::Config {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

/// Treat an empty string as absent.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Read an environment variable, treating empty as unset.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve a password from direct value, env indirection, or env var.
fn resolve_secret(
    direct: Option<&str>,
    env_key: Option<&str>,
    fallback_env: &str,
) -> Option<SecretString> {
    if let Some(val) = non_empty(direct) {
        return Some(SecretString::from(val.to_string()));
    }
    // Env indirection (e.g., password_env = "SANDBOX_RO_SECRET")
    if let Some(val) = non_empty(env_key).and_then(env_non_empty) {
        return Some(SecretString::from(val));
    }
    env_non_empty(fallback_env).map(SecretString::from)
}

fn required(value: Option<&str>, what: &str) -> Result<String, SandboxError> {
    non_empty(value)
        .map(str::to_string)
        .ok_or_else(|| SandboxError::Config {
            message: format!("no {what} specified"),
        })
}

/// Build AppConfig from the shared connection arguments.
pub fn load_from_connection_args(
    args: &ConnectionArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, SandboxError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;
    build(args, None, toml_config, verbose, show_secrets)
}

/// Build AppConfig for the `serve` subcommand, including listener settings.
pub fn load_from_serve_args(
    args: &ServeArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, SandboxError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;
    build(&args.connection, Some(args), toml_config, verbose, show_secrets)
}

fn build(
    args: &ConnectionArgs,
    serve: Option<&ServeArgs>,
    toml_config: TomlConfig,
    verbose: bool,
    show_secrets: bool,
) -> Result<AppConfig, SandboxError> {
    let TomlConfig {
        defaults,
        database: toml_db,
        read_only: toml_ro,
        write: toml_write,
        server: toml_server,
        solutions,
    } = toml_config;

    let database = DatabaseConfig {
        host: required(
            args.pg_host.as_deref().or(toml_db.host.as_deref()),
            "database host (PG_HOST)",
        )?,
        port: args.pg_port.or(toml_db.port).unwrap_or(DEFAULT_PG_PORT),
        database: required(
            args.pg_database.as_deref().or(toml_db.database.as_deref()),
            "database name (PG_DB_NAME)",
        )?,
        ssl: args.pg_ssl || toml_db.ssl.unwrap_or(false),
    };

    let idle_timeout_ms = args
        .idle_timeout_ms
        .or(toml_db.idle_timeout_ms)
        .unwrap_or(DEFAULT_IDLE_TIMEOUT_MS);
    let connect_timeout_ms = args
        .connect_timeout_ms
        .or(toml_db.connect_timeout_ms)
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);

    let read_only = PoolConfig {
        user: required(
            args.pg_readonly_user.as_deref().or(toml_ro.user.as_deref()),
            "read-only user (PG_READONLY_USER)",
        )?,
        password: resolve_secret(
            args.pg_readonly_password.as_deref(),
            toml_ro.password_env.as_deref(),
            "PG_READONLY_PASSWORD",
        )
        .or_else(|| {
            non_empty(toml_ro.password.as_deref()).map(|p| SecretString::from(p.to_string()))
        })
        .ok_or_else(|| SandboxError::Config {
            message: "no read-only password specified (PG_READONLY_PASSWORD)".to_string(),
        })?,
        max_connections: args
            .readonly_pool_max
            .or(toml_ro.pool_max)
            .unwrap_or(DEFAULT_READONLY_POOL_MAX),
        idle_timeout_ms,
        connect_timeout_ms,
    };

    // The write identity is optional: the sandbox itself never needs it.
    let write = match non_empty(args.pg_user.as_deref().or(toml_write.user.as_deref())) {
        Some(user) => Some(PoolConfig {
            user: user.to_string(),
            password: resolve_secret(
                args.pg_password.as_deref(),
                toml_write.password_env.as_deref(),
                "PG_PASSWORD",
            )
            .or_else(|| {
                non_empty(toml_write.password.as_deref())
                    .map(|p| SecretString::from(p.to_string()))
            })
            .ok_or_else(|| SandboxError::Config {
                message: "no write password specified (PG_PASSWORD)".to_string(),
            })?,
            max_connections: args
                .write_pool_max
                .or(toml_write.pool_max)
                .unwrap_or(DEFAULT_WRITE_POOL_MAX),
            idle_timeout_ms,
            connect_timeout_ms,
        }),
        None => None,
    };

    if read_only.max_connections == 0 || write.as_ref().is_some_and(|w| w.max_connections == 0) {
        return Err(SandboxError::Config {
            message: "pool size must be at least 1".to_string(),
        });
    }

    // limits: CLI/ENV > TOML > built-in defaults
    let default_limits = ExecutionLimits::default();
    let limits = ExecutionLimits::new(
        args.max_rows
            .or(defaults.max_rows)
            .unwrap_or(default_limits.max_rows),
        args.timeout_ms
            .or(defaults.timeout_ms)
            .unwrap_or(default_limits.timeout_ms),
    )?;

    let server = resolve_server(serve, toml_server);
    let verbose = verbose || defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        database,
        read_only,
        write,
        limits,
        server,
        solutions,
        verbose,
        show_secrets,
    })
}

fn resolve_server(serve: Option<&ServeArgs>, toml_server: TomlServer) -> ServerConfig {
    let defaults = ServerConfig::default();

    // bind: --bind > --port/PORT > TOML > 0.0.0.0:5000
    let bind = serve
        .and_then(|s| s.bind)
        .or_else(|| {
            serve
                .and_then(|s| s.port)
                .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        })
        .or(toml_server.bind)
        .unwrap_or(defaults.bind);

    ServerConfig {
        bind,
        dev_errors: serve.is_some_and(|s| s.dev_errors) || toml_server.dev_errors.unwrap_or(false),
        max_body_bytes: serve
            .and_then(|s| s.max_body_bytes)
            .or(toml_server.max_body_bytes)
            .unwrap_or(defaults.max_body_bytes),
    }
}

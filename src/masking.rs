use crate::config::{DatabaseConfig, PoolConfig};
use secrecy::{ExposeSecret, SecretString};

/// Format a secret value, respecting the show_secrets flag.
pub fn format_secret(secret: &SecretString, show_secrets: bool) -> String {
    if show_secrets {
        secret.expose_secret().to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

/// Format an optional secret value.
pub fn format_optional_secret(secret: Option<&SecretString>, show_secrets: bool) -> String {
    match secret {
        Some(s) => format_secret(s, show_secrets),
        None => "(not set)".to_string(),
    }
}

/// One-line description of a pool's target, safe for logs and terminals.
pub fn describe_pool(db: &DatabaseConfig, pool: &PoolConfig, show_secrets: bool) -> String {
    format!(
        "postgres://{}:{}@{}:{}/{} (max {} connections)",
        pool.user,
        format_secret(&pool.password, show_secrets),
        db.host,
        db.port,
        db.database,
        pool.max_connections
    )
}

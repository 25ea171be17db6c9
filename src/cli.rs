use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sqlsandbox",
    version,
    about = "Read-only SQL sandbox for practice assignments"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short = 'c', long, global = true, env = "SQLSANDBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit debug diagnostics to stderr
    #[arg(short = 'v', long, global = true, env = "SQLSANDBOX_VERBOSE")]
    pub verbose: bool,

    /// Disable credential masking in diagnostics
    #[arg(long, global = true, env = "SQLSANDBOX_SHOW_SECRETS")]
    pub show_secrets: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the sandbox over HTTP
    Serve(ServeArgs),

    /// Run one query through the sandbox and print the result
    Exec(ExecArgs),

    /// Check a query against the stored solution for an assignment
    Check(CheckArgs),

    /// Verify that the read-only identity cannot write
    Verify(ConnectionArgs),
}

/// Database and execution-limit settings shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// PostgreSQL host
    #[arg(long, env = "PG_HOST")]
    pub pg_host: Option<String>,

    /// PostgreSQL port (default: 5432)
    #[arg(long, env = "PG_PORT")]
    pub pg_port: Option<u16>,

    /// Database holding the sandbox tables
    #[arg(long, env = "PG_DB_NAME")]
    pub pg_database: Option<String>,

    /// Read-only user for sandboxed statements
    #[arg(long, env = "PG_READONLY_USER")]
    pub pg_readonly_user: Option<String>,

    /// Read-only user password
    #[arg(long, env = "PG_READONLY_PASSWORD", hide_env_values = true)]
    pub pg_readonly_password: Option<String>,

    /// Privileged user for trusted server code
    #[arg(long, env = "PG_USER")]
    pub pg_user: Option<String>,

    /// Privileged user password
    #[arg(long, env = "PG_PASSWORD", hide_env_values = true)]
    pub pg_password: Option<String>,

    /// Require TLS to the database
    #[arg(long, env = "PG_SSL")]
    pub pg_ssl: bool,

    /// Max rows returned per query (default: 1000)
    #[arg(long, env = "MAX_ROWS_RETURN")]
    pub max_rows: Option<usize>,

    /// Statement timeout in milliseconds (default: 5000)
    #[arg(long, env = "QUERY_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Read-only pool size (default: 10)
    #[arg(long, env = "PG_READONLY_POOL_MAX")]
    pub readonly_pool_max: Option<u32>,

    /// Write pool size (default: 20)
    #[arg(long, env = "PG_WRITE_POOL_MAX")]
    pub write_pool_max: Option<u32>,

    /// Idle connection timeout in milliseconds (default: 30000)
    #[arg(long, env = "PG_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: Option<u64>,

    /// Connection acquire timeout in milliseconds (default: 5000)
    #[arg(long, env = "PG_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Address to listen on (default: 0.0.0.0:5000)
    #[arg(short = 'b', long, env = "SQLSANDBOX_BIND")]
    pub bind: Option<SocketAddr>,

    /// Port to listen on, used when no bind address is given
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Attach debug error chains to 5xx responses (local development only)
    #[arg(long, env = "SQLSANDBOX_DEV_ERRORS")]
    pub dev_errors: bool,

    /// Request body limit in bytes (default: 1048576)
    #[arg(long, env = "SQLSANDBOX_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// SQL query text
    pub sql: Option<String>,

    /// Read SQL from file
    #[arg(short = 'f', long = "file", conflicts_with = "sql")]
    pub sql_file: Option<PathBuf>,

    /// Assignment the query belongs to (logged only)
    #[arg(long)]
    pub context_id: Option<String>,

    /// Print JSON instead of TOON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// SQL query text
    pub sql: Option<String>,

    /// Read SQL from file
    #[arg(short = 'f', long = "file", conflicts_with = "sql")]
    pub sql_file: Option<PathBuf>,

    /// Assignment whose stored solution is the reference
    #[arg(long)]
    pub context_id: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

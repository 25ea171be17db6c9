use clap::Parser;
use sqlsandbox::answer::{self, AnswerOutcome, StaticSolutions};
use sqlsandbox::backend::postgres::PgBackend;
use sqlsandbox::cli::{self, Cli, Command};
use sqlsandbox::error::SandboxError;
use sqlsandbox::gateway::{QueryRequest, SandboxGateway, SandboxOutcome};
use sqlsandbox::pool::ReadOnlyPool;
use sqlsandbox::{config, format, masking, output, server, translate, verbose};
use std::path::PathBuf;
use std::process;

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    verbose::init(cli.verbose);

    let result = match cli.command {
        Command::Serve(ref args) => {
            serve(args, cli.verbose, cli.show_secrets, cli.config.as_ref()).await
        }
        Command::Exec(ref args) => {
            exec(args, cli.verbose, cli.show_secrets, cli.config.as_ref()).await
        }
        Command::Check(ref args) => {
            check(args, cli.verbose, cli.show_secrets, cli.config.as_ref()).await
        }
        Command::Verify(ref args) => {
            verify(args, cli.verbose, cli.show_secrets, cli.config.as_ref()).await
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            output::print_error(&err);
            process::exit(1);
        }
    }
}

async fn serve(
    args: &cli::ServeArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<bool, SandboxError> {
    let app_config = config::load_from_serve_args(args, verbose, show_secrets, config_path)?;
    server::serve(app_config).await?;
    Ok(true)
}

async fn exec(
    args: &cli::ExecArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<bool, SandboxError> {
    let app_config =
        config::load_from_connection_args(&args.connection, verbose, show_secrets, config_path)?;
    let sql = resolve_sql(args.sql.as_deref(), args.sql_file.as_ref())?;

    let pool = connect_read_only(&app_config).await?;
    let gateway = SandboxGateway::new(PgBackend::new(pool.clone()), app_config.limits);

    let mut request = QueryRequest::new(sql);
    request.context_id = args.context_id.clone();
    let outcome = gateway.run(&request).await;
    pool.close().await;

    match outcome? {
        SandboxOutcome::Success(rows) => {
            let rendered = if args.json {
                format::to_json(&rows)?
            } else {
                format::to_toon(&rows)?
            };
            output::print_result(&rendered);
            if rows.truncated {
                output::print_truncation_warning(app_config.limits.max_rows);
            }
            Ok(true)
        }
        SandboxOutcome::Rejected(reason) => {
            output::print_rejection(reason);
            Ok(false)
        }
        SandboxOutcome::Failed(err) => {
            output::print_engine_failure(&translate::translate(&err));
            Ok(false)
        }
    }
}

async fn check(
    args: &cli::CheckArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<bool, SandboxError> {
    let app_config =
        config::load_from_connection_args(&args.connection, verbose, show_secrets, config_path)?;
    let sql = resolve_sql(args.sql.as_deref(), args.sql_file.as_ref())?;
    let solutions = StaticSolutions::new(app_config.solutions.clone());

    let pool = connect_read_only(&app_config).await?;
    let gateway = SandboxGateway::new(PgBackend::new(pool.clone()), app_config.limits);

    let request = QueryRequest::new(sql).with_context(args.context_id.clone());
    let outcome = answer::check_answer(&gateway, &solutions, &request).await;
    pool.close().await;

    match outcome? {
        AnswerOutcome::Checked { verdict, .. } => {
            output::print_result(&output::verdict_message(&verdict));
            Ok(verdict.correct)
        }
        AnswerOutcome::Rejected(reason) => {
            output::print_rejection(reason);
            Ok(false)
        }
        AnswerOutcome::Failed(err) => {
            output::print_engine_failure(&translate::translate(&err));
            Ok(false)
        }
    }
}

async fn verify(
    args: &cli::ConnectionArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<bool, SandboxError> {
    let app_config = config::load_from_connection_args(args, verbose, show_secrets, config_path)?;
    let pool = connect_read_only(&app_config).await?;
    pool.close().await;
    output::print_result(&format!(
        "ok: {} is read-only",
        masking::describe_pool(
            &app_config.database,
            &app_config.read_only,
            app_config.show_secrets
        )
    ));
    Ok(true)
}

// --- Helpers ---

/// Connect the read-only pool and refuse to go on unless it verifies.
async fn connect_read_only(app_config: &config::AppConfig) -> Result<ReadOnlyPool, SandboxError> {
    tracing::debug!(
        pool = %masking::describe_pool(
            &app_config.database,
            &app_config.read_only,
            app_config.show_secrets
        ),
        "connecting read-only pool"
    );
    let pool = ReadOnlyPool::connect(
        &app_config.database,
        &app_config.read_only,
        &app_config.limits,
    )
    .await?;
    if let Err(e) = pool.verify().await {
        pool.close().await;
        return Err(e);
    }
    Ok(pool)
}

fn resolve_sql(sql: Option<&str>, sql_file: Option<&PathBuf>) -> Result<String, SandboxError> {
    if let Some(sql) = sql {
        return Ok(sql.to_string());
    }
    if let Some(path) = sql_file {
        let content = std::fs::read_to_string(path).map_err(|e| SandboxError::Config {
            message: format!("cannot read SQL file {}: {}", path.display(), e),
        })?;
        return Ok(content);
    }
    Err(SandboxError::Config {
        message: "no SQL provided; pass it as an argument or with --file".to_string(),
    })
}

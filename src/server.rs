//! HTTP surface of the sandbox.

use crate::answer::{self, AnswerOutcome, StaticSolutions};
use crate::backend::Backend;
use crate::backend::postgres::PgBackend;
use crate::config::AppConfig;
use crate::error::SandboxError;
use crate::gateway::{QueryRequest, SandboxGateway, SandboxOutcome};
use crate::guard::ForbiddenReason;
use crate::masking;
use crate::normalize::RowSet;
use crate::pool::{Pools, WritePool};
use crate::translate::{self, EngineError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Header an upstream authentication layer uses to pass the caller along.
pub const CALLER_HEADER: &str = "x-user-id";

pub struct AppState<B> {
    pub gateway: Arc<SandboxGateway<B>>,
    pub solutions: Arc<StaticSolutions>,
    pub write_pool: Option<WritePool>,
    /// Attach debug error chains to 5xx responses.
    pub dev_errors: bool,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            solutions: Arc::clone(&self.solutions),
            write_pool: self.write_pool.clone(),
            dev_errors: self.dev_errors,
        }
    }
}

/// Body of `/api/query/*` requests. `assignmentId` is accepted for
/// `contextId`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, alias = "assignmentId")]
    pub context_id: Option<String>,
}

pub fn router<B>(state: AppState<B>, max_body_bytes: usize) -> Router
where
    B: Backend + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health::<B>))
        .route(
            "/api/query/execute",
            get(execute_get::<B>).post(execute_post::<B>),
        )
        .route("/api/query/check", post(check::<B>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect the pools, serve until Ctrl-C, then close the pools.
pub async fn serve(config: AppConfig) -> Result<(), SandboxError> {
    let read_only_password =
        masking::format_secret(&config.read_only.password, config.show_secrets);
    let write_password = masking::format_optional_secret(
        config.write.as_ref().map(|w| &w.password),
        config.show_secrets,
    );
    info!(
        host = %config.database.host,
        database = %config.database.database,
        read_only_user = %config.read_only.user,
        read_only_password = %read_only_password,
        write_user = config.write.as_ref().map(|w| w.user.as_str()).unwrap_or("(not set)"),
        write_password = %write_password,
        max_rows = config.limits.max_rows,
        timeout_ms = config.limits.timeout_ms,
        "starting sandbox"
    );

    let solutions = StaticSolutions::new(config.solutions.clone());
    if solutions.is_empty() {
        warn!("no reference solutions configured; /api/query/check will answer 404");
    } else {
        info!(count = solutions.len(), "reference solutions loaded");
    }

    let pools = Pools::init(&config).await?;
    let gateway = SandboxGateway::new(PgBackend::new(pools.read_only.clone()), config.limits);
    let state = AppState {
        gateway: Arc::new(gateway),
        solutions: Arc::new(solutions),
        write_pool: pools.write.clone(),
        dev_errors: config.server.dev_errors,
    };
    let app = router(state, config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
    info!(addr = %config.server.bind, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    pools.close().await;
    served.map_err(SandboxError::from)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn health<B>(State(state): State<AppState<B>>) -> Response
where
    B: Backend + Send + Sync + 'static,
{
    let read_only = state.gateway.backend().ping().await.is_ok();
    let write = match &state.write_pool {
        Some(pool) => Some(pool.ping().await.is_ok()),
        None => None,
    };
    let label = |up: bool| if up { "connected" } else { "disconnected" };

    let status = if read_only {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if read_only { "ok" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "databases": {
            "readOnly": label(read_only),
            "write": write.map(label).unwrap_or("not_configured"),
        },
    });
    (status, Json(body)).into_response()
}

async fn execute_get<B>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    Query(params): Query<ExecuteParams>,
) -> Response
where
    B: Backend + Send + Sync + 'static,
{
    execute(&state, &headers, params).await
}

async fn execute_post<B>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    body: Result<Json<ExecuteParams>, JsonRejection>,
) -> Response
where
    B: Backend + Send + Sync + 'static,
{
    match body {
        Ok(Json(params)) => execute(&state, &headers, params).await,
        Err(rejection) => bad_request(&rejection.body_text()),
    }
}

async fn execute<B>(state: &AppState<B>, headers: &HeaderMap, params: ExecuteParams) -> Response
where
    B: Backend + Send + Sync + 'static,
{
    let request = match to_request(headers, params) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.gateway.run(&request).await {
        Ok(SandboxOutcome::Success(rows)) => {
            (StatusCode::OK, Json(success_body(&rows))).into_response()
        }
        Ok(SandboxOutcome::Rejected(reason)) => rejected(reason),
        Ok(SandboxOutcome::Failed(err)) => engine_failure(&err),
        Err(err) => infrastructure_failure(&err, state.dev_errors),
    }
}

async fn check<B>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    body: Result<Json<ExecuteParams>, JsonRejection>,
) -> Response
where
    B: Backend + Send + Sync + 'static,
{
    let params = match body {
        Ok(Json(params)) => params,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let request = match to_request(&headers, params) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match answer::check_answer(state.gateway.as_ref(), state.solutions.as_ref(), &request).await {
        Ok(AnswerOutcome::Checked { verdict, result }) => {
            let mut body = success_body(&result);
            body["correct"] = Value::Bool(verdict.correct);
            if let Some(mismatch) = verdict.mismatch {
                body["mismatch"] = serde_json::to_value(mismatch).unwrap_or(Value::Null);
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(AnswerOutcome::Rejected(reason)) => rejected(reason),
        Ok(AnswerOutcome::Failed(err)) => engine_failure(&err),
        Err(err) => infrastructure_failure(&err, state.dev_errors),
    }
}

fn to_request(headers: &HeaderMap, params: ExecuteParams) -> Result<QueryRequest, Response> {
    let text = params.query.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(bad_request("Query is required"));
    }
    let caller = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let mut request = QueryRequest::new(text).with_caller(caller);
    if let Some(context_id) = params.context_id.filter(|c| !c.is_empty()) {
        request = request.with_context(context_id);
    }
    Ok(request)
}

/// Success payload: rows keyed by column name plus their positional form.
pub fn success_body(rows: &RowSet) -> Value {
    let columns: Vec<Value> = rows
        .columns
        .iter()
        .map(|c| json!({ "name": c.name, "dataType": c.engine_type_id }))
        .collect();
    json!({
        "success": true,
        "data": rows.keyed_rows(),
        "rows": rows.rows,
        "columns": columns,
        "rowCount": rows.row_count,
        "executionTime": rows.execution_time_ms,
        "truncated": rows.truncated,
    })
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

fn rejected(reason: ForbiddenReason) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "success": false,
            "error": reason.public_message(),
            "reason": reason.code(),
        })),
    )
        .into_response()
}

fn engine_failure(err: &EngineError) -> Response {
    let public = translate::translate(err);
    (
        public.status,
        Json(json!({
            "success": false,
            "error": public.error,
            "userMessage": public.user_message,
            "code": public.code,
            "category": public.category,
        })),
    )
        .into_response()
}

fn infrastructure_failure(err: &SandboxError, dev_errors: bool) -> Response {
    let status = err.status();
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    let mut body = json!({ "success": false, "error": err.public_message() });
    if dev_errors {
        body["details"] = Value::String(format!("{err:?}"));
    }
    (status, Json(body)).into_response()
}

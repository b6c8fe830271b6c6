//! HTTP server for the document corpus.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Root marker with the crate version |
//! | `GET`  | `/health` | Health check |
//! | `GET`  | `/sources` | List the `.md` / `.pdf` documents |
//! | `GET`  | `/sources/{filename}` | Download one document |
//! | `POST` | `/sources` | Replace the whole corpus from a zip upload (multipart) |
//! | any    | `/ask`, `/ask/{*rest}` | Forwarded to the question-answering service |
//!
//! # Error Contract
//!
//! Every failure is an [`AppError`] rendered once by the error boundary
//! middleware through [`ErrorMapper`]:
//!
//! ```json
//! { "error": { "code": "NOT_FOUND", "message": "File not found" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for the browser UI.

use anyhow::Context;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::PathRejection,
        DefaultBodyLimit, Multipart, Path, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, ErrorMapper};
use crate::get::{attachment_disposition, retrieve};
use crate::ingest::{replace_corpus, SUCCESS_MESSAGE};
use crate::models::{format_iso_millis, FileListResponse, UploadResponse};
use crate::proxy::AskProxy;
use crate::sources::list_corpus;
use crate::store::CorpusStore;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<CorpusStore>,
    proxy: Arc<AskProxy>,
    max_upload_bytes: usize,
}

/// Builds the full router: routes, body limit, error boundary and CORS.
pub fn build_router(config: &Config, store: Arc<CorpusStore>) -> Router {
    let max_upload_bytes = config.server.max_upload_bytes;
    let state = AppState {
        store,
        proxy: Arc::new(AskProxy::new(config.proxy.upstream.clone())),
        max_upload_bytes,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route(
            "/sources",
            get(handle_list)
                .post(handle_upload)
                .layer(DefaultBodyLimit::max(
                    max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
                )),
        )
        .route("/sources/{filename}", get(handle_download))
        .route("/ask", any(handle_ask))
        .route("/ask/{*rest}", any(handle_ask))
        .layer(middleware::from_fn_with_state(
            ErrorMapper::new(config.server.mode),
            error_boundary,
        ))
        .layer(cors)
        .with_state(state)
}

/// Starts the server and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(CorpusStore::new(&config.corpus.root));
    store
        .ensure()
        .await
        .context("Failed to prepare the corpus directory")?;
    let swept = store
        .sweep_leftovers()
        .await
        .context("Failed to clean up interrupted replacements")?;
    if swept > 0 {
        info!(count = swept, "removed leftovers of interrupted replacements");
    }

    let app = build_router(config, store);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!(
        bind = %config.server.bind,
        corpus = %config.corpus.root.display(),
        mode = ?config.server.mode,
        upstream = config.proxy.upstream.as_deref().unwrap_or("-"),
        "docshelf listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Re-renders any error response with the configured mode and logs it once.
async fn error_boundary(
    State(mapper): State<ErrorMapper>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    match response.extensions_mut().remove::<Arc<AppError>>() {
        Some(err) => mapper.render(&err, &method, &path),
        None => response,
    }
}

// ============ GET / and GET /health ============

#[derive(Serialize)]
struct RootResponse {
    root: bool,
    version: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        root: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: format_iso_millis(&Utc::now()),
    })
}

// ============ /sources ============

async fn handle_list(State(state): State<AppState>) -> Result<Json<FileListResponse>, AppError> {
    let files = list_corpus(&state.store).await?;
    Ok(Json(FileListResponse { files }))
}

async fn handle_download(
    State(state): State<AppState>,
    filename: Result<Path<String>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(filename) = filename.map_err(|e| AppError::validation("/filename", e.body_text()))?;
    let download = retrieve(&state.store, &filename).await?;

    let disposition = HeaderValue::from_bytes(attachment_disposition(&download.filename).as_bytes())
        .map_err(|e| AppError::internal("Failed to download file", e))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(download.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::validation("/file", err.body_text())
    }
}

/// Takes the first multipart field with a filename; other fields are skipped.
async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|_| AppError::bad_request("No file uploaded"))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let body = field.map(|chunk| chunk.map_err(multipart_error));
        replace_corpus(
            &state.store,
            Some(filename.as_str()),
            body,
            state.max_upload_bytes as u64,
        )
        .await?;

        return Ok(Json(UploadResponse {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
        }));
    }

    Err(AppError::bad_request("No file uploaded"))
}

// ============ /ask ============

async fn handle_ask(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    state.proxy.forward(request, state.max_upload_bytes).await
}

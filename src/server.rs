//! HTTP and websocket transport.
//!
//! `GET /generate-code` upgrades to a websocket carrying one generation session. The remaining
//! routes expose the eval engine, the static catalog and screenshot capture as JSON.

use crate::catalog::{catalog, BackendModel, Catalog, Stack};
use crate::config::AppConfig;
use crate::error::{ApiError, EvalError};
use crate::evals::{
    self, load_case, load_compared, Comparison, LoadedEval, RunEvalsDriver, RunEvalsReport,
    SkippedCase,
};
use crate::orchestrator::Orchestrator;
use crate::protocol::OutboundMessage;
use crate::provider::{BackendFactory, HttpBackendFactory};
use crate::request::GenerationParams;
use crate::screenshot::{ScreenshotClient, ScreenshotRequest, ScreenshotResponse};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::ready;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    config: Arc<AppConfig>,
    screenshots: Arc<ScreenshotClient>,
}

impl AppState {
    pub fn new(config: AppConfig, factory: Arc<dyn BackendFactory>) -> Result<Self, ApiError> {
        let orchestrator = Orchestrator::new(factory, config.generation.orchestrator_settings());
        let screenshots = ScreenshotClient::new(config.screenshot.endpoint.clone())?;
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
            screenshots: Arc::new(screenshots),
        })
    }

    /// State backed by the real HTTP clients
    pub fn from_config(config: AppConfig) -> Result<Self, ApiError> {
        let factory = HttpBackendFactory::new(
            config.generation.backend_endpoints(),
            config.generation.request_timeout(),
        );
        Self::new(config, Arc::new(factory))
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // Relative set locations live under the configured results directory
    fn resolve_set(&self, folder: &str) -> PathBuf {
        let path = Path::new(folder);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.evals.results_dir().join(path)
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate-code", get(generate_code))
        .route("/evals", get(single_evals))
        .route("/pairwise-evals", get(pairwise_evals))
        .route("/best-of-n-evals", get(best_of_n_evals))
        .route("/run_evals", post(run_evals))
        .route("/models", get(models))
        .route("/api/screenshot", post(screenshot))
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let address = state.config().server.bind_address();
    let listener = tokio::net::TcpListener::bind(address.as_str()).await?;
    info!(address = %address, "Listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn generate_code(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let outbound = sink.with(|text: String| ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    let inbound = stream
        .take_while(|frame| ready(matches!(frame, Ok(message) if !matches!(message, Message::Close(_)))))
        .filter_map(|frame| {
            ready(match frame {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        });
    run_session(&state, outbound, inbound).await;
}

/// Drive one generation session over already-decoded text frames.
///
/// The first inbound frame carries the parameters. The session ends when every variant has
/// reached a terminal event, or early when the inbound side closes, which cancels the run.
pub async fn run_session<O, I>(state: &AppState, mut outbound: O, mut inbound: I)
where
    O: Sink<String> + Unpin,
    I: Stream<Item = String> + Unpin,
{
    let Some(first) = inbound.next().await else {
        debug!("Client closed before sending parameters");
        return;
    };

    let started = GenerationParams::from_json(&first)
        .and_then(|params| params.into_request(&state.config.credentials))
        .and_then(|request| state.orchestrator.start(request));
    let mut generation = match started {
        Ok(generation) => generation,
        Err(e) => {
            warn!(error = %e, "Rejected generation request");
            let _ = outbound.send(OutboundMessage::fatal(e.to_string()).to_json()).await;
            let _ = outbound.close().await;
            return;
        }
    };
    info!(variants = generation.variant_count(), "Generation session started");

    loop {
        tokio::select! {
            event = generation.recv() => match event {
                Some(event) => {
                    let message = OutboundMessage::from(event);
                    if outbound.send(message.to_json()).await.is_err() {
                        info!("Client went away, cancelling generation");
                        generation.cancel();
                        break;
                    }
                }
                None => break,
            },
            frame = inbound.next() => {
                if frame.is_none() {
                    info!("Client closed the connection, cancelling generation");
                    generation.cancel();
                    break;
                }
            }
        }
    }
    let _ = outbound.close().await;
}

/// JSON error body with a status code
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<EvalError> for HttpError {
    fn from(err: EvalError) -> Self {
        let status = match &err {
            EvalError::SetNotFound(_) | EvalError::InputsNotFound(_) => StatusCode::NOT_FOUND,
            EvalError::InsufficientSets { .. } => StatusCode::BAD_REQUEST,
            EvalError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        if let ApiError::Eval(inner) = err {
            return inner.into();
        }
        let status = match &err {
            ApiError::NoCredentials(_)
            | ApiError::UnsupportedMode(_)
            | ApiError::UnsupportedStack(_)
            | ApiError::UnknownBackend(_)
            | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Screenshot(_) | ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SingleQuery {
    folder: String,
}

/// Combined view of 2..N result sets
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonView {
    pub cases: Vec<LoadedEval>,
    pub set_names: Vec<String>,
    pub skipped: Vec<SkippedCase>,
}

async fn single_evals(
    State(state): State<AppState>,
    Query(query): Query<SingleQuery>,
) -> Result<Json<Vec<LoadedEval>>, HttpError> {
    let set = state.resolve_set(&query.folder);
    let cases = evals::list_single(&state.config.evals.inputs_dir(), &set)?;
    let mut loaded = Vec::with_capacity(cases.len());
    for case in &cases {
        loaded.push(load_case(case).await?);
    }
    Ok(Json(loaded))
}

async fn pairwise_evals(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ComparisonView>, HttpError> {
    let sets: Vec<PathBuf> = ["folder1", "folder2"]
        .iter()
        .filter_map(|key| query.get(*key))
        .map(|folder| state.resolve_set(folder))
        .collect();
    compare(&state, &sets).await.map(Json)
}

async fn best_of_n_evals(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ComparisonView>, HttpError> {
    let sets: Vec<PathBuf> = (1..)
        .map_while(|n| query.get(&format!("folder{}", n)))
        .map(|folder| state.resolve_set(folder))
        .collect();
    compare(&state, &sets).await.map(Json)
}

async fn compare(state: &AppState, sets: &[PathBuf]) -> Result<ComparisonView, HttpError> {
    let Comparison {
        set_names,
        cases,
        skipped,
    } = evals::compare_sets(&state.config.evals.inputs_dir(), sets)?;
    let mut loaded = Vec::with_capacity(cases.len());
    for case in &cases {
        loaded.push(load_compared(case).await?);
    }
    Ok(ComparisonView {
        cases: loaded,
        set_names,
        skipped,
    })
}

#[derive(Debug, Deserialize)]
struct RunEvalsBody {
    #[serde(alias = "models")]
    backends: Vec<String>,
    stack: String,
}

async fn run_evals(
    State(state): State<AppState>,
    Json(body): Json<RunEvalsBody>,
) -> Result<Json<RunEvalsReport>, HttpError> {
    if body.backends.is_empty() {
        return Err(ApiError::InvalidRequest("No backends given".to_string()).into());
    }
    let backends = body
        .backends
        .iter()
        .map(|id| id.parse::<BackendModel>())
        .collect::<Result<Vec<_>, _>>()?;
    let stack: Stack = body.stack.parse()?;

    let driver = RunEvalsDriver::new(
        state.orchestrator(),
        state.config.evals.clone(),
        state.config.credentials.clone(),
    );
    Ok(Json(driver.run(&backends, stack).await?))
}

async fn models() -> Json<Catalog> {
    Json(catalog())
}

async fn screenshot(
    State(state): State<AppState>,
    Json(request): Json<ScreenshotRequest>,
) -> Result<Json<ScreenshotResponse>, HttpError> {
    let api_key = request
        .api_key
        .filter(|key| !key.trim().is_empty())
        .or_else(|| state.config.screenshot.api_key.clone())
        .ok_or_else(|| ApiError::InvalidRequest("No screenshot API key provided".to_string()))?;
    let url = state.screenshots.capture(&request.url, &api_key).await?;
    Ok(Json(ScreenshotResponse { url }))
}

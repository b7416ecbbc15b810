use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use agent_protocol::api::{
    AllowDirRequest, AllowDirResponse, HealthResponse, RunRequest, RunResponse,
    ADD_ALLOWED_DIR_PATH, HEALTH_PATH, RUN_PATH, RUN_STREAM_PATH,
};
use agent_protocol::{FrameType, StreamEvent};
use agent_provider::RunProvider;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, instrument, warn};

use crate::allowlist::AllowList;
use crate::config::ServerConfig;
use crate::dispatch::BuiltinDispatcher;
use crate::multiplexer::{EventMultiplexer, TurnOutcome};
use crate::subagent::SubagentSpawner;
use crate::tools::ToolRegistry;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared, immutable handler state. The allowlist is the only mutable part
/// and is shared across all requests.
#[derive(Debug, Clone)]
pub struct AppState {
    multiplexer: Arc<EventMultiplexer>,
    allowlist: AllowList,
}

impl AppState {
    /// Wires the full tool set, sub-agents included, around `provider`.
    pub fn new(provider: Arc<dyn RunProvider>, allowlist: AllowList, config: &ServerConfig) -> Self {
        let spawner = SubagentSpawner::new(
            Arc::clone(&provider),
            config.instructions.clone(),
            config.max_tool_phases,
        );
        let dispatcher = BuiltinDispatcher::new(ToolRegistry::full(), allowlist.clone(), config.policy)
            .with_subagents(spawner);
        let multiplexer = EventMultiplexer::new(provider, Arc::new(dispatcher), config.instructions.clone())
            .with_policy(config.policy)
            .with_max_tool_phases(config.max_tool_phases);

        Self::from_parts(Arc::new(multiplexer), allowlist)
    }

    pub fn from_parts(multiplexer: Arc<EventMultiplexer>, allowlist: AllowList) -> Self {
        Self {
            multiplexer,
            allowlist,
        }
    }

    pub fn allowlist(&self) -> &AllowList {
        &self.allowlist
    }

    /// Parses a run body and checks it against the outer ceiling.
    fn admit(&self, body: &str) -> Result<RunRequest, Rejection> {
        let parsed = serde_json::from_str::<RunRequest>(body);
        if let Err(error) = self.multiplexer.policy().validate_request(body) {
            return Err(Rejection {
                message: format!("request rejected: {error}"),
                history: parsed.map(|request| request.history).unwrap_or_default(),
            });
        }
        parsed.map_err(|error| Rejection {
            message: format!("invalid request body: {error}"),
            history: String::new(),
        })
    }
}

struct Rejection {
    message: String,
    history: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(RUN_PATH, post(run))
        .route(RUN_STREAM_PATH, post(run_stream))
        .route(ADD_ALLOWED_DIR_PATH, post(add_allowed_dir))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_listener(listener, state).await
}

/// Serves on an already-bound listener until Ctrl-C.
pub async fn serve_listener(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    match listener.local_addr() {
        Ok(addr) => info!(%addr, "agent server ready to accept connections"),
        Err(error) => warn!(%error, "agent server listening on an unknown address"),
    }

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[instrument(skip_all)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let profile = state.multiplexer.profile();
    Json(HealthResponse {
        status: "ok".to_string(),
        provider: profile.provider_id,
        model: profile.model_id,
    })
}

#[instrument(skip_all)]
async fn run(State(state): State<AppState>, body: String) -> Json<RunResponse> {
    let request = match state.admit(&body) {
        Ok(request) => request,
        Err(rejection) => {
            warn!(message = %rejection.message, "run request rejected");
            return Json(RunResponse::error(rejection.message, rejection.history));
        }
    };

    let inbound_history = request.history.clone();
    Json(match state.multiplexer.run_to_outcome(request).await {
        TurnOutcome::Completed { answer, history } => RunResponse::success(answer, history),
        TurnOutcome::Failed { message } => RunResponse::error(message, inbound_history),
    })
}

#[instrument(skip_all)]
async fn run_stream(
    State(state): State<AppState>,
    body: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    match state.admit(&body) {
        Ok(request) => {
            let multiplexer = Arc::clone(&state.multiplexer);
            tokio::spawn(async move {
                multiplexer.run_turn(request, sender).await;
            });
        }
        Err(rejection) => {
            warn!(message = %rejection.message, "run-stream request rejected");
            // The channel is empty, so this cannot hit a full buffer.
            let _ = sender.try_send(StreamEvent::error(rejection.message));
        }
    }

    let events = ReceiverStream::new(receiver).map(|event| Ok(sse_event(&event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_event(event: &StreamEvent) -> Event {
    match event.to_frame().and_then(|frame| frame.to_json()) {
        Ok(json) => Event::default().data(json),
        Err(error) => {
            warn!(%error, "failed to encode stream event");
            let fallback = serde_json::json!({
                "type": FrameType::Error.as_str(),
                "content": error.to_string(),
            });
            Event::default().data(fallback.to_string())
        }
    }
}

#[instrument(skip_all)]
async fn add_allowed_dir(
    State(state): State<AppState>,
    Json(request): Json<AllowDirRequest>,
) -> Json<AllowDirResponse> {
    match state.allowlist.allow(&request.path) {
        Ok(path) => {
            info!(path = %path.display(), "directory allowed");
            Json(AllowDirResponse::ok(path.to_string_lossy()))
        }
        Err(error) => {
            warn!(path = %request.path, %error, "allow-dir request rejected");
            Json(AllowDirResponse::error(error.to_string()))
        }
    }
}

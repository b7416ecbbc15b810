//! Client-side owner of conversation history.
//!
//! The server never keeps a session. Each turn ships the full encoded history
//! and, on `COMPLETE`, the returned history replaces the local copy wholesale.
//! Anything short of a decodable `COMPLETE` leaves the history untouched.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use agent_client::retry::retry_delay;
use agent_client::{AgentClient, AgentClientError, EventStream};
use agent_protocol::api::{
    AllowDirResponse, AllowDirStatus, HealthResponse, RunRequest, RunResponse, RunStatus,
};
use agent_protocol::{StreamEvent, ToolCallRecord, ToolResultRecord, Turn};
use async_trait::async_trait;
use chunk_codec::{ChunkError, ChunkPolicy};
use futures_util::stream::{FusedStream, Stream};
use futures_util::StreamExt;
use history_codec::HistoryCodecError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::launcher::ServerLauncher;

const DEFAULT_READINESS_ATTEMPTS: u32 = 5;
const DEFAULT_READINESS_DELAY: Duration = Duration::from_millis(200);

/// The calls a session makes against an agent server.
#[async_trait]
pub trait TurnTransport: Send + Sync {
    async fn health(&self) -> Result<HealthResponse, AgentClientError>;

    async fn open_stream(&self, request: &RunRequest) -> Result<EventStream, AgentClientError>;

    async fn run(&self, request: &RunRequest) -> Result<RunResponse, AgentClientError>;

    async fn add_allowed_dir(&self, path: &str) -> Result<AllowDirResponse, AgentClientError>;
}

#[async_trait]
impl TurnTransport for AgentClient {
    async fn health(&self) -> Result<HealthResponse, AgentClientError> {
        AgentClient::health(self).await
    }

    async fn open_stream(&self, request: &RunRequest) -> Result<EventStream, AgentClientError> {
        self.run_stream(request).await
    }

    async fn run(&self, request: &RunRequest) -> Result<RunResponse, AgentClientError> {
        AgentClient::run(self, request).await
    }

    async fn add_allowed_dir(&self, path: &str) -> Result<AllowDirResponse, AgentClientError> {
        AgentClient::add_allowed_dir(self, path).await
    }
}

#[async_trait]
impl<T: TurnTransport + ?Sized> TurnTransport for Arc<T> {
    async fn health(&self) -> Result<HealthResponse, AgentClientError> {
        (**self).health().await
    }

    async fn open_stream(&self, request: &RunRequest) -> Result<EventStream, AgentClientError> {
        (**self).open_stream(request).await
    }

    async fn run(&self, request: &RunRequest) -> Result<RunResponse, AgentClientError> {
        (**self).run(request).await
    }

    async fn add_allowed_dir(&self, path: &str) -> Result<AllowDirResponse, AgentClientError> {
        (**self).add_allowed_dir(path).await
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request too large to send: {source}. {hint}")]
    SizeExceeded {
        #[source]
        source: ChunkError,
        hint: String,
    },

    #[error("agent server unreachable after {attempts} attempts: {source}")]
    ServerUnreachable {
        attempts: u32,
        #[source]
        source: AgentClientError,
    },

    #[error("failed to launch agent server: {0}")]
    Launch(#[source] std::io::Error),

    #[error("cannot allow {}: {reason}", path.display())]
    AllowDir { path: PathBuf, reason: String },

    #[error(transparent)]
    History(#[from] HistoryCodecError),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] AgentClientError),
}

impl SessionError {
    #[must_use]
    pub fn allow_dir(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AllowDir {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Tool activity seen during a turn. Shown to the user, never stored as history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolActivity {
    Called(ToolCallRecord),
    Finished(ToolResultRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { answer: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Readiness {
    attempts: u32,
    base_delay: Duration,
}

pub struct SessionController<T> {
    transport: T,
    history: Vec<Turn>,
    policy: ChunkPolicy,
    allowed_dirs: Vec<PathBuf>,
    launcher: Option<Box<dyn ServerLauncher>>,
    readiness: Readiness,
}

impl<T> std::fmt::Debug for SessionController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("turns", &self.history.len())
            .field("policy", &self.policy)
            .field("allowed_dirs", &self.allowed_dirs)
            .field("has_launcher", &self.launcher.is_some())
            .finish()
    }
}

impl<T: TurnTransport> SessionController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            history: Vec::new(),
            policy: ChunkPolicy::default(),
            allowed_dirs: Vec::new(),
            launcher: None,
            readiness: Readiness {
                attempts: DEFAULT_READINESS_ATTEMPTS,
                base_delay: DEFAULT_READINESS_DELAY,
            },
        }
    }

    pub fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_launcher(mut self, launcher: impl ServerLauncher + 'static) -> Self {
        self.launcher = Some(Box::new(launcher));
        self
    }

    /// Health probes per readiness wait, and the delay before the first retry.
    pub fn with_readiness(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.readiness = Readiness {
            attempts: attempts.max(1),
            base_delay,
        };
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn allowed_dirs(&self) -> &[PathBuf] {
        &self.allowed_dirs
    }

    /// Waits for the server to answer health checks, launching it once when a
    /// launcher is configured, then re-registers known allowed directories.
    pub async fn initialize(&mut self) -> Result<HealthResponse, SessionError> {
        let health = match self.wait_until_ready().await {
            Ok(health) => health,
            Err(error) if error.is_unreachable() => match self.launcher.as_mut() {
                Some(launcher) => {
                    info!("agent server not reachable; launching it");
                    launcher.launch().map_err(SessionError::Launch)?;
                    self.wait_until_ready()
                        .await
                        .map_err(|source| self.unreachable(source))?
                }
                None => return Err(self.unreachable(error)),
            },
            Err(error) => return Err(SessionError::Transport(error)),
        };

        self.resync_allowed_dirs().await;
        info!(provider = %health.provider, model = %health.model, "agent server ready");
        Ok(health)
    }

    async fn wait_until_ready(&self) -> Result<HealthResponse, AgentClientError> {
        let mut attempt = 0;
        loop {
            match self.transport.health().await {
                Ok(health) => return Ok(health),
                Err(error) if error.is_unreachable() && attempt + 1 < self.readiness.attempts => {
                    debug!(attempt, %error, "agent server not ready");
                    tokio::time::sleep(retry_delay(self.readiness.base_delay, attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn unreachable(&self, source: AgentClientError) -> SessionError {
        SessionError::ServerUnreachable {
            attempts: self.readiness.attempts,
            source,
        }
    }

    async fn resync_allowed_dirs(&self) {
        for dir in &self.allowed_dirs {
            let path = dir.to_string_lossy();
            match self.transport.add_allowed_dir(&path).await {
                Ok(response) if response.status == AllowDirStatus::Ok => {}
                Ok(response) => warn!(
                    path = %path,
                    message = response.message.as_deref().unwrap_or_default(),
                    "server refused a previously allowed directory"
                ),
                Err(error) => warn!(path = %path, %error, "failed to re-register allowed directory"),
            }
        }
    }

    /// Builds the request for `prompt`, refusing it locally when it could
    /// never be accepted by the server. A prompt is not an insertion, so only
    /// the whole request body is held to the outer ceiling.
    fn prepare_request(&self, prompt: &str) -> Result<RunRequest, SessionError> {
        let request = RunRequest::new(prompt, history_codec::encode(&self.history)?);
        let body = serde_json::to_string(&request)?;
        self.policy
            .validate_request(&body)
            .map_err(|source| self.size_exceeded(source))?;
        Ok(request)
    }

    fn size_exceeded(&self, source: ChunkError) -> SessionError {
        let hint = self.policy.recovery_hint(&source);
        SessionError::SizeExceeded { source, hint }
    }

    /// Starts one agent turn and returns its events as a lazy stream.
    ///
    /// Size limits are checked before anything is sent; a rejected prompt
    /// costs no network call.
    pub async fn send_turn(&mut self, prompt: &str) -> Result<TurnStream<'_>, SessionError> {
        let request = self.prepare_request(prompt)?;
        debug!(turns = self.history.len(), "opening turn stream");
        let events = self.transport.open_stream(&request).await?;
        Ok(TurnStream::new(&mut self.history, events))
    }

    /// Drives a whole turn, handing every event to `on_event` in order.
    pub async fn run_turn<F>(&mut self, prompt: &str, mut on_event: F) -> Result<TurnOutcome, SessionError>
    where
        F: FnMut(&StreamEvent),
    {
        let mut stream = self.send_turn(prompt).await?;
        let mut outcome = None;
        while let Some(event) = stream.next().await {
            on_event(&event);
            match &event {
                StreamEvent::Complete { .. } => {
                    outcome = Some(TurnOutcome::Completed {
                        answer: stream.pending_answer().to_string(),
                    });
                }
                StreamEvent::Error { message } => {
                    outcome = Some(TurnOutcome::Failed {
                        message: message.clone(),
                    });
                }
                StreamEvent::ToolPhaseStart
                | StreamEvent::ToolCall(_)
                | StreamEvent::ToolResult(_)
                | StreamEvent::ToolPhaseEnd
                | StreamEvent::Chunk { .. } => {}
            }
        }

        Ok(outcome.unwrap_or_else(|| TurnOutcome::Failed {
            message: STREAM_ENDED_MESSAGE.to_string(),
        }))
    }

    /// Runs a turn through the non-streaming endpoint.
    pub async fn send_prompt(&mut self, prompt: &str) -> Result<TurnOutcome, SessionError> {
        let request = self.prepare_request(prompt)?;
        let response = self.transport.run(&request).await?;

        Ok(match response.status {
            RunStatus::Success => match history_codec::decode(&response.history) {
                Ok(history) => {
                    self.history = history;
                    TurnOutcome::Completed {
                        answer: response.output,
                    }
                }
                Err(error) => TurnOutcome::Failed {
                    message: error.to_string(),
                },
            },
            RunStatus::Error => TurnOutcome::Failed {
                message: response.output,
            },
        })
    }

    /// Grants the server's tools access to `path` and remembers it for
    /// re-registration after a reconnect.
    pub async fn add_allowed_dir(&mut self, path: impl AsRef<Path>) -> Result<PathBuf, SessionError> {
        let path = path.as_ref();
        let resolved = std::fs::canonicalize(path)
            .map_err(|error| SessionError::allow_dir(path, error.to_string()))?;
        if !resolved.is_dir() {
            return Err(SessionError::allow_dir(path, "not a directory"));
        }

        let response = self
            .transport
            .add_allowed_dir(&resolved.to_string_lossy())
            .await?;
        match response.status {
            AllowDirStatus::Ok => {
                if !self.allowed_dirs.contains(&resolved) {
                    self.allowed_dirs.push(resolved.clone());
                }
                Ok(resolved)
            }
            AllowDirStatus::Error => Err(SessionError::allow_dir(
                resolved,
                response
                    .message
                    .unwrap_or_else(|| "rejected by server".to_string()),
            )),
        }
    }
}

const STREAM_ENDED_MESSAGE: &str = "connection closed before the turn completed";

/// Events of one agent turn. Finite and single-use: exactly one terminal
/// event is yielded, then the stream ends.
pub struct TurnStream<'a> {
    history: &'a mut Vec<Turn>,
    events: Option<EventStream>,
    answer: String,
    activity: Vec<ToolActivity>,
}

impl<'a> TurnStream<'a> {
    fn new(history: &'a mut Vec<Turn>, events: EventStream) -> Self {
        Self {
            history,
            events: Some(events),
            answer: String::new(),
            activity: Vec::new(),
        }
    }

    /// Answer text received so far.
    pub fn pending_answer(&self) -> &str {
        &self.answer
    }

    pub fn activity(&self) -> &[ToolActivity] {
        &self.activity
    }

    fn accept(&mut self, event: StreamEvent) -> StreamEvent {
        match &event {
            StreamEvent::ToolPhaseStart | StreamEvent::ToolPhaseEnd => {}
            StreamEvent::ToolCall(record) => {
                self.activity.push(ToolActivity::Called(record.clone()));
            }
            StreamEvent::ToolResult(record) => {
                self.activity.push(ToolActivity::Finished(record.clone()));
            }
            StreamEvent::Chunk { text } => self.answer.push_str(text),
            StreamEvent::Complete { history } => {
                self.events = None;
                match history_codec::decode(history) {
                    Ok(history) => *self.history = history,
                    Err(error) => {
                        warn!(%error, "discarding undecodable history from server");
                        return StreamEvent::error(error.to_string());
                    }
                }
            }
            StreamEvent::Error { .. } => self.events = None,
        }
        event
    }

    fn fail(&mut self, message: String) -> StreamEvent {
        self.events = None;
        StreamEvent::Error { message }
    }
}

impl Stream for TurnStream<'_> {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(events) = this.events.as_mut() else {
            return Poll::Ready(None);
        };

        match events.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(this.accept(event))),
            Poll::Ready(Some(Err(error))) => {
                Poll::Ready(Some(this.fail(format!("transport error: {error}"))))
            }
            Poll::Ready(None) => Poll::Ready(Some(this.fail(STREAM_ENDED_MESSAGE.to_string()))),
        }
    }
}

impl FusedStream for TurnStream<'_> {
    fn is_terminated(&self) -> bool {
        self.events.is_none()
    }
}

impl std::fmt::Debug for TurnStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("answer", &self.answer)
            .field("activity", &self.activity)
            .field("finished", &self.events.is_none())
            .finish()
    }
}

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use agent_protocol::api::{
    AllowDirRequest, AllowDirResponse, HealthResponse, RunRequest, RunResponse,
    ADD_ALLOWED_DIR_PATH, HEALTH_PATH, RUN_PATH, RUN_STREAM_PATH,
};
use agent_protocol::StreamEvent;
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::AgentClientConfig;
use crate::error::{status_message, AgentClientError};
use crate::retry::{is_retryable_http_error, is_retryable_transport_error, retry_delay};
use crate::sse::SseFrameParser;
use crate::url::{endpoint_url, normalize_base_url};

/// Typed events of one `/run-stream` response, in arrival order.
pub type EventStream = BoxStream<'static, Result<StreamEvent, AgentClientError>>;

/// HTTP client for the agent server endpoints.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: Client,
    config: AgentClientConfig,
    base_url: String,
}

impl AgentClient {
    pub fn new(config: AgentClientConfig) -> Result<Self, AgentClientError> {
        let base_url = normalize_base_url(&config.base_url);
        reqwest::Url::parse(&base_url)
            .map_err(|error| AgentClientError::InvalidBaseUrl(format!("{base_url}: {error}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(AgentClientError::from)?;
        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    pub fn config(&self) -> &AgentClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        endpoint_url(&self.base_url, path)
    }

    /// Single readiness probe. Callers that wait for a server to come up
    /// own the polling loop.
    pub async fn health(&self) -> Result<HealthResponse, AgentClientError> {
        let response = self.http.get(self.endpoint(HEALTH_PATH)).send().await?;
        read_json(response).await
    }

    /// Blocking-style turn: the server collapses the event stream into one
    /// [`RunResponse`].
    pub async fn run(&self, request: &RunRequest) -> Result<RunResponse, AgentClientError> {
        let url = self.endpoint(RUN_PATH);
        let response = self
            .send_with_retry(|| self.http.post(&url).json(request))
            .await?;
        read_json(response).await
    }

    /// Open `/run-stream` and decode its frames as they arrive.
    pub async fn run_stream(&self, request: &RunRequest) -> Result<EventStream, AgentClientError> {
        let url = self.endpoint(RUN_STREAM_PATH);
        let response = self
            .send_with_retry(|| self.http.post(&url).json(request))
            .await?;
        Ok(decode_event_stream(response.bytes_stream()))
    }

    pub async fn add_allowed_dir(
        &self,
        path: impl Into<String>,
    ) -> Result<AllowDirResponse, AgentClientError> {
        let url = self.endpoint(ADD_ALLOWED_DIR_PATH);
        let body = AllowDirRequest { path: path.into() };
        let response = self
            .send_with_retry(|| self.http.post(&url).json(&body))
            .await?;
        read_json(response).await
    }

    /// Retries transient statuses and connection failures. A request that
    /// failed any other way may have reached the server and is not resent.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, AgentClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_retries = self.config.max_retries;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    last_status = Some(status);
                    let body = response.text().await.unwrap_or_default();
                    let message = status_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < max_retries && is_retryable_http_error(status.as_u16()) {
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(AgentClientError::Status(status, message));
                }
                Err(error) => {
                    let chain = error_chain_text(&error);
                    if !error.is_connect() && !is_retryable_transport_error(&chain) {
                        return Err(AgentClientError::Request(error));
                    }
                    last_error = Some(chain);
                    if attempt < max_retries {
                        self.backoff(attempt).await;
                        continue;
                    }
                }
            }
        }

        Err(AgentClientError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    async fn backoff(&self, attempt: u32) {
        let delay: Duration = retry_delay(self.config.retry_base_delay, attempt);
        tokio::time::sleep(delay).await;
    }
}

/// `error` and each of its sources, joined the way they are logged.
fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AgentClientError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AgentClientError::Status(status, status_message(status, &body)));
    }
    Ok(serde_json::from_str(&body)?)
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    parser: SseFrameParser,
    pending: VecDeque<Result<StreamEvent, AgentClientError>>,
    finished: bool,
}

/// Turn a raw SSE byte stream into typed events. A transport error or a
/// malformed frame is yielded in place and the stream keeps its order.
pub fn decode_event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<AgentClientError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        parser: SseFrameParser::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.parser.feed(chunk.as_ref());
                    state
                        .pending
                        .extend(events.into_iter().map(|event| event.map_err(Into::into)));
                }
                Some(Err(error)) => {
                    state.finished = true;
                    state.pending.push_back(Err(error.into()));
                }
                None => {
                    state.finished = true;
                    if let Some(event) = state.parser.finish() {
                        state.pending.push_back(event.map_err(Into::into));
                    }
                }
            }
        }
    })
    .boxed()
}

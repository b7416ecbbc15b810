#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use agent_client::{AgentClientError, EventStream};
use agent_protocol::api::{AllowDirResponse, HealthResponse, RunRequest, RunResponse};
use agent_protocol::StreamEvent;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use glod::{ServerLauncher, TurnTransport};

/// Transport double with scripted replies and call counters.
#[derive(Default)]
pub struct FakeTransport {
    streams: Mutex<VecDeque<Vec<Result<StreamEvent, AgentClientError>>>>,
    runs: Mutex<VecDeque<RunResponse>>,
    health: Mutex<VecDeque<Result<HealthResponse, AgentClientError>>>,
    requests: Mutex<Vec<RunRequest>>,
    allowed: Mutex<Vec<String>>,
    pub stream_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_stream(&self, events: Vec<StreamEvent>) {
        self.push_raw_stream(events.into_iter().map(Ok).collect());
    }

    pub fn push_raw_stream(&self, items: Vec<Result<StreamEvent, AgentClientError>>) {
        lock_unpoisoned(&self.streams).push_back(items);
    }

    pub fn push_run(&self, response: RunResponse) {
        lock_unpoisoned(&self.runs).push_back(response);
    }

    pub fn push_health(&self, result: Result<HealthResponse, AgentClientError>) {
        lock_unpoisoned(&self.health).push_back(result);
    }

    pub fn requests(&self) -> Vec<RunRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    pub fn allowed(&self) -> Vec<String> {
        lock_unpoisoned(&self.allowed).clone()
    }

    pub fn network_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst) + self.run_calls.load(Ordering::SeqCst)
    }
}

pub fn healthy() -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        provider: "fake".to_string(),
        model: "fake-model".to_string(),
    }
}

pub fn unreachable() -> AgentClientError {
    AgentClientError::RetryExhausted {
        status: None,
        last_error: Some("connection refused".to_string()),
    }
}

#[async_trait]
impl TurnTransport for FakeTransport {
    async fn health(&self) -> Result<HealthResponse, AgentClientError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.health)
            .pop_front()
            .unwrap_or_else(|| Ok(healthy()))
    }

    async fn open_stream(&self, request: &RunRequest) -> Result<EventStream, AgentClientError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.requests).push(request.clone());
        let items = lock_unpoisoned(&self.streams)
            .pop_front()
            .expect("a scripted stream for every turn");
        Ok(stream::iter(items).boxed())
    }

    async fn run(&self, request: &RunRequest) -> Result<RunResponse, AgentClientError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.requests).push(request.clone());
        Ok(lock_unpoisoned(&self.runs)
            .pop_front()
            .expect("a scripted response for every run"))
    }

    async fn add_allowed_dir(&self, path: &str) -> Result<AllowDirResponse, AgentClientError> {
        lock_unpoisoned(&self.allowed).push(path.to_string());
        Ok(AllowDirResponse::ok(path))
    }
}

/// Launcher double that makes the fake server healthy once launched.
pub struct FakeLauncher {
    pub transport: Arc<FakeTransport>,
    pub launches: Arc<AtomicUsize>,
}

impl ServerLauncher for FakeLauncher {
    fn launch(&mut self) -> io::Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.transport.health).clear();
        Ok(())
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

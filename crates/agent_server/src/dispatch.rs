use agent_provider::{ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use chunk_codec::ChunkPolicy;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::allowlist::AllowList;
use crate::executor::{BuiltinToolExecutor, ToolOutput};
use crate::subagent::SubagentSpawner;
use crate::tools::{BuiltinTool, SpawnSubagentArgs, ToolCall, ToolRegistry};

/// Infrastructure failure while running a tool. Unlike a failed
/// [`ToolOutput`], this ends the agent turn.
#[derive(Debug, Error)]
pub enum ToolDispatchError {
    #[error("tool worker for {tool_name} failed: {source}")]
    Worker {
        tool_name: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Host side of tool calling: advertises tools and runs them.
#[async_trait]
pub trait ToolDispatcher: Send + Sync + 'static {
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn dispatch(&self, call: ToolCallRequest) -> Result<ToolOutput, ToolDispatchError>;
}

/// [`ToolDispatcher`] over the built-in file, git and sub-agent tools.
#[derive(Debug, Clone)]
pub struct BuiltinDispatcher {
    registry: ToolRegistry,
    executor: BuiltinToolExecutor,
    subagents: Option<SubagentSpawner>,
}

impl BuiltinDispatcher {
    pub fn new(registry: ToolRegistry, allowlist: AllowList, policy: ChunkPolicy) -> Self {
        Self::with_executor(registry, BuiltinToolExecutor::new(allowlist, policy))
    }

    pub fn with_executor(registry: ToolRegistry, executor: BuiltinToolExecutor) -> Self {
        Self {
            registry,
            executor,
            subagents: None,
        }
    }

    /// Enables `spawn_subagent` when the registry includes it.
    #[must_use]
    pub fn with_subagents(mut self, spawner: SubagentSpawner) -> Self {
        self.subagents = Some(spawner);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &BuiltinToolExecutor {
        &self.executor
    }

    fn preflight(&self, call: &ToolCallRequest) -> Result<(), ToolOutput> {
        let policy = self.executor.policy();
        let payload = Value::Object(call.arguments.clone()).to_string();
        policy.validate_request(&payload).map_err(|error| {
            ToolOutput::fail(format!(
                "tool call rejected: {error}. {}",
                policy.recovery_hint(&error)
            ))
        })
    }

    async fn spawn_subagent(&self, call: &ToolCallRequest) -> ToolOutput {
        let Some(spawner) = &self.subagents else {
            return ToolOutput::fail("spawn_subagent is not available here");
        };
        let args = match SpawnSubagentArgs::parse(&call.arguments) {
            Ok(args) => args,
            Err(message) => return ToolOutput::fail(message),
        };
        spawner.run(args, &self.registry, &self.executor).await
    }
}

#[async_trait]
impl ToolDispatcher for BuiltinDispatcher {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.registry.definitions();
        if self.subagents.is_none() {
            definitions.retain(|definition| definition.name != BuiltinTool::SpawnSubagent.name());
        }
        definitions
    }

    async fn dispatch(&self, call: ToolCallRequest) -> Result<ToolOutput, ToolDispatchError> {
        debug!(call_id = %call.call_id, tool = %call.tool_name, "dispatching tool call");

        let Some(tool) = self.registry.get(&call.tool_name) else {
            warn!(tool = %call.tool_name, "unknown tool requested");
            return Ok(ToolOutput::fail(format!("unknown tool: {}", call.tool_name)));
        };
        if let Err(rejected) = self.preflight(&call) {
            warn!(tool = %call.tool_name, "tool call arguments over size limit");
            return Ok(rejected);
        }

        let output = if tool == BuiltinTool::SpawnSubagent {
            self.spawn_subagent(&call).await
        } else {
            match ToolCall::parse(tool, &call.arguments) {
                Ok(parsed) => {
                    let executor = self.executor.clone();
                    tokio::task::spawn_blocking(move || executor.execute(parsed))
                        .await
                        .map_err(|source| ToolDispatchError::Worker {
                            tool_name: call.tool_name.clone(),
                            source,
                        })?
                }
                Err(message) => ToolOutput::fail(message),
            }
        };

        if !output.ok {
            warn!(call_id = %call.call_id, tool = %call.tool_name, "tool call failed");
        }
        Ok(output)
    }
}

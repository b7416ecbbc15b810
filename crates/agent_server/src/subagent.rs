use std::fmt;
use std::sync::Arc;

use agent_protocol::api::RunRequest;
use agent_provider::RunProvider;
use history_codec::EMPTY_HISTORY;
use tracing::{info, warn};

use crate::dispatch::BuiltinDispatcher;
use crate::executor::{BuiltinToolExecutor, ToolOutput};
use crate::multiplexer::{EventMultiplexer, TurnOutcome};
use crate::tools::{SpawnSubagentArgs, ToolRegistry};

/// Runs `spawn_subagent` calls as fresh, history-less agent turns.
///
/// Sub-agents never see `spawn_subagent` themselves, so nesting stops at one level.
#[derive(Clone)]
pub struct SubagentSpawner {
    provider: Arc<dyn RunProvider>,
    instructions: String,
    max_tool_phases: usize,
}

impl fmt::Debug for SubagentSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubagentSpawner")
            .field("provider", &self.provider.profile())
            .field("max_tool_phases", &self.max_tool_phases)
            .finish_non_exhaustive()
    }
}

impl SubagentSpawner {
    pub fn new(
        provider: Arc<dyn RunProvider>,
        instructions: impl Into<String>,
        max_tool_phases: usize,
    ) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
            max_tool_phases,
        }
    }

    pub async fn run(
        &self,
        args: SpawnSubagentArgs,
        parent: &ToolRegistry,
        executor: &BuiltinToolExecutor,
    ) -> ToolOutput {
        let registry = match parent.restrict(&args.tool_names) {
            Ok(registry) => registry,
            Err(invalid) => {
                warn!(?invalid, "sub-agent requested tools outside its ceiling");
                return ToolOutput::fail(format!("invalid tool names: {invalid:?}"));
            }
        };

        let prompt = match args.context.as_deref().map(str::trim) {
            Some(context) if !context.is_empty() => format!("{context}\n\n{}", args.prompt),
            _ => args.prompt,
        };

        info!(tools = ?registry.names(), "starting sub-agent");
        let dispatcher = BuiltinDispatcher::with_executor(registry, executor.clone());
        let multiplexer = EventMultiplexer::new(
            Arc::clone(&self.provider),
            Arc::new(dispatcher),
            self.instructions.clone(),
        )
        .with_policy(*executor.policy())
        .with_max_tool_phases(self.max_tool_phases);

        match multiplexer
            .run_to_outcome(RunRequest::new(prompt, EMPTY_HISTORY))
            .await
        {
            TurnOutcome::Completed { answer, .. } => ToolOutput::ok(answer),
            TurnOutcome::Failed { message } => ToolOutput::fail(format!("sub-agent failed: {message}")),
        }
    }
}

use anyhow::Result;
use futures::stream::BoxStream;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::Provider;
use crate::systems::System;

pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    instructions: String,
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
    max_iterations: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider and base instructions
    pub fn new<S: Into<String>>(provider: Box<dyn Provider>, instructions: S) -> Self {
        Self {
            instructions: instructions.into(),
            systems: Vec::new(),
            provider,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Cap the number of model calls a single reply may make
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// Get all tools from all systems with proper system prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for system in &self.systems {
            for tool in system.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", system.name(), tool.name),
                    &tool.description,
                    tool.input_schema.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate system for a tool call based on the prefixed name
    fn get_system_for_tool(&self, prefixed_name: &str) -> Option<&dyn System> {
        let parts: Vec<&str> = prefixed_name.split("__").collect();
        if parts.len() != 2 {
            return None;
        }
        let system_name = parts[0];
        self.systems
            .iter()
            .find(|sys| sys.name() == system_name)
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(
        &self,
        tool_call: AgentResult<ToolCall>,
    ) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let tool_name = call
            .name
            .split("__")
            .nth(1)
            .ok_or_else(|| AgentError::InvalidToolName(call.name.clone()))?;
        let system_tool_call = ToolCall::new(tool_name, call.arguments);

        system.call(system_tool_call).await
    }

    fn get_system_prompt(&self) -> String {
        let mut prompt = self.instructions.clone();
        for system in &self.systems {
            prompt.push_str(&format!(
                "\n\n## {}\n{}\n\n{}",
                system.name(),
                system.description(),
                system.instructions()
            ));
        }
        prompt
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    /// The stream ends with an error once the model call cap is reached.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<Message>>> {
        let mut messages = messages.to_vec();
        let tools = self.get_prefixed_tools();
        let system_prompt = self.get_system_prompt();

        Ok(Box::pin(async_stream::try_stream! {
            let mut remaining = self.max_iterations;
            loop {
                if remaining == 0 {
                    let capped: AgentResult<()> =
                        Err(AgentError::MaxIterationsReached(self.max_iterations));
                    capped?;
                }
                remaining -= 1;

                // Get completion from provider
                let (response, _usage) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;

                // Yield the assistant's response
                yield response.clone();

                // Ensure the message above reaches the consumer before the
                // following potentially long-running tool calls start
                tokio::task::yield_now().await;

                // First collect any tool requests
                let tool_requests: Vec<&ToolRequest> = response.content
                    .iter()
                    .filter_map(|content| content.as_tool_request())
                    .collect();

                if tool_requests.is_empty() {
                    // No more tool calls, end the reply loop
                    break;
                }

                // Then dispatch each in parallel
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();

                // Process all the futures in parallel but wait until all are finished
                let outputs = futures::future::join_all(futures).await;

                // Combine the results into one tool response message,
                // keyed by the original request ids
                let mut message_tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield message_tool_response.clone();

                messages.push(response);
                messages.push(message_tool_response);
            }
        }))
    }
}

use crate::application::dispatch::ToolDispatcher;
use crate::application::history::ConversationHistory;
use crate::application::parser::{AgentStep, ResponseParser};
use crate::domain::tool::{ToolCallRequest, ToolDefinition, ToolResult};
use crate::domain::types::{ChatMessage, MessageRole};
use crate::infrastructure::model::{ModelError, ModelProvider, ModelRequest};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const COULD_NOT_COMPLETE: &str =
    "Sorry, the maximum number of tool iterations was exceeded. Please rephrase your request.";

#[derive(Debug, Clone)]
pub struct AgentDefaults {
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_iterations: usize,
}

/// One inbound request to the agent loop. Unset fields fall back to the
/// configured defaults.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub session_id: Option<String>,
    pub temperature: Option<f64>,
    pub max_iterations: Option<usize>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            system_prompt: None,
            session_id: None,
            temperature: None,
            max_iterations: None,
        }
    }
}

/// Trace of one executed tool call, surfaced to callers alongside the final
/// answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AgentStepRecord {
    pub tool: String,
    #[schema(value_type = Object)]
    pub arguments: Value,
    pub success: bool,
    #[schema(value_type = Object)]
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentStepRecord {
    fn from_execution(call: &ToolCallRequest, result: ToolResult) -> Self {
        Self {
            tool: call.name.clone(),
            arguments: Value::Object(call.arguments.clone()),
            success: result.success,
            output: result.result.unwrap_or(Value::Null),
            error: result.error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub session_id: String,
    pub answer: String,
    pub steps: Vec<AgentStepRecord>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(err) => err.user_message(),
        }
    }
}

/// The agentic control loop: ask the model what to do next, execute any
/// requested tool calls through the dispatcher, feed the results back, and
/// repeat until a final answer or the iteration bound.
///
/// Holds no per-request state; each `run` owns its own message sequence.
pub struct Orchestrator<P: ModelProvider> {
    provider: P,
    dispatcher: Arc<ToolDispatcher>,
    history: Arc<ConversationHistory>,
    parser: ResponseParser,
    defaults: AgentDefaults,
}

impl<P: ModelProvider> Orchestrator<P> {
    pub fn new(
        provider: P,
        dispatcher: Arc<ToolDispatcher>,
        history: Arc<ConversationHistory>,
        defaults: AgentDefaults,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            history,
            parser: ResponseParser::new(),
            defaults,
        }
    }

    pub fn dispatcher(&self) -> Arc<ToolDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub async fn run(&self, request: AgentRequest) -> Result<AgentOutcome, AgentError> {
        let session_id = request.session_id.clone().unwrap_or_else(new_session_id);
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.defaults.model.clone());
        let temperature = request.temperature.or(self.defaults.temperature);
        let max_iterations = request
            .max_iterations
            .unwrap_or(self.defaults.max_iterations)
            .max(1);

        let catalogue = self.dispatcher.all_definitions().await;
        info!(
            session_id = session_id.as_str(),
            tools = catalogue.len(),
            "Agent run started"
        );

        let custom = request
            .system_prompt
            .clone()
            .or_else(|| self.defaults.system_prompt.clone());
        let system_prompt = compose_system_prompt(&catalogue, custom.as_deref());

        let mut messages = Vec::new();
        messages.push(ChatMessage::new(MessageRole::System, system_prompt));
        messages.extend(self.history.history(&session_id).await);
        messages.push(ChatMessage::new(MessageRole::User, request.prompt.clone()));

        let mut steps: Vec<AgentStepRecord> = Vec::new();

        for iteration in 1..=max_iterations {
            debug!(iteration, "Tool loop iteration");
            let response = self
                .provider
                .chat(ModelRequest {
                    model: model.clone(),
                    messages: messages.clone(),
                    temperature,
                    max_tokens: self.defaults.max_tokens,
                })
                .await?;
            let raw = response.message.content;

            match self.parser.parse(&raw) {
                AgentStep::Final { answer } => {
                    info!(iteration, "Got final answer");
                    self.history
                        .append_exchange(&session_id, &request.prompt, &answer)
                        .await;
                    return Ok(AgentOutcome {
                        session_id,
                        answer,
                        steps,
                    });
                }
                AgentStep::Tool { calls } => {
                    info!(iteration, count = calls.len(), "Model requested tool calls");
                    messages.push(ChatMessage::new(MessageRole::Assistant, raw.clone()));

                    // Independent calls run concurrently; join_all keeps the
                    // request order, which the appended transcript must match.
                    let executions = join_all(
                        calls
                            .iter()
                            .map(|call| self.dispatcher.route(&call.name, call.arguments.clone())),
                    )
                    .await;

                    let mut block = String::from("Tool execution results:\n\n");
                    for (call, result) in calls.iter().zip(executions) {
                        block.push_str(&format!(
                            "TOOL_RESULT {}:\n{}\n\n",
                            call.name,
                            render_result(&result)
                        ));
                        steps.push(AgentStepRecord::from_execution(call, result));
                    }
                    messages.push(ChatMessage::new(
                        MessageRole::Tool,
                        block.trim_end().to_string(),
                    ));
                }
            }
        }

        warn!(max_iterations, "Max iterations reached in tool loop");
        let answer = COULD_NOT_COMPLETE.to_string();
        self.history
            .append_exchange(&session_id, &request.prompt, &answer)
            .await;
        Ok(AgentOutcome {
            session_id,
            answer,
            steps,
        })
    }
}

fn render_result(result: &ToolResult) -> String {
    if result.success {
        let value = result.result.clone().unwrap_or(Value::Null);
        serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
    } else {
        format!(
            "ERROR: {}",
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}

fn compose_system_prompt(catalogue: &[ToolDefinition], custom: Option<&str>) -> String {
    let mut lines = vec![
        "You are an autonomous assistant that can call tools to solve user requests.".to_string(),
        "Every response must be a single JSON object without commentary or code fences.".to_string(),
        r#"To call tools, respond with: {"step":"tool","tool_calls":[{"name":"server:tool","arguments":{...}}]}."#
            .to_string(),
        r#"When you are ready to answer the user, respond with: {"step":"final","answer":"..."}."#
            .to_string(),
        "Tool names are qualified as server:tool; local tools use their bare name.".to_string(),
    ];

    if catalogue.is_empty() {
        lines.push("No tools are currently available.".to_string());
    } else {
        lines.push("Available tools:".to_string());
        for tool in catalogue {
            let mut line = format!("- {}: {}", tool.name, tool.description);
            if !tool.input_schema.properties.is_empty() {
                let compact =
                    serde_json::to_string(&tool.input_schema).unwrap_or_default();
                line.push_str(&format!(" Input schema: {compact}"));
            }
            lines.push(line);
        }
    }

    let instructions = lines.join("\n");
    match custom {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{}\n\n{instructions}", existing.trim())
        }
        _ => instructions,
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

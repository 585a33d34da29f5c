use crate::application::orchestrator::AgentStepRecord;
use crate::domain::tool::ToolDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestChatRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub session_id: Option<String>,
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tool_steps: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestChatResponse {
    pub session_id: String,
    pub content: String,
    pub tool_steps: Vec<AgentStepRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServerListResponse {
    pub servers: Vec<String>,
}

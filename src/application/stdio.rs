use crate::application::orchestrator::{AgentRequest, AgentStepRecord, Orchestrator};
use crate::infrastructure::model::ModelProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum StdioError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize stdio response: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct StdioChatRequest {
    prompt: String,
    model: Option<String>,
    system_prompt: Option<String>,
    session_id: Option<String>,
    temperature: Option<f64>,
    #[serde(default)]
    max_tool_steps: Option<usize>,
}

#[derive(Debug, Serialize)]
struct StdioChatResponse {
    session_id: Option<String>,
    content: Option<String>,
    error: Option<String>,
    tool_steps: Vec<AgentStepRecord>,
}

impl StdioChatResponse {
    fn success(session_id: String, content: String, tool_steps: Vec<AgentStepRecord>) -> Self {
        Self {
            session_id: Some(session_id),
            content: Some(content),
            error: None,
            tool_steps,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            content: None,
            error: Some(message.into()),
            tool_steps: Vec::new(),
        }
    }
}

/// Reads one JSON request per line from stdin and writes one JSON response
/// per line to stdout.
pub async fn run<P>(orchestrator: Arc<Orchestrator<P>>) -> Result<(), StdioError>
where
    P: ModelProvider + 'static,
{
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!("Received STDIO line");

        match serde_json::from_str::<StdioChatRequest>(&line) {
            Ok(request) => {
                if request.prompt.trim().is_empty() {
                    write_response(
                        &mut stdout,
                        StdioChatResponse::error("prompt cannot be empty"),
                    )
                    .await?;
                    continue;
                }

                info!("Processing STDIO agent request");
                let mut agent_request = AgentRequest::new(request.prompt);
                agent_request.model = request.model;
                agent_request.system_prompt = request.system_prompt;
                agent_request.session_id = request.session_id;
                agent_request.temperature = request.temperature;
                agent_request.max_iterations = request.max_tool_steps;

                match orchestrator.run(agent_request).await {
                    Ok(outcome) => {
                        write_response(
                            &mut stdout,
                            StdioChatResponse::success(
                                outcome.session_id,
                                outcome.answer,
                                outcome.steps,
                            ),
                        )
                        .await?;
                    }
                    Err(err) => {
                        error!(%err, "Agent processing failed via STDIO");
                        write_response(&mut stdout, StdioChatResponse::error(err.user_message()))
                            .await?;
                    }
                }
            }
            Err(err) => {
                write_response(
                    &mut stdout,
                    StdioChatResponse::error(format!("invalid request: {err}")),
                )
                .await?;
            }
        }
    }

    Ok(())
}

async fn write_response(
    stdout: &mut io::Stdout,
    response: StdioChatResponse,
) -> Result<(), StdioError> {
    let encoded = serde_json::to_string(&response)?;
    stdout.write_all(encoded.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

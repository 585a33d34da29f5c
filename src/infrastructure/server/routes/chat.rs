use super::super::dto::{ErrorResponse, RestChatRequest, RestChatResponse};
use super::super::state::ServerState;
use crate::application::orchestrator::AgentRequest;
use crate::infrastructure::model::ModelProvider;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{error, info};

#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    request_body = RestChatRequest,
    responses(
        (status = 200, description = "Agent run completed", body = RestChatResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Model provider could not be reached", body = ErrorResponse)
    )
)]
pub async fn chat_handler<P: ModelProvider>(
    State(state): State<Arc<ServerState<P>>>,
    Json(payload): Json<RestChatRequest>,
) -> Result<Json<RestChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        session = payload.session_id.as_deref(),
        "Received /chat request"
    );

    if payload.prompt.trim().is_empty() {
        error!("Rejecting /chat request due to empty prompt");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "prompt cannot be empty".to_string(),
            }),
        ));
    }

    let mut request = AgentRequest::new(payload.prompt);
    request.model = payload.model;
    request.system_prompt = payload.system_prompt;
    request.session_id = payload.session_id;
    request.temperature = payload.temperature;
    request.max_iterations = payload.max_tool_steps;

    match state.orchestrator().run(request).await {
        Ok(outcome) => {
            info!(
                session_id = outcome.session_id.as_str(),
                steps = outcome.steps.len(),
                "Agent run completed successfully"
            );
            Ok(Json(RestChatResponse {
                session_id: outcome.session_id,
                content: outcome.answer,
                tool_steps: outcome.steps,
            }))
        }
        Err(err) => {
            error!(%err, "Agent run failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: err.user_message(),
                }),
            ))
        }
    }
}

mod dto;
mod error;
mod routes;
mod state;

pub use error::ServerError;

use crate::application::orchestrator::{AgentStepRecord, Orchestrator};
use crate::domain::tool::{InputSchema, PropertyDefinition, ToolDefinition};
use crate::infrastructure::model::ModelProvider;
use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use dto::{
    ErrorResponse, RestChatRequest, RestChatResponse, ServerListResponse, ToolListResponse,
};
use state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::chat::chat_handler,
        routes::tools::tools_handler,
        routes::tools::servers_handler
    ),
    components(
        schemas(
            RestChatRequest,
            RestChatResponse,
            ErrorResponse,
            ToolListResponse,
            ServerListResponse,
            AgentStepRecord,
            ToolDefinition,
            InputSchema,
            PropertyDefinition
        )
    ),
    tags(
        (name = "chat", description = "Agentic chat with tool execution"),
        (name = "tools", description = "Aggregated tool catalogue and servers")
    )
)]
struct ApiDoc;

pub async fn serve<P>(
    orchestrator: Arc<Orchestrator<P>>,
    addr: SocketAddr,
) -> Result<(), ServerError>
where
    P: ModelProvider + 'static,
{
    let api = ApiDoc::openapi();
    info!(%addr, "Binding REST server");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let state = Arc::new(ServerState::new(orchestrator));
    let app = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", api))
        .route("/chat", post(routes::chat::chat_handler::<P>))
        .route("/tools", get(routes::tools::tools_handler::<P>))
        .route("/servers", get(routes::tools::servers_handler::<P>))
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "REST server ready to accept connections");

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(ServerError::Serve)
}

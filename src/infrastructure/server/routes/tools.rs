use super::super::dto::{ServerListResponse, ToolListResponse};
use super::super::state::ServerState;
use crate::infrastructure::model::ModelProvider;
use axum::Json;
use axum::extract::State;
use std::sync::Arc;
use tracing::debug;

#[utoipa::path(
    get,
    path = "/tools",
    tag = "tools",
    responses(
        (status = 200, description = "Aggregated tool catalogue", body = ToolListResponse)
    )
)]
pub async fn tools_handler<P: ModelProvider>(
    State(state): State<Arc<ServerState<P>>>,
) -> Json<ToolListResponse> {
    debug!("Listing aggregated tool catalogue");
    let tools = state.dispatcher().all_definitions().await;
    Json(ToolListResponse { tools })
}

#[utoipa::path(
    get,
    path = "/servers",
    tag = "tools",
    responses(
        (status = 200, description = "Registered tool servers", body = ServerListResponse)
    )
)]
pub async fn servers_handler<P: ModelProvider>(
    State(state): State<Arc<ServerState<P>>>,
) -> Json<ServerListResponse> {
    debug!("Listing registered tool servers");
    let servers = state.dispatcher().registered_servers();
    Json(ServerListResponse { servers })
}

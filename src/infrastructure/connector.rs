use crate::domain::tool::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One registered tool server in the dispatch namespace.
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &str;

    /// Executes a tool by bare name. Failures of any kind come back as a
    /// `ToolResult` with `success = false`, never as an error.
    async fn execute(&self, tool: &str, arguments: Map<String, Value>) -> ToolResult;

    /// Cached tool catalogue, namespaced with this server's prefix. An
    /// unreachable server yields an empty list.
    async fn definitions(&self) -> Vec<ToolDefinition>;

    /// Drops the cached catalogue so the next `definitions` call refetches.
    async fn refresh(&self);
}

/// HTTP connector for one remote tool server.
///
/// The catalogue is fetched lazily on the first `definitions` call and kept
/// for the life of the connector. A failed fetch leaves the cache unset so a
/// server that comes up later is picked up on the next listing.
pub struct HttpToolConnector {
    server_name: String,
    base_url: String,
    http: Client,
    catalogue: Mutex<Option<Vec<ToolDefinition>>>,
}

impl HttpToolConnector {
    pub fn new(server_name: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(server_name, base_url, http)
    }

    pub fn with_client(
        server_name: impl Into<String>,
        base_url: impl Into<String>,
        http: Client,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            base_url: base_url.into(),
            http,
            catalogue: Mutex::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{trimmed}/{path}")
    }

    async fn fetch_catalogue(&self) -> Result<Vec<ToolDefinition>, reqwest::Error> {
        let url = self.endpoint("/tools");
        debug!(server = %self.server_name, url = %url, "Fetching tool catalogue");
        let remote: Vec<ToolDefinition> = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(remote
            .into_iter()
            .map(|mut tool| {
                tool.name = requalify(&self.server_name, &tool.name);
                tool
            })
            .collect())
    }
}

#[async_trait]
impl ToolServer for HttpToolConnector {
    fn name(&self) -> &str {
        &self.server_name
    }

    async fn execute(&self, tool: &str, arguments: Map<String, Value>) -> ToolResult {
        let qualified = format!("{}:{}", self.server_name, tool);
        let url = self.endpoint("/tools/execute");
        info!(tool = %qualified, "Executing remote tool");

        let request = ExecuteRequest {
            tool_name: tool.to_string(),
            arguments,
        };

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let response = match response {
            Ok(response) => response,
            Err(source) => {
                warn!(tool = %qualified, %source, "Remote tool call failed");
                return ToolResult::err(
                    &qualified,
                    format!("Failed to execute {qualified} - {source}"),
                );
            }
        };

        match response.json::<ExecuteResponse>().await {
            Ok(body) if body.success => {
                info!(tool = %qualified, "Remote tool executed");
                ToolResult::ok(&qualified, body.result.unwrap_or(Value::Null))
            }
            Ok(body) => {
                warn!(tool = %qualified, error = ?body.error, "Remote tool reported failure");
                ToolResult::err(
                    &qualified,
                    body.error
                        .unwrap_or_else(|| format!("{qualified} reported an unspecified failure")),
                )
            }
            Err(source) => {
                warn!(tool = %qualified, %source, "Remote tool returned invalid payload");
                ToolResult::err(
                    &qualified,
                    format!("Failed to decode response from {qualified} - {source}"),
                )
            }
        }
    }

    async fn definitions(&self) -> Vec<ToolDefinition> {
        let mut cache = self.catalogue.lock().await;
        if let Some(cached) = cache.as_ref() {
            return cached.clone();
        }

        match self.fetch_catalogue().await {
            Ok(tools) => {
                info!(
                    server = %self.server_name,
                    count = tools.len(),
                    "Cached tool catalogue"
                );
                *cache = Some(tools.clone());
                tools
            }
            Err(source) => {
                // Degrade by offering no tools; the cache stays unset so a
                // server that comes up later is retried.
                warn!(server = %self.server_name, %source, "Failed to fetch tool catalogue");
                Vec::new()
            }
        }
    }

    async fn refresh(&self) {
        info!(server = %self.server_name, "Tool catalogue cache invalidated");
        let mut cache = self.catalogue.lock().await;
        *cache = None;
    }
}

/// Strips any foreign `prefix:` a remote server may have applied to a tool
/// name and re-prefixes it with our own server key, so names stay globally
/// unique without coordination between tool servers.
fn requalify(server_name: &str, remote_name: &str) -> String {
    let bare = remote_name
        .rsplit_once(':')
        .map(|(_, tail)| tail)
        .unwrap_or(remote_name);
    format!("{server_name}:{bare}")
}

#[derive(Debug, Serialize)]
struct ExecuteRequest {
    #[serde(rename = "toolName")]
    tool_name: String,
    arguments: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

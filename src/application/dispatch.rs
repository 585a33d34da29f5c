use crate::application::registry::LocalToolRegistry;
use crate::domain::tool::{ToolDefinition, ToolResult};
use crate::infrastructure::connector::ToolServer;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Routes qualified tool calls to the right server and aggregates every
/// catalogue into the single flat namespace presented to the model.
///
/// Remote tools are addressed as `server:tool`; bare names go to the local
/// registry. `route` is total over `ToolResult`: the orchestration loop
/// feeds failures back into the conversation, so nothing may escape this
/// boundary as an error.
pub struct ToolDispatcher {
    servers: Vec<Arc<dyn ToolServer>>,
    index: HashMap<String, Arc<dyn ToolServer>>,
    local: LocalToolRegistry,
}

impl ToolDispatcher {
    pub fn new(local: LocalToolRegistry) -> Self {
        Self {
            servers: Vec::new(),
            index: HashMap::new(),
            local,
        }
    }

    pub fn register_server(&mut self, server: Arc<dyn ToolServer>) {
        let name = server.name().to_string();
        info!(server = %name, "Registering tool server");
        if self.index.insert(name, server.clone()).is_none() {
            self.servers.push(server);
        }
    }

    pub async fn route(&self, qualified_name: &str, arguments: Map<String, Value>) -> ToolResult {
        if let Some((server_name, tool_name)) = qualified_name.split_once(':') {
            let Some(server) = self.index.get(server_name) else {
                warn!(server = %server_name, "Tool call routed to unknown server");
                return ToolResult::err(
                    qualified_name,
                    format!(
                        "Tool server not found: {server_name}. Available: {:?}",
                        self.registered_servers()
                    ),
                );
            };
            return server.execute(tool_name, arguments).await;
        }

        self.local.execute(qualified_name, &arguments)
    }

    /// Local tools first, then each server's cached catalogue in
    /// registration order. Stable across calls unless a refresh happened.
    pub async fn all_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.local.list();
        for server in &self.servers {
            definitions.extend(server.definitions().await);
        }
        definitions
    }

    pub fn registered_servers(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|server| server.name().to_string())
            .collect()
    }

    pub fn has_tools(&self) -> bool {
        !self.servers.is_empty() || !self.local.list().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::{InputSchema, ToolDefinition};
    use crate::infrastructure::connector::HttpToolConnector;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubServer {
        name: String,
        tools: Vec<ToolDefinition>,
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl StubServer {
        fn new(name: &str, tools: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                tools: tools
                    .iter()
                    .map(|tool| {
                        ToolDefinition::new(
                            format!("{name}:{tool}"),
                            "stub",
                            InputSchema::object(),
                        )
                    })
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<(String, Map<String, Value>)> {
            self.calls.lock().expect("call log lock").clone()
        }
    }

    #[async_trait]
    impl ToolServer for StubServer {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, tool: &str, arguments: Map<String, Value>) -> ToolResult {
            self.calls
                .lock()
                .expect("call log lock")
                .push((tool.to_string(), arguments));
            ToolResult::ok(format!("{}:{}", self.name, tool), json!({"ok": true}))
        }

        async fn definitions(&self) -> Vec<ToolDefinition> {
            self.tools.clone()
        }

        async fn refresh(&self) {}
    }

    fn dispatcher_with(servers: Vec<Arc<dyn ToolServer>>) -> ToolDispatcher {
        let mut dispatcher = ToolDispatcher::new(LocalToolRegistry::with_builtins());
        for server in servers {
            dispatcher.register_server(server);
        }
        dispatcher
    }

    #[tokio::test]
    async fn routes_qualified_call_to_matching_server() {
        let rag = Arc::new(StubServer::new("rag", &["search_documents"]));
        let dispatcher = dispatcher_with(vec![rag.clone()]);

        let mut arguments = Map::new();
        arguments.insert("query".to_string(), json!("x"));
        let result = dispatcher.route("rag:search_documents", arguments).await;

        assert!(result.success);
        let calls = rag.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "search_documents");
        assert_eq!(calls[0].1.get("query"), Some(&json!("x")));
    }

    #[tokio::test]
    async fn unknown_server_returns_error_naming_it() {
        let dispatcher = dispatcher_with(vec![Arc::new(StubServer::new("rag", &[]))]);
        let result = dispatcher.route("ghost:anything", Map::new()).await;

        assert!(!result.success);
        let error = result.error.expect("error message");
        assert!(error.contains("ghost"));
        assert!(error.contains("rag"));
    }

    #[tokio::test]
    async fn bare_names_route_to_local_registry() {
        let dispatcher = dispatcher_with(Vec::new());
        let mut arguments = Map::new();
        arguments.insert("numbers".to_string(), json!([2, 3]));

        let result = dispatcher.route("add_numbers", arguments).await;
        assert!(result.success);
        assert_eq!(result.result, Some(json!({"sum": 5.0})));
    }

    #[tokio::test]
    async fn catalogue_lists_local_then_servers_in_registration_order() {
        let dispatcher = dispatcher_with(vec![
            Arc::new(StubServer::new("rag", &["search_documents"])),
            Arc::new(StubServer::new("google", &["tasks_list"])),
        ]);

        let names: Vec<_> = dispatcher
            .all_definitions()
            .await
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "add_numbers",
                "current_time",
                "rag:search_documents",
                "google:tasks_list"
            ]
        );
    }

    struct AddNumbersStub;

    impl crate::application::registry::LocalTool for AddNumbersStub {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("add_numbers", "Adds numbers.", InputSchema::object())
        }

        fn execute(&self, _arguments: &Map<String, Value>) -> Result<Value, String> {
            Ok(json!({"sum": 0}))
        }
    }

    #[tokio::test]
    async fn local_and_remote_tools_share_one_namespace() {
        let mut registry = LocalToolRegistry::new();
        registry.register(Arc::new(AddNumbersStub));
        let mut dispatcher = ToolDispatcher::new(registry);
        let rag = Arc::new(StubServer::new("rag", &["search_documents"]));
        dispatcher.register_server(rag.clone());

        let names: Vec<_> = dispatcher
            .all_definitions()
            .await
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, vec!["add_numbers", "rag:search_documents"]);

        let mut arguments = Map::new();
        arguments.insert("query".to_string(), json!("x"));
        dispatcher.route("rag:search_documents", arguments).await;

        let calls = rag.recorded();
        assert_eq!(calls[0].0, "search_documents");
    }

    #[tokio::test]
    async fn catalogue_names_are_unique_across_servers() {
        let dispatcher = dispatcher_with(vec![
            Arc::new(StubServer::new("rag", &["search", "list"])),
            Arc::new(StubServer::new("google", &["search", "list"])),
        ]);

        let definitions = dispatcher.all_definitions().await;
        let unique: HashSet<_> = definitions.iter().map(|tool| &tool.name).collect();
        assert_eq!(unique.len(), definitions.len());
    }

    #[tokio::test]
    async fn dead_connector_degrades_without_hiding_other_servers() {
        let dead: Arc<dyn ToolServer> = Arc::new(HttpToolConnector::new(
            "down",
            "http://127.0.0.1:9",
            Duration::from_secs(1),
        ));
        let dispatcher = dispatcher_with(vec![
            dead,
            Arc::new(StubServer::new("rag", &["search_documents"])),
        ]);

        let names: Vec<_> = dispatcher
            .all_definitions()
            .await
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert!(names.contains(&"rag:search_documents".to_string()));
        assert!(!names.iter().any(|name| name.starts_with("down:")));
    }
}

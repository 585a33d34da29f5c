mod application;
mod config;
mod domain;
mod infrastructure;

use application::dispatch::ToolDispatcher;
use application::history::ConversationHistory;
use application::orchestrator::{AgentDefaults, AgentRequest, Orchestrator};
use application::registry::LocalToolRegistry;
use application::stdio;
use clap::{Parser, ValueEnum};
use config::{AppConfig, ProviderKind};
use infrastructure::connector::HttpToolConnector;
use infrastructure::model::{AnyProvider, OllamaClient, OpenAiCompatClient};
use infrastructure::server;
use serde_json::json;
use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "toolbridge",
    version,
    about = "LLM agent gateway with MCP-style tool routing"
)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    session: Option<String>,
    #[arg(long)]
    prompt_file: Option<String>,
    #[arg(long, value_enum, default_value_t = RunMode::Cli)]
    mode: RunMode,
    #[arg(long, default_value = "127.0.0.1:8080")]
    rest_addr: SocketAddr,
    prompt: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunMode {
    Cli,
    Stdio,
    Rest,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    dotenvy::dotenv().ok();
    info!("Starting toolbridge");
    let cli = Cli::parse();
    debug!(?cli.mode, config = ?cli.config, session = ?cli.session, "CLI arguments parsed");

    let config_path = cli.config.as_deref().map(Path::new);
    let file_config = AppConfig::load(config_path)?;
    if let Some(path) = config_path {
        info!(path = %path.display(), "Loaded configuration from file");
    } else {
        info!("Loaded configuration using default path or defaults");
    }

    let timeout = Duration::from_secs(file_config.request_timeout_secs);
    let provider = build_provider(&file_config, timeout);

    let mut dispatcher = ToolDispatcher::new(LocalToolRegistry::with_builtins());
    for server_config in &file_config.servers {
        dispatcher.register_server(Arc::new(HttpToolConnector::new(
            server_config.name.clone(),
            server_config.base_url.clone(),
            timeout,
        )));
    }

    let defaults = AgentDefaults {
        model: file_config.model.clone(),
        system_prompt: cli.system.clone().or(file_config.system_prompt.clone()),
        temperature: file_config.temperature,
        max_tokens: file_config.max_tokens,
        max_iterations: file_config.max_iterations,
    };

    let orchestrator = Arc::new(Orchestrator::new(
        provider,
        Arc::new(dispatcher),
        Arc::new(ConversationHistory::new()),
        defaults,
    ));

    info!(mode = ?cli.mode, "Running in selected mode");
    match cli.mode {
        RunMode::Cli => {
            let prompt = load_prompt(&cli)?;
            info!("Executing agent run from CLI mode");
            let mut request = AgentRequest::new(prompt);
            request.session_id = cli.session.clone();
            let outcome = orchestrator.run(request).await?;
            let output = json!({
                "session_id": outcome.session_id,
                "content": outcome.answer,
                "tool_steps": outcome.steps,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        RunMode::Stdio => {
            info!("Entering STDIO mode; awaiting JSON line input");
            stdio::run(orchestrator.clone()).await?;
        }
        RunMode::Rest => {
            info!(addr = %cli.rest_addr, "Starting REST server");
            server::serve(orchestrator.clone(), cli.rest_addr).await?;
        }
    }
    info!("Execution finished");
    Ok(())
}

fn build_provider(config: &AppConfig, timeout: Duration) -> AnyProvider {
    match config.provider.kind {
        ProviderKind::Ollama => {
            debug!(base_url = %config.provider.base_url, "Creating Ollama provider");
            AnyProvider::Ollama(OllamaClient::new(config.provider.base_url.clone(), timeout))
        }
        ProviderKind::Openai => {
            debug!(base_url = %config.provider.base_url, "Creating OpenAI-compatible provider");
            let api_key = config.provider.api_key();
            if api_key.is_none() {
                warn!(
                    env = %config.provider.api_key_env,
                    "No API key found in environment; sending unauthenticated requests"
                );
            }
            AnyProvider::OpenAi(OpenAiCompatClient::new(
                config.provider.base_url.clone(),
                config.provider.api_path.clone(),
                api_key,
                timeout,
            ))
        }
    }
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if let Some(path) = &cli.prompt_file {
        info!(path = %path, "Loading prompt from file");
        let content = fs::read_to_string(path)?;
        return Ok(normalize_prompt(content));
    }

    if !cli.prompt.is_empty() {
        info!("Using prompt provided through CLI arguments");
        let joined = cli.prompt.join(" ");
        return Ok(normalize_prompt(joined));
    }

    if atty::isnt(atty::Stream::Stdin) {
        info!("Reading prompt from standard input");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(normalize_prompt(buffer));
    }

    warn!("Prompt not provided via arguments, file, or stdin");
    Err("prompt required via arguments, file, or stdin".into())
}

fn normalize_prompt(prompt: String) -> String {
    prompt.trim().to_string()
}

//! `designlink tools` and `designlink call`.

use super::OutputFormat;
use anyhow::Context;
use designlink_core::{
    CircuitBreakerRegistry, Config, ConfiguredTransportFactory, Session, SessionManager,
};
use serde_json::Value;
use std::sync::Arc;

const CLI_OWNER: &str = "designlink-cli";

async fn open_session(
    config: &Config,
    token: Option<String>,
) -> anyhow::Result<(SessionManager, Arc<Session>)> {
    let factory =
        ConfiguredTransportFactory::new(config.transport_config(), config.discovery_config());
    let manager = SessionManager::new(Arc::new(factory), config.session_config());
    let session = manager
        .create_session(CLI_OWNER, token)
        .await
        .context("Failed to connect to the MCP service")?;
    Ok((manager, session))
}

/// List the tools offered by the configured service.
pub async fn list_tools(
    config: &Config,
    token: Option<String>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let (manager, session) = open_session(config, token).await?;
    let result = session.list_tools().await;
    manager.shutdown().await;
    let tools = result?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tools)?),
        OutputFormat::Text => {
            if tools.tools.is_empty() {
                println!("No tools available.");
            }
            for tool in &tools.tools {
                match &tool.description {
                    Some(description) => println!("{}  {}", tool.name, description),
                    None => println!("{}", tool.name),
                }
            }
        }
    }

    Ok(())
}

/// Parse `--args`, which must be a JSON object.
pub fn parse_arguments(raw: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    anyhow::ensure!(value.is_object(), "--args must be a JSON object");
    Ok(value)
}

/// Call one tool through a circuit breaker keyed by its name.
pub async fn call_tool(
    config: &Config,
    tool: &str,
    raw_args: &str,
    token: Option<String>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let arguments = parse_arguments(raw_args)?;
    let breakers = CircuitBreakerRegistry::new(config.breaker_config());
    let (manager, session) = open_session(config, token).await?;

    let result = breakers
        .execute(tool, || session.call_tool(tool, arguments))
        .await;
    manager.shutdown().await;
    let result = result?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => println!("{}", result.text()),
    }

    Ok(())
}

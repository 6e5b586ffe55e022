//! `designlink discover`.

use super::OutputFormat;
use designlink_core::Config;
use designlink_discover::Discovery;
use designlink_util::TimingGuard;

/// Run discovery and print the result. A miss is reported, not an error.
pub async fn run_discover(config: &Config, output: OutputFormat) -> anyhow::Result<()> {
    let result = {
        let _timing = TimingGuard::new("discovery", "local");
        Discovery::new(config.discovery_config()).discover().await
    };

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
        OutputFormat::Text => match result.port {
            Some(port) => println!("Found MCP endpoint on port {port} (via {})", result.method),
            None => println!(
                "No MCP endpoint found: {}",
                result.error.as_deref().unwrap_or("unknown reason")
            ),
        },
    }

    Ok(())
}

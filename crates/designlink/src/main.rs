//! designlink - client for design-automation MCP services.
//!
//! This is the main entry point for the designlink CLI.

mod commands;

use clap::{Parser, Subcommand};
use commands::*;
use designlink_core::Config;

#[derive(Parser)]
#[command(name = "designlink")]
#[command(author, version, about = "Client for design-automation MCP services", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate the local MCP endpoint and print the result
    Discover,
    /// Connect with the configured transport and list tools
    Tools {
        /// Bearer token for remote or proxy transports (defaults to $DESIGNLINK_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
    /// Call a tool
    Call {
        /// Tool name
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
        /// Bearer token for remote or proxy transports (defaults to $DESIGNLINK_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    let (config, sources) = Config::load(Some(&cwd)).await?;
    init_logging(cli.verbose, config.log_level);

    let output = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Commands::Discover => run_discover(&config, output).await,
        Commands::Tools { token } => list_tools(&config, resolve_token(token), output).await,
        Commands::Call { tool, args, token } => {
            call_tool(&config, &tool, &args, resolve_token(token), output).await
        }
        Commands::Config => show_config(&config, &sources),
    }
}

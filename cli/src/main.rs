use clap::{Parser, Subcommand};
use gcal_mcp_runtime::{McpCommands, RuntimeArgs};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "gcal",
    version,
    about = "Google Calendar access for agents: consent, token status, MCP server"
)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the browser consent flow and store a fresh token
    Login,
    /// Delete the stored token
    Logout,
    /// Show descriptor and token state (no network)
    Status,
    /// Print the MCP tool catalogue
    Tools,
    /// MCP server over stdio
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout is reserved for command output and the MCP protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcal_mcp_runtime=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Login => commands::auth::login(&cli.runtime).await,
        Commands::Logout => commands::auth::logout(&cli.runtime).await,
        Commands::Status => commands::auth::status(&cli.runtime).await,
        Commands::Tools => commands::tools::run(),
        Commands::Mcp { command } => commands::mcp::run(cli.runtime, command).await,
    };

    std::process::exit(code);
}

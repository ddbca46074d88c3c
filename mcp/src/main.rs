use clap::Parser;

use gcal_mcp_runtime::{McpCommands, RuntimeArgs, run};

#[derive(Parser)]
#[command(
    name = "gcal-mcp",
    version,
    about = "Google Calendar tools as an MCP server over stdio"
)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcal_mcp_runtime=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = run(cli.runtime, cli.command.unwrap_or(McpCommands::Serve)).await;
    std::process::exit(code);
}

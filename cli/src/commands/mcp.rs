use gcal_mcp_runtime::{McpCommands, RuntimeArgs};

pub async fn run(args: RuntimeArgs, command: McpCommands) -> i32 {
    gcal_mcp_runtime::run(args, command).await
}

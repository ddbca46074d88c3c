use gcal_mcp_runtime::tools::ToolRegistry;

use crate::util::print_json_stdout;

pub fn run() -> i32 {
    print_json_stdout(&ToolRegistry::new().tools_list_payload());
    0
}

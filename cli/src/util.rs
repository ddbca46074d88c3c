use serde_json::{Value, json};

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", gcal_mcp_runtime::to_pretty_json(&err));
    std::process::exit(1);
}

pub fn print_json_stdout(value: &Value) {
    println!("{}", gcal_mcp_runtime::to_pretty_json(value));
}

/// Print a library error the way every command reports failures.
pub fn print_error(err: &gcal_core::CalendarError) -> i32 {
    eprintln!("{}", gcal_mcp_runtime::to_pretty_json(&err.to_value()));
    1
}

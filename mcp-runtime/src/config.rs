use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::calendar::DEFAULT_API_BASE_URL;

/// Settings shared by every binary that talks to the calendar.
#[derive(Args, Clone, Debug)]
pub struct RuntimeArgs {
    /// OAuth client descriptor (JSON with a "web" or "installed" section)
    #[arg(long, env = "CREDENTIALS_PATH", default_value = "./credentials.json")]
    pub credentials_path: PathBuf,

    /// Where granted tokens are persisted
    #[arg(long, env = "GCAL_TOKEN_PATH", default_value = "token.json")]
    pub token_path: PathBuf,

    /// Calendar API base URL
    #[arg(long, env = "GCAL_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Seconds to wait for the consent redirect before giving up
    #[arg(long, env = "GCAL_GRANT_TIMEOUT_SECS", default_value_t = 300)]
    pub grant_timeout_secs: u64,

    /// Print the consent URL instead of opening a browser
    #[arg(long, env = "GCAL_NO_BROWSER")]
    pub no_browser: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Authorize, then serve calendar tools over stdio
    Serve,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        runtime: RuntimeArgs,
    }

    #[test]
    fn defaults_match_documented_locations() {
        let cli = TestCli::parse_from(["gcal"]);
        assert_eq!(cli.runtime.credentials_path, PathBuf::from("./credentials.json"));
        assert_eq!(cli.runtime.token_path, PathBuf::from("token.json"));
        assert_eq!(cli.runtime.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cli.runtime.grant_timeout_secs, 300);
        assert!(!cli.runtime.no_browser);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::parse_from([
            "gcal",
            "--credentials-path",
            "/etc/gcal/client.json",
            "--token-path",
            "/var/lib/gcal/token.json",
            "--no-browser",
            "--grant-timeout-secs",
            "30",
        ]);
        assert_eq!(cli.runtime.credentials_path, PathBuf::from("/etc/gcal/client.json"));
        assert_eq!(cli.runtime.token_path, PathBuf::from("/var/lib/gcal/token.json"));
        assert_eq!(cli.runtime.grant_timeout_secs, 30);
        assert!(cli.runtime.no_browser);
    }
}

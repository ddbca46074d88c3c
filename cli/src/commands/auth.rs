use chrono::Utc;
use gcal_core::credentials::ClientSecret;
use gcal_core::store::{CredentialStore, FileCredentialStore};
use gcal_mcp_runtime::{Runtime, RuntimeArgs};
use serde_json::{Value, json};

use crate::util::{exit_error, print_error, print_json_stdout};

/// Run the consent flow even when a token is already stored.
pub async fn login(args: &RuntimeArgs) -> i32 {
    let runtime = match Runtime::build(args) {
        Ok(runtime) => runtime,
        Err(err) => return print_error(&err),
    };

    let handle = match runtime.session.reauthorize().await {
        Ok(handle) => handle,
        Err(err) if err.code() == gcal_core::error::codes::CONFIGURATION_ERROR => {
            return print_error(&err);
        }
        Err(err) => exit_error(
            &err.to_string(),
            Some("Approve access in the browser window, or pass --no-browser and open the logged URL"),
        ),
    };

    let credentials = handle.credentials().await;
    print_json_stdout(&json!({
        "status": "authorized",
        "token_path": runtime.store.path(),
        "expires_at": credentials.expires_at,
        "renewable": credentials.is_renewable(),
        "scopes": credentials.scopes,
    }));
    0
}

pub async fn logout(args: &RuntimeArgs) -> i32 {
    let store = FileCredentialStore::new(&args.token_path);
    match store.clear().await {
        Ok(removed) => {
            print_json_stdout(&json!({
                "status": if removed { "logged_out" } else { "no_token" },
                "token_path": store.path(),
            }));
            0
        }
        Err(e) => exit_error(
            &format!("Failed to remove {}: {e}", store.path().display()),
            None,
        ),
    }
}

pub async fn status(args: &RuntimeArgs) -> i32 {
    print_json_stdout(&status_report(args).await);
    0
}

/// Local view of the credential state. Never touches the network.
pub async fn status_report(args: &RuntimeArgs) -> Value {
    let descriptor = match ClientSecret::load(&args.credentials_path).await {
        Ok(secret) => json!({
            "path": args.credentials_path,
            "valid": true,
            "client_id": secret.client_id,
        }),
        Err(err) => json!({
            "path": args.credentials_path,
            "valid": false,
            "error": err.to_value(),
        }),
    };

    let store = FileCredentialStore::new(&args.token_path);
    let token = match store.load().await {
        Some(credentials) => json!({
            "path": store.path(),
            "present": true,
            "expires_at": credentials.expires_at,
            "expired": credentials.is_expired(Utc::now()),
            "renewable": credentials.is_renewable(),
            "scopes": credentials.scopes,
        }),
        None => json!({
            "path": store.path(),
            "present": false,
        }),
    };

    json!({
        "descriptor": descriptor,
        "token": token,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn args(dir: &Path) -> RuntimeArgs {
        RuntimeArgs {
            credentials_path: dir.join("credentials.json"),
            token_path: dir.join("token.json"),
            api_base_url: gcal_mcp_runtime::calendar::DEFAULT_API_BASE_URL.to_string(),
            grant_timeout_secs: 1,
            no_browser: true,
        }
    }

    #[tokio::test]
    async fn status_with_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let report = status_report(&args(dir.path())).await;
        assert_eq!(report["descriptor"]["valid"], false);
        assert_eq!(
            report["descriptor"]["error"]["error"],
            gcal_core::error::codes::CONFIGURATION_ERROR
        );
        assert_eq!(report["token"]["present"], false);
    }

    #[tokio::test]
    async fn status_reads_descriptor_and_token() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("credentials.json"),
            r#"{"installed":{"client_id":"cid.apps.googleusercontent.com","client_secret":"s3cret","auth_uri":"https://accounts.google.com/o/oauth2/auth","token_uri":"https://oauth2.googleapis.com/token","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("token.json"),
            r#"{"access_token":"ya29.a","refresh_token":"1//r","expiry_date":1000,"token_type":"Bearer"}"#,
        )
        .unwrap();

        let report = status_report(&args(dir.path())).await;
        assert_eq!(report["descriptor"]["valid"], true);
        assert_eq!(report["descriptor"]["client_id"], "cid.apps.googleusercontent.com");
        assert_eq!(report["token"]["present"], true);
        assert_eq!(report["token"]["expired"], true);
        assert_eq!(report["token"]["renewable"], true);
    }

    #[tokio::test]
    async fn logout_removes_the_token_once() {
        let dir = tempfile::tempdir().unwrap();
        let token = dir.path().join("token.json");
        std::fs::write(&token, r#"{"access_token":"ya29.a"}"#).unwrap();

        assert_eq!(logout(&args(dir.path())).await, 0);
        assert!(!token.exists());
        assert_eq!(logout(&args(dir.path())).await, 0);
    }
}

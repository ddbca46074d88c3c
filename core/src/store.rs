use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::credentials::CredentialSet;

/// Durable home for the single credential set of this process.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `None` when nothing usable is stored. Never an error: an unreadable
    /// store is the same as an empty one.
    async fn load(&self) -> Option<CredentialSet>;

    /// Replace whatever is stored with `credentials`.
    async fn save(&self, credentials: &CredentialSet) -> std::io::Result<()>;
}

/// JSON token file, overwritten wholesale on every save.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the token file. Returns whether one existed.
    pub async fn clear(&self) -> std::io::Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Option<CredentialSet> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read saved token");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "saved token is unparseable; ignoring it"
                );
                None
            }
        }
    }

    async fn save(&self, credentials: &CredentialSet) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(credentials)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Tokens are bearer secrets: owner read/write only.
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

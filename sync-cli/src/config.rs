//! Configuration management for roomsync.

use anyhow::{Context, Result};
use roomsync_client::ClientConfig;
use std::path::{Path, PathBuf};

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "roomsync.toml";

/// Sync state file name inside the data directory.
pub const STATE_FILE: &str = "state.json";

/// Default config file location for `data_dir`.
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Load the client configuration written by `roomsync login`.
pub fn load(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        anyhow::bail!(
            "Not logged in: {} does not exist. Run 'roomsync login' first.",
            path.display()
        );
    }
    ClientConfig::from_file(path).context("Invalid client configuration")
}

/// Save the client configuration. The file holds an access token, so it is
/// only readable by the owner.
pub async fn save(config: &ClientConfig, path: &Path) -> Result<()> {
    let contents = config.to_toml_string()?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create config directory")?;
    }
    tokio::fs::write(path, contents)
        .await
        .context("Failed to save client configuration")?;
    restrict_permissions(path, PRIVATE_FILE_MODE).await?;
    Ok(())
}

/// Mode for files holding credentials or sync tokens.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Mode for the data directory.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Restrict `path` to the owner. No-op on platforms without Unix modes.
pub async fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

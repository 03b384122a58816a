//! Log in and save the access token.

use anyhow::{Context, Result};
use roomsync_client::{ClientConfig, HttpTransport};
use roomsync_types::LoginRequest;
use std::path::Path;

use crate::config;

/// Run the login command.
pub async fn run(
    config_path: &Path,
    homeserver: &str,
    user: &str,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password(&format!("Password for {}: ", user))?,
    };

    let transport =
        HttpTransport::new(homeserver, user, "").context("Invalid homeserver URL")?;
    let response = transport
        .login(&LoginRequest::password(user, password))
        .await
        .context("Login failed")?;

    let user_id = if response.user_id.is_empty() {
        user.to_string()
    } else {
        response.user_id.clone()
    };
    let client_config = ClientConfig::new(homeserver, user_id.as_str())
        .with_access_token(response.access_token.as_str());
    client_config
        .validate()
        .context("Server returned an unusable login")?;
    config::save(&client_config, config_path).await?;

    println!("Logged in as {}", user_id);
    if !response.device_id.is_empty() {
        println!("  Device:       {}", response.device_id);
    }
    println!("  Access token: {}", response.access_token);
    println!("  Saved to:     {}", config_path.display());

    Ok(())
}

/// Prompt for password input with echo suppression.
fn prompt_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(password)
}

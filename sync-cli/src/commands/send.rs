//! Send a text message.

use anyhow::{Context, Result};
use roomsync_client::HttpTransport;
use std::path::Path;

use crate::config;

/// Run the send command.
pub async fn run(config_path: &Path, room_id: &str, message: &str) -> Result<()> {
    let client_config = config::load(config_path)?;
    let transport = HttpTransport::from_config(&client_config)?;

    let response = transport
        .send_text(room_id, message)
        .await
        .with_context(|| format!("Failed to send message to {}", room_id))?;

    println!("Sent {}", response.event_id);
    Ok(())
}

//! Sync and print incoming events.

use anyhow::{Context, Result};
use roomsync_client::{Client, DefaultSyncer, HttpTransport};
use roomsync_core::Storer;
use roomsync_types::{Event, EVENT_MEMBER, EVENT_MESSAGE};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{self, STATE_FILE};
use crate::store::FileStore;

/// A message to echo back: `(room_id, body)`.
type EchoRequest = (String, String);

/// Run the listen command.
pub async fn run(data_dir: &Path, config_path: &Path, echo: bool) -> Result<()> {
    let client_config = config::load(config_path)?;
    let user_id = client_config.user_id.clone();
    let store: Arc<dyn Storer> = Arc::new(FileStore::open(&data_dir.join(STATE_FILE))?);

    let (echo_tx, echo_rx) = mpsc::unbounded_channel();
    let mut syncer = DefaultSyncer::new(user_id.as_str(), Arc::clone(&store));
    register_printers(&mut syncer, &user_id, echo.then_some(echo_tx));

    let client = Arc::new(Client::from_config(&client_config, store, syncer)?);
    if echo {
        tokio::spawn(echo_replies(Arc::clone(&client), echo_rx));
    }

    println!("Listening as {} (Ctrl-C to stop)", user_id);

    let mut sync = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.start_sync().await }
    });

    tokio::select! {
        result = &mut sync => {
            return result
                .context("Sync task panicked")?
                .context("Sync stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            println!("Stopping after the current request...");
            client.stop_sync();
        }
    }

    sync.await
        .context("Sync task panicked")?
        .context("Sync stopped")?;
    Ok(())
}

fn register_printers(
    syncer: &mut DefaultSyncer,
    user_id: &str,
    echo: Option<mpsc::UnboundedSender<EchoRequest>>,
) {
    let own_user_id = user_id.to_string();
    syncer.on_event_type(EVENT_MESSAGE, move |event: &Event| {
        if let Some(line) = format_message(event) {
            println!("{}", line);
        }
        if event.sender == own_user_id {
            return;
        }
        if let (Some(echo), Ok(body)) = (&echo, event.body()) {
            // Receiver only goes away on shutdown
            let _ = echo.send((event.room_id.clone(), body.to_string()));
        }
    });

    syncer.on_event_type(EVENT_MEMBER, |event: &Event| {
        if let Some(line) = format_membership(event) {
            println!("{}", line);
        }
    });
}

async fn echo_replies(
    client: Arc<Client<HttpTransport>>,
    mut requests: mpsc::UnboundedReceiver<EchoRequest>,
) {
    while let Some((room_id, body)) = requests.recv().await {
        let reply = format!("echo: {}", body);
        if let Err(e) = client.transport().send_notice(&room_id, &reply).await {
            tracing::warn!(room_id = %room_id, error = %e, "Failed to send echo reply");
        }
    }
}

/// `[room] <sender> body`, or `None` for messages without a text body.
fn format_message(event: &Event) -> Option<String> {
    let body = event.body().ok()?;
    Some(format!("[{}] <{}> {}", event.room_id, event.sender, body))
}

/// `[room] * user membership`, or `None` if the event is malformed.
fn format_membership(event: &Event) -> Option<String> {
    let target = event.state_key.as_deref()?;
    let membership = event.membership().ok()?;
    Some(format!("[{}] * {} {}", event.room_id, target, membership))
}

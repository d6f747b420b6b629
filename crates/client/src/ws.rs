//! WebSocket listener for server-pushed sync notifications.
//!
//! The server pushes only `{"type":"events"}` — an opaque prompt to Pull
//! again, never the events themselves (see [`crate::wire::WsNotification`]).
//! A dropped connection is not an error condition worth surfacing loudly:
//! the puller's cursor means a reconnect just resumes a plain Pull.

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;
use crate::wire::WsNotification;

/// Connect to `GET /v1/sync/ws?cursor=N&access_token=...` and invoke
/// `on_notify` once per `{"type":"events"}` frame received, until the
/// connection closes or the transport errors.
///
/// `ws_base_url` is the `ws://` or `wss://` origin (e.g.
/// `wss://api.example.com`), not the `http(s)://` one `SyncClient` uses.
pub async fn listen(
    ws_base_url: &str,
    cursor: i64,
    access_token: &str,
    mut on_notify: impl FnMut(),
) -> Result<(), ClientError> {
    let url = format!("{ws_base_url}/v1/sync/ws?cursor={cursor}&access_token={access_token}");

    let (stream, _response) =
        tokio_tungstenite::connect_async(&url).await.map_err(|e| ClientError::Network(e.to_string()))?;
    let (_write, mut read) = stream.split();

    while let Some(message) = read.next().await {
        let message = message.map_err(|e| ClientError::Network(e.to_string()))?;
        match message {
            Message::Text(text) => {
                if let Ok(notification) = serde_json::from_str::<WsNotification>(&text) {
                    if notification.kind == "events" {
                        on_notify();
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}

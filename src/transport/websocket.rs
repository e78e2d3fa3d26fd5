//! The plain-websocket framing variant: the older but faster feed.

use std::sync::Arc;

use anyhow::Result;
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::Client;

/// Host of the plain-websocket feed.
pub const WEBSOCKET_HOST: &str = "websocket.mtgox.com";

/// One connection lifetime: connect, subscribe, then read until the socket
/// dies. Every text frame whose first byte is `{` is emitted on the
/// receive signal; everything else is ignored.
pub(super) async fn run(
    client: &Arc<Client>,
    outbound: &mut UnboundedReceiver<String>,
) -> Result<()> {
    let scheme = if client.config.get_bool("gox", "use_ssl") {
        "wss"
    } else {
        "ws"
    };
    let ws_url = format!(
        "{scheme}://{WEBSOCKET_HOST}/mtgox?Currency={}",
        client.currency
    );

    client.debug(format!("connecting websocket {ws_url}..."));
    let (stream, _) = connect_async(ws_url).await?;

    client.debug("connected, subscribing needed channels");
    let (mut sink, mut stream) = stream.split();
    client.channel_subscribe();

    client.debug("waiting for data...");
    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                match frame? {
                    Message::Text(text) => {
                        if text.starts_with('{') {
                            client.signal_recv.emit(&text);
                        }
                    }
                    Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
            json_str = outbound.next() => {
                let Some(json_str) = json_str else {
                    return Ok(());
                };
                sink.send(Message::Text(json_str)).await?;
            }
        }
    }
}

//! The socket.io framing variant.
//!
//! Socket.io wraps the feed in its own handshake and message prefixes: a
//! session id is fetched over HTTP first, the websocket then connects to a
//! per-session path, and every event frame carries a `4::/mtgox:` prefix
//! in front of the JSON payload. `2::` frames are pings and get answered
//! in place.

use std::sync::Arc;

use anyhow::Result;
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::ApiError;

use super::Client;

/// Host of the socket.io feed.
pub const SOCKETIO_HOST: &str = "socketio.mtgox.com";

/// Prefix of event frames in either direction.
const EVENT_PREFIX: &str = "4::/mtgox:";

/// Extract the session id from the colon-delimited handshake reply.
///
/// # Errors
///
/// Will return [`ApiError::Handshake`] if the reply has no leading field.
pub fn session_id(reply: &str) -> Result<&str, ApiError> {
    reply
        .split(':')
        .next()
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| ApiError::Handshake(reply.to_owned()))
}

/// Strip the event prefix off an inbound frame and return the payload if
/// it is a JSON message.
#[must_use]
pub fn event_payload(msg: &str) -> Option<&str> {
    msg.strip_prefix(EVENT_PREFIX)
        .filter(|payload| payload.starts_with('{'))
}

/// One connection lifetime: HTTP handshake, websocket connect, namespace
/// join, then read until the socket dies.
pub(super) async fn run(
    client: &Arc<Client>,
    outbound: &mut UnboundedReceiver<String>,
) -> Result<()> {
    let (wsp, htp) = if client.config.get_bool("gox", "use_ssl") {
        ("wss", "https")
    } else {
        ("ws", "http")
    };

    client.debug(format!(
        "connecting to {SOCKETIO_HOST}... (might take very loooooooong)"
    ));
    let handshake = reqwest::Client::new()
        .get(format!(
            "{htp}://{SOCKETIO_HOST}/socket.io/1?Currency={}",
            client.currency
        ))
        .send()
        .await?
        .text()
        .await?;
    let sid = session_id(&handshake)?;

    let ws_url = format!(
        "{wsp}://{SOCKETIO_HOST}/socket.io/1/websocket/{sid}?Currency={}",
        client.currency
    );
    client.debug(format!("trying websocket to {ws_url}"));
    let (stream, _) = connect_async(ws_url).await?;

    client.debug("connected");
    let (mut sink, mut stream) = stream.split();
    sink.send(Message::Text("1::/mtgox".to_owned())).await?;

    // two handshake acks: '1::' and '1::/mtgox'
    let mut acks = 0;
    while acks < 2 {
        let Some(frame) = stream.next().await else {
            return Ok(());
        };
        if let Message::Text(_) = frame? {
            acks += 1;
        }
    }

    client.debug("subscribing to channels");
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
                        if text == "2::" {
                            client.debug("### ping -> pong");
                            sink.send(Message::Text("2::".to_owned())).await?;
                        } else if let Some(payload) = event_payload(&text) {
                            client.signal_recv.emit(&payload.to_owned());
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
                sink.send(Message::Text(format!("{EVENT_PREFIX}{json_str}"))).await?;
            }
        }
    }
}

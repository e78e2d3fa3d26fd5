//! The long-lived duplex connection to the exchange.
//!
//! Two framing variants exist, selected by `gox.use_plain_old_websocket`:
//! the plain websocket feed and the socket.io feed. Both run the same
//! receive loop shell: connect, run the subscription hook, read until the
//! socket dies, then reconnect after a fixed delay. Outbound frames go
//! through an unbounded queue so callers never block on the socket.

use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::message::{FullDepth, HistoryTrade};
use crate::rest;
use crate::signal::Signal;
use crate::signer::Signer;
use crate::utils::config::Config;
use crate::utils::secret::Secret;

pub mod socketio;
pub mod websocket;

/// Pause between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// The streaming client: reconnecting transport plus the signer for
/// authenticated calls sent over it.
#[derive(Debug)]
pub struct Client {
    /// Configured quote currency.
    pub currency: String,
    /// Application config.
    pub config: Config,
    /// Builds and correlates authenticated calls.
    pub signer: Signer,
    /// Fires one raw JSON string per inbound message.
    pub signal_recv: Signal<String>,
    /// Fires when a full-depth snapshot pull completes.
    pub signal_fulldepth: Signal<FullDepth>,
    /// Fires when a recent-trades snapshot pull completes.
    pub signal_fullhistory: Signal<Vec<HistoryTrade>>,
    /// Debug lines; unheard lines fall through to the logger.
    pub signal_debug: Signal<String>,
    outbound_tx: UnboundedSender<String>,
    outbound_rx: Mutex<Option<UnboundedReceiver<String>>>,
}

impl Client {
    /// A new, not yet connected client.
    #[must_use]
    pub fn new(config: Config, secret: Option<Secret>) -> Self {
        let currency = config.get_string("gox", "currency");
        let (outbound_tx, outbound_rx) = mpsc::unbounded();

        Self {
            signer: Signer::new(currency.clone(), secret),
            currency,
            config,
            signal_recv: Signal::new(),
            signal_fulldepth: Signal::new(),
            signal_fullhistory: Signal::new(),
            signal_debug: Signal::new(),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    /// Emit a line on the debug signal, falling back to the logger when
    /// nobody is subscribed.
    pub fn debug(&self, msg: impl Into<String>) {
        let msg = msg.into();
        if !self.signal_debug.emit(&msg) {
            log::debug!("{msg}");
        }
    }

    /// Queue a raw JSON frame for sending. Frames queued while the socket
    /// is down are delivered after the next reconnect.
    pub fn send(&self, json_str: String) {
        if self.outbound_tx.unbounded_send(json_str).is_err() {
            log::warn!("outbound queue closed, dropping frame");
        }
    }

    /// Send a signed (authenticated) call over the stream. Without a
    /// loaded secret this logs a warning and does nothing; the engine
    /// keeps working in read-only mode.
    pub fn send_signed_call(&self, api_endpoint: &str, params: Value, reqid: &str) {
        if !self.signer.know_secret() {
            self.debug(format!("### don't know secret, cannot call {api_endpoint}"));
            return;
        }

        match self.signer.stream_call(api_endpoint, &params, reqid) {
            Ok(frame) => {
                self.debug(format!("### calling {api_endpoint}"));
                self.signer.register(reqid, api_endpoint, params);
                self.send(frame);
            }
            Err(err) => self.debug(format!("### cannot sign call to {api_endpoint}: {err}")),
        }
    }

    /// Resend a silently-failed bootstrap call, reusing its original
    /// reqid. Non-bootstrap or already-resent calls are left alone.
    pub fn resend_silent_failure(&self, reqid: &str) {
        let Some((api_endpoint, params)) = self.signer.take_retry(reqid) else {
            return;
        };

        self.debug(format!("### resending {api_endpoint}"));
        match self.signer.stream_call(&api_endpoint, &params, reqid) {
            Ok(frame) => self.send(frame),
            Err(err) => self.debug(format!("### cannot sign call to {api_endpoint}: {err}")),
        }
    }

    /// The subscription hook, run on every (re)connect before the read
    /// loop: subscribe the public channels, fire the bootstrap calls and
    /// optionally kick off the snapshot pulls on their own tasks.
    pub fn channel_subscribe(self: &Arc<Self>) {
        self.send(json!({"op": "mtgox.subscribe", "type": "depth"}).to_string());
        self.send(json!({"op": "mtgox.subscribe", "type": "ticker"}).to_string());
        self.send(json!({"op": "mtgox.subscribe", "type": "trades"}).to_string());

        self.send_signed_call("private/info", json!({}), "info");
        self.send_signed_call("private/orders", json!({}), "orders");
        self.send_signed_call("private/idkey", json!({}), "idkey");

        if self.config.get_bool("gox", "load_fulldepth") {
            self.request_fulldepth();
        }
        if self.config.get_bool("gox", "load_history") {
            self.request_history();
        }
    }

    /// Pull the full market depth on a short-lived task, so the read loop
    /// is not blocked while the snapshot downloads.
    pub fn request_fulldepth(self: &Arc<Self>) {
        let client = Arc::clone(self);

        tokio::spawn(async move {
            client.debug("requesting initial full depth");
            match rest::fetch_fulldepth(&client.config, &client.currency).await {
                Ok(depth) => {
                    client.signal_fulldepth.emit(&depth);
                }
                Err(err) => client.debug(format!("### fulldepth request failed: {err:#}")),
            }
        });
    }

    /// Pull the recent public trades on a short-lived task.
    pub fn request_history(self: &Arc<Self>) {
        let client = Arc::clone(self);

        tokio::spawn(async move {
            client.debug("requesting history");
            match rest::fetch_history(&client.config, &client.currency).await {
                Ok(trades) => {
                    client.signal_fullhistory.emit(&trades);
                }
                Err(err) => client.debug(format!("### history request failed: {err:#}")),
            }
        });
    }

    /// Start the receive task: an endless connect / read / reconnect loop
    /// in the configured framing variant. Aborting the returned handle is
    /// the only way to stop the client.
    ///
    /// # Panics
    ///
    /// Will panic if the client was already started.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let mut outbound = self
            .outbound_rx
            .lock()
            .take()
            .expect("client already started");

        tokio::spawn(async move {
            loop {
                let result = if client.config.get_bool("gox", "use_plain_old_websocket") {
                    websocket::run(&client, &mut outbound).await
                } else {
                    socketio::run(&client, &mut outbound).await
                };

                match result {
                    Ok(()) => client.debug("connection closed, reconnecting in 5 seconds..."),
                    Err(err) => client.debug(format!("{err:#}, reconnecting in 5 seconds...")),
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    /// Take the outbound frame queue out of the client. [`Client::start`]
    /// does this internally; it is public so the queued frames can be
    /// inspected without connecting anywhere.
    pub fn take_outbound(&self) -> Option<UnboundedReceiver<String>> {
        self.outbound_rx.lock().take()
    }
}

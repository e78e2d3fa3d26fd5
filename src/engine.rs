//! The engine facade: owns the client, the order book, the candle history
//! and the wallet, decodes the inbound stream and exposes the public
//! command surface (place order, cancel) plus the change signals that the
//! UI and strategies subscribe to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::book::{OrderBook, OwnOrder};
use crate::history::History;
use crate::message::{
    DepthEvent, Envelope, FullDepth, HistoryTrade, RawAccountInfo, RawDepth, RawOpenOrder,
    RawTicker, RawTrade, RawUserOrder, Side, TickerEvent, TradeEvent, UserOrderEvent,
    PUBLIC_TRADE_CHANNEL,
};
use crate::rest;
use crate::signal::Signal;
use crate::transport::Client;
use crate::utils::config::Config;
use crate::utils::int2str;
use crate::utils::secret::Secret;

/// Candle bucket width used when none is given, in seconds.
const DEFAULT_TIMEFRAME: i64 = 60 * 15;

/// Balances per currency code, each in that currency's fixed-point scale.
pub type Wallet = HashMap<String, i64>;

/// The market-state engine for one quote currency. Create it with
/// [`Engine::new`], subscribe to the signals of interest, then call
/// [`Engine::start`] to connect.
#[derive(Debug)]
pub struct Engine {
    /// Configured quote currency.
    pub currency: String,
    /// Application config.
    pub config: Config,
    /// The streaming client (transport plus signer).
    pub client: Arc<Client>,
    /// The maintained order book.
    pub orderbook: Arc<Mutex<OrderBook>>,
    /// The maintained candle history.
    pub history: Arc<Mutex<History>>,
    /// The maintained wallet balances.
    pub wallet: Arc<Mutex<Wallet>>,
    idkey: Mutex<String>,
    /// Debug lines; unheard lines fall through to the logger.
    pub signal_debug: Signal<String>,
    /// Best bid / best ask updates.
    pub signal_ticker: Signal<TickerEvent>,
    /// Depth deltas.
    pub signal_depth: Signal<DepthEvent>,
    /// Public and own trades.
    pub signal_trade: Signal<TradeEvent>,
    /// Full-depth snapshots.
    pub signal_fulldepth: Signal<FullDepth>,
    /// Recent-trades snapshots.
    pub signal_fullhistory: Signal<Vec<HistoryTrade>>,
    /// Wallet balance changes; read the balances from [`Engine::wallet`].
    pub signal_wallet: Signal<()>,
    /// Own-order lifecycle events.
    pub signal_userorder: Signal<UserOrderEvent>,
    /// The order book changed in any way.
    pub signal_orderbook_changed: Signal<()>,
    /// The candle history changed; payload is a candle count.
    pub signal_history_changed: Signal<usize>,
}

impl Engine {
    /// Create an engine with the default candle timeframe. Credentials are
    /// read from `gox.secret_key` / `gox.secret_secret`; without them the
    /// engine runs read-only. Nothing connects until [`Engine::start`].
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_timeframe(config, DEFAULT_TIMEFRAME)
    }

    /// Create an engine with a custom candle bucket width in seconds.
    #[must_use]
    pub fn with_timeframe(config: Config, timeframe: i64) -> Arc<Self> {
        let currency = config.get_string("gox", "currency");
        let secret = Secret::from_config(&config);
        let client = Arc::new(Client::new(config.clone(), secret));

        let engine = Arc::new(Self {
            currency: currency.clone(),
            config,
            client,
            orderbook: Arc::new(Mutex::new(OrderBook::new(currency))),
            history: Arc::new(Mutex::new(History::new(timeframe))),
            wallet: Arc::new(Mutex::new(Wallet::new())),
            idkey: Mutex::new(String::new()),
            signal_debug: Signal::new(),
            signal_ticker: Signal::new(),
            signal_depth: Signal::new(),
            signal_trade: Signal::new(),
            signal_fulldepth: Signal::new(),
            signal_fullhistory: Signal::new(),
            signal_wallet: Signal::new(),
            signal_userorder: Signal::new(),
            signal_orderbook_changed: Signal::new(),
            signal_history_changed: Signal::new(),
        });

        engine.connect_client_slots();
        engine.connect_history_slots();
        engine.connect_book_slots();

        engine
    }

    /// Connect to the exchange and start receiving events. Aborting the
    /// returned handle stops the receive loop.
    pub fn start(&self) -> JoinHandle<()> {
        self.debug(format!(
            "starting gox streaming API, currency={}",
            self.currency
        ));

        self.client.start()
    }

    /// Emit a line on the debug signal, falling back to the logger when
    /// nobody is subscribed.
    pub fn debug(&self, msg: impl Into<String>) {
        let msg = msg.into();
        if !self.signal_debug.emit(&msg) {
            log::debug!("{msg}");
        }
    }

    /// Place an order; `price = 0` fills at market. Blocks on the signed
    /// HTTP call. Returns the new order id, or `None` when the call failed
    /// (the failure is logged, never surfaced as an error).
    pub async fn order(&self, side: Side, price: i64, volume: i64) -> Option<String> {
        let api_endpoint = format!("BTC{}/private/order/add", self.currency);
        let params = [
            ("type", side.to_string()),
            ("amount_int", volume.to_string()),
            ("price_int", price.to_string()),
        ];

        let oid = match self.signed_http(&api_endpoint, &params).await {
            Some(ret) => ret.as_str().map(str::to_owned),
            None => None,
        };

        match oid {
            Some(oid) => {
                self.signal_userorder.emit(&UserOrderEvent {
                    price,
                    volume,
                    side: Some(side),
                    oid: oid.clone(),
                    status: "pending".to_owned(),
                });
                Some(oid)
            }
            None => {
                self.debug("### WTF??? order could not be placed!");
                None
            }
        }
    }

    /// New buy order; `price = 0` buys at market.
    pub async fn buy(&self, price: i64, volume: i64) -> Option<String> {
        self.order(Side::Bid, price, volume).await
    }

    /// New sell order; `price = 0` sells at market.
    pub async fn sell(&self, price: i64, volume: i64) -> Option<String> {
        self.order(Side::Ask, price, volume).await
    }

    /// Cancel the order with the given id. Returns whether the exchange
    /// accepted the cancel.
    pub async fn cancel(&self, oid: &str) -> bool {
        let api_endpoint = format!("BTC{}/private/order/cancel", self.currency);
        let params = [("oid", oid.to_owned())];

        if self.signed_http(&api_endpoint, &params).await.is_some() {
            self.signal_userorder.emit(&UserOrderEvent {
                price: 0,
                volume: 0,
                side: None,
                oid: oid.to_owned(),
                status: "removed".to_owned(),
            });
            true
        } else {
            self.debug("### WTF??? order could not be canceled!");
            false
        }
    }

    /// Cancel every own order resting at the given price.
    pub async fn cancel_by_price(&self, price: i64) {
        for oid in self.collect_cancelable(&|order| order.price == price) {
            self.cancel(&oid).await;
        }
    }

    /// Cancel every own order on one side, or all own orders when `side`
    /// is `None`.
    pub async fn cancel_by_side(&self, side: Option<Side>) {
        for oid in self.collect_cancelable(&|order| side.is_none() || side == Some(order.side)) {
            self.cancel(&oid).await;
        }
    }

    /// Collect the oids to cancel, walking the own orders in reverse so
    /// removal signals arriving mid-walk cannot shift entries that are
    /// still to be visited.
    fn collect_cancelable(&self, keep: &dyn Fn(&OwnOrder) -> bool) -> Vec<String> {
        let mut oids = Vec::new();
        let mut placeholders = 0_usize;
        {
            let book = self.orderbook.lock();
            for order in book.owns.iter().rev() {
                if !keep(order) {
                    continue;
                }
                if order.oid.is_empty() {
                    placeholders += 1;
                } else {
                    oids.push(order.oid.clone());
                }
            }
        }

        for _ in 0..placeholders {
            self.debug("### cannot cancel placeholder order, no oid.");
        }

        oids
    }

    async fn signed_http(&self, api_endpoint: &str, params: &[(&str, String)]) -> Option<Value> {
        if !self.client.signer.know_secret() {
            self.debug(format!("### don't know secret, cannot call {api_endpoint}"));
            return None;
        }

        match rest::http_signed_call(&self.config, &self.client.signer, api_endpoint, params).await
        {
            Ok(ret) => Some(ret),
            Err(err) => {
                self.debug(format!("### call {api_endpoint} failed: {err:#}"));
                None
            }
        }
    }

    /// Decode one inbound JSON message and fire every handler whose key is
    /// present. A malformed frame is logged and dropped; an unrecognized
    /// shape is logged with a warning.
    pub fn slot_recv(&self, json_str: &str) {
        let envelope: Envelope = match serde_json::from_str(json_str) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.debug(format!("### cannot decode frame: {err}: {json_str}"));
                return;
            }
        };

        let mut handled = false;
        if let Some(ref ticker) = envelope.ticker {
            handled = true;
            self.on_ticker(ticker);
        }
        if let Some(ref depth) = envelope.depth {
            handled = true;
            self.on_depth(depth);
        }
        if let Some(ref trade) = envelope.trade {
            handled = true;
            self.on_trade(trade, envelope.channel.as_deref());
        }
        if let Some(ref result) = envelope.result {
            handled = true;
            self.on_call_result(result, envelope.id.as_deref());
        }
        if let Some(ref user_order) = envelope.user_order {
            handled = true;
            self.on_user_order(user_order);
        }
        if envelope.wallet.is_some() {
            handled = true;
            self.on_wallet();
        }

        match envelope.op.as_deref() {
            Some("remark") => self.on_remark(json_str, &envelope),
            Some("subscribe" | "unsubscribe") => log::debug!("subscription ack: {json_str}"),
            Some(op) if !handled => log::warn!("unknown operation `{op}`: {json_str}"),
            None if !handled => log::warn!("unhandled message shape: {json_str}"),
            _ => {}
        }
    }

    fn on_ticker(&self, raw: &RawTicker) {
        if raw.sell.currency.as_deref() != Some(self.currency.as_str()) {
            return;
        }

        match TickerEvent::try_from(raw) {
            Ok(event) => {
                self.debug(format!(
                    " tick:  bid: {} ask: {}",
                    int2str(event.bid, &self.currency),
                    int2str(event.ask, &self.currency)
                ));
                self.signal_ticker.emit(&event);
            }
            Err(err) => self.debug(format!("### malformed ticker: {err}")),
        }
    }

    fn on_depth(&self, raw: &RawDepth) {
        if raw.currency != self.currency {
            return;
        }

        match DepthEvent::try_from(raw) {
            Ok(event) => {
                self.debug(format!(
                    "depth:  {}: {} vol: {} now: {}",
                    event.side,
                    int2str(event.price, &self.currency),
                    int2str(event.volume, "BTC"),
                    int2str(event.total_volume, "BTC")
                ));
                self.signal_depth.emit(&event);
            }
            Err(err) => self.debug(format!("### malformed depth: {err}")),
        }
    }

    fn on_trade(&self, raw: &RawTrade, channel: Option<&str>) {
        if raw.price_currency != self.currency {
            return;
        }
        let Some(channel) = channel else {
            self.debug("### trade message without channel, dropped");
            return;
        };

        match raw.to_event(channel != PUBLIC_TRADE_CHANNEL) {
            Ok(event) => {
                self.debug(format!(
                    "trade:       {} vol: {}",
                    int2str(event.price, &self.currency),
                    int2str(event.volume, "BTC")
                ));
                self.signal_trade.emit(&event);
            }
            Err(err) => self.debug(format!("### malformed trade: {err}")),
        }
    }

    /// Handle the result of an authenticated call, matched by reqid.
    fn on_call_result(&self, result: &Value, id: Option<&str>) {
        let Some(reqid) = id else {
            self.debug("### result without id, dropped");
            return;
        };
        self.client.signer.complete(reqid);

        match reqid {
            "idkey" => {
                let Some(key) = result.as_str() else {
                    self.debug("### idkey result is not a string");
                    return;
                };
                self.debug("### got key, subscribing to account messages");
                *self.idkey.lock() = key.to_owned();
                self.client
                    .send(json!({"op": "mtgox.subscribe", "key": key}).to_string());
            }
            "orders" => self.on_orders_result(result),
            "info" => self.on_info_result(result),
            "order_add" | "order_cancel" => log::debug!("{reqid} result: {result}"),
            _ => self.debug(format!("### unexpected result for `{reqid}`: {result}")),
        }
    }

    /// Replace the own-order collection with the initial download,
    /// filtered to the configured currency.
    fn on_orders_result(&self, result: &Value) {
        self.debug("### got own order list");
        let raw: Vec<RawOpenOrder> = match serde_json::from_value(result.clone()) {
            Ok(raw) => raw,
            Err(err) => {
                self.debug(format!("### malformed order list: {err}"));
                return;
            }
        };

        let count = {
            let mut book = self.orderbook.lock();
            book.reset_own();
            for order in &raw {
                if order.currency != self.currency {
                    continue;
                }
                let own = match own_order(order) {
                    Ok(own) => own,
                    Err(err) => {
                        log::warn!("skipping malformed own order {}: {err}", order.oid);
                        continue;
                    }
                };
                book.add_own(own);
            }
            book.owns.len()
        };

        self.debug(format!(
            "### have {count} own orders for BTC/{}",
            self.currency
        ));
        self.signal_orderbook_changed.emit(&());
    }

    /// Rebuild the wallet from an account info result.
    fn on_info_result(&self, result: &Value) {
        self.debug("### got account info");
        let raw: RawAccountInfo = match serde_json::from_value(result.clone()) {
            Ok(raw) => raw,
            Err(err) => {
                self.debug(format!("### malformed account info: {err}"));
                return;
            }
        };

        {
            let mut wallet = self.wallet.lock();
            wallet.clear();
            for (currency, entry) in &raw.wallets {
                match entry.balance.value_int.value() {
                    Ok(balance) => {
                        wallet.insert(currency.clone(), balance);
                    }
                    Err(err) => log::warn!("skipping malformed {currency} balance: {err}"),
                }
            }
        }

        self.signal_wallet.emit(&());
    }

    fn on_user_order(&self, raw: &RawUserOrder) {
        match raw.to_event(&self.currency) {
            Ok(Some(event)) => {
                self.signal_userorder.emit(&event);
            }
            Ok(None) => {}
            Err(err) => self.debug(format!("### malformed user_order: {err}")),
        }
    }

    /// A wallet push carries no usable payload; pull a fresh info result
    /// instead so the balances update through the one funnel.
    fn on_wallet(&self) {
        self.client
            .send_signed_call("private/info", json!({}), "info");
    }

    /// A remark is the server acknowledging a call without acting on it.
    /// Bootstrap calls reported as silently failed are resent once.
    fn on_remark(&self, json_str: &str, envelope: &Envelope) {
        self.debug(json_str.to_owned());

        if envelope.success == Some(false) {
            if let Some(ref reqid) = envelope.id {
                self.client.resend_silent_failure(reqid);
            }
        }
    }

    fn connect_client_slots(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.client.signal_recv.connect(move |json_str: &String| {
            if let Some(engine) = weak.upgrade() {
                engine.slot_recv(json_str);
            }
            Ok(())
        });

        let weak = Arc::downgrade(self);
        self.client.signal_fulldepth.connect(move |depth| {
            if let Some(engine) = weak.upgrade() {
                engine.signal_fulldepth.emit(depth);
            }
            Ok(())
        });

        let weak = Arc::downgrade(self);
        self.client.signal_fullhistory.connect(move |trades| {
            if let Some(engine) = weak.upgrade() {
                engine.signal_fullhistory.emit(trades);
            }
            Ok(())
        });

        let weak = Arc::downgrade(self);
        self.client.signal_debug.connect(move |msg: &String| {
            if let Some(engine) = weak.upgrade() {
                engine.debug(msg.clone());
            }
            Ok(())
        });
    }

    fn connect_history_slots(self: &Arc<Self>) {
        let history = Arc::clone(&self.history);
        let changed = self.signal_history_changed.clone();
        self.signal_trade.connect(move |trade| {
            let count = history.lock().apply_trade(trade);
            if let Some(count) = count {
                changed.emit(&count);
            }
            Ok(())
        });

        let history = Arc::clone(&self.history);
        let changed = self.signal_history_changed.clone();
        self.signal_fullhistory.connect(move |trades| {
            let count = history.lock().replace(trades);
            changed.emit(&count);
            Ok(())
        });
    }

    fn connect_book_slots(self: &Arc<Self>) {
        let book = Arc::clone(&self.orderbook);
        let changed = self.signal_orderbook_changed.clone();
        self.signal_ticker.connect(move |ticker| {
            if book.lock().apply_ticker(ticker) {
                changed.emit(&());
            }
            Ok(())
        });

        let book = Arc::clone(&self.orderbook);
        let changed = self.signal_orderbook_changed.clone();
        self.signal_depth.connect(move |depth| {
            if book.lock().apply_depth(depth) {
                changed.emit(&());
            }
            Ok(())
        });

        let book = Arc::clone(&self.orderbook);
        let changed = self.signal_orderbook_changed.clone();
        self.signal_trade.connect(move |trade| {
            if book.lock().apply_trade(trade) {
                changed.emit(&());
            }
            Ok(())
        });

        let book = Arc::clone(&self.orderbook);
        let changed = self.signal_orderbook_changed.clone();
        self.signal_userorder.connect(move |event| {
            if book.lock().apply_user_order(event) {
                changed.emit(&());
            }
            Ok(())
        });

        let book = Arc::clone(&self.orderbook);
        let changed = self.signal_orderbook_changed.clone();
        self.signal_fulldepth.connect(move |depth| {
            if book.lock().apply_fulldepth(depth) {
                changed.emit(&());
            }
            Ok(())
        });
    }
}

fn own_order(raw: &RawOpenOrder) -> Result<OwnOrder, crate::error::ApiError> {
    Ok(OwnOrder {
        price: raw.price.value_int.value()?,
        volume: raw.amount.value_int.value()?,
        side: Side::try_from(raw.kind.as_str())?,
        oid: raw.oid.clone(),
        status: raw.status.clone(),
    })
}

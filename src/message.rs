//! Wire shapes of the streaming feed and the snapshot endpoints.
//!
//! Every inbound frame decodes once into an [`Envelope`]; the engine then
//! fires a handler for each recognized key that is present. Numeric fields
//! arrive from the exchange either as JSON numbers or as decimal strings,
//! so the raw types keep them as [`RawInt`] and the processed event types
//! carry plain `i64` fixed-point values.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::ApiError;

/// Channel id of the public trade stream. A trade frame on any other
/// channel is the echo of a trade against one of our own orders.
pub const PUBLIC_TRADE_CHANNEL: &str = "dbf1dee9-4f2e-4a08-8cb7-748919a71b21";

/// Side of the book an order or depth level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Buy side, sorted highest price first.
    Bid,
    /// Sell side, sorted lowest price first.
    Ask,
}

impl Side {
    /// The wire spelling used in `type_str` and order parameters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Side {
    type Error = ApiError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "bid" => Ok(Side::Bid),
            "ask" => Ok(Side::Ask),
            _ => Err(ApiError::MissingField("type_str")),
        }
    }
}

/// An integer the feed may deliver either as a JSON number or as a string.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RawInt {
    /// Plain JSON number.
    Int(i64),
    /// Decimal string.
    Text(String),
}

impl RawInt {
    /// The integer value.
    ///
    /// # Errors
    ///
    /// Will return [`ApiError::ParseNumber`] if the string form is not a
    /// decimal integer.
    pub fn value(&self) -> Result<i64, ApiError> {
        match *self {
            RawInt::Int(value) => Ok(value),
            RawInt::Text(ref text) => Ok(text.parse()?),
        }
    }
}

/// An amount of money as the exchange encodes it: a fixed-point integer
/// plus, on some messages, the currency it is denominated in.
#[derive(Deserialize, Debug, Clone)]
pub struct RawMoney {
    /// Fixed-point integer value.
    pub value_int: RawInt,
    /// Currency code, when the message carries one.
    #[serde(default)]
    pub currency: Option<String>,
}

/// One decoded inbound frame. All fields are optional; a frame may carry
/// several recognized keys and the dispatcher fires every matching handler.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Envelope {
    /// Server operation, e.g. `"remark"` or `"subscribe"`.
    pub op: Option<String>,
    /// Request id this frame correlates to.
    pub id: Option<String>,
    /// Success flag on `remark` frames.
    pub success: Option<bool>,
    /// Server message text on `remark` frames.
    pub message: Option<String>,
    /// Channel the frame was published on.
    pub channel: Option<String>,
    /// Ticker push payload.
    pub ticker: Option<RawTicker>,
    /// Depth delta push payload.
    pub depth: Option<RawDepth>,
    /// Trade push payload.
    pub trade: Option<RawTrade>,
    /// Result payload of an authenticated call.
    pub result: Option<serde_json::Value>,
    /// Own-order push payload.
    pub user_order: Option<RawUserOrder>,
    /// Wallet push payload; opaque, it only triggers an info re-pull.
    pub wallet: Option<serde_json::Value>,
}

/// Raw ticker push: best bid and best ask only.
#[derive(Deserialize, Debug, Clone)]
pub struct RawTicker {
    /// Best ask.
    pub sell: RawMoney,
    /// Best bid.
    pub buy: RawMoney,
}

/// Processed ticker event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerEvent {
    /// Best bid price.
    pub bid: i64,
    /// Best ask price.
    pub ask: i64,
}

impl TryFrom<&RawTicker> for TickerEvent {
    type Error = ApiError;

    fn try_from(value: &RawTicker) -> Result<Self, Self::Error> {
        Ok(Self {
            bid: value.buy.value_int.value()?,
            ask: value.sell.value_int.value()?,
        })
    }
}

/// Raw depth delta push.
#[derive(Deserialize, Debug, Clone)]
pub struct RawDepth {
    /// Quote currency of the level.
    pub currency: String,
    /// `"bid"` or `"ask"`.
    pub type_str: String,
    /// Price of the level.
    pub price_int: RawInt,
    /// Signed volume change; carried but not used, the total is what counts.
    pub volume_int: RawInt,
    /// New total resting volume at the price.
    pub total_volume_int: RawInt,
}

/// Processed depth event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthEvent {
    /// Side of the book the level is on.
    pub side: Side,
    /// Price of the level.
    pub price: i64,
    /// Signed volume change reported by the exchange.
    pub volume: i64,
    /// New total resting volume at the price; zero removes the level.
    pub total_volume: i64,
}

impl TryFrom<&RawDepth> for DepthEvent {
    type Error = ApiError;

    fn try_from(value: &RawDepth) -> Result<Self, Self::Error> {
        Ok(Self {
            side: Side::try_from(value.type_str.as_str())?,
            price: value.price_int.value()?,
            volume: value.volume_int.value()?,
            total_volume: value.total_volume_int.value()?,
        })
    }
}

/// Raw trade push.
#[derive(Deserialize, Debug, Clone)]
pub struct RawTrade {
    /// Quote currency the trade printed in.
    pub price_currency: String,
    /// Trade timestamp, seconds since the epoch.
    pub date: RawInt,
    /// Trade price.
    pub price_int: RawInt,
    /// Trade volume.
    pub amount_int: RawInt,
}

impl RawTrade {
    /// Convert into a processed event; `own` comes from the channel the
    /// frame arrived on, not from the payload.
    ///
    /// # Errors
    ///
    /// Will return [`ApiError::ParseNumber`] on a malformed numeric field.
    pub fn to_event(&self, own: bool) -> Result<TradeEvent, ApiError> {
        Ok(TradeEvent {
            date: self.date.value()?,
            price: self.price_int.value()?,
            volume: self.amount_int.value()?,
            own,
        })
    }
}

/// Processed trade event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeEvent {
    /// Trade timestamp, seconds since the epoch.
    pub date: i64,
    /// Trade price.
    pub price: i64,
    /// Trade volume.
    pub volume: i64,
    /// Whether the trade hit one of our own orders.
    pub own: bool,
}

/// Raw own-order push. Absence of `price` means the order was removed
/// (filled or cancelled).
#[derive(Deserialize, Debug, Clone)]
pub struct RawUserOrder {
    /// Order id.
    pub oid: String,
    /// Quote currency of the order.
    #[serde(default)]
    pub currency: Option<String>,
    /// Limit price; absent on removal.
    #[serde(default)]
    pub price: Option<RawMoney>,
    /// Remaining volume; absent on removal.
    #[serde(default)]
    pub amount: Option<RawMoney>,
    /// `"bid"` or `"ask"`; absent on removal.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Order status; absent on removal.
    #[serde(default)]
    pub status: Option<String>,
}

impl RawUserOrder {
    /// Convert into a processed event, filtered to the given currency.
    /// Returns `Ok(None)` when the order belongs to another currency.
    ///
    /// # Errors
    ///
    /// Will return [`ApiError::MissingField`] when an update frame lacks
    /// one of its required fields.
    pub fn to_event(&self, currency: &str) -> Result<Option<UserOrderEvent>, ApiError> {
        let Some(ref price) = self.price else {
            // removed (filled or canceled)
            return Ok(Some(UserOrderEvent {
                price: 0,
                volume: 0,
                side: None,
                oid: self.oid.clone(),
                status: "removed".to_owned(),
            }));
        };

        if self.currency.as_deref() != Some(currency) {
            return Ok(None);
        }

        let amount = self.amount.as_ref().ok_or(ApiError::MissingField("amount"))?;
        let kind = self.kind.as_deref().ok_or(ApiError::MissingField("type"))?;
        let status = self.status.as_deref().ok_or(ApiError::MissingField("status"))?;

        Ok(Some(UserOrderEvent {
            price: price.value_int.value()?,
            volume: amount.value_int.value()?,
            side: Some(Side::try_from(kind)?),
            oid: self.oid.clone(),
            status: status.to_owned(),
        }))
    }
}

/// Processed own-order event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOrderEvent {
    /// Limit price; zero on removal.
    pub price: i64,
    /// Remaining volume; zero on removal.
    pub volume: i64,
    /// Side of the order; `None` on removal.
    pub side: Option<Side>,
    /// Order id.
    pub oid: String,
    /// Order status, e.g. `"pending"`, `"open"`, `"removed"`.
    pub status: String,
}

/// One entry of the initial `private/orders` list.
#[derive(Deserialize, Debug, Clone)]
pub struct RawOpenOrder {
    /// Order id.
    pub oid: String,
    /// Quote currency of the order.
    pub currency: String,
    /// Limit price.
    pub price: RawMoney,
    /// Remaining volume.
    pub amount: RawMoney,
    /// `"bid"` or `"ask"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Order status.
    pub status: String,
}

/// Raw full-depth snapshot reply.
#[derive(Deserialize, Debug)]
pub struct RawFullDepth {
    /// Payload of the reply.
    #[serde(rename = "return")]
    pub ret: RawFullDepthBook,
}

/// Both sides of the raw full-depth snapshot.
#[derive(Deserialize, Debug)]
pub struct RawFullDepthBook {
    /// Ask levels, ascending by price.
    pub asks: Vec<RawFullDepthEntry>,
    /// Bid levels, ascending by price as served.
    pub bids: Vec<RawFullDepthEntry>,
}

/// One level of the raw full-depth snapshot.
#[derive(Deserialize, Debug)]
pub struct RawFullDepthEntry {
    /// Price of the level.
    pub price_int: RawInt,
    /// Total resting volume at the price.
    pub amount_int: RawInt,
}

/// One price level of a full-depth snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLevel {
    /// Price of the level.
    pub price: i64,
    /// Total resting volume at the price.
    pub volume: i64,
}

/// Processed full-depth snapshot, both sides in the order the exchange
/// serves them (ascending by price).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullDepth {
    /// Ask levels, ascending by price.
    pub asks: Vec<DepthLevel>,
    /// Bid levels, ascending by price.
    pub bids: Vec<DepthLevel>,
}

fn depth_levels(entries: &[RawFullDepthEntry]) -> Result<Vec<DepthLevel>, ApiError> {
    entries
        .iter()
        .map(|entry| {
            Ok(DepthLevel {
                price: entry.price_int.value()?,
                volume: entry.amount_int.value()?,
            })
        })
        .collect()
}

impl TryFrom<&RawFullDepth> for FullDepth {
    type Error = ApiError;

    fn try_from(value: &RawFullDepth) -> Result<Self, Self::Error> {
        Ok(Self {
            asks: depth_levels(&value.ret.asks)?,
            bids: depth_levels(&value.ret.bids)?,
        })
    }
}

/// Raw recent-trades reply.
#[derive(Deserialize, Debug)]
pub struct RawTradeList {
    /// `"success"` on a good reply.
    pub result: String,
    /// The trades, oldest first.
    #[serde(rename = "return", default)]
    pub ret: Vec<RawHistoryTrade>,
}

/// One trade of the recent-trades reply.
#[derive(Deserialize, Debug, Clone)]
pub struct RawHistoryTrade {
    /// Trade timestamp, seconds since the epoch.
    pub date: RawInt,
    /// Trade price.
    pub price_int: RawInt,
    /// Trade volume.
    pub amount_int: RawInt,
}

/// Processed entry of a `fullhistory` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTrade {
    /// Trade timestamp, seconds since the epoch.
    pub date: i64,
    /// Trade price.
    pub price: i64,
    /// Trade volume.
    pub volume: i64,
}

impl TryFrom<&RawHistoryTrade> for HistoryTrade {
    type Error = ApiError;

    fn try_from(value: &RawHistoryTrade) -> Result<Self, Self::Error> {
        Ok(Self {
            date: value.date.value()?,
            price: value.price_int.value()?,
            volume: value.amount_int.value()?,
        })
    }
}

/// Reply envelope of the signed HTTP API.
#[derive(Deserialize, Debug)]
pub struct ApiReply {
    /// `"success"` when the call was acted on.
    pub result: String,
    /// Payload of a successful call.
    #[serde(rename = "return", default)]
    pub ret: Option<serde_json::Value>,
    /// Error text of a failed call.
    #[serde(default)]
    pub error: Option<String>,
}

/// Result payload of `private/info`, reduced to the wallet balances.
#[derive(Deserialize, Debug)]
pub struct RawAccountInfo {
    /// Balances per currency.
    #[serde(rename = "Wallets")]
    pub wallets: HashMap<String, RawWalletEntry>,
}

/// One wallet of the account info reply.
#[derive(Deserialize, Debug)]
pub struct RawWalletEntry {
    /// Current balance.
    #[serde(rename = "Balance")]
    pub balance: RawMoney,
}

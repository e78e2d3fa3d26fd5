//! Order-book maintainer: the sorted public ladders, the set of own open
//! orders and the cached top of book.
//!
//! All mutations take processed events from the engine dispatcher and
//! return whether anything actually changed, so the caller can decide
//! whether to fire the change signal. Prices and volumes stay fixed-point
//! integers throughout.

use crate::message::{DepthEvent, FullDepth, Side, TickerEvent, TradeEvent, UserOrderEvent};
use crate::utils::int2str;

/// One aggregated public price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    /// Price of the level.
    pub price: i64,
    /// Total resting volume at the price.
    pub volume: i64,
}

/// One of our own open orders. A freshly submitted order may exist briefly
/// without an `oid` (placeholder); such an order cannot be cancelled until
/// the server attaches the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnOrder {
    /// Limit price.
    pub price: i64,
    /// Remaining volume.
    pub volume: i64,
    /// Side of the order.
    pub side: Side,
    /// Server order id; empty for a placeholder.
    pub oid: String,
    /// Last known status.
    pub status: String,
}

/// The order book of one quote currency.
#[derive(Debug)]
pub struct OrderBook {
    /// Quote currency, used for log formatting only.
    currency: String,
    /// Bid levels, descending by price.
    pub bids: Vec<Level>,
    /// Ask levels, ascending by price.
    pub asks: Vec<Level>,
    /// Own open orders, unordered.
    pub owns: Vec<OwnOrder>,
    /// Cached best bid price, 0 while no bid is known.
    pub bid: i64,
    /// Cached best ask price, 0 while no ask is known.
    pub ask: i64,
}

/// Whether a new level at `new` must be inserted before an existing level
/// at `existing`. Asks are sorted ascending, bids descending.
fn must_insert_before(new: i64, existing: i64, side: Side) -> bool {
    match side {
        Side::Ask => existing > new,
        Side::Bid => existing < new,
    }
}

/// Update one ladder in place: overwrite the volume of the level at
/// `price`, insert a new level at its sort position, or remove the level
/// when the new total is zero. Returns whether the ladder changed.
fn update_level(levels: &mut Vec<Level>, side: Side, price: i64, total_volume: i64) -> bool {
    if total_volume > 0 {
        let mut insert_at = levels.len();
        for (i, level) in levels.iter_mut().enumerate() {
            if level.price == price {
                if level.volume == total_volume {
                    return false;
                }
                level.volume = total_volume;
                return true;
            }
            if must_insert_before(price, level.price, side) {
                insert_at = i;
                break;
            }
        }
        levels.insert(
            insert_at,
            Level {
                price,
                volume: total_volume,
            },
        );
        true
    } else if let Some(i) = levels.iter().position(|level| level.price == price) {
        levels.remove(i);
        true
    } else {
        false
    }
}

/// Decrement the level at `price` by the traded volume and drop it when it
/// reaches zero. A price that is not in the ladder is silently ignored;
/// the matching depth delta usually arrives a moment later.
fn consume_level(levels: &mut Vec<Level>, price: i64, volume: i64) {
    if let Some(i) = levels.iter().position(|level| level.price == price) {
        levels[i].volume -= volume;
        if levels[i].volume <= 0 {
            levels.remove(i);
        }
    }
}

impl OrderBook {
    /// A new empty book for one quote currency.
    #[must_use]
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            owns: Vec::new(),
            bid: 0,
            ask: 0,
        }
    }

    /// Apply a ticker: refresh the cached top of book and trim levels the
    /// depth stream missed (asks strictly below the new ask, bids strictly
    /// above the new bid).
    pub fn apply_ticker(&mut self, event: &TickerEvent) -> bool {
        let mut changed = self.bid != event.bid || self.ask != event.ask;
        self.bid = event.bid;
        self.ask = event.ask;

        while self
            .asks
            .first()
            .is_some_and(|level| level.price < event.ask)
        {
            changed = true;
            self.asks.remove(0);
        }
        while self
            .bids
            .first()
            .is_some_and(|level| level.price > event.bid)
        {
            changed = true;
            self.bids.remove(0);
        }

        changed
    }

    /// Apply a depth delta to the affected ladder. A delta that neither
    /// changes a volume nor touches a known level is a no-op.
    pub fn apply_depth(&mut self, event: &DepthEvent) -> bool {
        let levels = match event.side {
            Side::Ask => &mut self.asks,
            Side::Bid => &mut self.bids,
        };

        update_level(levels, event.side, event.price, event.total_volume)
    }

    /// Apply a trade. A public trade removes liquidity at its price; the
    /// message carries no side, so both ladders are decremented and the
    /// miss is a no-op on the other one. The cached top of book is
    /// refreshed afterwards, dropping to 0 on a side the trade emptied.
    /// A trade against an own order only decrements the matching own
    /// entry.
    pub fn apply_trade(&mut self, event: &TradeEvent) -> bool {
        if event.own {
            log::debug!("this trade message affects only our own order");
            if let Some(i) = self.owns.iter().position(|order| order.price == event.price) {
                self.owns[i].volume -= event.volume;
                if self.owns[i].volume <= 0 {
                    self.owns.remove(i);
                }
            }
        } else {
            consume_level(&mut self.asks, event.price, event.volume);
            consume_level(&mut self.bids, event.price, event.volume);
            self.ask = self.asks.first().map_or(0, |level| level.price);
            self.bid = self.bids.first().map_or(0, |level| level.price);
        }

        true
    }

    /// Apply an own-order update: remove on `status == "removed"`, update
    /// the known entry otherwise, or append a new one.
    pub fn apply_user_order(&mut self, event: &UserOrderEvent) -> bool {
        if event.status == "removed" {
            if let Some(i) = self.owns.iter().position(|order| order.oid == event.oid) {
                let order = &self.owns[i];
                log::debug!(
                    "removing order {} price: {} type: {}",
                    event.oid,
                    int2str(order.price, &self.currency),
                    order.side
                );
                self.owns.remove(i);
            }
        } else if let Some(order) = self.owns.iter_mut().find(|order| order.oid == event.oid) {
            log::debug!(
                "updating order {} volume: {} status: {}",
                event.oid,
                int2str(event.volume, "BTC"),
                event.status
            );
            order.volume = event.volume;
            order.status = event.status.clone();
        } else {
            let Some(side) = event.side else {
                log::warn!("own order {} update without a side, dropped", event.oid);
                return false;
            };
            log::debug!(
                "adding order {} volume: {} status: {}",
                event.oid,
                int2str(event.volume, "BTC"),
                event.status
            );
            self.owns.push(OwnOrder {
                price: event.price,
                volume: event.volume,
                side,
                oid: event.oid.clone(),
                status: event.status.clone(),
            });
        }

        true
    }

    /// Wipe both ladders and repopulate them from a full-depth snapshot.
    /// The snapshot serves both sides ascending by price, so the bids are
    /// loaded reversed to put the highest bid first.
    pub fn apply_fulldepth(&mut self, depth: &FullDepth) -> bool {
        self.asks = depth
            .asks
            .iter()
            .map(|entry| Level {
                price: entry.price,
                volume: entry.volume,
            })
            .collect();
        self.bids = depth
            .bids
            .iter()
            .rev()
            .map(|entry| Level {
                price: entry.price,
                volume: entry.volume,
            })
            .collect();

        true
    }

    /// Clear all own orders, ahead of reloading them from an `orders`
    /// result.
    pub fn reset_own(&mut self) {
        self.owns.clear();
    }

    /// Add one order during the initial own-order download. All later
    /// updates arrive through [`OrderBook::apply_user_order`] and
    /// [`OrderBook::apply_trade`].
    pub fn add_own(&mut self, order: OwnOrder) {
        self.owns.push(order);
    }
}

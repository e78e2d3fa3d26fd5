//! Trade-to-candle aggregator: folds the public trade stream into
//! fixed-width OHLCV buckets, newest candle first.

use crate::message::{HistoryTrade, TradeEvent};

/// One chart candle. `tim` is the POSIX timestamp of the bucket open;
/// prices and volume are fixed-point integers like everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candle {
    /// Bucket open time, seconds since the epoch.
    pub tim: i64,
    /// Open price.
    pub opn: i64,
    /// High price.
    pub hig: i64,
    /// Low price.
    pub low: i64,
    /// Close price.
    pub cls: i64,
    /// Total traded volume.
    pub vol: i64,
}

impl Candle {
    /// A candle opened by its first trade.
    #[must_use]
    pub fn open(tim: i64, price: i64, volume: i64) -> Self {
        Self {
            tim,
            opn: price,
            hig: price,
            low: price,
            cls: price,
            vol: volume,
        }
    }

    /// Fold one more trade into the candle.
    pub fn update(&mut self, price: i64, volume: i64) {
        if price > self.hig {
            self.hig = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.cls = price;
        self.vol += volume;
    }
}

/// The in-memory trading history, newest candle at index 0.
#[derive(Debug)]
pub struct History {
    /// Candles in reverse chronological order.
    pub candles: Vec<Candle>,
    timeframe: i64,
}

impl History {
    /// A new empty history with the given bucket width in seconds.
    #[must_use]
    pub fn new(timeframe: i64) -> Self {
        assert!(timeframe > 0, "timeframe must be positive");

        Self {
            candles: Vec::new(),
            timeframe,
        }
    }

    /// Bucket width in seconds.
    #[must_use]
    pub fn timeframe(&self) -> i64 {
        self.timeframe
    }

    /// Fold one live trade into the history. Own trades do not feed the
    /// candles. Returns the payload for the change signal: `Some(1)` when
    /// the current candle was updated, `Some(len)` when a new candle was
    /// opened, `None` when nothing changed.
    pub fn apply_trade(&mut self, event: &TradeEvent) -> Option<usize> {
        if event.own {
            return None;
        }

        let bucket = self.bucket(event.date);
        match self.candles.first_mut() {
            Some(candle) if candle.tim == bucket => {
                candle.update(event.price, event.volume);
                Some(1)
            }
            _ => {
                log::debug!("opening new candle");
                self.candles
                    .insert(0, Candle::open(bucket, event.price, event.volume));
                Some(self.candles.len())
            }
        }
    }

    /// Discard the in-memory history and rebuild it from a full snapshot
    /// of recent trades, folded in arrival order. Returns the new candle
    /// count for the change signal.
    pub fn replace(&mut self, trades: &[HistoryTrade]) -> usize {
        self.candles.clear();
        for trade in trades {
            let bucket = self.bucket(trade.date);
            match self.candles.first_mut() {
                Some(candle) if candle.tim == bucket => candle.update(trade.price, trade.volume),
                _ => self
                    .candles
                    .insert(0, Candle::open(bucket, trade.price, trade.volume)),
            }
        }
        log::debug!("got {} candles", self.candles.len());

        self.candles.len()
    }

    /// The current (newest, still incomplete) candle.
    #[must_use]
    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.first()
    }

    /// Number of candles in the history.
    #[must_use]
    pub fn length(&self) -> usize {
        self.candles.len()
    }

    fn bucket(&self, date: i64) -> i64 {
        date.div_euclid(self.timeframe) * self.timeframe
    }
}

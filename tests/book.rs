use mtgox_api::book::{Level, OrderBook, OwnOrder};
use mtgox_api::message::{
    DepthEvent, DepthLevel, FullDepth, Side, TickerEvent, TradeEvent, UserOrderEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn depth(side: Side, price: i64, total_volume: i64) -> DepthEvent {
    DepthEvent {
        side,
        price,
        volume: 0,
        total_volume,
    }
}

fn trade(price: i64, volume: i64, own: bool) -> TradeEvent {
    TradeEvent {
        date: 0,
        price,
        volume,
        own,
    }
}

fn levels(book: &[Level]) -> Vec<(i64, i64)> {
    book.iter().map(|level| (level.price, level.volume)).collect()
}

#[test]
fn depth_insert_into_empty_book() {
    let mut book = OrderBook::new("USD");

    assert!(book.apply_depth(&depth(Side::Ask, 1_010_000, 100_000_000)));
    assert_eq!(levels(&book.asks), vec![(1_010_000, 100_000_000)]);
    assert!(book.bids.is_empty());
}

#[test]
fn depth_insert_keeps_asks_ascending() {
    let mut book = OrderBook::new("USD");

    assert!(book.apply_depth(&depth(Side::Ask, 1_010_000, 100_000_000)));
    assert!(book.apply_depth(&depth(Side::Ask, 1_005_000, 50_000_000)));
    assert_eq!(
        levels(&book.asks),
        vec![(1_005_000, 50_000_000), (1_010_000, 100_000_000)]
    );
}

#[test]
fn depth_zero_total_removes_level() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 1_010_000, 100_000_000));
    book.apply_depth(&depth(Side::Ask, 1_005_000, 50_000_000));

    assert!(book.apply_depth(&depth(Side::Ask, 1_010_000, 0)));
    assert_eq!(levels(&book.asks), vec![(1_005_000, 50_000_000)]);
}

#[test]
fn depth_overwrites_volume_in_place() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Bid, 900, 10));
    book.apply_depth(&depth(Side::Bid, 950, 20));

    assert!(book.apply_depth(&depth(Side::Bid, 900, 30)));
    assert_eq!(levels(&book.bids), vec![(950, 20), (900, 30)]);
}

#[test]
fn depth_noop_reports_unchanged() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 1_000, 10));

    // same total at a known price
    assert!(!book.apply_depth(&depth(Side::Ask, 1_000, 10)));
    // removal of a price that is not in the ladder
    assert!(!book.apply_depth(&depth(Side::Ask, 2_000, 0)));
    assert_eq!(levels(&book.asks), vec![(1_000, 10)]);
}

#[test]
fn depth_keeps_bids_descending() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Bid, 900, 1));
    book.apply_depth(&depth(Side::Bid, 950, 1));
    book.apply_depth(&depth(Side::Bid, 920, 1));

    assert_eq!(levels(&book.bids), vec![(950, 1), (920, 1), (900, 1)]);
}

#[test]
fn ticker_trims_stale_levels() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 1_000, 5));
    book.apply_depth(&depth(Side::Ask, 2_000, 5));
    book.apply_depth(&depth(Side::Bid, 900, 5));

    assert!(book.apply_ticker(&TickerEvent {
        bid: 950,
        ask: 1_500
    }));
    assert_eq!(levels(&book.asks), vec![(2_000, 5)]);
    assert_eq!(levels(&book.bids), vec![(900, 5)]);
    assert_eq!(book.bid, 950);
    assert_eq!(book.ask, 1_500);
}

#[test]
fn repeated_ticker_is_a_noop() {
    let mut book = OrderBook::new("USD");

    assert!(book.apply_ticker(&TickerEvent { bid: 900, ask: 950 }));
    assert!(!book.apply_ticker(&TickerEvent { bid: 900, ask: 950 }));
}

#[test]
fn public_trade_consumes_both_ladders() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 1_000, 10));
    book.apply_depth(&depth(Side::Ask, 1_100, 10));
    book.apply_depth(&depth(Side::Bid, 900, 10));

    // the trade message carries no side; the miss on the bid ladder is a no-op
    assert!(book.apply_trade(&trade(1_000, 4, false)));
    assert_eq!(levels(&book.asks), vec![(1_000, 6), (1_100, 10)]);
    assert_eq!(levels(&book.bids), vec![(900, 10)]);

    // drives the level to zero and refreshes the cached top of book
    assert!(book.apply_trade(&trade(1_000, 6, false)));
    assert_eq!(levels(&book.asks), vec![(1_100, 10)]);
    assert_eq!(book.ask, 1_100);
    assert_eq!(book.bid, 900);
}

#[test]
fn trade_emptying_a_ladder_zeroes_top_of_book() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 1_000, 10));
    book.apply_depth(&depth(Side::Bid, 900, 10));
    book.apply_ticker(&TickerEvent {
        bid: 900,
        ask: 1_000,
    });

    book.apply_trade(&trade(1_000, 10, false));
    assert!(book.asks.is_empty());
    assert_eq!(book.ask, 0);
    assert_eq!(book.bid, 900);

    book.apply_trade(&trade(900, 10, false));
    assert!(book.bids.is_empty());
    assert_eq!(book.bid, 0);
}

#[test]
fn trade_at_unknown_price_is_dropped() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 1_000, 10));

    book.apply_trade(&trade(999, 4, false));
    assert_eq!(levels(&book.asks), vec![(1_000, 10)]);
}

#[test]
fn own_trade_only_touches_own_orders() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 1_000, 10));
    book.add_own(OwnOrder {
        price: 1_000,
        volume: 5,
        side: Side::Ask,
        oid: "abc".to_owned(),
        status: "open".to_owned(),
    });

    book.apply_trade(&trade(1_000, 2, true));
    assert_eq!(levels(&book.asks), vec![(1_000, 10)]);
    assert_eq!(book.owns[0].volume, 3);

    // filled completely: the own order leaves the book
    book.apply_trade(&trade(1_000, 3, true));
    assert!(book.owns.is_empty());
}

#[test]
fn user_order_add_update_remove() {
    let mut book = OrderBook::new("USD");

    book.apply_user_order(&UserOrderEvent {
        price: 1_000,
        volume: 5,
        side: Some(Side::Bid),
        oid: "oid-1".to_owned(),
        status: "pending".to_owned(),
    });
    assert_eq!(book.owns.len(), 1);

    // same oid updates in place, no duplicate entry
    book.apply_user_order(&UserOrderEvent {
        price: 1_000,
        volume: 3,
        side: Some(Side::Bid),
        oid: "oid-1".to_owned(),
        status: "open".to_owned(),
    });
    assert_eq!(book.owns.len(), 1);
    assert_eq!(book.owns[0].volume, 3);
    assert_eq!(book.owns[0].status, "open");

    book.apply_user_order(&UserOrderEvent {
        price: 0,
        volume: 0,
        side: None,
        oid: "oid-1".to_owned(),
        status: "removed".to_owned(),
    });
    assert!(book.owns.is_empty());
}

#[test]
fn fulldepth_resets_ladders() {
    let mut book = OrderBook::new("USD");
    book.apply_depth(&depth(Side::Ask, 5, 5));
    book.apply_depth(&depth(Side::Bid, 4, 4));

    let snapshot = FullDepth {
        asks: vec![
            DepthLevel {
                price: 1_000,
                volume: 1,
            },
            DepthLevel {
                price: 1_100,
                volume: 2,
            },
        ],
        bids: vec![
            DepthLevel {
                price: 800,
                volume: 3,
            },
            DepthLevel {
                price: 900,
                volume: 4,
            },
        ],
    };
    assert!(book.apply_fulldepth(&snapshot));

    assert_eq!(levels(&book.asks), vec![(1_000, 1), (1_100, 2)]);
    // the snapshot serves bids ascending; the book wants the best bid first
    assert_eq!(levels(&book.bids), vec![(900, 4), (800, 3)]);
}

fn assert_invariants(book: &OrderBook) {
    for pair in book.asks.windows(2) {
        assert!(pair[0].price < pair[1].price, "asks not strictly ascending");
    }
    for pair in book.bids.windows(2) {
        assert!(pair[0].price > pair[1].price, "bids not strictly descending");
    }
    for level in book.asks.iter().chain(book.bids.iter()) {
        assert!(level.volume > 0, "level with non-positive volume");
    }
    if let (Some(ask), Some(bid)) = (book.asks.first(), book.bids.first()) {
        assert!(ask.price > bid.price, "book crossed");
    }
}

/// Feed a long pseudo-random but exchange-legal event sequence (asks above
/// 1000, bids below) and check the structural invariants after every step.
#[test]
fn invariants_hold_under_random_events() {
    let mut rng = StdRng::seed_from_u64(0x0b00_5e11);
    let mut book = OrderBook::new("USD");

    for step in 0..5_000 {
        match rng.gen_range(0..10) {
            0..=4 => {
                let side = if rng.gen() { Side::Ask } else { Side::Bid };
                let price = match side {
                    Side::Ask => rng.gen_range(1_001..1_200),
                    Side::Bid => rng.gen_range(800..1_000),
                };
                let total = rng.gen_range(0..50);
                book.apply_depth(&depth(side, price, total));
            }
            5..=7 => {
                let price = rng.gen_range(800..1_200);
                let volume = rng.gen_range(1..30);
                book.apply_trade(&trade(price, volume, false));
            }
            8 => {
                let bid = rng.gen_range(800..1_000);
                let ask = rng.gen_range(1_001..1_200);
                book.apply_ticker(&TickerEvent { bid, ask });
            }
            _ => {
                let snapshot = FullDepth {
                    asks: vec![
                        DepthLevel {
                            price: 1_050,
                            volume: rng.gen_range(1..10),
                        },
                        DepthLevel {
                            price: 1_060,
                            volume: rng.gen_range(1..10),
                        },
                    ],
                    bids: vec![
                        DepthLevel {
                            price: 940,
                            volume: rng.gen_range(1..10),
                        },
                        DepthLevel {
                            price: 950,
                            volume: rng.gen_range(1..10),
                        },
                    ],
                };
                book.apply_fulldepth(&snapshot);
            }
        }

        assert_invariants(&book);
        // after a trade the cached top of book tracks the ladder heads,
        // dropping to 0 on a side the trade emptied
        if !book.asks.is_empty() && step % 10 == 5 {
            book.apply_trade(&trade(book.asks[0].price, 1, false));
            assert_eq!(book.ask, book.asks.first().map_or(0, |l| l.price));
            assert_eq!(book.bid, book.bids.first().map_or(0, |l| l.price));
        }
    }
}

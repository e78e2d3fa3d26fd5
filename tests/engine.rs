use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_channel::mpsc::UnboundedReceiver;
use mtgox_api::engine::Engine;
use mtgox_api::message::{DepthLevel, FullDepth, HistoryTrade};
use mtgox_api::utils::config::Config;
use serde_json::Value;

const KEY: &str = "814f23c3-1234-4f23-a2b0-0d9e5e7c1234";
const SECRET: &str =
    "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCUmJygpKissLS4vMDEyMzQ1Njc4OTo7PD0+Pw==";

fn authed_config() -> Config {
    let mut config = Config::new();
    config.set("gox", "secret_key", KEY);
    config.set("gox", "secret_secret", SECRET);
    config
}

/// Count emissions of a `()` signal.
fn count_changes(signal: &mtgox_api::signal::Signal<()>) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let slot_counter = Arc::clone(&counter);
    signal.connect(move |_| {
        slot_counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    counter
}

fn drain(outbound: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = outbound.try_next() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

#[test]
fn ticker_updates_top_of_book_and_filters_currency() {
    let engine = Engine::new(Config::new());

    engine.slot_recv(
        r#"{"ticker":{"sell":{"value_int":"1000000","currency":"USD"},"buy":{"value_int":999000,"currency":"USD"}}}"#,
    );
    {
        let book = engine.orderbook.lock();
        assert_eq!(book.bid, 999_000);
        assert_eq!(book.ask, 1_000_000);
    }

    // a ticker for another currency is ignored
    engine.slot_recv(
        r#"{"ticker":{"sell":{"value_int":"5","currency":"JPY"},"buy":{"value_int":"4","currency":"JPY"}}}"#,
    );
    let book = engine.orderbook.lock();
    assert_eq!(book.bid, 999_000);
    assert_eq!(book.ask, 1_000_000);
}

#[test]
fn depth_frames_maintain_the_ladder() {
    let engine = Engine::new(Config::new());
    let changes = count_changes(&engine.signal_orderbook_changed);

    engine.slot_recv(
        r#"{"depth":{"currency":"USD","type_str":"ask","price_int":1010000,"volume_int":100000000,"total_volume_int":100000000}}"#,
    );
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    {
        let book = engine.orderbook.lock();
        assert_eq!(book.asks.len(), 1);
        assert_eq!((book.asks[0].price, book.asks[0].volume), (1_010_000, 100_000_000));
    }

    engine.slot_recv(
        r#"{"depth":{"currency":"USD","type_str":"ask","price_int":1005000,"volume_int":50000000,"total_volume_int":50000000}}"#,
    );
    assert_eq!(changes.load(Ordering::SeqCst), 2);
    {
        let book = engine.orderbook.lock();
        assert_eq!(
            book.asks.iter().map(|l| (l.price, l.volume)).collect::<Vec<_>>(),
            vec![(1_005_000, 50_000_000), (1_010_000, 100_000_000)]
        );
    }

    engine.slot_recv(
        r#"{"depth":{"currency":"USD","type_str":"ask","price_int":1010000,"volume_int":0,"total_volume_int":0}}"#,
    );
    assert_eq!(changes.load(Ordering::SeqCst), 3);
    {
        let book = engine.orderbook.lock();
        assert_eq!(
            book.asks.iter().map(|l| (l.price, l.volume)).collect::<Vec<_>>(),
            vec![(1_005_000, 50_000_000)]
        );
    }

    // a no-op delta (same total at a known price) emits no change
    engine.slot_recv(
        r#"{"depth":{"currency":"USD","type_str":"ask","price_int":1005000,"volume_int":0,"total_volume_int":50000000}}"#,
    );
    assert_eq!(changes.load(Ordering::SeqCst), 3);

    // another currency never touches the book
    engine.slot_recv(
        r#"{"depth":{"currency":"EUR","type_str":"ask","price_int":1,"volume_int":1,"total_volume_int":1}}"#,
    );
    assert_eq!(changes.load(Ordering::SeqCst), 3);
}

#[test]
fn public_trade_consumes_book_and_feeds_candles() {
    let engine = Engine::new(Config::new());
    engine.slot_recv(
        r#"{"depth":{"currency":"USD","type_str":"ask","price_int":1000,"volume_int":10,"total_volume_int":10}}"#,
    );

    engine.slot_recv(
        r#"{"trade":{"price_currency":"USD","date":1234,"price_int":1000,"amount_int":4},"channel":"dbf1dee9-4f2e-4a08-8cb7-748919a71b21"}"#,
    );

    assert_eq!(engine.orderbook.lock().asks[0].volume, 6);
    let history = engine.history.lock();
    assert_eq!(history.length(), 1);
    assert_eq!(history.last_candle().unwrap().vol, 4);
}

#[test]
fn own_trade_skips_candles_and_public_ladders() {
    let engine = Engine::new(Config::new());
    engine.slot_recv(
        r#"{"depth":{"currency":"USD","type_str":"ask","price_int":1000,"volume_int":10,"total_volume_int":10}}"#,
    );
    engine.slot_recv(
        r#"{"user_order":{"oid":"o1","currency":"USD","price":{"value_int":1000},"amount":{"value_int":5},"type":"ask","status":"open"}}"#,
    );
    assert_eq!(engine.orderbook.lock().owns.len(), 1);

    // not the public channel: the trade is an own-trade echo
    engine.slot_recv(
        r#"{"trade":{"price_currency":"USD","date":1234,"price_int":1000,"amount_int":2},"channel":"some-account-channel"}"#,
    );

    let book = engine.orderbook.lock();
    assert_eq!(book.asks[0].volume, 10);
    assert_eq!(book.owns[0].volume, 3);
    drop(book);
    assert_eq!(engine.history.lock().length(), 0);
}

#[test]
fn user_order_without_price_removes() {
    let engine = Engine::new(Config::new());
    engine.slot_recv(
        r#"{"user_order":{"oid":"o1","currency":"USD","price":{"value_int":1000},"amount":{"value_int":5},"type":"bid","status":"open"}}"#,
    );
    assert_eq!(engine.orderbook.lock().owns.len(), 1);

    engine.slot_recv(r#"{"user_order":{"oid":"o1"}}"#);
    assert!(engine.orderbook.lock().owns.is_empty());
}

#[test]
fn orders_result_replaces_own_orders_filtered_to_currency() {
    let engine = Engine::new(Config::new());
    engine.slot_recv(
        r#"{"user_order":{"oid":"stale","currency":"USD","price":{"value_int":1},"amount":{"value_int":1},"type":"bid","status":"open"}}"#,
    );

    engine.slot_recv(
        r#"{"result":[
            {"oid":"o1","currency":"USD","price":{"value_int":"900"},"amount":{"value_int":"2"},"type":"bid","status":"open"},
            {"oid":"o2","currency":"EUR","price":{"value_int":"901"},"amount":{"value_int":"3"},"type":"bid","status":"open"}
        ],"id":"orders"}"#,
    );

    let book = engine.orderbook.lock();
    assert_eq!(book.owns.len(), 1);
    assert_eq!(book.owns[0].oid, "o1");
    assert_eq!(book.owns[0].price, 900);
}

#[test]
fn info_result_rebuilds_wallet() {
    let engine = Engine::new(Config::new());
    let wallet_signals = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&wallet_signals);
    engine.signal_wallet.connect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    engine.slot_recv(
        r#"{"result":{"Wallets":{"BTC":{"Balance":{"value_int":"5000"}},"USD":{"Balance":{"value_int":777}}}},"id":"info"}"#,
    );

    let wallet = engine.wallet.lock();
    assert_eq!(wallet.get("BTC"), Some(&5_000));
    assert_eq!(wallet.get("USD"), Some(&777));
    drop(wallet);
    assert_eq!(wallet_signals.load(Ordering::SeqCst), 1);
}

#[test]
fn idkey_result_subscribes_account_channel() {
    let engine = Engine::new(Config::new());

    engine.slot_recv(r#"{"result":"the-idkey","id":"idkey"}"#);

    let mut outbound = engine.client.take_outbound().unwrap();
    let frames = drain(&mut outbound);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], "mtgox.subscribe");
    assert_eq!(frames[0]["key"], "the-idkey");
}

#[test]
fn wallet_push_triggers_info_repull() {
    let engine = Engine::new(authed_config());
    let mut outbound = engine.client.take_outbound().unwrap();

    engine.slot_recv(r#"{"wallet":{"op":"private"}}"#);

    let frames = drain(&mut outbound);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], "call");
    assert_eq!(frames[0]["id"], "info");
}

#[test]
fn silently_failed_bootstrap_call_is_resent_once() {
    let engine = Engine::new(authed_config());
    let mut outbound = engine.client.take_outbound().unwrap();

    engine
        .client
        .send_signed_call("private/orders", serde_json::json!({}), "orders");
    assert_eq!(drain(&mut outbound).len(), 1);

    // the server dropped the call without acting on it
    engine.slot_recv(r#"{"op":"remark","success":false,"id":"orders","message":"Method not found"}"#);
    let frames = drain(&mut outbound);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], "call");
    assert_eq!(frames[0]["id"], "orders");

    // a second remark does not trigger another resend
    engine.slot_recv(r#"{"op":"remark","success":false,"id":"orders"}"#);
    assert!(drain(&mut outbound).is_empty());

    // a success reply retires the call; later remarks are ignored too
    engine.slot_recv(r#"{"result":[],"id":"orders"}"#);
    engine.slot_recv(r#"{"op":"remark","success":false,"id":"orders"}"#);
    assert!(drain(&mut outbound).is_empty());
}

#[test]
fn remark_for_unknown_call_is_ignored() {
    let engine = Engine::new(authed_config());
    let mut outbound = engine.client.take_outbound().unwrap();

    engine.slot_recv(r#"{"op":"remark","success":false,"id":"nobody"}"#);
    assert!(drain(&mut outbound).is_empty());
}

#[test]
fn fulldepth_signal_resets_the_book() {
    let engine = Engine::new(Config::new());
    engine.slot_recv(
        r#"{"depth":{"currency":"USD","type_str":"ask","price_int":5,"volume_int":5,"total_volume_int":5}}"#,
    );
    let changes = count_changes(&engine.signal_orderbook_changed);

    engine.signal_fulldepth.emit(&FullDepth {
        asks: vec![DepthLevel {
            price: 1_000,
            volume: 1,
        }],
        bids: vec![
            DepthLevel {
                price: 800,
                volume: 2,
            },
            DepthLevel {
                price: 900,
                volume: 3,
            },
        ],
    });

    assert_eq!(changes.load(Ordering::SeqCst), 1);
    let book = engine.orderbook.lock();
    assert_eq!(book.asks.len(), 1);
    assert_eq!(book.bids[0].price, 900);
}

#[test]
fn fullhistory_signal_replaces_candles() {
    let engine = Engine::new(Config::new());
    let counts = Arc::new(std::sync::Mutex::new(Vec::new()));
    let slot_counts = Arc::clone(&counts);
    engine.signal_history_changed.connect(move |count| {
        slot_counts.lock().unwrap().push(*count);
        Ok(())
    });

    engine.signal_fullhistory.emit(&vec![
        HistoryTrade {
            date: 900,
            price: 10,
            volume: 1,
        },
        HistoryTrade {
            date: 1_800,
            price: 11,
            volume: 2,
        },
    ]);

    assert_eq!(engine.history.lock().length(), 2);
    assert_eq!(*counts.lock().unwrap(), vec![2]);
}

#[test]
fn malformed_frames_are_dropped() {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = Engine::new(Config::new());

    engine.slot_recv("{ not json at all");
    engine.slot_recv(r#"{"depth":{"currency":"USD"}}"#);
    engine.slot_recv(r#"{"op":"some.new.op"}"#);

    let book = engine.orderbook.lock();
    assert!(book.asks.is_empty());
    assert!(book.bids.is_empty());
}

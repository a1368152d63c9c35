#![cfg(target_arch = "wasm32")]

use coin_pusher_core::{CoinPusherEngine, KeyValueStore, LocalStorageStore};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn resolution(json: &str) -> serde_json::Value {
    serde_json::from_str(json).expect("resolution should be valid json")
}

#[wasm_bindgen_test]
fn local_storage_round_trips_values() {
    let mut store = LocalStorageStore::new();
    assert!(store.is_available());
    store.set("coinPusherTest", "17");
    assert_eq!(store.get("coinPusherTest").as_deref(), Some("17"));
}

#[wasm_bindgen_test]
fn engine_scores_and_combos() {
    let engine = CoinPusherEngine::new(None, None).expect("engine should build");
    engine.start_game().expect("start should succeed");

    let first = resolution(&engine.add_score(10.0).unwrap());
    assert_eq!(first["view"]["score"], 10);
    assert_eq!(first["view"]["combo"], 1);

    let second = resolution(&engine.add_score(5.0).unwrap());
    assert_eq!(second["view"]["score"], 15);
    assert_eq!(second["view"]["combo"], 2);

    assert!(engine.add_score(1.5).is_err());
    engine.end_game().unwrap();
}

#[wasm_bindgen_test]
fn engine_applies_difficulty_changes() {
    let engine = CoinPusherEngine::new(None, None).unwrap();
    engine.set_difficulty("easy").unwrap();
    let adjusted = engine.adjusted_drop_probability().unwrap();
    assert!((adjusted - 84.0).abs() < 1e-9);
    assert!(engine.set_difficulty("impossible").is_err());
    assert!(engine.set_coin_count(-3.0).is_err());
}

#[wasm_bindgen_test]
fn engine_clamps_push_bar() {
    let engine = CoinPusherEngine::new(None, None).unwrap();
    let moved = resolution(&engine.move_push_bar(10_000.0).unwrap());
    assert_eq!(moved["view"]["pushBarPosition"], 700.0);
}

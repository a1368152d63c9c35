pub mod game;
pub mod runtime;

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub use game::{
    clamp_probability, combo_multiplier, format_elapsed_time, next_phase, probability_to_chance,
    ConfigError, Difficulty, DifficultyFactors, FieldObject, GameConfig, GameError, GameEvent,
    GamePhase, GameSession, GameStateMachine, GameStore, PhaseCommand, PhysicsConfig,
    PrizeRoller, PrizeTemplate, PrizeTemplatePatch, Resolution, Reward, RewardId, SessionView,
};
pub use runtime::{
    Clock, IntervalScheduler, KeyValueStore, LocalStorageStore, ManualClock, ManualScheduler,
    MemoryStore, SystemClock, TickScheduler, TimerHandle,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    console_log::init_with_level(log::Level::Debug).ok();
    log::info!("coin pusher core initialised");
}

fn to_js_error<E: Serialize + Display>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn serde_to_js_error<E: Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(resolution: Resolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn whole_number(field: &str, value: f64) -> Result<i64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite {
            field: field.to_string(),
        });
    }
    if value.fract() != 0.0 {
        return Err(ConfigError::NotAnInteger {
            field: field.to_string(),
            value,
        });
    }
    Ok(value as i64)
}

fn parse_field_objects(json: &str) -> Result<Vec<FieldObject>, GameError> {
    serde_json::from_str(json).map_err(|error| GameError::InvalidFieldObjects {
        message: error.to_string(),
    })
}

/// 浏览器端入口：持有配置与会话，计时器由 `setInterval` 驱动。
#[wasm_bindgen]
pub struct CoinPusherEngine {
    store: Rc<RefCell<GameStore>>,
}

#[wasm_bindgen]
impl CoinPusherEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        strict_transitions: Option<bool>,
    ) -> Result<CoinPusherEngine, JsValue> {
        let config = match config_json {
            Some(json) => GameConfig::from_json(&json).map_err(to_js_error)?,
            None => GameConfig::default(),
        };
        let strict = strict_transitions.unwrap_or(false);
        let store = Rc::new_cyclic(|weak| {
            let machine = GameStateMachine::new(
                Box::new(SystemClock),
                Box::new(LocalStorageStore::new()),
                Box::new(IntervalScheduler::new(weak.clone())),
            )
            .with_strict_transitions(strict);
            RefCell::new(GameStore::new(config, machine))
        });
        Ok(CoinPusherEngine { store })
    }

    pub fn config_json(&self) -> Result<String, JsValue> {
        self.store.borrow().config().to_json().map_err(to_js_error)
    }

    pub fn session_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.store.borrow().game().session()).map_err(serde_to_js_error)
    }

    pub fn view(&self) -> Result<JsValue, JsValue> {
        to_value(&self.store.borrow().game().view()).map_err(JsValue::from)
    }

    pub fn start_game(&self) -> Result<String, JsValue> {
        self.resolve(|store| store.game_mut().start_game())
    }

    pub fn pause_game(&self) -> Result<String, JsValue> {
        self.resolve(|store| store.game_mut().pause_game())
    }

    pub fn resume_game(&self) -> Result<String, JsValue> {
        self.resolve(|store| store.game_mut().resume_game())
    }

    pub fn end_game(&self) -> Result<String, JsValue> {
        self.resolve(|store| store.game_mut().end_game())
    }

    pub fn reset_game(&self) -> Result<String, JsValue> {
        self.resolve(|store| store.game_mut().reset_game())
    }

    pub fn tick(&self) -> Result<String, JsValue> {
        self.resolve(|store| Ok(store.game_mut().tick()))
    }

    pub fn load_persisted_high_score(&self) -> Result<String, JsValue> {
        self.resolve(|store| Ok(store.game_mut().load_persisted_high_score()))
    }

    pub fn move_push_bar(&self, position: f64) -> Result<String, JsValue> {
        self.resolve(|store| store.move_push_bar(position))
    }

    pub fn update_field_objects_json(
        &self,
        coins_json: &str,
        prizes_json: &str,
    ) -> Result<String, JsValue> {
        self.resolve(|store| {
            let coins = parse_field_objects(coins_json)?;
            let prizes = parse_field_objects(prizes_json)?;
            store.game_mut().update_field_objects(coins, prizes)
        })
    }

    pub fn add_score(&self, points: f64) -> Result<String, JsValue> {
        self.resolve(|store| {
            if !points.is_finite() || points.fract() != 0.0 {
                return Err(GameError::InvalidPoints { points });
            }
            store.game_mut().add_score(points as i64)
        })
    }

    pub fn add_reward_json(&self, template_json: &str) -> Result<String, JsValue> {
        let template: PrizeTemplate =
            serde_json::from_str(template_json).map_err(serde_to_js_error)?;
        self.resolve(|store| store.game_mut().add_reward(&template))
    }

    pub fn collect_coin(&self) -> Result<String, JsValue> {
        self.resolve(|store| store.collect_coin())
    }

    pub fn collect_prize(&self, index: usize) -> Result<String, JsValue> {
        self.resolve(|store| store.collect_prize(index))
    }

    pub fn set_difficulty(&self, value: &str) -> Result<(), JsValue> {
        let difficulty: Difficulty = value.parse().map_err(to_js_error)?;
        self.configure(|config| config.set_difficulty(difficulty))
    }

    pub fn set_coin_count(&self, count: f64) -> Result<(), JsValue> {
        let count = whole_number("coinCount", count).map_err(to_js_error)?;
        self.configure(|config| config.set_coin_count(count))
    }

    pub fn set_push_bar_length(&self, length: f64) -> Result<(), JsValue> {
        self.configure(|config| config.set_push_bar_length(length))
    }

    pub fn set_drop_probability_base(&self, probability: f64) -> Result<(), JsValue> {
        self.configure(|config| config.set_drop_probability_base(probability))
    }

    pub fn update_prize_template_json(
        &self,
        index: usize,
        patch_json: &str,
    ) -> Result<String, JsValue> {
        let patch: PrizeTemplatePatch =
            serde_json::from_str(patch_json).map_err(serde_to_js_error)?;
        let mut store = self.store.borrow_mut();
        let updated = store
            .config_mut()
            .update_prize_template(index, patch)
            .map_err(to_js_error)?;
        serde_json::to_string(updated).map_err(serde_to_js_error)
    }

    pub fn difficulty_factors(&self) -> Result<JsValue, JsValue> {
        let factors = self
            .store
            .borrow()
            .config()
            .difficulty_factors()
            .map_err(to_js_error)?;
        to_value(&factors).map_err(JsValue::from)
    }

    pub fn adjusted_drop_probability(&self) -> Result<f64, JsValue> {
        self.store
            .borrow()
            .config()
            .adjusted_drop_probability()
            .map_err(to_js_error)
    }

    pub fn adjusted_spawn_probability(&self) -> Result<f64, JsValue> {
        self.store
            .borrow()
            .config()
            .adjusted_spawn_probability()
            .map_err(to_js_error)
    }

    pub fn roll_prize_spawn(&self) -> Result<JsValue, JsValue> {
        let spawned = self
            .store
            .borrow_mut()
            .roll_prize_spawn()
            .map_err(to_js_error)?;
        to_value(&spawned).map_err(JsValue::from)
    }

    pub fn roll_coin_drop(&self) -> Result<bool, JsValue> {
        self.store.borrow_mut().roll_coin_drop().map_err(to_js_error)
    }

    pub fn roll_prize_drop(&self, index: usize) -> Result<bool, JsValue> {
        self.store
            .borrow_mut()
            .roll_prize_drop(index)
            .map_err(to_js_error)
    }

    fn resolve<F>(&self, action: F) -> Result<String, JsValue>
    where
        F: FnOnce(&mut GameStore) -> Result<Vec<GameEvent>, GameError>,
    {
        let mut store = self.store.borrow_mut();
        let events = action(&mut *store).map_err(to_js_error)?;
        make_resolution_json(Resolution::new(store.game().session(), events))
    }

    fn configure<F>(&self, action: F) -> Result<(), JsValue>
    where
        F: FnOnce(&mut GameConfig) -> Result<(), ConfigError>,
    {
        action(self.store.borrow_mut().config_mut()).map_err(to_js_error)
    }
}

/// 返回默认配置，方便前端初始化。
#[wasm_bindgen(js_name = "createDefaultConfig")]
pub fn create_default_config() -> Result<JsValue, JsValue> {
    GameConfig::default()
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateConfig")]
pub fn validate_config(config: JsValue) -> Result<(), JsValue> {
    let config: GameConfig = from_value(config).map_err(JsValue::from)?;
    config.validate().map_err(to_js_error)
}

#[wasm_bindgen(js_name = "comboMultiplier")]
pub fn combo_multiplier_js(combo: u32) -> f64 {
    combo_multiplier(combo)
}

#[wasm_bindgen(js_name = "formatElapsedTime")]
pub fn format_elapsed_time_js(seconds: u32) -> String {
    format_elapsed_time(seconds as u64)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_number_rejects_fractions_and_nan() {
        assert_eq!(whole_number("coinCount", 12.0), Ok(12));
        assert!(matches!(
            whole_number("coinCount", 1.5),
            Err(ConfigError::NotAnInteger { .. })
        ));
        assert!(matches!(
            whole_number("coinCount", f64::INFINITY),
            Err(ConfigError::NotFinite { .. })
        ));
    }

    #[test]
    fn field_objects_must_be_json_arrays() {
        assert_eq!(parse_field_objects("[1, {\"id\": 2}]").unwrap().len(), 2);
        assert!(matches!(
            parse_field_objects("{\"id\": 2}"),
            Err(GameError::InvalidFieldObjects { .. })
        ));
    }
}

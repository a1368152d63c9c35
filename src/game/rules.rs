use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    config::{ConfigError, GameConfig, PrizeTemplate},
    state::{
        combo_multiplier, FieldObject, GameEvent, GamePhase, GameSession, Reward, SessionView,
        COMBO_WINDOW_MS,
    },
};
use crate::runtime::{
    parse_high_score, Clock, KeyValueStore, TickScheduler, TimerHandle, HIGH_SCORE_KEY,
    TICK_INTERVAL_MS,
};

/// 改变游戏阶段的指令。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PhaseCommand {
    Start,
    Pause,
    Resume,
    End,
    Reset,
}

impl fmt::Display for PhaseCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseCommand::Start => "start",
            PhaseCommand::Pause => "pause",
            PhaseCommand::Resume => "resume",
            PhaseCommand::End => "end",
            PhaseCommand::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// 阶段转换表；`None` 表示该指令在当前阶段不生效。
pub fn next_phase(phase: GamePhase, command: PhaseCommand) -> Option<GamePhase> {
    use GamePhase::*;
    use PhaseCommand::*;

    match (phase, command) {
        (Init | Ended, Start) => Some(Running),
        (Running, Pause) => Some(Paused),
        (Paused, Resume) => Some(Running),
        (Init | Running | Paused, End) => Some(Ended),
        (_, Reset) => Some(Init),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[serde(tag = "type")]
pub enum GameError {
    #[error("invalid configuration: {error}")]
    Config {
        #[from]
        error: ConfigError,
    },
    #[error("cannot {command} while {from:?}")]
    InvalidTransition {
        from: GamePhase,
        command: PhaseCommand,
    },
    #[error("session has ended, reset before mutating it")]
    SessionEnded,
    #[error("points must be a finite whole number, got {points}")]
    InvalidPoints { points: f64 },
    #[error("push bar position must be finite, got {position}")]
    InvalidPosition { position: f64 },
    #[error("malformed field objects: {message}")]
    InvalidFieldObjects { message: String },
}

/// 一次操作后的会话快照与事件。
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub session: GameSession,
    pub view: SessionView,
    pub events: Vec<GameEvent>,
}

impl Resolution {
    pub fn new(session: &GameSession, events: Vec<GameEvent>) -> Self {
        Self {
            session: session.clone(),
            view: session.view(),
            events,
        }
    }
}

/// 会话状态机：持有唯一的会话，以及至多一个计时任务句柄。
pub struct GameStateMachine {
    session: GameSession,
    clock: Box<dyn Clock>,
    store: Box<dyn KeyValueStore>,
    scheduler: Box<dyn TickScheduler>,
    timer: Option<Box<dyn TimerHandle>>,
    strict: bool,
}

impl GameStateMachine {
    pub fn new(
        clock: Box<dyn Clock>,
        store: Box<dyn KeyValueStore>,
        scheduler: Box<dyn TickScheduler>,
    ) -> Self {
        Self {
            session: GameSession::new(),
            clock,
            store,
            scheduler,
            timer: None,
            strict: false,
        }
    }

    /// 严格模式下，非法的阶段转换返回错误而不是静默忽略。
    pub fn with_strict_transitions(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn view(&self) -> SessionView {
        self.session.view()
    }

    pub fn phase(&self) -> GamePhase {
        self.session.phase
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn start_game(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let from = self.session.phase;
        let Some(to) = self.transition(PhaseCommand::Start)? else {
            return Ok(Vec::new());
        };
        let mut events = Vec::new();
        if from == GamePhase::Ended {
            self.session.clear_round();
            events.push(GameEvent::SessionReset);
        }
        events.push(self.enter(from, to));
        self.arm_timer();
        Ok(events)
    }

    pub fn pause_game(&mut self) -> Result<Vec<GameEvent>, GameError> {
        self.simple_transition(PhaseCommand::Pause)
    }

    pub fn resume_game(&mut self) -> Result<Vec<GameEvent>, GameError> {
        self.simple_transition(PhaseCommand::Resume)
    }

    pub fn end_game(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let events = self.simple_transition(PhaseCommand::End)?;
        if self.session.is_ended() {
            self.disarm_timer();
        }
        Ok(events)
    }

    pub fn reset_game(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let from = self.session.phase;
        let Some(to) = self.transition(PhaseCommand::Reset)? else {
            return Ok(Vec::new());
        };
        self.disarm_timer();
        self.session.clear_round();
        let mut events = vec![GameEvent::SessionReset];
        if from != to {
            events.push(self.enter(from, to));
        }
        Ok(events)
    }

    /// 推板位置截断到 `[0, boardWidth - pushBarLength]`。
    pub fn set_push_bar_position(
        &mut self,
        position: f64,
        config: &GameConfig,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_ended()?;
        if !position.is_finite() {
            return Err(GameError::InvalidPosition { position });
        }
        let clamped = position.clamp(0.0, config.max_push_bar_position());
        self.session.push_bar_position = clamped;
        Ok(vec![GameEvent::PushBarMoved { position: clamped }])
    }

    pub fn update_field_objects(
        &mut self,
        coins: Vec<FieldObject>,
        prizes: Vec<FieldObject>,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_ended()?;
        self.session.coins = coins;
        self.session.active_prizes = prizes;
        Ok(vec![GameEvent::FieldObjectsUpdated {
            coins: self.session.coins.len(),
            prizes: self.session.active_prizes.len(),
        }])
    }

    /// 加分；每次加分都参与连击判定，并在刷新最高分时立即持久化。
    pub fn add_score(&mut self, points: i64) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_ended()?;
        let now = self.clock.now_ms();
        let mut events = Vec::new();

        self.session.score = self.session.score.saturating_add(points);
        if self.session.score > self.session.high_score {
            self.session.high_score = self.session.score;
            self.persist_high_score();
            events.push(GameEvent::HighScoreUpdated {
                high_score: self.session.high_score,
            });
        }

        self.session.combo = self.combo_at(now);
        self.session.last_reward_timestamp = Some(now);

        events.insert(
            0,
            GameEvent::ScoreAdded {
                points,
                score: self.session.score,
                combo: self.session.combo,
            },
        );
        Ok(events)
    }

    /// 记录奖励，不会自动加分。
    pub fn add_reward(&mut self, template: &PrizeTemplate) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_ended()?;
        let now = self.clock.now_ms();
        let id = match self.session.last_reward_id() {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.session.rewards.push(Reward {
            prize: template.clone(),
            id,
            timestamp: now,
        });
        Ok(vec![GameEvent::RewardAdded {
            reward_id: id,
            name: template.name.clone(),
        }])
    }

    /// 金币掉落：按当前连击倍率折算金币价值后加分。
    pub fn collect_coin(&mut self, config: &GameConfig) -> Result<Vec<GameEvent>, GameError> {
        let points = self.scaled_points(config.coin_value());
        self.add_score(points)
    }

    /// 奖品掉落：记录奖励并按连击倍率加分。
    pub fn collect_prize(
        &mut self,
        template: &PrizeTemplate,
    ) -> Result<Vec<GameEvent>, GameError> {
        let points = self.scaled_points(template.value);
        let mut events = self.add_reward(template)?;
        events.extend(self.add_score(points)?);
        Ok(events)
    }

    /// 读取持久化的最高分；缺失或格式错误时保持当前值。
    pub fn load_persisted_high_score(&mut self) -> Vec<GameEvent> {
        let Some(raw) = self.store.get(HIGH_SCORE_KEY) else {
            log::debug!("no persisted high score");
            return Vec::new();
        };
        let Some(high_score) = parse_high_score(&raw) else {
            log::warn!("ignoring malformed persisted high score {raw:?}");
            return Vec::new();
        };
        if high_score <= self.session.high_score {
            return Vec::new();
        }
        self.session.high_score = high_score;
        vec![GameEvent::HighScoreLoaded { high_score }]
    }

    /// 计时器回调：运行中每秒加一；离开 running/paused 后注销计时器。
    pub fn tick(&mut self) -> Vec<GameEvent> {
        if self.timer.is_none() {
            return Vec::new();
        }
        match self.session.phase {
            GamePhase::Running => {
                self.session.elapsed_seconds += 1;
                vec![GameEvent::ElapsedTimeAdvanced {
                    elapsed_seconds: self.session.elapsed_seconds,
                }]
            }
            GamePhase::Paused => Vec::new(),
            GamePhase::Init | GamePhase::Ended => {
                self.disarm_timer();
                Vec::new()
            }
        }
    }

    fn simple_transition(&mut self, command: PhaseCommand) -> Result<Vec<GameEvent>, GameError> {
        let from = self.session.phase;
        Ok(self
            .transition(command)?
            .map(|to| vec![self.enter(from, to)])
            .unwrap_or_default())
    }

    fn transition(&self, command: PhaseCommand) -> Result<Option<GamePhase>, GameError> {
        let from = self.session.phase;
        match next_phase(from, command) {
            Some(to) => Ok(Some(to)),
            None if self.strict => Err(GameError::InvalidTransition { from, command }),
            None => {
                log::debug!("ignoring {command} while {from:?}");
                Ok(None)
            }
        }
    }

    fn enter(&mut self, from: GamePhase, to: GamePhase) -> GameEvent {
        self.session.phase = to;
        log::info!("game phase {from:?} -> {to:?}");
        GameEvent::PhaseChanged { from, to }
    }

    fn ensure_not_ended(&self) -> Result<(), GameError> {
        if self.session.is_ended() {
            return Err(GameError::SessionEnded);
        }
        Ok(())
    }

    fn combo_at(&self, now: u64) -> u32 {
        match self.session.last_reward_timestamp {
            Some(last) if now.saturating_sub(last) < COMBO_WINDOW_MS => {
                self.session.combo.saturating_add(1)
            }
            _ => 1,
        }
    }

    fn scaled_points(&self, base: u32) -> i64 {
        let combo = self.combo_at(self.clock.now_ms());
        (base as f64 * combo_multiplier(combo)).round() as i64
    }

    fn persist_high_score(&mut self) {
        log::info!("new high score {}", self.session.high_score);
        self.store
            .set(HIGH_SCORE_KEY, &self.session.high_score.to_string());
    }

    fn arm_timer(&mut self) {
        self.disarm_timer();
        self.timer = Some(self.scheduler.arm(TICK_INTERVAL_MS));
    }

    fn disarm_timer(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ManualClock, ManualScheduler, MemoryStore};

    struct Harness {
        machine: GameStateMachine,
        clock: ManualClock,
        store: MemoryStore,
        scheduler: ManualScheduler,
    }

    fn harness_with_store(store: MemoryStore) -> Harness {
        let clock = ManualClock::new(10_000);
        let scheduler = ManualScheduler::new();
        let machine = GameStateMachine::new(
            Box::new(clock.clone()),
            Box::new(store.clone()),
            Box::new(scheduler.clone()),
        );
        Harness {
            machine,
            clock,
            store,
            scheduler,
        }
    }

    fn harness() -> Harness {
        harness_with_store(MemoryStore::new())
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use GamePhase::*;
        use PhaseCommand::*;

        assert_eq!(next_phase(Init, Start), Some(Running));
        assert_eq!(next_phase(Ended, Start), Some(Running));
        assert_eq!(next_phase(Running, Start), None);
        assert_eq!(next_phase(Paused, Start), None);
        assert_eq!(next_phase(Running, Pause), Some(Paused));
        assert_eq!(next_phase(Init, Pause), None);
        assert_eq!(next_phase(Paused, Resume), Some(Running));
        assert_eq!(next_phase(Running, Resume), None);
        assert_eq!(next_phase(Paused, End), Some(Ended));
        assert_eq!(next_phase(Ended, End), None);
        assert_eq!(next_phase(Ended, Reset), Some(Init));
        assert_eq!(next_phase(Running, Reset), Some(Init));
    }

    #[test]
    fn pause_before_start_is_a_no_op() {
        let mut h = harness();
        let events = h.machine.pause_game().expect("tolerant pause");
        assert!(events.is_empty());
        assert_eq!(h.machine.phase(), GamePhase::Init);

        h.machine.start_game().expect("start should succeed");
        assert_eq!(h.machine.phase(), GamePhase::Running);
    }

    #[test]
    fn strict_mode_rejects_illegal_transitions() {
        let mut h = harness();
        h.machine = h.machine.with_strict_transitions(true);
        let error = h.machine.pause_game().unwrap_err();
        assert_eq!(
            error,
            GameError::InvalidTransition {
                from: GamePhase::Init,
                command: PhaseCommand::Pause,
            }
        );
        assert_eq!(h.machine.phase(), GamePhase::Init);
    }

    #[test]
    fn pause_and_resume_oscillate() {
        let mut h = harness();
        h.machine.start_game().unwrap();
        h.machine.pause_game().unwrap();
        assert!(h.machine.session().is_paused());
        assert_eq!(h.machine.resume_game().unwrap().len(), 1);
        assert!(h.machine.session().is_running());
        assert!(h.machine.resume_game().unwrap().is_empty());
    }

    #[test]
    fn add_score_tracks_high_score_and_combo() {
        let mut h = harness();
        h.machine.start_game().unwrap();

        h.machine.add_score(10).unwrap();
        let session = h.machine.session();
        assert_eq!((session.score, session.high_score, session.combo), (10, 10, 1));

        h.clock.advance(200);
        h.machine.add_score(5).unwrap();
        let session = h.machine.session();
        assert_eq!((session.score, session.high_score, session.combo), (15, 15, 2));
        assert_eq!(h.store.get(HIGH_SCORE_KEY).as_deref(), Some("15"));
    }

    #[test]
    fn combo_resets_after_window_gap() {
        let mut h = harness();
        h.machine.start_game().unwrap();
        h.machine.add_score(1).unwrap();
        h.clock.advance(999);
        h.machine.add_score(1).unwrap();
        assert_eq!(h.machine.session().combo, 2);

        h.clock.advance(COMBO_WINDOW_MS);
        h.machine.add_score(1).unwrap();
        assert_eq!(h.machine.session().combo, 1);
    }

    #[test]
    fn high_score_never_decreases() {
        let mut h = harness();
        h.machine.start_game().unwrap();
        let mut previous = 0;
        for points in [5, -3, 12, -20, 4, 30, -1] {
            h.clock.advance(1_500);
            h.machine.add_score(points).unwrap();
            let high = h.machine.session().high_score;
            assert!(high >= previous);
            previous = high;
        }
        assert_eq!(previous, 28);

        h.machine.reset_game().unwrap();
        assert_eq!(h.machine.session().high_score, 28);
        assert_eq!(h.machine.session().score, 0);
    }

    #[test]
    fn reset_then_load_restores_persisted_high_score() {
        let store = MemoryStore::new();
        {
            let mut first = harness_with_store(store.clone());
            first.machine.start_game().unwrap();
            first.machine.add_score(120).unwrap();
        }

        let mut h = harness_with_store(store);
        h.machine.start_game().unwrap();
        h.machine
            .add_reward(&PrizeTemplate::new("Small Prize", 10, 30.0, 80.0, "prize-small.png"))
            .unwrap();
        h.machine.tick();

        h.machine.reset_game().unwrap();
        let events = h.machine.load_persisted_high_score();

        assert_eq!(events, vec![GameEvent::HighScoreLoaded { high_score: 120 }]);
        let session = h.machine.session();
        assert_eq!(session.high_score, 120);
        assert_eq!(session.score, 0);
        assert_eq!(session.combo, 0);
        assert!(session.rewards.is_empty());
        assert_eq!(session.elapsed_seconds, 0);
        assert_eq!(session.phase, GamePhase::Init);
    }

    #[test]
    fn malformed_persisted_high_score_is_ignored() {
        let store = MemoryStore::new().with_entry(HIGH_SCORE_KEY, "lots");
        let mut h = harness_with_store(store);
        assert!(h.machine.load_persisted_high_score().is_empty());
        assert_eq!(h.machine.session().high_score, 0);

        let mut empty = harness();
        assert!(empty.machine.load_persisted_high_score().is_empty());
        assert_eq!(empty.machine.session().high_score, 0);
    }

    #[test]
    fn push_bar_position_is_clamped_to_board() {
        let mut h = harness();
        let config = GameConfig::default();
        h.machine.set_push_bar_position(10_000.0, &config).unwrap();
        assert_eq!(h.machine.session().push_bar_position, 700.0);
        h.machine.set_push_bar_position(-40.0, &config).unwrap();
        assert_eq!(h.machine.session().push_bar_position, 0.0);
        assert!(h.machine.set_push_bar_position(f64::NAN, &config).is_err());
    }

    #[test]
    fn field_objects_are_replaced_wholesale() {
        let mut h = harness();
        let coins = vec![serde_json::json!({"id": 1}), serde_json::json!({"id": 2})];
        h.machine
            .update_field_objects(coins, vec![serde_json::json!({"id": 9})])
            .unwrap();
        h.machine
            .update_field_objects(vec![serde_json::json!({"id": 3})], Vec::new())
            .unwrap();
        let session = h.machine.session();
        assert_eq!(session.coins, vec![serde_json::json!({"id": 3})]);
        assert!(session.active_prizes.is_empty());
    }

    #[test]
    fn rewards_get_unique_ids_and_do_not_score() {
        let mut h = harness();
        let prize = PrizeTemplate::new("Grand Prize", 100, 5.0, 40.0, "prize-large.png");
        h.machine.add_reward(&prize).unwrap();
        h.machine.add_reward(&prize).unwrap();
        let session = h.machine.session();
        assert_eq!(session.rewards.len(), 2);
        assert_eq!(session.rewards[0].id, 10_000);
        assert_eq!(session.rewards[1].id, 10_001);
        assert_eq!(session.rewards[1].timestamp, 10_000);
        assert_eq!(session.rewards[0].prize, prize);
        assert_eq!(session.score, 0);
    }

    #[test]
    fn ended_session_rejects_mutation_until_reset() {
        let mut h = harness();
        let config = GameConfig::default();
        h.machine.start_game().unwrap();
        h.machine.end_game().unwrap();

        assert_eq!(h.machine.add_score(5), Err(GameError::SessionEnded));
        assert!(h.machine.set_push_bar_position(10.0, &config).is_err());
        assert!(h.machine.end_game().unwrap().is_empty());

        h.machine.reset_game().unwrap();
        assert_eq!(h.machine.phase(), GamePhase::Init);
        assert!(h.machine.add_score(5).is_ok());
    }

    #[test]
    fn timer_only_counts_while_running() {
        let mut h = harness();
        assert!(h.machine.tick().is_empty());

        h.machine.start_game().unwrap();
        h.machine.tick();
        h.machine.tick();
        h.machine.pause_game().unwrap();
        h.machine.tick();
        h.machine.resume_game().unwrap();
        h.machine.tick();

        assert_eq!(h.machine.session().elapsed_seconds, 3);
        assert_eq!(h.machine.session().formatted_elapsed_time(), "00:03");
        assert_eq!(h.scheduler.active(), 1);

        h.machine.end_game().unwrap();
        assert!(!h.machine.is_timer_armed());
        assert_eq!(h.scheduler.active(), 0);
        h.machine.tick();
        assert_eq!(h.machine.session().elapsed_seconds, 3);
    }

    #[test]
    fn restarting_keeps_a_single_timer() {
        let mut h = harness();
        h.machine.start_game().unwrap();
        h.machine.tick();
        h.machine.end_game().unwrap();
        h.machine.start_game().unwrap();
        h.machine.start_game().unwrap();

        assert_eq!(h.scheduler.armed(), 2);
        assert_eq!(h.scheduler.active(), 1);
        assert_eq!(h.machine.session().elapsed_seconds, 0);

        h.machine.tick();
        assert_eq!(h.machine.session().elapsed_seconds, 1);

        h.machine.reset_game().unwrap();
        assert_eq!(h.scheduler.active(), 0);
    }

    #[test]
    fn collect_helpers_scale_by_combo() {
        let mut h = harness();
        let config = GameConfig::default();
        let prize = config.prize(2).unwrap().clone();
        h.machine.start_game().unwrap();

        let events = h.machine.collect_prize(&prize).unwrap();
        assert!(matches!(events[0], GameEvent::RewardAdded { .. }));
        assert_eq!(h.machine.session().score, 110);
        assert_eq!(h.machine.session().rewards.len(), 1);

        h.clock.advance(100);
        h.machine.collect_coin(&config).unwrap();
        assert_eq!(h.machine.session().score, 111);
        assert_eq!(h.machine.session().combo, 2);
    }
}

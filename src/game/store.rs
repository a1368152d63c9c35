use super::{
    config::{ConfigError, GameConfig, PrizeTemplate},
    prizes::PrizeRoller,
    rules::{GameError, GameStateMachine},
    state::GameEvent,
};

/// 配置与会话状态机的组合容器，由调用方显式持有并按引用传递。
pub struct GameStore {
    config: GameConfig,
    game: GameStateMachine,
    roller: PrizeRoller,
}

impl GameStore {
    pub fn new(config: GameConfig, game: GameStateMachine) -> Self {
        Self {
            config,
            game,
            roller: PrizeRoller::new(),
        }
    }

    pub fn with_roller(mut self, roller: PrizeRoller) -> Self {
        self.roller = roller;
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GameConfig {
        &mut self.config
    }

    pub fn game(&self) -> &GameStateMachine {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut GameStateMachine {
        &mut self.game
    }

    pub fn move_push_bar(&mut self, position: f64) -> Result<Vec<GameEvent>, GameError> {
        self.game.set_push_bar_position(position, &self.config)
    }

    pub fn collect_coin(&mut self) -> Result<Vec<GameEvent>, GameError> {
        self.game.collect_coin(&self.config)
    }

    pub fn collect_prize(&mut self, index: usize) -> Result<Vec<GameEvent>, GameError> {
        let prize = self.config.prize(index)?.clone();
        self.game.collect_prize(&prize)
    }

    pub fn roll_prize_spawn(&mut self) -> Result<Option<PrizeTemplate>, ConfigError> {
        let active = self.game.session().active_prizes.len();
        self.roller.roll_prize_spawn(&self.config, active)
    }

    pub fn roll_coin_drop(&mut self) -> Result<bool, ConfigError> {
        self.roller.roll_coin_drop(&self.config)
    }

    pub fn roll_prize_drop(&mut self, index: usize) -> Result<bool, ConfigError> {
        let prize = self.config.prize(index)?;
        self.roller.roll_prize_drop(&self.config, prize)
    }
}

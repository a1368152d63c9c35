//! 游戏核心逻辑模块（配置、会话状态机、奖品概率等）。

pub mod config;
pub mod prizes;
pub mod rules;
pub mod state;
pub mod store;

pub use config::{
    clamp_probability,
    probability_to_chance,
    ConfigError,
    Difficulty,
    DifficultyFactors,
    GameConfig,
    PhysicsConfig,
    PrizeTemplate,
    PrizeTemplatePatch,
};
pub use prizes::PrizeRoller;
pub use rules::{next_phase, GameError, GameStateMachine, PhaseCommand, Resolution};
pub use state::{
    combo_multiplier,
    format_elapsed_time,
    FieldObject,
    GameEvent,
    GamePhase,
    GameSession,
    Reward,
    RewardId,
    SessionView,
    COMBO_WINDOW_MS,
    MAX_COMBO_MULTIPLIER,
};
pub use store::GameStore;

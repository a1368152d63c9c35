use serde::{Deserialize, Serialize};

use super::config::PrizeTemplate;

/// 连击判定窗口（毫秒）。
pub const COMBO_WINDOW_MS: u64 = 1_000;
/// 连击倍率上限。
pub const MAX_COMBO_MULTIPLIER: f64 = 3.0;
const COMBO_MULTIPLIER_STEP: f64 = 0.1;

/// 场上物体（金币、奖品）由物理引擎持有，这里只保存不透明的载荷。
pub type FieldObject = serde_json::Value;
/// 奖励记录标识。
pub type RewardId = u64;

/// 游戏阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Init,
    Running,
    Paused,
    Ended,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Init
    }
}

/// 已获得的奖励：奖品模板字段加上标识与时间戳。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    #[serde(flatten)]
    pub prize: PrizeTemplate,
    pub id: RewardId,
    pub timestamp: u64,
}

/// 状态变更事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GameEvent {
    PhaseChanged {
        from: GamePhase,
        to: GamePhase,
    },
    SessionReset,
    PushBarMoved {
        position: f64,
    },
    FieldObjectsUpdated {
        coins: usize,
        prizes: usize,
    },
    ScoreAdded {
        points: i64,
        score: i64,
        combo: u32,
    },
    HighScoreUpdated {
        high_score: i64,
    },
    HighScoreLoaded {
        high_score: i64,
    },
    RewardAdded {
        reward_id: RewardId,
        name: String,
    },
    ElapsedTimeAdvanced {
        elapsed_seconds: u64,
    },
}

/// 单局游戏的可变状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coins: Vec<FieldObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_prizes: Vec<FieldObject>,
    #[serde(default)]
    pub push_bar_position: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub high_score: i64,
    #[serde(default)]
    pub combo: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reward_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub elapsed_seconds: u64,
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::default(),
            coins: Vec::new(),
            active_prizes: Vec::new(),
            push_bar_position: 0.0,
            score: 0,
            high_score: 0,
            combo: 0,
            last_reward_timestamp: None,
            rewards: Vec::new(),
            elapsed_seconds: 0,
        }
    }

    pub fn with_high_score(mut self, high_score: i64) -> Self {
        self.high_score = high_score.max(0);
        self
    }

    /// 清空本局数据，最高分保留。
    pub fn clear_round(&mut self) {
        let high_score = self.high_score;
        *self = Self::new().with_high_score(high_score);
    }

    pub fn is_running(&self) -> bool {
        self.phase == GamePhase::Running
    }

    pub fn is_paused(&self) -> bool {
        self.phase == GamePhase::Paused
    }

    pub fn is_ended(&self) -> bool {
        self.phase == GamePhase::Ended
    }

    pub fn combo_multiplier(&self) -> f64 {
        combo_multiplier(self.combo)
    }

    pub fn formatted_elapsed_time(&self) -> String {
        format_elapsed_time(self.elapsed_seconds)
    }

    pub fn last_reward_id(&self) -> Option<RewardId> {
        self.rewards.last().map(|reward| reward.id)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            is_running: self.is_running(),
            is_paused: self.is_paused(),
            is_ended: self.is_ended(),
            score: self.score,
            high_score: self.high_score,
            combo: self.combo,
            combo_multiplier: self.combo_multiplier(),
            elapsed_seconds: self.elapsed_seconds,
            formatted_elapsed_time: self.formatted_elapsed_time(),
            push_bar_position: self.push_bar_position,
            coin_count: self.coins.len(),
            active_prize_count: self.active_prizes.len(),
            reward_count: self.rewards.len(),
        }
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

/// 供界面读取的派生数据快照。
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: GamePhase,
    pub is_running: bool,
    pub is_paused: bool,
    pub is_ended: bool,
    pub score: i64,
    pub high_score: i64,
    pub combo: u32,
    pub combo_multiplier: f64,
    pub elapsed_seconds: u64,
    pub formatted_elapsed_time: String,
    pub push_bar_position: f64,
    pub coin_count: usize,
    pub active_prize_count: usize,
    pub reward_count: usize,
}

/// 连击倍率：每次连击 +0.1，最高 3 倍。
pub fn combo_multiplier(combo: u32) -> f64 {
    (1.0 + combo as f64 * COMBO_MULTIPLIER_STEP).min(MAX_COMBO_MULTIPLIER)
}

/// 以 `MM:SS` 格式显示游戏时间。
pub fn format_elapsed_time(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

//! 游戏配置（棋盘、金币、推板、奖品目录与难度系数）。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_PROBABILITY: f64 = 0.0;
pub const MAX_PROBABILITY: f64 = 100.0;

static DEFAULT_DIFFICULTY_FACTORS: Lazy<BTreeMap<Difficulty, DifficultyFactors>> =
    Lazy::new(|| {
        BTreeMap::from([
            (Difficulty::Easy, DifficultyFactors::uniform(1.2)),
            (Difficulty::Normal, DifficultyFactors::uniform(1.0)),
            (Difficulty::Hard, DifficultyFactors::uniform(0.8)),
        ])
    });

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[serde(tag = "type")]
pub enum ConfigError {
    #[error("unknown difficulty `{value}`, expected easy, normal or hard")]
    UnknownDifficulty { value: String },
    #[error("no multiplier entry for difficulty `{difficulty}`")]
    MissingDifficultyFactors { difficulty: Difficulty },
    #[error("prize index {index} is out of bounds ({len} templates)")]
    PrizeIndexOutOfBounds { index: usize, len: usize },
    #[error("`{field}` must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("`{field}` must be a finite number")]
    NotFinite { field: String },
    #[error("`{field}` must be a whole number, got {value}")]
    NotAnInteger { field: String, value: f64 },
    #[error("malformed configuration: {message}")]
    Malformed { message: String },
}

/// 难度等级。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Normal
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ConfigError::UnknownDifficulty {
                value: s.to_string(),
            }),
        }
    }
}

/// 难度对掉落概率与奖品生成概率的缩放系数。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyFactors {
    pub drop_probability_multiplier: f64,
    #[serde(alias = "prizeGenerationMultiplier")]
    pub spawn_probability_multiplier: f64,
}

impl DifficultyFactors {
    pub fn new(drop_probability_multiplier: f64, spawn_probability_multiplier: f64) -> Self {
        Self {
            drop_probability_multiplier,
            spawn_probability_multiplier,
        }
    }

    pub fn uniform(multiplier: f64) -> Self {
        Self::new(multiplier, multiplier)
    }
}

/// 奖品模板：名称、分值、生成概率、掉落概率（0–100）与图标。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrizeTemplate {
    pub name: String,
    pub value: u32,
    #[serde(alias = "probability")]
    pub spawn_probability: f64,
    pub drop_probability: f64,
    #[serde(alias = "iconRef")]
    pub icon: String,
}

impl PrizeTemplate {
    pub fn new(
        name: impl Into<String>,
        value: u32,
        spawn_probability: f64,
        drop_probability: f64,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            spawn_probability,
            drop_probability,
            icon: icon.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure_probability("spawnProbability", self.spawn_probability)?;
        ensure_probability("dropProbability", self.drop_probability)
    }
}

/// 对奖品模板的局部更新，未给出的字段保持原值。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PrizeTemplatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
    #[serde(alias = "probability", skip_serializing_if = "Option::is_none")]
    pub spawn_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_probability: Option<f64>,
    #[serde(alias = "iconRef", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PrizeTemplatePatch {
    fn merged_into(self, template: &PrizeTemplate) -> PrizeTemplate {
        PrizeTemplate {
            name: self.name.unwrap_or_else(|| template.name.clone()),
            value: self.value.unwrap_or(template.value),
            spawn_probability: self.spawn_probability.unwrap_or(template.spawn_probability),
            drop_probability: self.drop_probability.unwrap_or(template.drop_probability),
            icon: self.icon.unwrap_or_else(|| template.icon.clone()),
        }
    }
}

/// 物理参数，本模块只负责透传给物理引擎。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsConfig {
    pub gravity: f64,
    pub friction: f64,
    pub restitution: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            friction: 0.1,
            restitution: 0.7,
        }
    }
}

/// 会话期间不可变的游戏配置，只能通过显式的 setter 修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    board_width: f64,
    board_height: f64,
    coin_count: u32,
    coin_size: f64,
    coin_value: u32,
    push_bar_length: f64,
    push_bar_height: f64,
    push_bar_y: f64,
    push_bar_speed: f64,
    prizes: Vec<PrizeTemplate>,
    max_prizes: u32,
    prize_size: f64,
    #[serde(alias = "prizeGenerationProbability")]
    spawn_probability_base: f64,
    #[serde(alias = "dropProbability")]
    drop_probability_base: f64,
    gravity: f64,
    friction: f64,
    restitution: f64,
    difficulty: Difficulty,
    difficulty_factors: BTreeMap<Difficulty, DifficultyFactors>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let physics = PhysicsConfig::default();
        Self {
            board_width: 800.0,
            board_height: 600.0,
            coin_count: 50,
            coin_size: 30.0,
            coin_value: 1,
            push_bar_length: 100.0,
            push_bar_height: 20.0,
            push_bar_y: 500.0,
            push_bar_speed: 5.0,
            prizes: default_prizes(),
            max_prizes: 3,
            prize_size: 40.0,
            spawn_probability_base: 5.0,
            drop_probability_base: 70.0,
            gravity: physics.gravity,
            friction: physics.friction,
            restitution: physics.restitution,
            difficulty: Difficulty::default(),
            difficulty_factors: DEFAULT_DIFFICULTY_FACTORS.clone(),
        }
    }
}

fn default_prizes() -> Vec<PrizeTemplate> {
    vec![
        PrizeTemplate::new("Small Prize", 10, 30.0, 80.0, "prize-small.png"),
        PrizeTemplate::new("Medium Prize", 50, 15.0, 60.0, "prize-medium.png"),
        PrizeTemplate::new("Grand Prize", 100, 5.0, 40.0, "prize-large.png"),
    ]
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig =
            serde_json::from_str(json).map_err(|error| ConfigError::Malformed {
                message: error.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|error| ConfigError::Malformed {
            message: error.to_string(),
        })
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Result<Self, ConfigError> {
        self.set_difficulty(difficulty)?;
        Ok(self)
    }

    pub fn with_difficulty_factors(
        mut self,
        difficulty: Difficulty,
        factors: DifficultyFactors,
    ) -> Self {
        self.difficulty_factors.insert(difficulty, factors);
        self
    }

    pub fn board_width(&self) -> f64 {
        self.board_width
    }

    pub fn board_height(&self) -> f64 {
        self.board_height
    }

    pub fn coin_count(&self) -> u32 {
        self.coin_count
    }

    pub fn coin_size(&self) -> f64 {
        self.coin_size
    }

    pub fn coin_value(&self) -> u32 {
        self.coin_value
    }

    pub fn push_bar_length(&self) -> f64 {
        self.push_bar_length
    }

    pub fn push_bar_height(&self) -> f64 {
        self.push_bar_height
    }

    pub fn push_bar_y(&self) -> f64 {
        self.push_bar_y
    }

    pub fn push_bar_speed(&self) -> f64 {
        self.push_bar_speed
    }

    pub fn prizes(&self) -> &[PrizeTemplate] {
        &self.prizes
    }

    pub fn prize(&self, index: usize) -> Result<&PrizeTemplate, ConfigError> {
        self.prizes
            .get(index)
            .ok_or(ConfigError::PrizeIndexOutOfBounds {
                index,
                len: self.prizes.len(),
            })
    }

    pub fn max_prizes(&self) -> u32 {
        self.max_prizes
    }

    pub fn prize_size(&self) -> f64 {
        self.prize_size
    }

    pub fn spawn_probability_base(&self) -> f64 {
        self.spawn_probability_base
    }

    pub fn drop_probability_base(&self) -> f64 {
        self.drop_probability_base
    }

    pub fn physics(&self) -> PhysicsConfig {
        PhysicsConfig {
            gravity: self.gravity,
            friction: self.friction,
            restitution: self.restitution,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// 推板可移动的最大偏移量。
    pub fn max_push_bar_position(&self) -> f64 {
        (self.board_width - self.push_bar_length).max(0.0)
    }

    pub fn difficulty_factors(&self) -> Result<DifficultyFactors, ConfigError> {
        self.difficulty_factors
            .get(&self.difficulty)
            .copied()
            .ok_or(ConfigError::MissingDifficultyFactors {
                difficulty: self.difficulty,
            })
    }

    /// 掉落概率基数乘以当前难度系数，结果未做截断。
    pub fn adjusted_drop_probability(&self) -> Result<f64, ConfigError> {
        let factors = self.difficulty_factors()?;
        Ok(clamp_probability(self.drop_probability_base) * factors.drop_probability_multiplier)
    }

    /// 奖品生成概率基数乘以当前难度系数，结果未做截断。
    pub fn adjusted_spawn_probability(&self) -> Result<f64, ConfigError> {
        let factors = self.difficulty_factors()?;
        Ok(clamp_probability(self.spawn_probability_base) * factors.spawn_probability_multiplier)
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) -> Result<(), ConfigError> {
        if !self.difficulty_factors.contains_key(&difficulty) {
            return Err(ConfigError::MissingDifficultyFactors { difficulty });
        }
        self.difficulty = difficulty;
        Ok(())
    }

    pub fn set_coin_count(&mut self, count: i64) -> Result<(), ConfigError> {
        self.coin_count = u32::try_from(count).map_err(|_| ConfigError::OutOfRange {
            field: "coinCount".into(),
            value: count as f64,
            min: 0.0,
            max: u32::MAX as f64,
        })?;
        Ok(())
    }

    pub fn set_push_bar_length(&mut self, length: f64) -> Result<(), ConfigError> {
        ensure_range("pushBarLength", length, 0.0, self.board_width)?;
        self.push_bar_length = length;
        Ok(())
    }

    pub fn set_drop_probability_base(&mut self, probability: f64) -> Result<(), ConfigError> {
        ensure_probability("dropProbability", probability)?;
        self.drop_probability_base = probability;
        Ok(())
    }

    pub fn update_prize_template(
        &mut self,
        index: usize,
        patch: PrizeTemplatePatch,
    ) -> Result<&PrizeTemplate, ConfigError> {
        let merged = patch.merged_into(self.prize(index)?);
        merged.validate()?;
        self.prizes[index] = merged;
        Ok(&self.prizes[index])
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("boardWidth", self.board_width)?;
        ensure_positive("boardHeight", self.board_height)?;
        ensure_non_negative("coinSize", self.coin_size)?;
        ensure_range("pushBarLength", self.push_bar_length, 0.0, self.board_width)?;
        ensure_non_negative("pushBarHeight", self.push_bar_height)?;
        ensure_finite("pushBarY", self.push_bar_y)?;
        ensure_non_negative("pushBarSpeed", self.push_bar_speed)?;
        ensure_non_negative("prizeSize", self.prize_size)?;
        ensure_probability("prizeGenerationProbability", self.spawn_probability_base)?;
        ensure_probability("dropProbability", self.drop_probability_base)?;
        ensure_finite("gravity", self.gravity)?;
        ensure_finite("friction", self.friction)?;
        ensure_finite("restitution", self.restitution)?;
        for prize in &self.prizes {
            prize.validate()?;
        }
        for difficulty in Difficulty::ALL {
            let factors = self
                .difficulty_factors
                .get(&difficulty)
                .ok_or(ConfigError::MissingDifficultyFactors { difficulty })?;
            ensure_non_negative(
                "dropProbabilityMultiplier",
                factors.drop_probability_multiplier,
            )?;
            ensure_non_negative(
                "spawnProbabilityMultiplier",
                factors.spawn_probability_multiplier,
            )?;
        }
        Ok(())
    }
}

/// 将概率截断到 [0, 100]，NaN 视为 0。
pub fn clamp_probability(value: f64) -> f64 {
    if value.is_nan() {
        MIN_PROBABILITY
    } else {
        value.clamp(MIN_PROBABILITY, MAX_PROBABILITY)
    }
}

/// 0–100 的概率转换为伯努利试验参数。
pub fn probability_to_chance(value: f64) -> f64 {
    clamp_probability(value) / MAX_PROBABILITY
}

fn ensure_finite(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite {
            field: field.to_string(),
        })
    }
}

fn ensure_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    ensure_finite(field, value)?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn ensure_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    ensure_range(field, value, 0.0, f64::MAX)
}

fn ensure_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    ensure_finite(field, value)?;
    if value <= 0.0 {
        return Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            min: f64::MIN_POSITIVE,
            max: f64::MAX,
        });
    }
    Ok(())
}

fn ensure_probability(field: &str, value: f64) -> Result<(), ConfigError> {
    ensure_range(field, value, MIN_PROBABILITY, MAX_PROBABILITY)
}

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::config::{
    clamp_probability, probability_to_chance, ConfigError, GameConfig, PrizeTemplate,
};

/// 按难度调整后的概率抽取奖品生成与掉落结果。
pub struct PrizeRoller {
    rng: SmallRng,
}

impl PrizeRoller {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// 场上奖品未满时，按调整后的生成概率决定是否生成，并按模板生成概率加权选取。
    pub fn roll_prize_spawn(
        &mut self,
        config: &GameConfig,
        active_prizes: usize,
    ) -> Result<Option<PrizeTemplate>, ConfigError> {
        if active_prizes >= config.max_prizes() as usize {
            return Ok(None);
        }
        let chance = probability_to_chance(config.adjusted_spawn_probability()?);
        if !self.rng.gen_bool(chance) {
            return Ok(None);
        }
        Ok(config
            .prizes()
            .choose_weighted(&mut self.rng, |prize| {
                clamp_probability(prize.spawn_probability)
            })
            .ok()
            .cloned())
    }

    pub fn roll_coin_drop(&mut self, config: &GameConfig) -> Result<bool, ConfigError> {
        let chance = probability_to_chance(config.adjusted_drop_probability()?);
        Ok(self.rng.gen_bool(chance))
    }

    pub fn roll_prize_drop(
        &mut self,
        config: &GameConfig,
        prize: &PrizeTemplate,
    ) -> Result<bool, ConfigError> {
        let factors = config.difficulty_factors()?;
        let probability =
            clamp_probability(prize.drop_probability) * factors.drop_probability_multiplier;
        Ok(self.rng.gen_bool(probability_to_chance(probability)))
    }
}

impl Default for PrizeRoller {
    fn default() -> Self {
        Self::new()
    }
}

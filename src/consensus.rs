//! Proof-of-stake consensus: the validator pool and weighted proposer selection.

use crate::config::StakingConfig;
use crate::crypto::Address;
use crate::error::ChainError;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Validators are deactivated once slashed this many times.
pub const MAX_SLASHES: u32 = 3;
/// A validator may not propose again until this many seconds have passed.
pub const PROPOSER_COOLDOWN_SECS: i64 = 60;
pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub staked_amount: f64,
    /// Time of the last block this validator proposed; 0 if none.
    pub last_block_time: i64,
    pub slash_count: u32,
    pub is_active: bool,
    pub join_time: i64,
    pub total_rewards: f64,
}

impl Validator {
    fn new(address: Address, staked_amount: f64, now: i64) -> Self {
        Validator {
            address,
            staked_amount,
            last_block_time: 0,
            slash_count: 0,
            is_active: true,
            join_time: now,
            total_rewards: 0.0,
        }
    }

    /// Eligible to propose at `now`: active, not slashed out, and outside
    /// the cooldown window of its last block.
    pub fn is_eligible(&self, now: i64) -> bool {
        self.is_active
            && self.slash_count < MAX_SLASHES
            && now - self.last_block_time >= PROPOSER_COOLDOWN_SECS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPool {
    /// Ordered by address so the weighted walk is reproducible.
    pub validators: BTreeMap<Address, Validator>,
    pub min_stake_amount: f64,
    pub max_validators: usize,
    /// Percentage of the current stake removed per slash.
    pub slashing_penalty: f64,
    pub block_reward: f64,
    /// Annual staking reward, in percent of stake.
    pub staking_reward: f64,
}

impl Default for StakingPool {
    fn default() -> Self {
        Self::new(&StakingConfig::default())
    }
}

impl StakingPool {
    pub fn new(config: &StakingConfig) -> Self {
        StakingPool {
            validators: BTreeMap::new(),
            min_stake_amount: config.min_stake,
            max_validators: config.max_validators,
            slashing_penalty: config.slashing_penalty_percent,
            block_reward: config.block_reward,
            staking_reward: config.annual_reward_percent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.validators.contains_key(address)
    }

    pub fn stake(&mut self, address: &str, amount: f64) -> Result<(), ChainError> {
        self.stake_at(address, amount, chrono::Utc::now().timestamp())
    }

    pub fn stake_at(&mut self, address: &str, amount: f64, now: i64) -> Result<(), ChainError> {
        if !amount.is_finite() || amount < self.min_stake_amount {
            return Err(ChainError::BelowMinimumStake {
                minimum: self.min_stake_amount,
                amount,
            });
        }

        if self.validators.len() >= self.max_validators {
            return Err(ChainError::ValidatorPoolFull(self.max_validators));
        }

        if self.contains(address) {
            return Err(ChainError::AlreadyStaked(address.to_string()));
        }

        self.validators.insert(
            address.to_string(),
            Validator::new(address.to_string(), amount, now),
        );
        Ok(())
    }

    /// Remove the validator entirely and hand back its entry. Returning the
    /// stake to the ledger is the caller's job.
    pub fn unstake(&mut self, address: &str) -> Result<Validator, ChainError> {
        self.validators
            .remove(address)
            .ok_or_else(|| ChainError::ValidatorNotFound(address.to_string()))
    }

    pub fn eligible_validators(&self, now: i64) -> Vec<&Validator> {
        self.validators
            .values()
            .filter(|v| v.is_eligible(now))
            .collect()
    }

    /// Pick the next proposer by stake-weighted lottery using the OS RNG.
    pub fn select_proposer(&self) -> Result<Address, ChainError> {
        self.select_proposer_at(chrono::Utc::now().timestamp(), &mut OsRng)
    }

    pub fn select_proposer_at<R: Rng + ?Sized>(
        &self,
        now: i64,
        rng: &mut R,
    ) -> Result<Address, ChainError> {
        let eligible = self.eligible_validators(now);
        if eligible.is_empty() {
            return Err(ChainError::NoEligibleValidators);
        }

        let total_stake: f64 = eligible.iter().map(|v| v.staked_amount).sum();
        let draw = if total_stake > 0.0 {
            rng.gen_range(0.0..total_stake)
        } else {
            0.0
        };

        Ok(Self::pick_weighted(&eligible, draw))
    }

    /// Walk `eligible` accumulating stake until the running total exceeds
    /// `draw`. Falls back to the first validator if the walk never hits.
    pub fn pick_weighted(eligible: &[&Validator], draw: f64) -> Address {
        let mut running = 0.0;
        for validator in eligible {
            running += validator.staked_amount;
            if running > draw {
                return validator.address.clone();
            }
        }
        eligible
            .first()
            .map(|v| v.address.clone())
            .unwrap_or_default()
    }

    pub fn reward(&mut self, address: &str, amount: f64) -> Result<(), ChainError> {
        self.reward_at(address, amount, chrono::Utc::now().timestamp())
    }

    /// Credit a block reward and start the proposer's cooldown window.
    pub fn reward_at(&mut self, address: &str, amount: f64, now: i64) -> Result<(), ChainError> {
        let validator = self
            .validators
            .get_mut(address)
            .ok_or_else(|| ChainError::ValidatorNotFound(address.to_string()))?;

        validator.total_rewards += amount;
        validator.last_block_time = now;
        Ok(())
    }

    pub fn slash(&mut self, address: &str) -> Result<&Validator, ChainError> {
        let penalty_percent = self.slashing_penalty;
        let validator = self
            .validators
            .get_mut(address)
            .ok_or_else(|| ChainError::ValidatorNotFound(address.to_string()))?;

        validator.slash_count += 1;
        validator.staked_amount -= validator.staked_amount * (penalty_percent / 100.0);
        if validator.slash_count >= MAX_SLASHES {
            validator.is_active = false;
        }
        Ok(validator)
    }

    pub fn compute_accrued_staking_reward(&self, address: &str) -> Result<f64, ChainError> {
        self.compute_accrued_staking_reward_at(address, chrono::Utc::now().timestamp())
    }

    /// Linear pro-rata of the annual reward over the time since joining.
    pub fn compute_accrued_staking_reward_at(
        &self,
        address: &str,
        now: i64,
    ) -> Result<f64, ChainError> {
        let validator = self
            .validators
            .get(address)
            .ok_or_else(|| ChainError::ValidatorNotFound(address.to_string()))?;

        if !validator.is_active {
            return Ok(0.0);
        }

        let elapsed = (now - validator.join_time).max(0) as f64;
        let annual_reward = validator.staked_amount * (self.staking_reward / 100.0);
        Ok(annual_reward * (elapsed / SECONDS_PER_YEAR))
    }

    pub fn get_validator(&self, address: &str) -> Result<&Validator, ChainError> {
        self.validators
            .get(address)
            .ok_or_else(|| ChainError::ValidatorNotFound(address.to_string()))
    }

    /// All validators, highest stake first.
    pub fn get_all_validators(&self) -> Vec<Validator> {
        let mut validators: Vec<Validator> = self.validators.values().cloned().collect();
        validators.sort_by(|a, b| b.staked_amount.total_cmp(&a.staked_amount));
        validators
    }

    /// Stake held by active validators.
    pub fn total_staked(&self) -> f64 {
        self.validators
            .values()
            .filter(|v| v.is_active)
            .map(|v| v.staked_amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NOW: i64 = 1_700_000_000;

    fn pool() -> StakingPool {
        StakingPool::default()
    }

    #[test]
    fn test_stake_creates_active_validator() {
        let mut pool = pool();
        pool.stake_at("v1", 10.0, NOW).unwrap();

        let v = pool.get_validator("v1").unwrap();
        assert!(v.is_active);
        assert_eq!(v.staked_amount, 10.0);
        assert_eq!(v.slash_count, 0);
        assert_eq!(v.join_time, NOW);
        assert_eq!(v.last_block_time, 0);
    }

    #[test]
    fn test_stake_below_minimum_rejected() {
        let mut pool = pool();
        let err = pool.stake_at("v1", 9.99, NOW).unwrap_err();
        assert!(matches!(err, ChainError::BelowMinimumStake { .. }));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_stake_twice_rejected() {
        let mut pool = pool();
        pool.stake_at("v1", 10.0, NOW).unwrap();
        assert_eq!(
            pool.stake_at("v1", 20.0, NOW).unwrap_err(),
            ChainError::AlreadyStaked("v1".to_string())
        );
    }

    #[test]
    fn test_pool_capacity() {
        let mut pool = StakingPool::new(&StakingConfig {
            max_validators: 2,
            ..StakingConfig::default()
        });
        pool.stake_at("v1", 10.0, NOW).unwrap();
        pool.stake_at("v2", 10.0, NOW).unwrap();
        assert_eq!(
            pool.stake_at("v3", 10.0, NOW).unwrap_err(),
            ChainError::ValidatorPoolFull(2)
        );
    }

    #[test]
    fn test_unstake_removes_entry() {
        let mut pool = pool();
        pool.stake_at("v1", 12.0, NOW).unwrap();
        let removed = pool.unstake("v1").unwrap();
        assert_eq!(removed.staked_amount, 12.0);
        assert!(!pool.contains("v1"));
        assert!(matches!(
            pool.unstake("v1"),
            Err(ChainError::ValidatorNotFound(_))
        ));
    }

    #[test]
    fn test_cooldown_excludes_recent_proposer() {
        let mut pool = pool();
        pool.stake_at("v1", 10.0, NOW).unwrap();
        pool.reward_at("v1", 5.0, NOW - 10).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            pool.select_proposer_at(NOW, &mut rng).unwrap_err(),
            ChainError::NoEligibleValidators
        );

        // Exactly at the window boundary the validator is eligible again.
        let later = NOW - 10 + PROPOSER_COOLDOWN_SECS;
        assert_eq!(pool.select_proposer_at(later, &mut rng).unwrap(), "v1");
    }

    #[test]
    fn test_empty_pool_has_no_proposer() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            pool().select_proposer_at(NOW, &mut rng).unwrap_err(),
            ChainError::NoEligibleValidators
        );
    }

    #[test]
    fn test_weighted_walk_is_deterministic_for_a_draw() {
        let mut pool = pool();
        pool.stake_at("a", 10.0, NOW).unwrap();
        pool.stake_at("b", 30.0, NOW).unwrap();
        pool.stake_at("c", 60.0, NOW).unwrap();

        let eligible = pool.eligible_validators(NOW);
        assert_eq!(StakingPool::pick_weighted(&eligible, 0.0), "a");
        assert_eq!(StakingPool::pick_weighted(&eligible, 9.99), "a");
        assert_eq!(StakingPool::pick_weighted(&eligible, 10.0), "b");
        assert_eq!(StakingPool::pick_weighted(&eligible, 39.5), "b");
        assert_eq!(StakingPool::pick_weighted(&eligible, 40.0), "c");
        assert_eq!(StakingPool::pick_weighted(&eligible, 99.99), "c");
        // A draw past the total falls back to the first validator.
        assert_eq!(StakingPool::pick_weighted(&eligible, 250.0), "a");
    }

    #[test]
    fn test_selection_frequency_tracks_stake() {
        let mut pool = pool();
        pool.stake_at("light", 10.0, NOW).unwrap();
        pool.stake_at("heavy", 90.0, NOW).unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let heavy_wins = (0..2_000)
            .filter(|_| pool.select_proposer_at(NOW, &mut rng).unwrap() == "heavy")
            .count();
        assert!(heavy_wins > 1_600, "heavy won only {} of 2000", heavy_wins);
    }

    #[test]
    fn test_slashing_reduces_stake_and_deactivates() {
        let mut pool = pool();
        pool.stake_at("v1", 100.0, NOW).unwrap();

        pool.slash("v1").unwrap();
        assert!((pool.get_validator("v1").unwrap().staked_amount - 90.0).abs() < 1e-9);

        pool.slash("v1").unwrap();
        let v = pool.slash("v1").unwrap();
        assert_eq!(v.slash_count, 3);
        assert!(!v.is_active);
        assert!((v.staked_amount - 72.9).abs() < 1e-9);
        assert!(pool.eligible_validators(NOW).is_empty());
        assert_eq!(pool.total_staked(), 0.0);
    }

    #[test]
    fn test_reward_unknown_validator() {
        assert!(matches!(
            pool().reward_at("ghost", 1.0, NOW),
            Err(ChainError::ValidatorNotFound(_))
        ));
    }

    #[test]
    fn test_accrued_reward_is_linear() {
        let mut pool = pool();
        pool.stake_at("v1", 100.0, NOW).unwrap();

        let one_year = NOW + SECONDS_PER_YEAR as i64;
        let reward = pool.compute_accrued_staking_reward_at("v1", one_year).unwrap();
        assert!((reward - 5.0).abs() < 1e-9);

        let half_year = NOW + (SECONDS_PER_YEAR / 2.0) as i64;
        let reward = pool.compute_accrued_staking_reward_at("v1", half_year).unwrap();
        assert!((reward - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_accrued_reward_zero_when_inactive() {
        let mut pool = pool();
        pool.stake_at("v1", 100.0, NOW).unwrap();
        for _ in 0..MAX_SLASHES {
            pool.slash("v1").unwrap();
        }
        assert_eq!(
            pool.compute_accrued_staking_reward_at("v1", NOW + 1_000).unwrap(),
            0.0
        );
        assert!(pool.compute_accrued_staking_reward_at("ghost", NOW).is_err());
    }

    #[test]
    fn test_validators_sorted_by_stake() {
        let mut pool = pool();
        pool.stake_at("a", 15.0, NOW).unwrap();
        pool.stake_at("b", 50.0, NOW).unwrap();
        pool.stake_at("c", 20.0, NOW).unwrap();
        let order: Vec<_> = pool
            .get_all_validators()
            .into_iter()
            .map(|v| v.address)
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(pool.total_staked(), 85.0);
    }
}

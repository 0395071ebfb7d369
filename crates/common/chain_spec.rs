//! Chain-wide parameter resolution: the pairing of a [`ChainConfig`] with an
//! active hardfork and a user-supplied list of additionally activated EIPs.
//!
//! Consumers that derive tables from the active fork (opcode sets,
//! precompile sets) subscribe to the fork-change signal and must re-fetch
//! through their accessor after it fires; nothing is implicitly cached.

use std::fmt;

use crc32fast::Hasher;
use ethereum_types::{H256, H32, U256};

use crate::params::{self, ParamTopic};
use crate::types::{
    BlockNumber, ChainConfig, ChainConfigError, Fork, ForkActivation, ForkHead,
};

pub type ForkListener = Box<dyn Fn(Fork) + Send + Sync>;

pub struct ChainSpec {
    config: ChainConfig,
    fork: Fork,
    eips: Vec<u64>,
    generation: u64,
    listeners: Vec<ForkListener>,
}

impl fmt::Debug for ChainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSpec")
            .field("chain_id", &self.config.chain_id)
            .field("fork", &self.fork)
            .field("eips", &self.eips)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Clone for ChainSpec {
    /// Deep copy of the resolver state. Fork-change listeners are bound to
    /// the original instance and do not carry over.
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            fork: self.fork,
            eips: self.eips.clone(),
            generation: self.generation,
            listeners: Vec::new(),
        }
    }
}

impl ChainSpec {
    pub fn new(config: ChainConfig, fork: Fork) -> Result<Self, ChainConfigError> {
        ChainConfig::validate_schedule(&config.scheduled_forks())?;
        Ok(Self {
            config,
            fork,
            eips: Vec::new(),
            generation: 0,
            listeners: Vec::new(),
        })
    }

    /// A spec for a custom chain with every fork up to `fork` active from
    /// genesis. Handy for tests and dev chains.
    pub fn custom(chain_id: u64, fork: Fork) -> Self {
        let zero_if = |active| if active { Some(0) } else { None };
        let config = ChainConfig {
            chain_id,
            network_id: Some(chain_id),
            homestead_block: zero_if(fork >= Fork::Homestead),
            eip150_block: zero_if(fork >= Fork::Tangerine),
            eip155_block: zero_if(fork >= Fork::SpuriousDragon),
            eip158_block: zero_if(fork >= Fork::SpuriousDragon),
            byzantium_block: zero_if(fork >= Fork::Byzantium),
            constantinople_block: zero_if(fork >= Fork::Constantinople),
            petersburg_block: zero_if(fork >= Fork::Petersburg),
            istanbul_block: zero_if(fork >= Fork::Istanbul),
            muir_glacier_block: zero_if(fork >= Fork::MuirGlacier),
            berlin_block: zero_if(fork >= Fork::Berlin),
            london_block: zero_if(fork >= Fork::London),
            arrow_glacier_block: zero_if(fork >= Fork::ArrowGlacier),
            gray_glacier_block: zero_if(fork >= Fork::GrayGlacier),
            terminal_total_difficulty: if fork >= Fork::Paris { Some(0) } else { None },
            terminal_total_difficulty_passed: fork >= Fork::Paris,
            shanghai_time: zero_if(fork >= Fork::Shanghai),
            cancun_time: zero_if(fork >= Fork::Cancun),
            ..Default::default()
        };
        Self {
            config,
            fork,
            eips: Vec::new(),
            generation: 0,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn network_id(&self) -> u64 {
        self.config.network_id.unwrap_or(self.config.chain_id)
    }

    pub fn fork(&self) -> Fork {
        self.fork
    }

    /// Bumped on every fork/EIP change; derived tables compare it to decide
    /// whether they are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn gte_fork(&self, fork: Fork) -> bool {
        self.fork >= fork
    }

    pub fn active_eips(&self) -> &[u64] {
        &self.eips
    }

    /// Active either through the user-supplied list or by being bundled in
    /// the current hardfork.
    pub fn is_activated_eip(&self, eip: u64) -> bool {
        self.eips.contains(&eip)
            || self
                .fork
                .iter_back()
                .any(|fork| params::fork_eips(fork).contains(&eip))
    }

    /// Switches the active hardfork and notifies subscribers.
    pub fn set_fork(&mut self, fork: Fork) -> Result<(), ChainConfigError> {
        Self::validate_eips(&self.eips, fork)?;
        self.fork = fork;
        self.generation += 1;
        for listener in &self.listeners {
            listener(fork);
        }
        Ok(())
    }

    /// Replaces the additionally activated EIP list. Order is observable:
    /// parameter resolution honors it.
    pub fn set_eips(&mut self, eips: Vec<u64>) -> Result<(), ChainConfigError> {
        Self::validate_eips(&eips, self.fork)?;
        self.eips = eips;
        self.generation += 1;
        for listener in &self.listeners {
            listener(self.fork);
        }
        Ok(())
    }

    fn validate_eips(eips: &[u64], fork: Fork) -> Result<(), ChainConfigError> {
        for &eip in eips {
            let spec = params::eip_spec(eip).ok_or(ChainConfigError::UnknownEip(eip))?;
            if fork < spec.minimum_fork {
                return Err(ChainConfigError::EipBelowMinimumFork {
                    eip,
                    minimum: spec.minimum_fork,
                });
            }
            for &required in spec.required {
                let satisfied = eips.contains(&required)
                    || fork
                        .iter_back()
                        .any(|current| params::fork_eips(current).contains(&required));
                if !satisfied {
                    return Err(ChainConfigError::EipPrerequisiteMissing { eip, required });
                }
            }
        }
        Ok(())
    }

    pub fn subscribe(&mut self, listener: ForkListener) {
        self.listeners.push(listener);
    }

    /// Parameter lookup: active EIPs in user order first, then the latest
    /// value along the fork chain, zero as the default.
    pub fn param(&self, topic: ParamTopic, name: &str) -> U256 {
        self.eips
            .iter()
            .find_map(|&eip| params::param_by_eip(topic, name, eip))
            .or_else(|| params::param_by_fork(topic, name, self.fork))
            .unwrap_or_default()
            .into()
    }

    pub fn param_by_fork(&self, topic: ParamTopic, name: &str, fork: Fork) -> U256 {
        params::param_by_fork(topic, name, fork)
            .unwrap_or_default()
            .into()
    }

    pub fn param_by_eip(&self, topic: ParamTopic, name: &str, eip: u64) -> Option<U256> {
        params::param_by_eip(topic, name, eip).map(Into::into)
    }

    pub fn fork_at(&self, head: ForkHead) -> Result<Fork, ChainConfigError> {
        self.config.fork_at(head)
    }

    pub fn fork_activation(&self, fork: Fork) -> Option<ForkActivation> {
        self.config.fork_activation(fork)
    }

    /// Activation block of a block-scheduled fork.
    pub fn fork_block(&self, fork: Fork) -> Result<BlockNumber, ChainConfigError> {
        match self.config.fork_activation(fork) {
            Some(ForkActivation::Block(number)) => Ok(number),
            _ => Err(ChainConfigError::ForkNotScheduled(fork)),
        }
    }

    /// Activation point of the next scheduled fork after `fork`, skipping
    /// the TTD-gated merge (which has no block/timestamp of its own).
    pub fn next_fork_activation(&self, fork: Fork) -> Option<ForkActivation> {
        self.config
            .scheduled_forks()
            .into_iter()
            .filter(|(next, act)| {
                *next > fork && !matches!(act, ForkActivation::TotalDifficulty(_))
            })
            .map(|(_, act)| act)
            .next()
    }

    /// EIP-2124 fork hash as of `fork`: CRC32 over the genesis hash and each
    /// scheduled activation point up to and including `fork`, skipping the
    /// merge fork, genesis-time activations and duplicate points.
    pub fn fork_hash(&self, fork: Fork, genesis_hash: H256) -> Result<H32, ChainConfigError> {
        if self.config.fork_activation(fork).is_none() {
            return Err(ChainConfigError::ForkNotScheduled(fork));
        }
        let mut hasher = Hasher::new();
        hasher.update(genesis_hash.as_bytes());
        let mut last_included = 0u64;
        for (current, activation) in self.config.scheduled_forks() {
            if current > fork {
                break;
            }
            let point = match activation {
                ForkActivation::Block(number) => number,
                ForkActivation::Timestamp(time) => time,
                ForkActivation::TotalDifficulty(_) => continue,
            };
            if point > 0 && point != last_included {
                hasher.update(&point.to_be_bytes());
                last_included = point;
            }
        }
        Ok(H32::from_slice(&hasher.finalize().to_be_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn param_resolution_order() {
        let mut spec = ChainSpec::custom(1, Fork::Berlin);
        assert_eq!(spec.param(ParamTopic::GasPrices, "maxRefundQuotient"), 2.into());

        // Activating EIP-3529 ahead of London overrides the fork value.
        spec.set_eips(vec![3529]).unwrap();
        assert_eq!(spec.param(ParamTopic::GasPrices, "maxRefundQuotient"), 5.into());

        // Unknown parameters default to zero.
        assert_eq!(spec.param(ParamTopic::Vm, "noSuchParam"), U256::zero());
    }

    #[test]
    fn eip_activation_rules() {
        let mut spec = ChainSpec::custom(1, Fork::Istanbul);
        assert_eq!(spec.set_eips(vec![99_999]), Err(ChainConfigError::UnknownEip(99_999)));
        // EIP-1559 requires at least Berlin.
        assert_eq!(
            spec.set_eips(vec![1559]),
            Err(ChainConfigError::EipBelowMinimumFork {
                eip: 1559,
                minimum: Fork::Berlin
            })
        );
        // On Istanbul, EIP-2930's prerequisites are not yet bundled.
        assert_eq!(
            spec.set_eips(vec![2930]),
            Err(ChainConfigError::EipPrerequisiteMissing {
                eip: 2930,
                required: 2718
            })
        );
        // Supplying the prerequisites explicitly makes it valid.
        spec.set_eips(vec![2718, 2929, 2930]).unwrap();
        assert!(spec.is_activated_eip(2930));
    }

    #[test]
    fn fork_bundled_eips_are_active() {
        let spec = ChainSpec::custom(1, Fork::Cancun);
        assert!(spec.is_activated_eip(1559));
        assert!(spec.is_activated_eip(4844));
        assert!(spec.is_activated_eip(6780));
        assert!(!spec.is_activated_eip(2537));
    }

    #[test]
    fn fork_change_signal_fires() {
        let mut spec = ChainSpec::custom(1, Fork::London);
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        spec.subscribe(Box::new(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        }));

        let generation = spec.generation();
        spec.set_fork(Fork::Shanghai).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(spec.generation() > generation);

        // Clones are deep copies without the listeners.
        let mut clone = spec.clone();
        clone.set_fork(Fork::Cancun).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(spec.fork(), Fork::Shanghai);
    }

    #[test]
    fn fork_hash_known_mainnet_vectors() {
        // EIP-2124 test vectors for mainnet.
        let config = ChainConfig {
            chain_id: 1,
            homestead_block: Some(1_150_000),
            dao_fork_block: Some(1_920_000),
            dao_fork_support: true,
            eip150_block: Some(2_463_000),
            eip155_block: Some(2_675_000),
            eip158_block: Some(2_675_000),
            byzantium_block: Some(4_370_000),
            constantinople_block: Some(7_280_000),
            petersburg_block: Some(7_280_000),
            istanbul_block: Some(9_069_000),
            ..Default::default()
        };
        let spec = ChainSpec::new(config, Fork::Istanbul).unwrap();
        let genesis =
            H256::from_str("d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3")
                .unwrap();

        assert_eq!(
            spec.fork_hash(Fork::Frontier, genesis).unwrap(),
            H32::from_str("fc64ec04").unwrap()
        );
        assert_eq!(
            spec.fork_hash(Fork::Homestead, genesis).unwrap(),
            H32::from_str("97c2c34c").unwrap()
        );
        assert_eq!(
            spec.fork_hash(Fork::SpuriousDragon, genesis).unwrap(),
            H32::from_str("3edd5b10").unwrap()
        );
        // Petersburg shares Constantinople's activation point.
        assert_eq!(
            spec.fork_hash(Fork::Petersburg, genesis).unwrap(),
            spec.fork_hash(Fork::Constantinople, genesis).unwrap()
        );
    }

    #[test]
    fn fork_hash_stable_under_future_forks() {
        let mut config = ChainConfig {
            chain_id: 1,
            homestead_block: Some(10),
            berlin_block: Some(20),
            ..Default::default()
        };
        let genesis = H256::repeat_byte(0xab);
        let without_future = ChainSpec::new(config, Fork::Berlin)
            .unwrap()
            .fork_hash(Fork::Berlin, genesis)
            .unwrap();

        config.london_block = Some(30);
        config.shanghai_time = Some(1_000_000);
        let with_future = ChainSpec::new(config, Fork::Berlin)
            .unwrap()
            .fork_hash(Fork::Berlin, genesis)
            .unwrap();

        assert_eq!(without_future, with_future);
    }

    #[test]
    fn next_fork_activation_skips_merge() {
        let mut spec = ChainSpec::custom(1, Fork::London);
        let mut config = *spec.config();
        config.terminal_total_difficulty = Some(1000);
        config.shanghai_time = Some(50_000);
        spec = ChainSpec::new(config, Fork::London).unwrap();

        assert_eq!(
            spec.next_fork_activation(Fork::London),
            Some(ForkActivation::Timestamp(50_000))
        );
        assert_eq!(spec.next_fork_activation(Fork::Shanghai), None);
    }
}

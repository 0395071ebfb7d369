use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type BlockNumber = u64;

/// Named hardforks in activation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fork {
    Frontier = 0,
    Homestead = 1,
    Dao = 2,
    Tangerine = 3,
    SpuriousDragon = 4,
    Byzantium = 5,
    Constantinople = 6,
    Petersburg = 7,
    Istanbul = 8,
    MuirGlacier = 9,
    Berlin = 10,
    London = 11,
    ArrowGlacier = 12,
    GrayGlacier = 13,
    Paris = 14,
    Shanghai = 15,
    Cancun = 16,
}

impl Fork {
    pub const ALL: [Fork; 17] = [
        Fork::Frontier,
        Fork::Homestead,
        Fork::Dao,
        Fork::Tangerine,
        Fork::SpuriousDragon,
        Fork::Byzantium,
        Fork::Constantinople,
        Fork::Petersburg,
        Fork::Istanbul,
        Fork::MuirGlacier,
        Fork::Berlin,
        Fork::London,
        Fork::ArrowGlacier,
        Fork::GrayGlacier,
        Fork::Paris,
        Fork::Shanghai,
        Fork::Cancun,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Fork::Frontier => "frontier",
            Fork::Homestead => "homestead",
            Fork::Dao => "dao",
            Fork::Tangerine => "tangerineWhistle",
            Fork::SpuriousDragon => "spuriousDragon",
            Fork::Byzantium => "byzantium",
            Fork::Constantinople => "constantinople",
            Fork::Petersburg => "petersburg",
            Fork::Istanbul => "istanbul",
            Fork::MuirGlacier => "muirGlacier",
            Fork::Berlin => "berlin",
            Fork::London => "london",
            Fork::ArrowGlacier => "arrowGlacier",
            Fork::GrayGlacier => "grayGlacier",
            Fork::Paris => "paris",
            Fork::Shanghai => "shanghai",
            Fork::Cancun => "cancun",
        }
    }

    /// Forks preceding and including `self`, in order.
    pub fn iter_back(&self) -> impl Iterator<Item = Fork> {
        let this = *self;
        Fork::ALL.into_iter().rev().filter(move |fork| *fork <= this)
    }
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Fork {
    type Err = ChainConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Fork::ALL
            .into_iter()
            .find(|fork| fork.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ChainConfigError::UnknownFork(name.to_string()))
    }
}

/// Condition under which a fork becomes active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkActivation {
    Block(BlockNumber),
    Timestamp(u64),
    TotalDifficulty(u128),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainConfigError {
    #[error("unknown hardfork: {0}")]
    UnknownFork(String),
    #[error("no hardfork scheduled at block zero")]
    NoForkAtGenesis,
    #[error("more than one hardfork carries a total-difficulty activation")]
    MultipleMergeForks,
    #[error("total difficulty is inconsistent with the block-derived hardfork")]
    ForkMismatch,
    #[error("hardfork {0} has no scheduled activation")]
    ForkNotScheduled(Fork),
    #[error("unknown EIP: {0}")]
    UnknownEip(u64),
    #[error("EIP {eip} requires EIP {required} to be active")]
    EipPrerequisiteMissing { eip: u64, required: u64 },
    #[error("EIP {eip} requires at least the {minimum} hardfork")]
    EipBelowMinimumFork { eip: u64, minimum: Fork },
}

/// Inputs for hardfork selection. Absent fields are treated as "latest" for
/// their activation kind (a missing timestamp ignores timestamp forks).
#[derive(Clone, Copy, Debug, Default)]
pub struct ForkHead {
    pub block_number: Option<BlockNumber>,
    pub timestamp: Option<u64>,
    pub total_difficulty: Option<u128>,
}

/// Blockchain settings defined per chain, geth genesis-config compatible.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub network_id: Option<u64>,

    /// Block numbers for the block where each fork was activated
    /// (None = no fork, 0 = fork is already active)
    pub homestead_block: Option<BlockNumber>,

    pub dao_fork_block: Option<BlockNumber>,
    /// Whether the node supports or opposes the DAO hard-fork
    #[serde(default)]
    pub dao_fork_support: bool,

    pub eip150_block: Option<BlockNumber>,
    pub eip155_block: Option<BlockNumber>,
    pub eip158_block: Option<BlockNumber>,

    pub byzantium_block: Option<BlockNumber>,
    pub constantinople_block: Option<BlockNumber>,
    pub petersburg_block: Option<BlockNumber>,
    pub istanbul_block: Option<BlockNumber>,
    pub muir_glacier_block: Option<BlockNumber>,
    pub berlin_block: Option<BlockNumber>,
    pub london_block: Option<BlockNumber>,
    pub arrow_glacier_block: Option<BlockNumber>,
    pub gray_glacier_block: Option<BlockNumber>,
    pub merge_netsplit_block: Option<BlockNumber>,

    /// Timestamp at which each fork was activated
    /// (None = no fork, 0 = fork is already active)
    pub shanghai_time: Option<u64>,
    pub cancun_time: Option<u64>,

    /// Amount of total difficulty reached by the network that triggers the
    /// consensus upgrade.
    pub terminal_total_difficulty: Option<u128>,
    /// Network has already passed the terminal total difficulty
    #[serde(default)]
    pub terminal_total_difficulty_passed: bool,
}

impl ChainConfig {
    pub fn fork_activation(&self, fork: Fork) -> Option<ForkActivation> {
        match fork {
            Fork::Frontier => Some(ForkActivation::Block(0)),
            Fork::Homestead => self.homestead_block.map(ForkActivation::Block),
            Fork::Dao => {
                if self.dao_fork_support {
                    self.dao_fork_block.map(ForkActivation::Block)
                } else {
                    None
                }
            }
            Fork::Tangerine => self.eip150_block.map(ForkActivation::Block),
            Fork::SpuriousDragon => self.eip158_block.map(ForkActivation::Block),
            Fork::Byzantium => self.byzantium_block.map(ForkActivation::Block),
            Fork::Constantinople => self.constantinople_block.map(ForkActivation::Block),
            Fork::Petersburg => self.petersburg_block.map(ForkActivation::Block),
            Fork::Istanbul => self.istanbul_block.map(ForkActivation::Block),
            Fork::MuirGlacier => self.muir_glacier_block.map(ForkActivation::Block),
            Fork::Berlin => self.berlin_block.map(ForkActivation::Block),
            Fork::London => self.london_block.map(ForkActivation::Block),
            Fork::ArrowGlacier => self.arrow_glacier_block.map(ForkActivation::Block),
            Fork::GrayGlacier => self.gray_glacier_block.map(ForkActivation::Block),
            Fork::Paris => self
                .terminal_total_difficulty
                .map(ForkActivation::TotalDifficulty),
            Fork::Shanghai => self.shanghai_time.map(ForkActivation::Timestamp),
            Fork::Cancun => self.cancun_time.map(ForkActivation::Timestamp),
        }
    }

    /// Forks with an activation condition, in fork order.
    pub fn scheduled_forks(&self) -> Vec<(Fork, ForkActivation)> {
        Fork::ALL
            .into_iter()
            .filter_map(|fork| self.fork_activation(fork).map(|act| (fork, act)))
            .collect()
    }

    /// Sanity-checks a fork schedule: something must activate at block zero
    /// and at most one fork may be gated on total difficulty.
    pub fn validate_schedule(schedule: &[(Fork, ForkActivation)]) -> Result<(), ChainConfigError> {
        match schedule.first() {
            Some((_, ForkActivation::Block(0))) => {}
            _ => return Err(ChainConfigError::NoForkAtGenesis),
        }
        let merge_forks = schedule
            .iter()
            .filter(|(_, act)| matches!(act, ForkActivation::TotalDifficulty(_)))
            .count();
        if merge_forks > 1 {
            return Err(ChainConfigError::MultipleMergeForks);
        }
        Ok(())
    }

    /// Selects the hardfork active at the given head.
    ///
    /// Walks the schedule to the first fork strictly beyond the head, steps
    /// back, skips timestamp forks when no timestamp was given, and resolves
    /// the merge fork through its terminal total difficulty.
    pub fn fork_at(&self, head: ForkHead) -> Result<Fork, ChainConfigError> {
        let schedule = self.scheduled_forks();
        Self::validate_schedule(&schedule)?;

        // The merge fork is transparent to the positional scan: its activation
        // is resolved through the terminal total difficulty after landing.
        let exceeds_head = |activation: &ForkActivation| match *activation {
            ForkActivation::Block(number) => head
                .block_number
                .is_some_and(|head_number| number > head_number),
            ForkActivation::Timestamp(time) => {
                head.timestamp.is_some_and(|head_time| time > head_time)
            }
            ForkActivation::TotalDifficulty(_) => false,
        };

        let next = schedule
            .iter()
            .position(|(_, activation)| exceeds_head(activation))
            .unwrap_or(schedule.len());
        let mut landed = next.checked_sub(1).ok_or(ChainConfigError::NoForkAtGenesis)?;

        // A timestamp fork cannot be selected without a timestamp.
        if head.timestamp.is_none() {
            while matches!(schedule[landed].1, ForkActivation::Timestamp(_)) {
                landed = landed
                    .checked_sub(1)
                    .ok_or(ChainConfigError::NoForkAtGenesis)?;
            }
        }

        let merge_position = schedule
            .iter()
            .position(|(_, act)| matches!(act, ForkActivation::TotalDifficulty(_)));

        if let ForkActivation::TotalDifficulty(ttd) = schedule[landed].1 {
            let post_merge = match head.total_difficulty {
                Some(td) => td >= ttd,
                None => self.terminal_total_difficulty_passed,
            };
            if !post_merge {
                landed = landed
                    .checked_sub(1)
                    .ok_or(ChainConfigError::NoForkAtGenesis)?;
            }
        } else if let (Some(merge), Some(td)) = (merge_position, head.total_difficulty) {
            if let ForkActivation::TotalDifficulty(ttd) = schedule[merge].1 {
                // Block/timestamp inputs landed on one side of the merge; the
                // total difficulty must agree.
                if (landed > merge && td < ttd) || (landed < merge && td >= ttd) {
                    return Err(ChainConfigError::ForkMismatch);
                }
            }
        }

        // Forks sharing the same activation point collapse into the last one.
        let (mut selected, activation) = schedule[landed];
        for (fork, act) in schedule.iter().skip(landed + 1) {
            if *act == activation {
                selected = *fork;
            } else {
                break;
            }
        }
        Ok(selected)
    }

    pub fn is_shanghai_activated(&self, block_timestamp: u64) -> bool {
        self.shanghai_time
            .is_some_and(|time| time <= block_timestamp)
    }

    pub fn is_cancun_activated(&self, block_timestamp: u64) -> bool {
        self.cancun_time.is_some_and(|time| time <= block_timestamp)
    }

    pub fn is_istanbul_activated(&self, block_number: BlockNumber) -> bool {
        self.istanbul_block.is_some_and(|num| num <= block_number)
    }

    pub fn is_london_activated(&self, block_number: BlockNumber) -> bool {
        self.london_block.is_some_and(|num| num <= block_number)
    }

    pub fn is_eip155_activated(&self, block_number: BlockNumber) -> bool {
        self.eip155_block.is_some_and(|num| num <= block_number)
    }

    /// Post-merge fork selection by timestamp only.
    pub fn fork_by_timestamp(&self, block_timestamp: u64) -> Fork {
        if self.is_cancun_activated(block_timestamp) {
            Fork::Cancun
        } else if self.is_shanghai_activated(block_timestamp) {
            Fork::Shanghai
        } else {
            Fork::Paris
        }
    }

    /// Fork activations split into block-number and timestamp gated lists,
    /// in schedule order, as the fork-id checksum consumes them.
    pub fn gather_forks(&self) -> (Vec<Option<u64>>, Vec<Option<u64>>) {
        let block_number_based_forks = vec![
            self.homestead_block,
            if self.dao_fork_support {
                self.dao_fork_block
            } else {
                None
            },
            self.eip150_block,
            self.eip155_block,
            self.eip158_block,
            self.byzantium_block,
            self.constantinople_block,
            self.petersburg_block,
            self.istanbul_block,
            self.muir_glacier_block,
            self.berlin_block,
            self.london_block,
            self.arrow_glacier_block,
            self.gray_glacier_block,
            self.merge_netsplit_block,
        ];

        let timestamp_based_forks = vec![self.shanghai_time, self.cancun_time];

        (block_number_based_forks, timestamp_based_forks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goerli_like() -> ChainConfig {
        ChainConfig {
            chain_id: 5,
            homestead_block: Some(0),
            eip150_block: Some(0),
            eip155_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(0),
            berlin_block: Some(2),
            london_block: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn fork_by_block_number() {
        let config = goerli_like();
        let by_block = |number| {
            config
                .fork_at(ForkHead {
                    block_number: Some(number),
                    ..Default::default()
                })
                .unwrap()
        };
        assert_eq!(by_block(0), Fork::Istanbul);
        assert_eq!(by_block(1), Fork::Istanbul);
        assert_eq!(by_block(2), Fork::Berlin);
        assert_eq!(by_block(3), Fork::London);
        assert_eq!(by_block(4), Fork::London);
    }

    #[test]
    fn fork_selection_is_monotonic() {
        let config = goerli_like();
        let mut previous = Fork::Frontier;
        for number in 0..6 {
            let fork = config
                .fork_at(ForkHead {
                    block_number: Some(number),
                    ..Default::default()
                })
                .unwrap();
            assert!(fork >= previous);
            previous = fork;
        }
    }

    #[test]
    fn ties_resolve_to_last_fork() {
        // Everything at block 0 collapses into the newest zero-activated fork.
        let config = goerli_like();
        let fork = config
            .fork_at(ForkHead {
                block_number: Some(0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(fork, Fork::Istanbul);
    }

    #[test]
    fn merge_resolution_by_total_difficulty() {
        let mut config = goerli_like();
        config.terminal_total_difficulty = Some(10_000);
        config.shanghai_time = Some(100);

        let pre_merge = config
            .fork_at(ForkHead {
                block_number: Some(50),
                total_difficulty: Some(9_999),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pre_merge, Fork::London);

        let post_merge = config
            .fork_at(ForkHead {
                block_number: Some(50),
                total_difficulty: Some(10_000),
                timestamp: Some(99),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(post_merge, Fork::Paris);

        let shanghai = config
            .fork_at(ForkHead {
                block_number: Some(50),
                total_difficulty: Some(10_000),
                timestamp: Some(100),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(shanghai, Fork::Shanghai);
    }

    #[test]
    fn inconsistent_total_difficulty_is_rejected() {
        let mut config = goerli_like();
        config.terminal_total_difficulty = Some(10_000);
        config.shanghai_time = Some(100);

        let result = config.fork_at(ForkHead {
            block_number: Some(50),
            timestamp: Some(200),
            total_difficulty: Some(1),
        });
        assert_eq!(result, Err(ChainConfigError::ForkMismatch));
    }

    #[test]
    fn timestamp_forks_skipped_without_timestamp() {
        let mut config = goerli_like();
        config.terminal_total_difficulty = Some(0);
        config.terminal_total_difficulty_passed = true;
        config.shanghai_time = Some(0);

        let fork = config
            .fork_at(ForkHead {
                block_number: Some(10),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(fork, Fork::Paris);
    }

    #[test]
    fn missing_genesis_fork_is_rejected() {
        let config = ChainConfig {
            chain_id: 1,
            homestead_block: Some(5),
            ..Default::default()
        };
        // Frontier always activates at zero, so this still resolves.
        assert!(config
            .fork_at(ForkHead {
                block_number: Some(0),
                ..Default::default()
            })
            .is_ok());

        let schedule = vec![(Fork::Homestead, ForkActivation::Block(5))];
        assert_eq!(
            ChainConfig::validate_schedule(&schedule),
            Err(ChainConfigError::NoForkAtGenesis)
        );
    }

    #[test]
    fn multiple_merge_forks_are_rejected() {
        let schedule = vec![
            (Fork::Frontier, ForkActivation::Block(0)),
            (Fork::Paris, ForkActivation::TotalDifficulty(100)),
            (Fork::Shanghai, ForkActivation::TotalDifficulty(200)),
        ];
        assert_eq!(
            ChainConfig::validate_schedule(&schedule),
            Err(ChainConfigError::MultipleMergeForks)
        );
    }

    #[test]
    fn fork_name_parsing() {
        assert_eq!("london".parse::<Fork>().unwrap(), Fork::London);
        assert_eq!("Shanghai".parse::<Fork>().unwrap(), Fork::Shanghai);
        assert!(matches!(
            "futurefork".parse::<Fork>(),
            Err(ChainConfigError::UnknownFork(_))
        ));
    }
}

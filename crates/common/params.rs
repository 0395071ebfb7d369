//! Protocol parameter registry.
//!
//! Parameters are introduced either by a hardfork or by an individually
//! activated EIP. Each fork contributes a delta over its predecessors, so a
//! lookup walks the active EIP list first (in the order the user supplied)
//! and then the fork chain from newest to oldest.

use crate::types::Fork;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamTopic {
    GasConfig,
    GasPrices,
    Vm,
    Sharding,
}

pub type ParamEntry = (ParamTopic, &'static str, u64);

use ParamTopic::{GasConfig, GasPrices, Sharding, Vm};

/// Parameters introduced (or re-priced) by the given fork.
pub fn fork_params(fork: Fork) -> &'static [ParamEntry] {
    match fork {
        Fork::Frontier => &[
            (GasConfig, "minGasLimit", 5000),
            (GasConfig, "gasLimitBoundDivisor", 1024),
            (GasPrices, "tx", 21_000),
            (GasPrices, "txCreation", 32_000),
            (GasPrices, "txDataZero", 4),
            (GasPrices, "txDataNonZero", 68),
            (GasPrices, "codeDepositCost", 200),
            (GasPrices, "callStipend", 2300),
            (GasPrices, "maxRefundQuotient", 2),
            (GasPrices, "selfdestructRefund", 24_000),
            (GasPrices, "sstoreClearRefund", 15_000),
            (Vm, "stackLimit", 1024),
            (Vm, "callCreateDepth", 1024),
        ],
        Fork::Tangerine => &[
            // EIP-150 IO-heavy repricings
            (GasPrices, "sload", 200),
            (GasPrices, "call", 700),
            (GasPrices, "extcodesize", 700),
            (GasPrices, "balance", 400),
            (GasPrices, "selfdestruct", 5000),
        ],
        Fork::SpuriousDragon => &[
            // EIP-170
            (Vm, "maxCodeSize", 24_576),
            // EIP-160
            (GasPrices, "expByte", 50),
        ],
        Fork::Istanbul => &[
            // EIP-2028
            (GasPrices, "txDataNonZero", 16),
            // EIP-1108 bn254 repricings
            (GasPrices, "bn254AddGas", 150),
            (GasPrices, "bn254MulGas", 6000),
            (GasPrices, "bn254PairingGas", 45_000),
            (GasPrices, "bn254PairingWordGas", 34_000),
        ],
        // Berlin and later forks only bundle EIPs; their parameters live on
        // the EIP specs and are picked up through `fork_eips`.
        _ => &[],
    }
}

/// EIPs bundled into the given fork (queried when an EIP is "active" by way
/// of the fork rather than the user-supplied list).
pub fn fork_eips(fork: Fork) -> &'static [u64] {
    match fork {
        Fork::Homestead => &[2, 7, 8],
        Fork::Tangerine => &[150],
        Fork::SpuriousDragon => &[155, 158, 160, 161, 170],
        Fork::Byzantium => &[100, 140, 196, 197, 198, 211, 214, 649, 658],
        Fork::Constantinople => &[145, 1014, 1052, 1234, 1283],
        Fork::Petersburg => &[1716],
        Fork::Istanbul => &[152, 1108, 1344, 1884, 2028, 2200],
        Fork::MuirGlacier => &[2384],
        Fork::Berlin => &[2565, 2718, 2929, 2930],
        Fork::London => &[1559, 3198, 3529, 3541],
        Fork::ArrowGlacier => &[4345],
        Fork::GrayGlacier => &[5133],
        Fork::Paris => &[3675, 4399],
        Fork::Shanghai => &[3651, 3855, 3860, 4895],
        Fork::Cancun => &[1153, 4788, 4844, 5656, 6780, 7516],
        _ => &[],
    }
}

/// An individually activatable EIP: activation preconditions plus the
/// parameters it introduces.
#[derive(Debug)]
pub struct EipSpec {
    pub number: u64,
    pub minimum_fork: Fork,
    pub required: &'static [u64],
    pub params: &'static [ParamEntry],
}

pub const EIPS: &[EipSpec] = &[
    EipSpec {
        number: 1153,
        minimum_fork: Fork::London,
        required: &[],
        params: &[(GasPrices, "tstore", 100), (GasPrices, "tload", 100)],
    },
    EipSpec {
        number: 1559,
        minimum_fork: Fork::Berlin,
        required: &[2930],
        params: &[
            (GasConfig, "baseFeeMaxChangeDenominator", 8),
            (GasConfig, "elasticityMultiplier", 2),
            (GasConfig, "initialBaseFee", 1_000_000_000),
        ],
    },
    EipSpec {
        number: 2028,
        minimum_fork: Fork::Byzantium,
        required: &[],
        params: &[(GasPrices, "txDataNonZero", 16)],
    },
    EipSpec {
        number: 2537,
        minimum_fork: Fork::Frontier,
        required: &[],
        params: &[
            (GasPrices, "bls12381G1AddGas", 500),
            (GasPrices, "bls12381G1MulGas", 12_000),
            (GasPrices, "bls12381G2AddGas", 800),
            (GasPrices, "bls12381G2MulGas", 45_000),
            (GasPrices, "bls12381PairingBaseGas", 65_000),
            (GasPrices, "bls12381PairingPerPairGas", 43_000),
            (GasPrices, "bls12381MapG1Gas", 5500),
            (GasPrices, "bls12381MapG2Gas", 75_000),
        ],
    },
    EipSpec {
        number: 2565,
        minimum_fork: Fork::Byzantium,
        required: &[],
        params: &[(GasPrices, "modexpGquaddivisor", 3)],
    },
    EipSpec {
        number: 2718,
        minimum_fork: Fork::Frontier,
        required: &[],
        params: &[],
    },
    EipSpec {
        number: 2929,
        minimum_fork: Fork::Istanbul,
        required: &[],
        params: &[
            (GasPrices, "coldsload", 2100),
            (GasPrices, "coldaccountaccess", 2600),
            (GasPrices, "warmstorageread", 100),
        ],
    },
    EipSpec {
        number: 2930,
        minimum_fork: Fork::Istanbul,
        required: &[2718, 2929],
        params: &[
            (GasPrices, "accessListAddressCost", 2400),
            (GasPrices, "accessListStorageKeyCost", 1900),
        ],
    },
    EipSpec {
        number: 3198,
        minimum_fork: Fork::London,
        required: &[1559],
        params: &[(GasPrices, "basefee", 2)],
    },
    EipSpec {
        number: 3529,
        minimum_fork: Fork::Berlin,
        required: &[2929],
        params: &[
            (GasPrices, "maxRefundQuotient", 5),
            (GasPrices, "selfdestructRefund", 0),
            (GasPrices, "sstoreClearRefund", 4800),
        ],
    },
    EipSpec {
        number: 3540,
        minimum_fork: Fork::London,
        required: &[3541],
        params: &[],
    },
    EipSpec {
        number: 3541,
        minimum_fork: Fork::Berlin,
        required: &[],
        params: &[],
    },
    EipSpec {
        number: 3607,
        minimum_fork: Fork::Frontier,
        required: &[],
        params: &[],
    },
    EipSpec {
        number: 3651,
        minimum_fork: Fork::London,
        required: &[2929],
        params: &[],
    },
    EipSpec {
        number: 3670,
        minimum_fork: Fork::London,
        required: &[3540],
        params: &[],
    },
    EipSpec {
        number: 3855,
        minimum_fork: Fork::Frontier,
        required: &[],
        params: &[(GasPrices, "push0", 2)],
    },
    EipSpec {
        number: 3860,
        minimum_fork: Fork::SpuriousDragon,
        required: &[],
        params: &[
            (GasPrices, "initcodeWordCost", 2),
            (Vm, "maxInitCodeSize", 49_152),
        ],
    },
    EipSpec {
        number: 4399,
        minimum_fork: Fork::London,
        required: &[],
        params: &[],
    },
    EipSpec {
        number: 4844,
        minimum_fork: Fork::Paris,
        required: &[1559, 4895],
        params: &[
            (Sharding, "blobCommitmentVersionKzg", 1),
            (Sharding, "blobGasPerBlob", 131_072),
            (Sharding, "targetBlobGasPerBlock", 393_216),
            (Sharding, "maxBlobGasPerBlock", 786_432),
            (Sharding, "blobGasPriceUpdateFraction", 3_338_477),
            (GasPrices, "minBlobGas", 1),
            (GasPrices, "kzgPointEvaluationGas", 50_000),
            (GasPrices, "blobhash", 3),
        ],
    },
    EipSpec {
        number: 4895,
        minimum_fork: Fork::Paris,
        required: &[],
        params: &[],
    },
    EipSpec {
        number: 5656,
        minimum_fork: Fork::Shanghai,
        required: &[],
        params: &[(GasPrices, "mcopy", 3)],
    },
    EipSpec {
        number: 6780,
        minimum_fork: Fork::London,
        required: &[2929],
        params: &[],
    },
];

pub fn eip_spec(number: u64) -> Option<&'static EipSpec> {
    EIPS.iter().find(|spec| spec.number == number)
}

fn lookup(entries: &[ParamEntry], topic: ParamTopic, name: &str) -> Option<u64> {
    entries
        .iter()
        .find(|(entry_topic, entry_name, _)| *entry_topic == topic && *entry_name == name)
        .map(|(_, _, value)| *value)
}

/// Parameter as introduced by `eip` itself or, transitively, one of its
/// prerequisites.
pub fn param_by_eip(topic: ParamTopic, name: &str, eip: u64) -> Option<u64> {
    let spec = eip_spec(eip)?;
    lookup(spec.params, topic, name).or_else(|| {
        spec.required
            .iter()
            .find_map(|required| param_by_eip(topic, name, *required))
    })
}

/// Parameter as of `fork`: the most recent value introduced at or before it,
/// considering both fork deltas and fork-bundled EIPs.
pub fn param_by_fork(topic: ParamTopic, name: &str, fork: Fork) -> Option<u64> {
    fork.iter_back().find_map(|current| {
        lookup(fork_params(current), topic, name).or_else(|| {
            fork_eips(current)
                .iter()
                .filter_map(|eip| eip_spec(*eip))
                .find_map(|spec| lookup(spec.params, topic, name))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_data_cost_repriced_at_istanbul() {
        assert_eq!(
            param_by_fork(GasPrices, "txDataNonZero", Fork::Byzantium),
            Some(68)
        );
        assert_eq!(
            param_by_fork(GasPrices, "txDataNonZero", Fork::Istanbul),
            Some(16)
        );
        assert_eq!(
            param_by_fork(GasPrices, "txDataNonZero", Fork::Cancun),
            Some(16)
        );
    }

    #[test]
    fn refund_quotient_tightened_by_london() {
        assert_eq!(
            param_by_fork(GasPrices, "maxRefundQuotient", Fork::Berlin),
            Some(2)
        );
        assert_eq!(
            param_by_fork(GasPrices, "maxRefundQuotient", Fork::London),
            Some(5)
        );
    }

    #[test]
    fn access_list_costs_from_berlin() {
        assert_eq!(
            param_by_fork(GasPrices, "accessListAddressCost", Fork::Istanbul),
            None
        );
        assert_eq!(
            param_by_fork(GasPrices, "accessListAddressCost", Fork::Berlin),
            Some(2400)
        );
    }

    #[test]
    fn eip_params_resolve_transitively() {
        // EIP-3529 itself does not define the cold-access costs, its
        // prerequisite EIP-2929 does.
        assert_eq!(param_by_eip(GasPrices, "coldsload", 3529), Some(2100));
        assert_eq!(param_by_eip(GasPrices, "maxRefundQuotient", 3529), Some(5));
        assert_eq!(param_by_eip(GasPrices, "tx", 3529), None);
    }

    #[test]
    fn sharding_params_from_cancun() {
        assert_eq!(
            param_by_fork(Sharding, "blobCommitmentVersionKzg", Fork::Cancun),
            Some(1)
        );
        assert_eq!(
            param_by_fork(Sharding, "blobCommitmentVersionKzg", Fork::Shanghai),
            None
        );
    }
}

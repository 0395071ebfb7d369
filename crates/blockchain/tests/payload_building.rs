use std::time::{Duration, Instant};

use bytes::Bytes;
use ethereum_types::{Address, Bloom, H256, U256};
use ethrun_blockchain::error::MempoolError;
use ethrun_blockchain::payload::BuildPayloadArgs;
use ethrun_blockchain::store::Store;
use ethrun_blockchain::Blockchain;
use ethrun_core::chain_spec::ChainSpec;
use ethrun_core::types::{
    address_from_secret_key, BlobsBundle, Block, BlockBody, BlockHeader, EIP4844Transaction,
    Fork, LegacyTransaction, Transaction, TxKind, BYTES_PER_BLOB, DEFAULT_OMMERS_HASH,
    GAS_PER_BLOB, VERSIONED_HASH_VERSION_KZG,
};
use ethrun_vm::Account;
use secp256k1::SecretKey;

const CHAIN_ID: u64 = 1;
const RECIPIENT: Address = ethereum_types::H160([0x42; 20]);

fn secret(tag: u8) -> SecretKey {
    SecretKey::from_slice(&[tag; 32]).unwrap()
}

fn genesis_block() -> Block {
    Block {
        header: BlockHeader {
            ommers_hash: *DEFAULT_OMMERS_HASH,
            gas_limit: 30_000_000,
            base_fee_per_gas: Some(0),
            withdrawals_root: Some(H256::zero()),
            blob_gas_used: Some(0),
            excess_blob_gas: Some(0),
            parent_beacon_block_root: Some(H256::zero()),
            logs_bloom: Bloom::zero(),
            ..Default::default()
        },
        body: BlockBody::empty(),
    }
}

fn setup() -> (Blockchain, Block) {
    let store = Store::new(ChainSpec::custom(CHAIN_ID, Fork::Cancun));
    let genesis = genesis_block();
    store.add_block(genesis.clone());
    store.set_canonical(&genesis);
    (Blockchain::new(store), genesis)
}

fn fund(chain: &Blockchain, key: &SecretKey) -> Address {
    let address = address_from_secret_key(key);
    chain.storage.set_account(
        address,
        Account::default().with_balance(U256::from(10).pow(18.into())),
    );
    address
}

fn signed_transfer(key: &SecretKey, nonce: u64, gas_price: u64) -> Transaction {
    let mut tx = LegacyTransaction {
        nonce,
        gas_price,
        gas_limit: 21_000,
        to: TxKind::Call(RECIPIENT),
        value: U256::from(1),
        data: Bytes::new(),
        ..Default::default()
    };
    tx.sign(key, Some(CHAIN_ID));
    Transaction::LegacyTransaction(tx)
}

fn payload_args(parent: &Block) -> BuildPayloadArgs {
    BuildPayloadArgs {
        parent: parent.hash(),
        timestamp: parent.header.timestamp + 12,
        fee_recipient: Address::repeat_byte(0xfe),
        random: H256::repeat_byte(0x99),
        withdrawals: vec![],
        beacon_root: Some(H256::zero()),
        version: 3,
    }
}

#[test]
fn payload_id_is_stable_and_version_tagged() {
    let (_, genesis) = setup();
    let args = payload_args(&genesis);
    let id = args.id();
    assert_eq!(args.id(), id);
    assert_eq!(id.to_be_bytes()[0], 3);

    let mut other = payload_args(&genesis);
    other.timestamp += 1;
    assert_ne!(other.id(), id);
}

#[test]
fn transactions_are_ordered_by_tip_across_senders() {
    let (chain, genesis) = setup();
    let key_a = secret(0x11);
    let key_b = secret(0x22);
    let sender_a = fund(&chain, &key_a);
    let sender_b = fund(&chain, &key_b);

    // A: three nonce-ordered transactions at rising prices; B: a single
    // transaction priced between A's first and last.
    chain
        .add_transaction_to_pool(signed_transfer(&key_a, 0, 10))
        .unwrap();
    chain
        .add_transaction_to_pool(signed_transfer(&key_a, 1, 20))
        .unwrap();
    chain
        .add_transaction_to_pool(signed_transfer(&key_a, 2, 30))
        .unwrap();
    chain
        .add_transaction_to_pool(signed_transfer(&key_b, 0, 25))
        .unwrap();

    let id = chain.start_payload(payload_args(&genesis));
    let result = chain.build_payload(id, None).unwrap();

    // B's head outbids A's head; A's remaining transactions follow in nonce
    // order regardless of their prices.
    let senders: Vec<Address> = result
        .block
        .body
        .transactions
        .iter()
        .map(|tx| tx.sender().unwrap())
        .collect();
    assert_eq!(senders, vec![sender_b, sender_a, sender_a, sender_a]);
    let nonces: Vec<u64> = result
        .block
        .body
        .transactions
        .iter()
        .map(|tx| tx.nonce())
        .collect();
    assert_eq!(nonces, vec![0, 0, 1, 2]);

    assert_eq!(result.receipts.len(), 4);
    assert_eq!(result.block.header.gas_used, 4 * 21_000);
    // 21000 gas at tips 25 + 10 + 20 + 30.
    assert_eq!(result.block_value, U256::from(21_000u64 * (25 + 10 + 20 + 30)));
}

#[test]
fn blob_budget_defers_overflowing_transactions() {
    let (chain, genesis) = setup();

    let mut expected_bundle = BlobsBundle::default();
    for (tag, tip) in [(0x31u8, 30u64), (0x32, 20), (0x33, 10)] {
        let key = secret(tag);
        let sender = fund(&chain, &key);
        let hashes: Vec<H256> = (0..3)
            .map(|i| {
                let mut hash = [0u8; 32];
                hash[0] = VERSIONED_HASH_VERSION_KZG;
                hash[1] = tag;
                hash[2] = i;
                H256::from(hash)
            })
            .collect();
        let mut tx = EIP4844Transaction {
            chain_id: CHAIN_ID,
            nonce: 0,
            max_priority_fee_per_gas: tip,
            max_fee_per_gas: tip,
            gas_limit: 21_000,
            to: RECIPIENT,
            value: U256::zero(),
            max_fee_per_blob_gas: U256::from(1_000),
            blob_versioned_hashes: hashes,
            ..Default::default()
        };
        tx.sign(&key);
        let bundle = BlobsBundle {
            blobs: vec![[tag; BYTES_PER_BLOB]; 3],
            commitments: vec![[tag; 48]; 3],
            proofs: vec![[tag; 48]; 3],
        };
        if tip > 10 {
            expected_bundle.extend(&bundle);
        }
        chain.mempool.add_transaction_unvalidated(
            Transaction::EIP4844Transaction(tx),
            sender,
            Some(bundle),
        );
    }

    let id = chain.start_payload(payload_args(&genesis));
    let result = chain.build_payload(id, None).unwrap();

    // Two three-blob transactions fit the six-blob budget; the third waits.
    assert_eq!(result.block.body.transactions.len(), 2);
    assert_eq!(result.block.header.blob_gas_used, Some(6 * GAS_PER_BLOB));
    assert_eq!(result.blobs_bundle.blobs.len(), 6);
    assert_eq!(result.blobs_bundle.commitments.len(), 6);
    assert_eq!(result.blobs_bundle.proofs.len(), 6);
    assert_eq!(result.blobs_bundle, expected_bundle);
    assert_eq!(chain.mempool.len(), 3);
}

#[test]
fn cancelled_build_returns_without_filling() {
    let (chain, genesis) = setup();
    let key = secret(0x44);
    fund(&chain, &key);
    chain
        .add_transaction_to_pool(signed_transfer(&key, 0, 10))
        .unwrap();

    let id = chain.start_payload(payload_args(&genesis));
    chain.stop_payload(id);
    // Stopping twice is fine.
    chain.stop_payload(id);

    let result = chain.build_payload(id, None).unwrap();
    assert!(result.block.body.transactions.is_empty());
    // The pool is untouched.
    assert_eq!(chain.mempool.len(), 1);
}

#[test]
fn deadline_in_the_past_yields_empty_block() {
    let (chain, genesis) = setup();
    let key = secret(0x45);
    fund(&chain, &key);
    chain
        .add_transaction_to_pool(signed_transfer(&key, 0, 10))
        .unwrap();

    let id = chain.start_payload(payload_args(&genesis));
    let expired = Instant::now() - Duration::from_secs(1);
    let result = chain.build_payload(id, Some(expired)).unwrap();
    assert!(result.block.body.transactions.is_empty());
}

#[test]
fn built_payload_imports_and_prunes_the_pool() {
    let (chain, genesis) = setup();
    let key = secret(0x46);
    let sender = fund(&chain, &key);
    chain
        .add_transaction_to_pool(signed_transfer(&key, 0, 10))
        .unwrap();
    chain
        .add_transaction_to_pool(signed_transfer(&key, 1, 10))
        .unwrap();

    let id = chain.start_payload(payload_args(&genesis));
    let result = chain.build_payload(id, None).unwrap();
    assert_eq!(result.block.body.transactions.len(), 2);

    chain.add_block(result.block.clone()).unwrap();
    assert_eq!(chain.latest_block_hash(), Some(result.block.hash()));
    assert_eq!(chain.storage.account_nonce(sender), 2);
    assert!(chain.mempool.is_empty());

    // The recipient received both transfers.
    assert_eq!(chain.storage.account_balance(RECIPIENT), U256::from(2));
}

#[test]
fn pool_rejects_underpriced_replacement_and_low_nonces() {
    let (chain, _) = setup();
    let key = secret(0x47);
    fund(&chain, &key);

    chain
        .add_transaction_to_pool(signed_transfer(&key, 0, 100))
        .unwrap();
    // Same nonce, tip not bumped by 10%.
    assert!(matches!(
        chain.add_transaction_to_pool(signed_transfer(&key, 0, 105)),
        Err(MempoolError::ReplacementUnderpriced)
    ));
    // A 10% bump replaces.
    chain
        .add_transaction_to_pool(signed_transfer(&key, 0, 110))
        .unwrap();
    assert_eq!(chain.mempool.len(), 1);

    // Below the account nonce after a block moved it forward.
    let sender = address_from_secret_key(&key);
    chain.storage.set_account(
        sender,
        Account::default()
            .with_balance(U256::from(10).pow(18.into()))
            .with_nonce(5),
    );
    assert!(matches!(
        chain.add_transaction_to_pool(signed_transfer(&key, 4, 10)),
        Err(MempoolError::NonceTooLow { expected: 5, got: 4 })
    ));
}

#[test]
fn pool_enforces_base_fee_floor() {
    let store = Store::new(ChainSpec::custom(CHAIN_ID, Fork::Cancun));
    let mut genesis = genesis_block();
    genesis.header.base_fee_per_gas = Some(1_000);
    store.add_block(genesis.clone());
    store.set_canonical(&genesis);
    let chain = Blockchain::new(store);

    let key = secret(0x48);
    fund(&chain, &key);
    assert!(matches!(
        chain.add_transaction_to_pool(signed_transfer(&key, 0, 999)),
        Err(MempoolError::FeeBelowBase)
    ));
    chain
        .add_transaction_to_pool(signed_transfer(&key, 0, 1_000))
        .unwrap();
}

#[test]
fn blob_transactions_require_a_sidecar() {
    let (chain, _) = setup();
    let key = secret(0x49);
    fund(&chain, &key);
    let tx = Transaction::EIP4844Transaction(EIP4844Transaction {
        chain_id: CHAIN_ID,
        gas_limit: 21_000,
        to: RECIPIENT,
        blob_versioned_hashes: vec![H256::from_low_u64_be(1)],
        ..Default::default()
    });
    assert!(matches!(
        chain.add_transaction_to_pool(tx),
        Err(MempoolError::MissingBlobSidecar)
    ));
}

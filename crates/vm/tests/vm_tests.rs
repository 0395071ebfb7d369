use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use ethrun_core::chain_spec::ChainSpec;
use ethrun_core::types::{Fork, TxKind};
use ethrun_vm::db::Db;
use ethrun_vm::environment::{Environment, EvmConfig};
use ethrun_vm::errors::{TxResult, TxValidationError, VMError};
use ethrun_vm::journal::JournaledState;
use ethrun_vm::{Account, VM};

const SENDER: Address = ethereum_types::H160([0xaa; 20]);
const RECEIVER: Address = ethereum_types::H160([0xbb; 20]);
const COINBASE: Address = ethereum_types::H160([0xcc; 20]);

fn funded_state(accounts: Vec<(Address, Account)>) -> JournaledState {
    let mut db = Db::new();
    db.add_accounts(accounts);
    JournaledState::new(Arc::new(db))
}

fn env(fork: Fork, gas_limit: u64) -> Environment {
    Environment {
        origin: SENDER,
        gas_limit,
        config: EvmConfig::new(&ChainSpec::custom(1, fork)),
        coinbase: COINBASE,
        chain_id: U256::one(),
        base_fee_per_gas: U256::zero(),
        gas_price: U256::one(),
        block_gas_limit: 30_000_000,
        ..Default::default()
    }
}

fn sender_with_balance(wei: u64) -> (Address, Account) {
    (SENDER, Account::default().with_balance(wei.into()))
}

#[test]
fn run_code_simple_arithmetic() {
    // PUSH1 2, PUSH1 3, ADD, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
    let code = Bytes::from_static(&[
        0x60, 0x02, 0x60, 0x03, 0x01, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3,
    ]);
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, 100_000),
        U256::zero(),
        Bytes::new(),
        funded_state(vec![]),
        vec![],
    );
    let report = vm.run_code(code, Bytes::new(), 100_000).unwrap();
    assert!(report.is_success());
    assert_eq!(U256::from_big_endian(&report.output), U256::from(5));
    // 4 pushes, ADD, MSTORE (+3 expansion), RETURN expansion already paid.
    assert_eq!(report.gas_used, 3 + 3 + 3 + 3 + 3 + 3 + 3 + 3);
}

#[test]
fn undefined_opcode_consumes_all_gas() {
    let code = Bytes::from_static(&[0x0c]);
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, 50_000),
        U256::zero(),
        Bytes::new(),
        funded_state(vec![]),
        vec![],
    );
    let report = vm.run_code(code, Bytes::new(), 50_000).unwrap();
    assert!(matches!(report.result, TxResult::Revert(VMError::InvalidOpcode)));
    assert_eq!(report.gas_used, 50_000);
}

#[test]
fn push0_requires_shanghai() {
    let code = Bytes::from_static(&[0x5f, 0x00]);

    let mut old = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::London, 50_000),
        U256::zero(),
        Bytes::new(),
        funded_state(vec![]),
        vec![],
    );
    let report = old.run_code(code.clone(), Bytes::new(), 50_000).unwrap();
    assert!(matches!(report.result, TxResult::Revert(VMError::InvalidOpcode)));

    let mut new = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Shanghai, 50_000),
        U256::zero(),
        Bytes::new(),
        funded_state(vec![]),
        vec![],
    );
    let report = new.run_code(code, Bytes::new(), 50_000).unwrap();
    assert!(report.is_success());
}

#[test]
fn revert_preserves_return_data_and_remaining_gas() {
    // PUSH1 0xEE, PUSH1 0, MSTORE8, PUSH1 1, PUSH1 0, REVERT
    let code = Bytes::from_static(&[0x60, 0xee, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xfd]);
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, 60_000),
        U256::zero(),
        Bytes::new(),
        funded_state(vec![]),
        vec![],
    );
    let report = vm.run_code(code, Bytes::new(), 60_000).unwrap();
    assert!(matches!(report.result, TxResult::Revert(VMError::RevertOpcode)));
    assert_eq!(report.output.as_ref(), &[0xee]);
    assert!(report.gas_used < 60_000);
}

#[test]
fn simple_transfer_moves_value_and_pays_base_cost() {
    let state = funded_state(vec![sender_with_balance(1_000_000)]);
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, 21_000),
        U256::from(700),
        Bytes::new(),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    assert_eq!(report.gas_used, 21_000);

    let mut state = vm.into_state();
    assert_eq!(state.get_account_info(RECEIVER).balance, U256::from(700));
    // balance - value - gas (price 1, base fee 0 so all returned except tip)
    assert_eq!(
        state.get_account_info(SENDER).balance,
        U256::from(1_000_000 - 700 - 21_000)
    );
    assert_eq!(state.get_account_info(SENDER).nonce, 1);
    assert_eq!(state.get_account_info(COINBASE).balance, U256::from(21_000));
}

#[test]
fn insufficient_balance_is_a_validation_error() {
    let state = funded_state(vec![sender_with_balance(100)]);
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, 21_000),
        U256::from(700),
        Bytes::new(),
        state,
        vec![],
    );
    assert!(matches!(
        vm.transact(),
        Err(VMError::TxValidation(
            TxValidationError::InsufficientAccountFunds
        ))
    ));
}

#[test]
fn nonce_mismatch_is_rejected() {
    let state = funded_state(vec![sender_with_balance(1_000_000)]);
    let mut environment = env(Fork::Cancun, 21_000);
    environment.tx_nonce = 5;
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        environment,
        U256::zero(),
        Bytes::new(),
        state,
        vec![],
    );
    assert!(matches!(
        vm.transact(),
        Err(VMError::TxValidation(TxValidationError::NonceMismatch {
            expected: 0,
            got: 5
        }))
    ));
}

#[test]
fn create_transaction_deploys_runtime_code() {
    // Initcode: PUSH1 0x01 PUSH1 0 MSTORE8 PUSH1 1 PUSH1 0 RETURN
    // deploys the single-byte contract 0x01.
    let initcode = Bytes::from_static(&[0x60, 0x01, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3]);
    let state = funded_state(vec![sender_with_balance(10_000_000)]);
    let mut vm = VM::new(
        TxKind::Create,
        env(Fork::Cancun, 200_000),
        U256::zero(),
        initcode,
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    let created = report.created_address.unwrap();
    assert_eq!(created, VM::calculate_create_address(SENDER, 0).unwrap());
    assert!(report.created_accounts.contains(&created));

    let mut state = vm.into_state();
    let deployed = state.get_account_info(created);
    assert_eq!(deployed.bytecode.as_ref(), &[0x01]);
    assert_eq!(deployed.nonce, 1);
}

#[test]
fn create_rejects_deployed_code_starting_with_ef() {
    // Initcode returning a single 0xEF byte (EIP-3541).
    let initcode = Bytes::from_static(&[0x60, 0xef, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3]);
    let state = funded_state(vec![sender_with_balance(10_000_000)]);
    let mut vm = VM::new(
        TxKind::Create,
        env(Fork::Cancun, 200_000),
        U256::zero(),
        initcode,
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(matches!(
        report.result,
        TxResult::Revert(VMError::InvalidContractPrefix)
    ));
    assert_eq!(report.created_address, None);
    // The whole gas limit burns on an invalid deployment.
    assert_eq!(report.gas_used, 200_000);
}

#[test]
fn create_collision_burns_all_gas() {
    let occupied = VM::calculate_create_address(SENDER, 0).unwrap();
    let state = funded_state(vec![
        sender_with_balance(10_000_000),
        (occupied, Account::default().with_nonce(7)),
    ]);
    let mut vm = VM::new(
        TxKind::Create,
        env(Fork::Cancun, 100_000),
        U256::zero(),
        Bytes::from_static(&[0x00]),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(matches!(
        report.result,
        TxResult::Revert(VMError::CreateCollision)
    ));
    assert_eq!(report.gas_used, 100_000);
}

#[test]
fn intrinsic_gas_for_calldata_and_access_list() {
    // Spec'd example: data 0x010200 with one access-list entry of one key.
    let state = funded_state(vec![sender_with_balance(10_000_000)]);
    let gas_limit = 21_000 + 2 * 16 + 4 + 2400 + 1900;
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, gas_limit),
        U256::zero(),
        Bytes::from_static(&[0x01, 0x02, 0x00]),
        state,
        vec![(RECEIVER, vec![H256::zero()])],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    assert_eq!(report.gas_used, gas_limit);

    // One unit less fails intrinsic-gas validation.
    let state = funded_state(vec![sender_with_balance(10_000_000)]);
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, gas_limit - 1),
        U256::zero(),
        Bytes::from_static(&[0x01, 0x02, 0x00]),
        state,
        vec![(RECEIVER, vec![H256::zero()])],
    );
    assert!(matches!(
        vm.transact(),
        Err(VMError::TxValidation(TxValidationError::IntrinsicGasTooLow))
    ));
}

#[test]
fn duplicate_access_list_entries_are_charged_each() {
    let state = funded_state(vec![sender_with_balance(10_000_000)]);
    let gas_limit = 21_000 + 2 * (2400 + 1900);
    let duplicated = vec![
        (RECEIVER, vec![H256::zero()]),
        (RECEIVER, vec![H256::zero()]),
    ];
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, gas_limit),
        U256::zero(),
        Bytes::new(),
        state,
        duplicated,
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    assert_eq!(report.gas_used, gas_limit);
}

#[test]
fn sstore_refund_is_capped_post_london() {
    // Store a value into a slot that currently holds one: clearing it earns
    // the EIP-3529 refund, capped to gas_used / 5.
    // Code: PUSH1 0, PUSH1 0, SSTORE (clears slot 0).
    let contract = Address::repeat_byte(0xd1);
    let mut storage = HashMap::new();
    storage.insert(
        H256::zero(),
        ethrun_vm::StorageSlot {
            original_value: U256::from(9),
            current_value: U256::from(9),
        },
    );
    let state = funded_state(vec![
        sender_with_balance(100_000_000),
        (
            contract,
            Account::default()
                .with_bytecode(Bytes::from_static(&[0x60, 0x00, 0x60, 0x00, 0x55, 0x00]))
                .with_storage(storage),
        ),
    ]);
    let mut vm = VM::new(
        TxKind::Call(contract),
        env(Fork::Cancun, 100_000),
        U256::zero(),
        Bytes::new(),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    let gas_before_refund = report.gas_used + report.gas_refunded;
    assert_eq!(report.gas_refunded, (gas_before_refund / 5).min(4800));

    let mut state = vm.into_state();
    assert_eq!(
        state
            .get_storage_slot(contract, H256::zero())
            .current_value,
        U256::zero()
    );
}

#[test]
fn reverted_transaction_keeps_nonce_and_charges_gas() {
    let contract = Address::repeat_byte(0xd2);
    // Unconditional revert with no data.
    let state = funded_state(vec![
        sender_with_balance(1_000_000),
        (
            contract,
            Account::default().with_bytecode(Bytes::from_static(&[0x60, 0x00, 0x60, 0x00, 0xfd])),
        ),
    ]);
    let mut vm = VM::new(
        TxKind::Call(contract),
        env(Fork::Cancun, 50_000),
        U256::from(300),
        Bytes::new(),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(!report.is_success());

    let mut state = vm.into_state();
    // Value transfer rolled back, nonce kept, gas paid.
    assert_eq!(state.get_account_info(contract).balance, U256::zero());
    assert_eq!(state.get_account_info(SENDER).nonce, 1);
    assert!(state.get_account_info(SENDER).balance < U256::from(1_000_000));
}

#[test]
fn inner_call_failure_is_contained() {
    // Callee: INVALID. Caller: CALL the callee, then return the call's
    // status word from memory.
    let callee = Address::repeat_byte(0xd3);
    // PUSH1 0 (retSize) PUSH1 0 (retOffset) PUSH1 0 (argsSize) PUSH1 0
    // (argsOffset) PUSH1 0 (value) PUSH20 callee PUSH2 0xffff (gas) CALL
    // PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
    let mut caller_code = vec![0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x73];
    caller_code.extend_from_slice(callee.as_bytes());
    caller_code.extend_from_slice(&[0x61, 0xff, 0xff, 0xf1, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3]);

    let caller = Address::repeat_byte(0xd4);
    let state = funded_state(vec![
        sender_with_balance(10_000_000),
        (
            caller,
            Account::default().with_bytecode(Bytes::from(caller_code)),
        ),
        (
            callee,
            Account::default().with_bytecode(Bytes::from_static(&[0xfe])),
        ),
    ]);
    let mut vm = VM::new(
        TxKind::Call(caller),
        env(Fork::Cancun, 200_000),
        U256::zero(),
        Bytes::new(),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    // The CALL pushed 0 (failure) but the outer frame completed.
    assert_eq!(U256::from_big_endian(&report.output), U256::zero());
}

#[test]
fn transient_storage_is_per_transaction() {
    // TSTORE slot 1 := 42 then TLOAD it back and return it.
    let contract = Address::repeat_byte(0xd5);
    let code = Bytes::from_static(&[
        0x60, 0x2a, 0x60, 0x01, 0x5d, // TSTORE(1, 42)
        0x60, 0x01, 0x5c, // TLOAD(1)
        0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3,
    ]);
    let state = funded_state(vec![
        sender_with_balance(10_000_000),
        (contract, Account::default().with_bytecode(code)),
    ]);
    let mut vm = VM::new(
        TxKind::Call(contract),
        env(Fork::Cancun, 200_000),
        U256::zero(),
        Bytes::new(),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    assert_eq!(U256::from_big_endian(&report.output), U256::from(42));
}

#[test]
fn selfdestruct_of_preexisting_contract_only_transfers_post_cancun() {
    // EIP-6780: a contract not created in this tx survives SELFDESTRUCT.
    let contract = Address::repeat_byte(0xd6);
    let beneficiary = Address::repeat_byte(0xd7);
    let mut code = vec![0x73];
    code.extend_from_slice(beneficiary.as_bytes());
    code.push(0xff); // SELFDESTRUCT
    let state = funded_state(vec![
        sender_with_balance(10_000_000),
        (
            contract,
            Account::default()
                .with_bytecode(Bytes::from(code))
                .with_balance(U256::from(5000)),
        ),
    ]);
    let mut vm = VM::new(
        TxKind::Call(contract),
        env(Fork::Cancun, 100_000),
        U256::zero(),
        Bytes::new(),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());
    assert!(report.selfdestructed.is_empty());

    let mut state = vm.into_state();
    assert_eq!(
        state.get_account_info(beneficiary).balance,
        U256::from(5000)
    );
    // The contract code survives (only the balance moved).
    assert!(state.get_account_info(contract).has_code());
}

#[test]
fn gas_conservation_holds_for_successful_calls() {
    let state = funded_state(vec![sender_with_balance(10_000_000)]);
    let gas_limit = 40_000;
    let mut vm = VM::new(
        TxKind::Call(RECEIVER),
        env(Fork::Cancun, gas_limit),
        U256::zero(),
        Bytes::from_static(&[0xff, 0x00, 0xff]),
        state,
        vec![],
    );
    let report = vm.transact().unwrap();
    assert!(report.is_success());

    // gas used (after refund) + gas returned to the sender == limit.
    let mut state = vm.into_state();
    let sender_balance = state.get_account_info(SENDER).balance;
    let spent = U256::from(10_000_000) - sender_balance;
    assert_eq!(spent, U256::from(report.gas_used));
}

use std::collections::HashMap;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use ethrun_core::types::{calculate_base_fee_per_blob_gas, Fork, TxKind};
use ethrun_rlp::encode::RLPEncode;
use keccak_hash::keccak;

use crate::account::Account;
use crate::call_frame::CallFrame;
use crate::constants::{
    CALL_DEPTH_LIMIT, CODE_DEPOSIT_COST, CREATE_BASE_COST, EOF_PREFIX, GAS_PER_BLOB,
    INIT_CODE_WORD_COST, MAX_BLOB_COUNT, TX_BASE_COST, TX_DATA_ZERO_COST, WORD_SIZE,
};
use crate::environment::Environment;
use crate::eof;
use crate::errors::{
    ExecutionReport, InternalError, OpcodeSuccess, OutOfGasError, TxResult, TxValidationError,
    VMError,
};
use crate::gas_cost::{
    self, ACCESS_LIST_ADDRESS_COST, ACCESS_LIST_STORAGE_KEY_COST, CALL_STIPEND,
};
use crate::journal::JournaledState;
use crate::opcodes::{Opcode, OpcodeTable};
use crate::precompiles::PrecompileSet;
use crate::transient::TransientStorage;

pub type AccessList = Vec<(Address, Vec<H256>)>;

pub fn address_to_word(address: Address) -> U256 {
    let mut word = [0u8; WORD_SIZE];
    word[12..].copy_from_slice(address.as_bytes());
    U256::from_big_endian(&word)
}

pub fn word_to_address(word: U256) -> Address {
    let mut bytes = [0u8; WORD_SIZE];
    word.to_big_endian(&mut bytes);
    Address::from_slice(&bytes[12..])
}

/// The EVM: executes one message (transaction or raw code) against a
/// journaled state it owns for the duration of the run.
pub struct VM {
    pub env: Environment,
    pub state: JournaledState,
    pub transient: TransientStorage,
    pub tx_kind: TxKind,
    pub tx_value: U256,
    pub tx_calldata: Bytes,
    pub access_list: AccessList,
    pub opcode_table: OpcodeTable,
    pub precompiles: PrecompileSet,
}

impl VM {
    pub fn new(
        to: TxKind,
        env: Environment,
        value: U256,
        calldata: Bytes,
        state: JournaledState,
        access_list: AccessList,
    ) -> Self {
        let opcode_table = OpcodeTable::new(&env.config);
        let precompiles = PrecompileSet::new(&env.config);
        Self {
            env,
            state,
            transient: TransientStorage::new(),
            tx_kind: to,
            tx_value: value,
            tx_calldata: calldata,
            access_list,
            opcode_table,
            precompiles,
        }
    }

    /// Hands the state back once the VM is done with it.
    pub fn into_state(self) -> JournaledState {
        self.state
    }

    fn is_create(&self) -> bool {
        matches!(self.tx_kind, TxKind::Create)
    }

    // ===== gas plumbing =====

    /// Charges gas against the frame, failing when the frame limit is hit.
    pub fn increase_consumed_gas(
        &mut self,
        current_call_frame: &mut CallFrame,
        gas: u64,
    ) -> Result<(), VMError> {
        let next = current_call_frame
            .gas_used
            .checked_add(gas)
            .ok_or(OutOfGasError::ConsumedGasOverflow)?;
        if next > current_call_frame.gas_limit {
            return Err(VMError::OutOfGas(OutOfGasError::MaxGasLimitExceeded));
        }
        current_call_frame.gas_used = next;
        Ok(())
    }

    // ===== warm/cold access =====

    /// Reads an account and marks it warm; the flag reports whether it was
    /// cold before (EIP-2929 pricing input).
    pub fn access_account(&mut self, address: Address) -> (crate::account::AccountInfo, bool) {
        let was_cold = self.state.warm_address(address);
        (self.state.get_account_info(address), was_cold)
    }

    /// Reads a storage slot and marks it warm.
    pub fn access_storage_slot(
        &mut self,
        address: Address,
        key: H256,
    ) -> (crate::account::StorageSlot, bool) {
        let was_cold = self.state.warm_slot(address, key);
        (self.state.get_storage_slot(address, key), was_cold)
    }

    // ===== create addresses =====

    /// `keccak256(rlp([sender, nonce]))[12..]`
    pub fn calculate_create_address(
        sender_address: Address,
        sender_nonce: u64,
    ) -> Result<Address, VMError> {
        let mut encoded = Vec::new();
        (sender_address, sender_nonce).encode(&mut encoded);
        let digest = keccak(encoded);
        Ok(Address::from_slice(digest.as_bytes().get(12..).ok_or(
            VMError::Internal(InternalError::CouldNotComputeCreateAddress),
        )?))
    }

    /// `keccak256(0xff || sender || salt || keccak256(init_code))[12..]`
    pub fn calculate_create2_address(
        sender_address: Address,
        init_code: &Bytes,
        salt: U256,
    ) -> Result<Address, VMError> {
        let init_code_hash = keccak(init_code);
        let mut salt_bytes = [0u8; 32];
        salt.to_big_endian(&mut salt_bytes);

        let digest = keccak(
            [
                [0xffu8].as_slice(),
                sender_address.as_bytes(),
                &salt_bytes,
                init_code_hash.as_bytes(),
            ]
            .concat(),
        );
        Ok(Address::from_slice(digest.as_bytes().get(12..).ok_or(
            VMError::Internal(InternalError::CouldNotComputeCreateAddress),
        )?))
    }

    // ===== interpreter =====

    /// Runs one call frame to completion. Precompile targets short-circuit.
    /// Only internal errors propagate as `Err`; contract-level failures come
    /// back as a `Revert` report.
    pub fn execute(&mut self, current_call_frame: &mut CallFrame) -> Result<ExecutionReport, VMError> {
        if self.precompiles.is_precompile(current_call_frame.code_address) {
            return self.execute_precompile_frame(current_call_frame);
        }

        loop {
            let opcode = current_call_frame.current_opcode();
            let op_result = match self.opcode_table.get(opcode) {
                Some(handler) => handler(self, current_call_frame),
                None => Err(VMError::InvalidOpcode),
            };

            // Jump handlers position the pc themselves.
            if opcode != Opcode::JUMP as u8 && opcode != Opcode::JUMPI as u8 {
                current_call_frame.increment_pc_by(1)?;
            }

            match op_result {
                Ok(OpcodeSuccess::Continue) => {}
                Ok(OpcodeSuccess::Result(_)) => {
                    return Ok(self.frame_report(current_call_frame, TxResult::Success));
                }
                Err(error) if error.is_internal() => return Err(error),
                Err(error) => {
                    if error.should_consume_all_gas() {
                        current_call_frame.gas_used = current_call_frame.gas_limit;
                        current_call_frame.output = Bytes::new();
                    }
                    return Ok(self.frame_report(current_call_frame, TxResult::Revert(error)));
                }
            }
        }
    }

    fn frame_report(&self, frame: &CallFrame, result: TxResult) -> ExecutionReport {
        ExecutionReport {
            result,
            gas_used: frame.gas_used,
            gas_refunded: 0,
            output: frame.output.clone(),
            logs: Vec::new(),
            created_address: None,
            selfdestructed: Default::default(),
            created_accounts: Default::default(),
        }
    }

    fn execute_precompile_frame(
        &mut self,
        current_call_frame: &mut CallFrame,
    ) -> Result<ExecutionReport, VMError> {
        let result = self.precompiles.execute(
            current_call_frame.code_address,
            &current_call_frame.calldata,
            current_call_frame.gas_limit,
            &mut current_call_frame.gas_used,
            &self.env,
        );
        match result {
            Ok(output) => {
                current_call_frame.output = output;
                Ok(self.frame_report(current_call_frame, TxResult::Success))
            }
            Err(error) if error.is_internal() => Err(error),
            Err(error) => {
                // Failed precompile calls consume the full gas allowance.
                current_call_frame.gas_used = current_call_frame.gas_limit;
                current_call_frame.output = Bytes::new();
                Ok(self.frame_report(current_call_frame, TxResult::Revert(error)))
            }
        }
    }

    // ===== message calls =====

    /// Memory growth charged by the CALL family: the larger of the argument
    /// and return regions.
    pub fn call_memory_expansion(
        &self,
        current_call_frame: &mut CallFrame,
        args_offset: usize,
        args_size: usize,
        return_offset: usize,
        return_size: usize,
    ) -> Result<u64, VMError> {
        let args_expansion = current_call_frame.memory.access_cost(args_offset, args_size)?;
        let return_expansion = current_call_frame
            .memory
            .access_cost(return_offset, return_size)?;
        Ok(args_expansion.max(return_expansion))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generic_call(
        &mut self,
        current_call_frame: &mut CallFrame,
        gas_requested: U256,
        value: U256,
        msg_sender: Address,
        to: Address,
        code_address: Address,
        is_static: bool,
        args_offset: usize,
        args_size: usize,
        return_offset: usize,
        return_size: usize,
    ) -> Result<OpcodeSuccess, VMError> {
        self.message_call(
            current_call_frame,
            gas_requested,
            value,
            msg_sender,
            to,
            code_address,
            is_static,
            true,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )
    }

    /// DELEGATECALL: the value is visible to the callee but never moves.
    #[allow(clippy::too_many_arguments)]
    pub fn generic_call_no_transfer(
        &mut self,
        current_call_frame: &mut CallFrame,
        gas_requested: U256,
        value: U256,
        msg_sender: Address,
        to: Address,
        code_address: Address,
        is_static: bool,
        args_offset: usize,
        args_size: usize,
        return_offset: usize,
        return_size: usize,
    ) -> Result<OpcodeSuccess, VMError> {
        self.message_call(
            current_call_frame,
            gas_requested,
            value,
            msg_sender,
            to,
            code_address,
            is_static,
            false,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn message_call(
        &mut self,
        current_call_frame: &mut CallFrame,
        gas_requested: U256,
        value: U256,
        msg_sender: Address,
        to: Address,
        code_address: Address,
        is_static: bool,
        should_transfer: bool,
        args_offset: usize,
        args_size: usize,
        return_offset: usize,
        return_size: usize,
    ) -> Result<OpcodeSuccess, VMError> {
        current_call_frame.sub_return_data = Bytes::new();

        if current_call_frame.depth + 1 > CALL_DEPTH_LIMIT {
            current_call_frame.stack.push(U256::zero())?;
            return Ok(OpcodeSuccess::Continue);
        }

        let transfers_value = should_transfer && !value.is_zero();
        if transfers_value && self.state.get_account_info(msg_sender).balance < value {
            current_call_frame.stack.push(U256::zero())?;
            return Ok(OpcodeSuccess::Continue);
        }

        // EIP-150: forward at most 63/64 of what remains.
        let max_forward = gas_cost::max_message_call_gas(current_call_frame.gas_remaining());
        let requested = if gas_requested > U256::from(u64::MAX) {
            u64::MAX
        } else {
            gas_requested.low_u64()
        };
        let forwarded = requested.min(max_forward);
        self.increase_consumed_gas(current_call_frame, forwarded)?;

        let stipend = if transfers_value { CALL_STIPEND } else { 0 };
        let callee_gas_limit = forwarded
            .checked_add(stipend)
            .ok_or(OutOfGasError::GasCostOverflow)?;

        let calldata = current_call_frame.memory.load_range(args_offset, args_size)?;
        let bytecode = self.state.get_account_info(code_address).bytecode;

        self.state.checkpoint();
        self.transient.checkpoint();

        if transfers_value {
            self.state.decrease_balance(msg_sender, value)?;
            self.state.increase_balance(to, value)?;
        }

        let mut child = CallFrame::new(
            msg_sender,
            to,
            code_address,
            bytecode,
            value,
            Bytes::from(calldata),
            is_static,
            callee_gas_limit,
            current_call_frame.depth + 1,
            false,
        );

        let report = self.execute(&mut child)?;

        // Unused forwarded gas flows back; the stipend is not the caller's.
        let spent_of_forwarded = child.gas_used.saturating_sub(stipend).min(forwarded);
        current_call_frame.gas_used = current_call_frame
            .gas_used
            .saturating_sub(forwarded - spent_of_forwarded);

        match report.result {
            TxResult::Success => {
                self.state.commit()?;
                self.transient.commit()?;
                current_call_frame.sub_return_data = report.output.clone();
                self.write_return_data(current_call_frame, &report.output, return_offset, return_size)?;
                current_call_frame.stack.push(U256::one())?;
            }
            TxResult::Revert(_) => {
                self.state.revert()?;
                self.transient.revert()?;
                current_call_frame.sub_return_data = report.output.clone();
                self.write_return_data(current_call_frame, &report.output, return_offset, return_size)?;
                current_call_frame.stack.push(U256::zero())?;
            }
        }
        Ok(OpcodeSuccess::Continue)
    }

    fn write_return_data(
        &mut self,
        frame: &mut CallFrame,
        data: &Bytes,
        offset: usize,
        size: usize,
    ) -> Result<(), VMError> {
        let count = size.min(data.len());
        if count > 0 {
            frame.memory.store_bytes(offset, &data[..count])?;
        }
        Ok(())
    }

    // ===== contract creation =====

    pub fn generic_create(
        &mut self,
        current_call_frame: &mut CallFrame,
        value: U256,
        code_offset: usize,
        code_size: usize,
        salt: Option<U256>,
    ) -> Result<OpcodeSuccess, VMError> {
        if current_call_frame.is_static {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        let memory_expansion = current_call_frame.memory.access_cost(code_offset, code_size)?;
        let gas = gas_cost::create(
            &self.env.config,
            memory_expansion,
            code_size,
            salt.is_some(),
        )?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        // EIP-3860 hard cap; the per-word charge above applies regardless.
        if self.env.config.is_activated(3860)
            && !self.env.config.allow_unlimited_initcode
            && code_size > self.env.config.max_initcode_size
        {
            return Err(VMError::InitcodeSizeExceeded);
        }

        current_call_frame.sub_return_data = Bytes::new();

        if current_call_frame.depth + 1 > CALL_DEPTH_LIMIT {
            current_call_frame.stack.push(U256::zero())?;
            return Ok(OpcodeSuccess::Continue);
        }

        let creator = current_call_frame.to;
        let creator_info = self.state.get_account_info(creator);
        if creator_info.balance < value || creator_info.nonce == u64::MAX {
            current_call_frame.stack.push(U256::zero())?;
            return Ok(OpcodeSuccess::Continue);
        }

        let init_code = Bytes::from(current_call_frame.memory.load_range(code_offset, code_size)?);
        let new_address = match salt {
            Some(salt) => Self::calculate_create2_address(creator, &init_code, salt)?,
            None => Self::calculate_create_address(creator, creator_info.nonce)?,
        };

        self.state.increment_nonce(creator)?;
        self.state.warm_address(new_address);

        let forwarded = gas_cost::max_message_call_gas(current_call_frame.gas_remaining());
        self.increase_consumed_gas(current_call_frame, forwarded)?;

        // Address collision: the forwarded gas stays consumed.
        let target = self.state.get_account_info(new_address);
        if target.nonce > 0 || target.has_code() {
            current_call_frame.stack.push(U256::zero())?;
            return Ok(OpcodeSuccess::Continue);
        }

        self.state.checkpoint();
        self.transient.checkpoint();

        let created_address =
            self.setup_created_account(new_address, creator, value, target.balance)?;

        let mut child = CallFrame::new(
            creator,
            created_address,
            created_address,
            init_code,
            value,
            Bytes::new(),
            false,
            forwarded,
            current_call_frame.depth + 1,
            true,
        );

        let report = self.execute(&mut child)?;

        let finalize_result = if report.is_success() {
            self.finalize_create(&mut child, created_address)
        } else {
            Ok(())
        };

        let success = report.is_success() && finalize_result.is_ok();
        if !success {
            if let Err(error) = &finalize_result {
                if error.should_consume_all_gas() {
                    child.gas_used = child.gas_limit;
                    child.output = Bytes::new();
                }
            }
        }

        let give_back = forwarded.saturating_sub(child.gas_used.min(forwarded));
        current_call_frame.gas_used = current_call_frame.gas_used.saturating_sub(give_back);

        if success {
            self.state.commit()?;
            self.transient.commit()?;
            current_call_frame.stack.push(address_to_word(created_address))?;
        } else {
            self.state.revert()?;
            self.transient.revert()?;
            // Only an explicit REVERT surfaces return data from the initcode.
            if matches!(report.result, TxResult::Revert(VMError::RevertOpcode)) {
                current_call_frame.sub_return_data = child.output.clone();
            }
            current_call_frame.stack.push(U256::zero())?;
        }
        Ok(OpcodeSuccess::Continue)
    }

    /// Clears the target account (fresh storage, EIP-161 starting nonce),
    /// keeps any pre-existing balance and moves the endowment.
    fn setup_created_account(
        &mut self,
        new_address: Address,
        creator: Address,
        value: U256,
        preserved_balance: U256,
    ) -> Result<Address, VMError> {
        self.state.mark_created(new_address);
        let starting_nonce = if self.env.config.gte(Fork::SpuriousDragon) {
            1
        } else {
            0
        };
        self.state.put_account(
            new_address,
            Account::new(preserved_balance, Bytes::new(), starting_nonce, HashMap::new()),
        );
        if !value.is_zero() {
            self.state.decrease_balance(creator, value)?;
            self.state.increase_balance(new_address, value)?;
        }
        Ok(new_address)
    }

    /// Deployed-code checks and the code-deposit charge.
    ///
    /// On Frontier an unaffordable deposit is dismissed: the contract simply
    /// ends up without code and accumulated refunds survive. Homestead
    /// onward it fails the create.
    fn finalize_create(
        &mut self,
        child_frame: &mut CallFrame,
        created_address: Address,
    ) -> Result<(), VMError> {
        let code = child_frame.output.clone();

        if code.first() == Some(&EOF_PREFIX) {
            if self.env.config.is_activated(3540) {
                eof::validate_eof(&code, &self.env.config)?;
            } else if self.env.config.is_activated(3541) {
                return Err(VMError::InvalidContractPrefix);
            }
        }

        if self.env.config.gte(Fork::SpuriousDragon) && code.len() > self.env.config.max_code_size {
            return Err(VMError::ContractOutputTooBig);
        }

        let deposit = CODE_DEPOSIT_COST
            .checked_mul(code.len() as u64)
            .ok_or(OutOfGasError::GasCostOverflow)?;
        if self.increase_consumed_gas(child_frame, deposit).is_err() {
            if self.env.config.fork == Fork::Frontier {
                return Ok(());
            }
            return Err(VMError::CodeStoreOutOfGas);
        }

        self.state.set_code(created_address, code)?;
        Ok(())
    }

    // ===== transaction pipeline =====

    /// Pre-execution validation and bookkeeping: fee checks, intrinsic gas,
    /// upfront cost, nonce bump, warm-set seeding.
    fn prepare_execution(&mut self, initial_call_frame: &mut CallFrame) -> Result<(), VMError> {
        let sender = self.env.origin;
        let sender_info = self.state.get_account_info(sender);

        // (1) GASLIMIT_PRICE_PRODUCT_OVERFLOW
        let gaslimit_price_product = self
            .env
            .gas_price
            .checked_mul(self.env.gas_limit.into())
            .ok_or(VMError::TxValidation(
                TxValidationError::GasLimitPriceProductOverflow,
            ))?;

        let value = self.tx_value;
        let blob_fee_cap_cost = self.max_blob_gas_cost()?;

        // (2) INSUFFICIENT_ACCOUNT_FUNDS: the sender must afford the fee cap.
        let fee_cap = self
            .env
            .tx_max_fee_per_gas
            .unwrap_or(self.env.gas_price)
            .checked_mul(self.env.gas_limit.into())
            .ok_or(VMError::TxValidation(
                TxValidationError::GasLimitPriceProductOverflow,
            ))?;
        let required_balance = fee_cap
            .checked_add(value)
            .and_then(|sum| sum.checked_add(blob_fee_cap_cost))
            .ok_or(VMError::TxValidation(
                TxValidationError::InsufficientAccountFunds,
            ))?;
        if sender_info.balance < required_balance {
            return Err(VMError::TxValidation(
                TxValidationError::InsufficientAccountFunds,
            ));
        }

        // (3) INSUFFICIENT_MAX_FEE_PER_GAS
        if self.env.tx_max_fee_per_gas.unwrap_or(self.env.gas_price) < self.env.base_fee_per_gas {
            return Err(VMError::TxValidation(
                TxValidationError::InsufficientMaxFeePerGas,
            ));
        }

        // (4) PRIORITY_GREATER_THAN_MAX_FEE_PER_GAS
        if let (Some(priority_fee), Some(max_fee)) = (
            self.env.tx_max_priority_fee_per_gas,
            self.env.tx_max_fee_per_gas,
        ) {
            if priority_fee > max_fee {
                return Err(VMError::TxValidation(
                    TxValidationError::PriorityGreaterThanMaxFeePerGas,
                ));
            }
        }

        // (5) SENDER_NOT_EOA (EIP-3607)
        if self.env.config.is_activated(3607) && sender_info.has_code() {
            return Err(VMError::TxValidation(TxValidationError::SenderNotEoa));
        }

        // (6) GAS_ALLOWANCE_EXCEEDED
        if self.env.gas_limit > self.env.block_gas_limit {
            return Err(VMError::TxValidation(
                TxValidationError::GasAllowanceExceeded,
            ));
        }

        // (7) NONCE checks
        if sender_info.nonce == u64::MAX {
            return Err(VMError::TxValidation(TxValidationError::NonceIsMax));
        }
        if self.env.tx_nonce != sender_info.nonce {
            return Err(VMError::TxValidation(TxValidationError::NonceMismatch {
                expected: sender_info.nonce,
                got: self.env.tx_nonce,
            }));
        }

        // (8) INITCODE_SIZE_EXCEEDED; gas for the initcode words is still
        // charged through the intrinsic cost below.
        if self.is_create()
            && self.env.config.is_activated(3860)
            && !self.env.config.allow_unlimited_initcode
            && self.tx_calldata.len() > self.env.config.max_initcode_size
        {
            return Err(VMError::TxValidation(
                TxValidationError::InitcodeSizeExceeded,
            ));
        }

        // (9) Blob-transaction rules (EIP-4844).
        if self.env.tx_max_fee_per_blob_gas.is_some() {
            self.validate_blob_tx()?;
        }

        // (10) INTRINSIC_GAS_TOO_LOW
        self.add_intrinsic_gas(initial_call_frame)?;

        // Charge the gas fee and the blob fee upfront, move the nonce.
        let blob_fee = self.blob_base_fee_cost()?;
        let upfront = gaslimit_price_product
            .checked_add(blob_fee)
            .ok_or(VMError::TxValidation(
                TxValidationError::InsufficientAccountFunds,
            ))?;
        self.state
            .decrease_balance(sender, upfront)
            .map_err(|_| VMError::TxValidation(TxValidationError::InsufficientAccountFunds))?;
        self.state.increment_nonce(sender)?;

        // Warm-set seeding: precompiles, origin, target, coinbase
        // (EIP-3651), access list. Duplicate access-list entries collapse
        // here; they were each charged in the intrinsic cost.
        for address in self.precompiles.addresses() {
            self.state.warm_address(address);
        }
        self.state.warm_address(sender);
        if let TxKind::Call(to) = self.tx_kind {
            self.state.warm_address(to);
        }
        if self.env.config.is_activated(3651) {
            self.state.warm_address(self.env.coinbase);
        }
        let access_list = self.access_list.clone();
        for (address, keys) in access_list {
            self.state.warm_address(address);
            for key in keys {
                self.state.warm_slot(address, key);
            }
        }

        Ok(())
    }

    fn validate_blob_tx(&mut self) -> Result<(), VMError> {
        let blob_hashes = &self.env.tx_blob_hashes;
        if blob_hashes.is_empty() {
            return Err(VMError::TxValidation(TxValidationError::Type3TxZeroBlobs));
        }
        if blob_hashes.len() > MAX_BLOB_COUNT {
            return Err(VMError::TxValidation(
                TxValidationError::Type3TxBlobCountExceeded,
            ));
        }
        let version = self.env.config.blob_hash_version;
        for hash in blob_hashes {
            if hash.as_bytes().first() != Some(&version) {
                return Err(VMError::TxValidation(
                    TxValidationError::Type3TxInvalidBlobVersionedHash,
                ));
            }
        }
        if self.is_create() {
            return Err(VMError::TxValidation(
                TxValidationError::Type3TxContractCreation,
            ));
        }
        if let Some(blob_fee_cap) = self.env.tx_max_fee_per_blob_gas {
            if blob_fee_cap < self.blob_base_fee()? {
                return Err(VMError::TxValidation(
                    TxValidationError::InsufficientMaxFeePerBlobGas,
                ));
            }
        }
        Ok(())
    }

    fn blob_gas_used(&self) -> u64 {
        self.env.tx_blob_hashes.len() as u64 * GAS_PER_BLOB
    }

    /// What the sender must be able to pay: the blob fee cap.
    fn max_blob_gas_cost(&self) -> Result<U256, VMError> {
        Ok(self
            .env
            .tx_max_fee_per_blob_gas
            .unwrap_or_default()
            .checked_mul(self.blob_gas_used().into())
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?)
    }

    pub fn blob_base_fee(&self) -> Result<U256, VMError> {
        let excess = self
            .env
            .block_excess_blob_gas
            .unwrap_or_default()
            .low_u64();
        Ok(U256::from(calculate_base_fee_per_blob_gas(excess)))
    }

    /// What is actually burned: blob gas at the block's blob base fee.
    fn blob_base_fee_cost(&self) -> Result<U256, VMError> {
        if self.env.tx_max_fee_per_blob_gas.is_none() {
            return Ok(U256::zero());
        }
        self.blob_base_fee()?
            .checked_mul(self.blob_gas_used().into())
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))
    }

    /// Intrinsic gas per the Yellow Paper §6.2 plus the EIP-2930/3860 terms.
    /// Duplicate access-list entries are charged per occurrence.
    fn add_intrinsic_gas(&mut self, initial_call_frame: &mut CallFrame) -> Result<(), VMError> {
        let mut intrinsic: u64 = TX_BASE_COST;

        let data = if self.is_create() {
            &self.tx_calldata
        } else {
            &initial_call_frame.calldata
        };
        let non_zero_bytes = data.iter().filter(|&&byte| byte != 0).count() as u64;
        let zero_bytes = data.len() as u64 - non_zero_bytes;
        intrinsic = intrinsic
            .checked_add(non_zero_bytes * self.env.config.tx_data_non_zero_cost)
            .and_then(|gas| gas.checked_add(zero_bytes * TX_DATA_ZERO_COST))
            .ok_or(OutOfGasError::ConsumedGasOverflow)?;

        if self.is_create() {
            intrinsic = intrinsic
                .checked_add(CREATE_BASE_COST)
                .ok_or(OutOfGasError::ConsumedGasOverflow)?;
            if self.env.config.is_activated(3860) {
                let words = (data.len() as u64 + WORD_SIZE as u64 - 1) / WORD_SIZE as u64;
                intrinsic = intrinsic
                    .checked_add(words * INIT_CODE_WORD_COST)
                    .ok_or(OutOfGasError::ConsumedGasOverflow)?;
            }
        }

        for (_, keys) in &self.access_list {
            intrinsic = intrinsic
                .checked_add(ACCESS_LIST_ADDRESS_COST)
                .and_then(|gas| {
                    gas.checked_add(ACCESS_LIST_STORAGE_KEY_COST * keys.len() as u64)
                })
                .ok_or(OutOfGasError::ConsumedGasOverflow)?;
        }

        self.increase_consumed_gas(initial_call_frame, intrinsic)
            .map_err(|_| VMError::TxValidation(TxValidationError::IntrinsicGasTooLow))?;
        Ok(())
    }

    /// Runs the whole transaction: validation, execution, refunds, fee
    /// payout and the selfdestruct sweep.
    pub fn transact(&mut self) -> Result<ExecutionReport, VMError> {
        let sender = self.env.origin;
        let sender_nonce = self.state.get_account_info(sender).nonce;

        let (to, created_address) = match self.tx_kind {
            TxKind::Call(to) => (to, None),
            TxKind::Create => {
                let address = Self::calculate_create_address(sender, sender_nonce)?;
                (address, Some(address))
            }
        };

        let bytecode = if self.is_create() {
            // The payload is the initcode.
            self.tx_calldata.clone()
        } else {
            self.state.get_account_info(to).bytecode
        };
        let calldata = if self.is_create() {
            Bytes::new()
        } else {
            self.tx_calldata.clone()
        };

        let mut initial_call_frame = CallFrame::new(
            sender,
            to,
            to,
            bytecode,
            self.tx_value,
            calldata,
            false,
            self.env.gas_limit,
            0,
            false,
        );

        self.prepare_execution(&mut initial_call_frame)?;

        // Collision check for create transactions: a failed create still
        // burns the whole gas limit.
        if let Some(address) = created_address {
            let target = self.state.get_account_info(address);
            if target.nonce > 0 || target.has_code() {
                initial_call_frame.gas_used = initial_call_frame.gas_limit;
                let mut report =
                    self.frame_report(&initial_call_frame, TxResult::Revert(VMError::CreateCollision));
                self.post_execution(&initial_call_frame, &mut report)?;
                return Ok(self.seal_report(report, None));
            }
        }

        self.state.checkpoint();
        self.transient.checkpoint();

        if let Some(address) = created_address {
            let preserved_balance = self.state.get_account_info(address).balance;
            self.setup_created_account(address, sender, self.tx_value, preserved_balance)?;
        } else if !self.tx_value.is_zero() {
            self.state.decrease_balance(sender, self.tx_value)?;
            self.state.increase_balance(to, self.tx_value)?;
        }

        let mut report = self.execute(&mut initial_call_frame)?;

        if report.is_success() {
            if let Some(address) = created_address {
                if let Err(error) = self.finalize_create(&mut initial_call_frame, address) {
                    if error.should_consume_all_gas() {
                        initial_call_frame.gas_used = initial_call_frame.gas_limit;
                        initial_call_frame.output = Bytes::new();
                    }
                    report = self.frame_report(&initial_call_frame, TxResult::Revert(error));
                } else {
                    report.gas_used = initial_call_frame.gas_used;
                }
            }
        }

        if report.is_success() {
            self.state.commit()?;
            self.transient.commit()?;
        } else {
            self.state.revert()?;
            self.transient.revert()?;
        }

        self.post_execution(&initial_call_frame, &mut report)?;
        Ok(self.seal_report(report, created_address))
    }

    /// Refund application, unused-gas return, coinbase payout and the
    /// selfdestruct sweep.
    fn post_execution(
        &mut self,
        initial_call_frame: &CallFrame,
        report: &mut ExecutionReport,
    ) -> Result<(), VMError> {
        let sender = initial_call_frame.msg_sender;

        let refund_cap = report.gas_used / self.env.config.refund_quotient;
        let refunded = if report.is_success() {
            self.state.refund().min(refund_cap)
        } else {
            0
        };
        report.gas_refunded = refunded;
        report.gas_used = report
            .gas_used
            .checked_sub(refunded)
            .ok_or(VMError::Internal(InternalError::ArithmeticUnderflow))?;

        // Unused gas flows back to the sender at the effective price.
        let gas_to_return = self
            .env
            .gas_limit
            .checked_sub(report.gas_used)
            .ok_or(VMError::Internal(InternalError::ArithmeticUnderflow))?;
        let wei_to_return = self
            .env
            .gas_price
            .checked_mul(gas_to_return.into())
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        self.state.increase_balance(sender, wei_to_return)?;

        // The coinbase earns the tip; the base fee is burned.
        let priority_fee_per_gas = self
            .env
            .gas_price
            .checked_sub(self.env.base_fee_per_gas)
            .ok_or(VMError::TxValidation(
                TxValidationError::InsufficientMaxFeePerGas,
            ))?;
        let coinbase_fee = priority_fee_per_gas
            .checked_mul(report.gas_used.into())
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        if !coinbase_fee.is_zero() {
            self.state.increase_balance(self.env.coinbase, coinbase_fee)?;
        }

        // Sweep the accounts scheduled for destruction; under EIP-6780 the
        // opcode only marks accounts created in this transaction.
        let doomed: Vec<Address> = self.state.selfdestructs().iter().copied().collect();
        for address in doomed {
            self.state.delete_account(address);
        }

        Ok(())
    }

    fn seal_report(
        &mut self,
        mut report: ExecutionReport,
        created_address: Option<Address>,
    ) -> ExecutionReport {
        self.transient.clear();
        let (logs, selfdestructed, created_accounts) = self.state.finish_transaction();
        report.logs = logs;
        report.selfdestructed = selfdestructed;
        report.created_accounts = created_accounts;
        report.created_address = if report.is_success() {
            created_address
        } else {
            None
        };
        report
    }

    /// Runs raw code without the surrounding transaction machinery (no fee
    /// charging, no nonce bump): message dispatch for tooling and tests.
    pub fn run_code(&mut self, code: Bytes, calldata: Bytes, gas_limit: u64) -> Result<ExecutionReport, VMError> {
        let mut frame = CallFrame::new_from_bytecode(code);
        frame.gas_limit = gas_limit;
        frame.calldata = calldata;
        frame.msg_sender = self.env.origin;

        self.state.checkpoint();
        self.transient.checkpoint();
        let report = self.execute(&mut frame)?;
        if report.is_success() {
            self.state.commit()?;
            self.transient.commit()?;
        } else {
            self.state.revert()?;
            self.transient.revert()?;
        }
        Ok(self.seal_report(report, None))
    }
}

use ethereum_types::{H256, U256};
use ethrun_core::types::{calculate_base_fee_per_blob_gas, Fork};

use crate::call_frame::CallFrame;
use crate::constants::LAST_AVAILABLE_BLOCK_LIMIT;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::vm::{address_to_word, VM};

// Block Information (11)
// Opcodes: BLOCKHASH, COINBASE, TIMESTAMP, NUMBER, PREVRANDAO, GASLIMIT,
//          CHAINID, SELFBALANCE, BASEFEE, BLOBHASH, BLOBBASEFEE

impl VM {
    pub fn op_blockhash(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BLOCKHASH)?;
        let block_number = current_call_frame.stack.pop()?;

        let current_block = self.env.block_number;
        // Only the last 256 ancestors are addressable, never the current
        // block itself.
        let in_range = block_number < current_block
            && block_number + U256::from(LAST_AVAILABLE_BLOCK_LIMIT) >= current_block;
        let hash = if in_range {
            self.state
                .get_block_hash(block_number.low_u64())
                .unwrap_or_default()
        } else {
            H256::zero()
        };
        current_call_frame
            .stack
            .push(U256::from_big_endian(hash.as_bytes()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_coinbase(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(address_to_word(self.env.coinbase))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_timestamp(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame.stack.push(self.env.timestamp)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_number(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame.stack.push(self.env.block_number)?;
        Ok(OpcodeSuccess::Continue)
    }

    /// DIFFICULTY before the merge; the random beacon value after (EIP-4399
    /// re-purposes the same byte).
    pub fn op_prevrandao(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        let value = if self.env.config.gte(Fork::Paris) {
            self.env
                .prev_randao
                .map(|randao| U256::from_big_endian(randao.as_bytes()))
                .unwrap_or_default()
        } else {
            self.env.difficulty
        };
        current_call_frame.stack.push(value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_gaslimit(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(U256::from(self.env.block_gas_limit))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_chainid(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame.stack.push(self.env.chain_id)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_selfbalance(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::SELFBALANCE)?;
        let balance = self
            .state
            .get_account_info(current_call_frame.to)
            .balance;
        current_call_frame.stack.push(balance)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_basefee(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame.stack.push(self.env.base_fee_per_gas)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_blobhash(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BLOBHASH)?;
        let index = current_call_frame.stack.pop()?;
        let hash = if index < U256::from(self.env.tx_blob_hashes.len()) {
            let hash = self.env.tx_blob_hashes[index.low_u64() as usize];
            U256::from_big_endian(hash.as_bytes())
        } else {
            U256::zero()
        };
        current_call_frame.stack.push(hash)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_blobbasefee(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        let excess = self
            .env
            .block_excess_blob_gas
            .unwrap_or_default()
            .low_u64();
        current_call_frame
            .stack
            .push(U256::from(calculate_base_fee_per_blob_gas(excess)))?;
        Ok(OpcodeSuccess::Continue)
    }
}

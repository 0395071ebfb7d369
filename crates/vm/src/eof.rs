//! EOF v1 container validation (EIP-3540) and code validation (EIP-3670),
//! applied to deployed code when the respective EIPs are active.

use crate::constants::{EOF_MAGIC, EOF_VERSION_1};
use crate::environment::EvmConfig;
use crate::errors::EofError;
use crate::opcodes::{Opcode, OpcodeTable};

const SECTION_TERMINATOR: u8 = 0x00;
const SECTION_KIND_CODE: u8 = 0x01;
const SECTION_KIND_DATA: u8 = 0x02;

#[derive(Debug, PartialEq, Eq)]
pub struct EofContainer<'a> {
    pub code: &'a [u8],
    pub data: &'a [u8],
}

/// Parses an EOF v1 container:
/// `0xEF 0x00 0x01 (kind: u8, size: u16be)* 0x00 <sections>` with exactly one
/// code section and at most one data section, in that order.
pub fn parse_eof_v1(container: &[u8]) -> Result<EofContainer<'_>, EofError> {
    if container.len() < 2 || container[..2] != EOF_MAGIC {
        return Err(EofError::InvalidMagic);
    }
    if container.get(2) != Some(&EOF_VERSION_1) {
        return Err(EofError::InvalidVersion);
    }

    let mut cursor = 3usize;
    let mut code_size: Option<usize> = None;
    let mut data_size: Option<usize> = None;

    loop {
        let kind = *container
            .get(cursor)
            .ok_or(EofError::InvalidSectionHeaders)?;
        cursor += 1;
        match kind {
            SECTION_TERMINATOR => break,
            SECTION_KIND_CODE if code_size.is_none() && data_size.is_none() => {
                let size = read_u16(container, cursor)?;
                if size == 0 {
                    return Err(EofError::InvalidSectionHeaders);
                }
                code_size = Some(size);
                cursor += 2;
            }
            SECTION_KIND_DATA if code_size.is_some() && data_size.is_none() => {
                let size = read_u16(container, cursor)?;
                if size == 0 {
                    return Err(EofError::InvalidSectionHeaders);
                }
                data_size = Some(size);
                cursor += 2;
            }
            _ => return Err(EofError::InvalidSectionHeaders),
        }
    }

    let code_size = code_size.ok_or(EofError::InvalidSectionHeaders)?;
    let data_size = data_size.unwrap_or(0);

    let body = container
        .get(cursor..)
        .ok_or(EofError::InvalidContainerSize)?;
    if body.len() != code_size + data_size {
        return Err(EofError::InvalidContainerSize);
    }

    Ok(EofContainer {
        code: &body[..code_size],
        data: &body[code_size..],
    })
}

/// EIP-3670: every instruction in the code section must be defined under the
/// current config, and the section may not end inside a push payload.
pub fn validate_code(code: &[u8], table: &OpcodeTable) -> Result<(), EofError> {
    let mut pc = 0usize;
    while pc < code.len() {
        let opcode = code[pc];
        if !table.is_defined(opcode) {
            return Err(EofError::UndefinedInstruction(opcode));
        }
        if (Opcode::PUSH1 as u8..=Opcode::PUSH32 as u8).contains(&opcode) {
            let push_len = (opcode - Opcode::PUSH1 as u8) as usize + 1;
            pc += push_len;
        }
        pc += 1;
    }
    if pc != code.len() {
        return Err(EofError::TruncatedPush);
    }
    Ok(())
}

/// Full deployed-code check under EIP-3540 + EIP-3670.
pub fn validate_eof(container: &[u8], config: &EvmConfig) -> Result<(), EofError> {
    let parsed = parse_eof_v1(container)?;
    if config.is_activated(3670) {
        validate_code(parsed.code, &OpcodeTable::new(config))?;
    }
    Ok(())
}

fn read_u16(container: &[u8], cursor: usize) -> Result<usize, EofError> {
    let bytes = container
        .get(cursor..cursor + 2)
        .ok_or(EofError::InvalidSectionHeaders)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethrun_core::types::Fork;

    fn container(code: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = vec![0xef, 0x00, 0x01];
        out.extend_from_slice(&[0x01]);
        out.extend_from_slice(&(code.len() as u16).to_be_bytes());
        if !data.is_empty() {
            out.extend_from_slice(&[0x02]);
            out.extend_from_slice(&(data.len() as u16).to_be_bytes());
        }
        out.push(0x00);
        out.extend_from_slice(code);
        out.extend_from_slice(data);
        out
    }

    fn shanghai_config() -> EvmConfig {
        let mut spec = ethrun_core::chain_spec::ChainSpec::custom(1, Fork::Shanghai);
        spec.set_eips(vec![3540, 3670]).unwrap();
        EvmConfig::new(&spec)
    }

    #[test]
    fn valid_container_roundtrip() {
        // PUSH1 0x00 STOP, one data byte.
        let encoded = container(&[0x60, 0x00, 0x00], &[0xaa]);
        let parsed = parse_eof_v1(&encoded).unwrap();
        assert_eq!(parsed.code, &[0x60, 0x00, 0x00]);
        assert_eq!(parsed.data, &[0xaa]);
        assert!(validate_eof(&encoded, &shanghai_config()).is_ok());
    }

    #[test]
    fn bad_magic_and_version() {
        assert_eq!(parse_eof_v1(&[0xef, 0x01, 0x01]), Err(EofError::InvalidMagic));
        assert_eq!(
            parse_eof_v1(&[0xef, 0x00, 0x02]),
            Err(EofError::InvalidVersion)
        );
    }

    #[test]
    fn section_size_mismatch() {
        let mut encoded = container(&[0x00], &[]);
        encoded.push(0xff); // trailing garbage
        assert_eq!(parse_eof_v1(&encoded), Err(EofError::InvalidContainerSize));
    }

    #[test]
    fn undefined_opcode_rejected() {
        // 0x0c is unassigned.
        let encoded = container(&[0x0c], &[]);
        assert_eq!(
            validate_eof(&encoded, &shanghai_config()),
            Err(EofError::UndefinedInstruction(0x0c))
        );
    }

    #[test]
    fn truncated_push_rejected() {
        // PUSH2 with only one payload byte.
        let encoded = container(&[0x61, 0x01], &[]);
        assert_eq!(
            validate_eof(&encoded, &shanghai_config()),
            Err(EofError::TruncatedPush)
        );
    }

    #[test]
    fn data_before_code_rejected() {
        let encoded = vec![0xef, 0x00, 0x01, 0x02, 0x00, 0x01, 0x00, 0xaa];
        assert_eq!(
            parse_eof_v1(&encoded),
            Err(EofError::InvalidSectionHeaders)
        );
    }
}

use alloy_primitives::{Address, B256};

use crate::error::IndexError;

pub const ADDRESS_BYTES: usize = 20;
pub const HASH_BYTES: usize = 32;
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Canonical lower-case `0x` form of a 20-byte address.
pub fn normalize_address(value: &str, event_id: &str) -> Result<String, IndexError> {
    let bytes = decode_hex_with_expected(value, ADDRESS_BYTES)
        .map_err(|reason| IndexError::malformed(event_id, format!("address {value:?}: {reason}")))?;
    Ok(encode_prefixed(&bytes))
}

pub fn normalize_hash(value: &str, event_id: &str) -> Result<String, IndexError> {
    let bytes = decode_hex_with_expected(value, HASH_BYTES)
        .map_err(|reason| IndexError::malformed(event_id, format!("hash {value:?}: {reason}")))?;
    Ok(encode_prefixed(&bytes))
}

/// Address held in an ABI word; `None` when the 12 padding bytes are not zero.
pub fn address_from_word(word: &B256) -> Option<String> {
    let (padding, address) = word.as_slice().split_at(HASH_BYTES - ADDRESS_BYTES);
    if padding.iter().any(|byte| *byte != 0) {
        return None;
    }
    Some(encode_prefixed(address))
}

pub fn format_address(address: &Address) -> String {
    encode_prefixed(address.as_slice())
}

pub fn is_zero_address(address: &str) -> bool {
    address == ZERO_ADDRESS
}

pub fn encode_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Stable identifier of a log: `{transaction_hash}_{log_index}`.
pub fn event_id(transaction_hash: &str, log_index: u64) -> String {
    format!("{transaction_hash}_{log_index}")
}

fn decode_hex_with_expected(value: &str, expected_len: usize) -> Result<Vec<u8>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("value cannot be empty".to_string());
    }
    let bytes = hex::decode(strip_hex_prefix(trimmed))
        .map_err(|err| format!("not valid hex: {err}"))?;
    if bytes.len() != expected_len {
        return Err(format!(
            "must be {expected_len} bytes, got {}",
            bytes.len()
        ));
    }
    Ok(bytes)
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

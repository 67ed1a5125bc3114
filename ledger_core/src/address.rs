//! Address rules shared by every crate in the workspace.
//!
//! All comparisons are case-insensitive. Anything that is not `0x` followed by
//! exactly 40 hex digits is rejected at parse time, and the comparison helpers
//! treat such input as "equal to nothing".

use ethers::types::{Address, H160};

use crate::{LedgerError, Result};

/// Zero address, used by the explorer and routers for the native asset.
pub const ZERO_ADDRESS: Address = H160([0u8; 20]);

/// `0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE`, the other native-asset sentinel.
pub const NATIVE_SENTINEL: Address = H160([0xee; 20]);

pub const NATIVE_SYMBOL: &str = "BNB";
pub const NATIVE_DECIMALS: u8 = 18;

pub const WBNB_ADDRESS: &str = "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c";
pub const USDT_ADDRESS: &str = "0x55d398326f99059fF775485246999027B3197955";
pub const USDC_ADDRESS: &str = "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d";

/// Parse a 0x-prefixed, 40-hex-digit address. Checksums are not enforced.
pub fn parse_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| LedgerError::MalformedAddress(input.to_string()))?;

    if hex_part.len() != 40 {
        return Err(LedgerError::MalformedAddress(input.to_string()));
    }

    let bytes = hex::decode(hex_part).map_err(|_| LedgerError::MalformedAddress(input.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Compare a raw explorer string against an already parsed address.
pub fn matches_address(raw: &str, expected: &Address) -> bool {
    parse_address(raw).map(|a| &a == expected).unwrap_or(false)
}

/// Lowercase 0x-prefixed rendering used in output and as cache keys.
pub fn to_hex(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn is_native(address: &Address) -> bool {
    *address == ZERO_ADDRESS || *address == NATIVE_SENTINEL
}

pub fn wbnb() -> Address {
    parse_address(WBNB_ADDRESS).unwrap_or_default()
}

pub fn usdt() -> Address {
    parse_address(USDT_ADDRESS).unwrap_or_default()
}

pub fn usdc() -> Address {
    parse_address(USDC_ADDRESS).unwrap_or_default()
}

/// Tokens accepted as the paying side of a buy under the stricter buy policy.
pub fn is_quote_asset(address: &Address) -> bool {
    is_native(address) || *address == wbnb() || *address == usdt() || *address == usdc()
}

/// Map explorer symbol aliases to the names used in the ledger. Only the USDT
/// contract itself is renamed; any other token may report `BSC-USD`.
pub fn normalize_symbol(address: &Address, symbol: &str) -> String {
    if *address == usdt() {
        "USDT".to_string()
    } else {
        symbol.to_string()
    }
}

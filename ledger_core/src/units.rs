use ethers::types::U256;
use ethers::utils::format_units;
use tracing::warn;

use crate::address::NATIVE_DECIMALS;

/// Parse an explorer decimal string. Empty or non-numeric input yields `None`.
pub fn parse_wei(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    U256::from_dec_str(trimmed).ok()
}

/// Convert a raw integer amount into token units.
pub fn scale_amount(raw: U256, decimals: u8) -> f64 {
    match format_units(raw, decimals as u32) {
        Ok(formatted) => formatted.parse::<f64>().unwrap_or_else(|e| {
            warn!("Unparseable scaled amount {}: {}", formatted, e);
            0.0
        }),
        Err(e) => {
            warn!("Cannot scale {} by {} decimals: {}", raw, decimals, e);
            0.0
        }
    }
}

pub fn scale_native(raw: U256) -> f64 {
    scale_amount(raw, NATIVE_DECIMALS)
}

/// Native-asset cost of `gas_used * gas_price`.
pub fn gas_cost_native(gas_used: &str, gas_price: &str) -> f64 {
    match (parse_wei(gas_used), parse_wei(gas_price)) {
        (Some(used), Some(price)) => scale_native(used.saturating_mul(price)),
        _ => 0.0,
    }
}

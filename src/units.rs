//! Display ⇄ base-unit conversion and input validation.
//!
//! Amounts travel as decimal strings in display units (18 decimals) and as
//! `U256` in base units. Conversion is exact in both directions.

use alloy_primitives::utils::{format_ether, parse_ether};
use alloy_primitives::{Address, U256};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::TipError;

/// Decimals of the native token.
pub const DECIMALS: usize = 18;

fn amount_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+(\.\d+)?|\.\d+)$").expect("amount regex"))
}

fn address_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address regex"))
}

/// Parse a positive display-unit amount ("1.5") into base units.
pub fn parse_amount(input: &str) -> Result<U256, TipError> {
    let trimmed = input.trim();
    if !amount_pattern().is_match(trimmed) {
        return Err(TipError::InvalidAmount(input.to_string()));
    }
    if trimmed.split_once('.').is_some_and(|(_, frac)| frac.len() > DECIMALS) {
        return Err(TipError::InvalidAmount(format!("{}: more than {} decimals", input, DECIMALS)));
    }
    let normalized = if trimmed.starts_with('.') { format!("0{}", trimmed) } else { trimmed.to_string() };
    let value = parse_ether(&normalized).map_err(|e| TipError::InvalidAmount(format!("{}: {}", input, e)))?;
    if value.is_zero() {
        return Err(TipError::InvalidAmount(input.to_string()));
    }
    Ok(value)
}

/// Format base units as a display-unit decimal: no trailing zeros, at least one
/// fractional digit ("1.5", "2.0", "0.000000000000000001").
pub fn format_amount(value: U256) -> String {
    let full = format_ether(value);
    match full.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() { format!("{}.0", whole) } else { format!("{}.{}", whole, frac) }
        }
        None => format!("{}.0", full),
    }
}

/// Parse a `0x`-prefixed 20-byte hex address. Mixed-case input must carry a
/// valid EIP-55 checksum; all-lower and all-upper input is accepted as is.
pub fn parse_address(input: &str) -> Result<Address, TipError> {
    let trimmed = input.trim();
    if !address_pattern().is_match(trimmed) {
        return Err(TipError::InvalidRecipient(input.to_string()));
    }
    let body = &trimmed[2..];
    let mixed = body.chars().any(|c| c.is_ascii_lowercase()) && body.chars().any(|c| c.is_ascii_uppercase());
    if mixed {
        Address::parse_checksummed(trimmed, None).map_err(|_| TipError::InvalidRecipient(input.to_string()))
    } else {
        Address::from_str(trimmed).map_err(|_| TipError::InvalidRecipient(input.to_string()))
    }
}

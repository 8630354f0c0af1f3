//! String formatting utilities.
//!
//! Provides functions for formatting strings for display, including
//! hex string prefix management, token amount formatting, and truncation
//! for readability.

use alloy_primitives::U256;

/// Utility function to truncate a hex string for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 8 {
		id.to_string()
	} else {
		format!("{}..", &id[..8])
	}
}

/// Adds "0x" prefix to a hex string if it doesn't already have one.
///
/// This function ensures that a hex string has the standard "0x" prefix,
/// adding it if missing and leaving it unchanged if already present.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes "0x" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Formats a token amount with decimal places for display.
///
/// Converts a raw token amount (as stored on-chain) to a human-readable
/// format with proper decimal placement, trimming trailing zeros.
///
/// # Arguments
///
/// * `amount` - The raw token amount as a string
/// * `decimals` - The number of decimal places for the token
///
/// # Returns
///
/// A formatted string like "1.5" or "1000"
pub fn format_token_amount(amount: &str, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}

	let (integer_part, decimal_part) = split_base_units(amount, decimals);

	// Remove trailing zeros from decimal part for cleaner display
	let decimal_trimmed = decimal_part.trim_end_matches('0');

	if decimal_trimmed.is_empty() {
		integer_part
	} else {
		format!("{}.{}", integer_part, decimal_trimmed)
	}
}

/// Formats a base-unit price for display with at least two fraction digits.
///
/// Asset prices always render a currency-style fraction, so
/// 2_500_000_000_000_000_000 base units at 18 decimals becomes "2.50" and a
/// whole amount becomes "1.00". Fractions needing more than two digits keep
/// them all.
pub fn format_price(base_units: U256, decimals: u8) -> String {
	let amount = base_units.to_string();
	if decimals == 0 {
		return format!("{}.00", amount);
	}

	let (integer_part, decimal_part) = split_base_units(&amount, decimals);

	let mut decimal_trimmed = decimal_part.trim_end_matches('0').to_string();
	while decimal_trimmed.len() < 2 {
		decimal_trimmed.push('0');
	}

	format!("{}.{}", integer_part, decimal_trimmed)
}

/// Splits a raw base-unit amount string into integer and fraction parts.
fn split_base_units(amount: &str, decimals: u8) -> (String, String) {
	let decimal_places = decimals as usize;

	if amount.len() <= decimal_places {
		// Pad with leading zeros
		let decimal_str = format!("{:0>width$}", amount, width = decimal_places);
		("0".to_string(), decimal_str)
	} else {
		// Split at the decimal point
		let split_pos = amount.len() - decimal_places;
		(
			amount[..split_pos].to_string(),
			amount[split_pos..].to_string(),
		)
	}
}

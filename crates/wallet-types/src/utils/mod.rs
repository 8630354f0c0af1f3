//! Utility functions for common type conversions and transformations.
//!
//! This module provides helper functions for converting between different
//! data formats and string formatting commonly used throughout the wallet.

pub mod conversion;
pub mod formatting;

pub use conversion::{asset_id_to_did, did_to_asset_id, parse_address, DID_PREFIX};
pub use formatting::{
	format_price, format_token_amount, truncate_id, with_0x_prefix, without_0x_prefix,
};

//! Common types module for the data-wallet system.
//!
//! This module defines the core data types and structures shared by the
//! session manager, the consumption workflow, and the chain gateway. It
//! provides a centralized location for domain types to keep the wallet
//! components consistent.

/// Account-related types for addresses and signatures.
pub mod account;
/// Agreement types for one consumption attempt's on-chain negotiation.
pub mod agreement;
/// Asset descriptor (DDO) types and typed service records.
pub mod asset;
/// Progress and stage types for the consumption workflow.
pub mod events;
/// Recognized-network classification types.
pub mod networks;
/// Session state types published by the session manager.
pub mod session;
/// Typed keys for the persistent key-value store.
pub mod storage;
/// Utility functions for formatting and conversions.
pub mod utils;

// Re-export all types for convenient access
pub use account::{Address, Signature};
pub use agreement::{Agreement, AgreementId, AgreementStatus};
pub use asset::{AssetDescriptor, ServiceRecord, SERVICE_ACCESS, SERVICE_METADATA};
pub use events::{AuthorizeProgress, ConsumeStage};
pub use networks::{deserialize_recognized, NetworkStatus, RecognizedNetworks};
pub use session::{Balances, LoadState, LoginState, Session, WalletKind};
pub use storage::StoreKey;
pub use utils::{
	did_to_asset_id, format_price, format_token_amount, parse_address, truncate_id,
	with_0x_prefix, without_0x_prefix, DID_PREFIX,
};

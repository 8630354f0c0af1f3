//! Asset consumption workflow for the wallet service.
//!
//! Takes a resolved asset from permission check through agreement
//! creation, on-chain confirmation, payment lock and content download.
//! Every stage change is validated against a transition table and
//! published as a full [`state::ConsumeState`] snapshot, so observers
//! never see a step skipped, reordered or half-applied.
//!
//! One attempt runs at a time. A `consume` call that arrives while an
//! attempt is in flight is rejected, not queued and not restarted.

use alloy_primitives::U256;
use thiserror::Error;
use wallet_types::ConsumeStage;

pub mod state;
pub mod workflow;

pub use state::ConsumeState;
pub use workflow::{ConsumeWorkflow, GatingInfo};

/// Errors surfaced by consumption operations.
///
/// Precondition violations caught before the stage machine starts
/// moving are rejections and leave the workflow stage untouched.
/// Anything raised once an attempt is under way fails it and lands the
/// stage on `Failed`.
#[derive(Debug, Error)]
pub enum ConsumeError {
	/// Another attempt holds the workflow.
	#[error("Another consumption attempt is already in flight")]
	Busy,
	/// No wallet session is active.
	#[error("Not logged in")]
	NotLoggedIn,
	/// The session is on a chain outside the recognized set.
	#[error("Network not recognized: {0}")]
	NetworkUnrecognized(String),
	/// The service-token balance cannot cover the asset price.
	#[error("Insufficient balance: have {have} base units, need {need}")]
	InsufficientBalance { have: U256, need: U256 },
	/// The asset cannot be consumed as resolved.
	#[error("Invalid asset: {0}")]
	InvalidAsset(String),
	/// The on-chain permission lookup failed.
	#[error("Permission check failed: {0}")]
	PermissionCheckFailed(String),
	/// Agreement creation could not be submitted.
	#[error("Agreement creation failed: {0}")]
	AgreementCreationFailed(String),
	/// The agreement-created event never showed up in time.
	#[error("Agreement was not confirmed within {0} seconds")]
	AgreementConfirmationTimeout(u64),
	/// The payment lock transaction failed or reverted.
	#[error("Payment lock failed for agreement {agreement_id} on asset {asset_id}: {reason}")]
	PaymentLockFailed {
		agreement_id: String,
		asset_id: String,
		reason: String,
	},
	/// The wallet could not sign the content request.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// The provider did not hand over the content.
	#[error("Content fetch failed: {0}")]
	ContentFetchFailed(String),
	/// Fetched content could not be written to disk.
	#[error("Could not persist content: {0}")]
	PersistFailed(String),
	/// A stage change the transition table forbids.
	#[error("Invalid stage transition from {from} to {to}")]
	InvalidTransition { from: ConsumeStage, to: ConsumeStage },
}

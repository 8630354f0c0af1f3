//! Consumption state snapshot and stage transition rules.
//!
//! The workflow publishes a full [`ConsumeState`] after every change, so a
//! watcher sees either the previous consistent snapshot or the next one.
//! Stage changes are checked against a transition table; an attempt cannot
//! skip a step, reorder steps, or walk backwards.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use wallet_types::{AgreementId, AssetDescriptor, ConsumeStage};

/// Snapshot of the consumption workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeState {
	/// Where the current or most recent attempt stands.
	pub stage: ConsumeStage,
	/// Resolved asset, kept across attempts and resets. An empty
	/// descriptor records that resolution failed.
	pub descriptor: Option<AssetDescriptor>,
	/// Display form of the asset price, like "2.50".
	pub price_display: Option<String>,
	/// Agreement id of the attempt in flight, or of the attempt that
	/// just finished.
	pub agreement_id: Option<AgreementId>,
	/// Why the last attempt failed. Cleared when a new attempt starts
	/// and on reset.
	pub last_error: Option<String>,
	/// Where fetched content was written, set on success.
	pub downloaded_to: Option<PathBuf>,
}

impl ConsumeState {
	/// State before any asset has been resolved.
	pub fn idle() -> Self {
		Self {
			stage: ConsumeStage::Idle,
			descriptor: None,
			price_display: None,
			agreement_id: None,
			last_error: None,
			downloaded_to: None,
		}
	}
}

impl Default for ConsumeState {
	fn default() -> Self {
		Self::idle()
	}
}

/// Validates a stage change against the transition table.
///
/// `Succeeded` and `Failed` only lead back to the resting stages, which
/// is how a reset works; everything in between advances one step at a
/// time or fails.
pub fn is_valid_transition(from: ConsumeStage, to: ConsumeStage) -> bool {
	// Static transition table - each stage maps to allowed next stages
	static TRANSITIONS: Lazy<HashMap<ConsumeStage, HashSet<ConsumeStage>>> = Lazy::new(|| {
		let mut m = HashMap::new();
		m.insert(ConsumeStage::Idle, HashSet::from([ConsumeStage::Resolving]));
		m.insert(
			ConsumeStage::Resolving,
			HashSet::from([ConsumeStage::Ready]),
		);
		m.insert(
			ConsumeStage::Ready,
			HashSet::from([
				ConsumeStage::Resolving,
				ConsumeStage::CheckingPermission,
				ConsumeStage::Idle,
			]),
		);
		m.insert(
			ConsumeStage::CheckingPermission,
			HashSet::from([
				// Straight to Fetching when access is already granted.
				ConsumeStage::CreatingAgreement,
				ConsumeStage::Fetching,
				ConsumeStage::Failed,
			]),
		);
		m.insert(
			ConsumeStage::CreatingAgreement,
			HashSet::from([ConsumeStage::AwaitingConfirmation, ConsumeStage::Failed]),
		);
		m.insert(
			ConsumeStage::AwaitingConfirmation,
			HashSet::from([ConsumeStage::LockingPayment, ConsumeStage::Failed]),
		);
		m.insert(
			ConsumeStage::LockingPayment,
			HashSet::from([ConsumeStage::PaymentLocked, ConsumeStage::Failed]),
		);
		m.insert(
			ConsumeStage::PaymentLocked,
			HashSet::from([ConsumeStage::Fetching, ConsumeStage::Failed]),
		);
		m.insert(
			ConsumeStage::Fetching,
			HashSet::from([ConsumeStage::Succeeded, ConsumeStage::Failed]),
		);
		m.insert(
			ConsumeStage::Succeeded,
			HashSet::from([ConsumeStage::Ready, ConsumeStage::Idle]),
		);
		m.insert(
			ConsumeStage::Failed,
			HashSet::from([ConsumeStage::Ready, ConsumeStage::Idle]),
		);
		m
	});

	TRANSITIONS
		.get(&from)
		.map(|next| next.contains(&to))
		.unwrap_or(false)
}

//! Progress and stage types for the consumption workflow.
//!
//! The workflow reports its position two ways: a coarse [`ConsumeStage`] on
//! the attempt snapshot, and discrete [`AuthorizeProgress`] events emitted
//! while the on-chain authorization sequence runs. Progress steps carry
//! fixed indices so callers can render incremental status text; the workflow
//! guarantees they are emitted in order with none skipped.

use crate::AgreementId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a consumption attempt in its lifecycle.
///
/// `Failed` is terminal until an explicit reset; `Succeeded` likewise only
/// leaves via reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsumeStage {
	/// No attempt in progress and no descriptor resolved.
	Idle,
	/// Resolving the asset descriptor.
	Resolving,
	/// Descriptor resolved (possibly empty); waiting for a consume trigger.
	Ready,
	/// Checking whether access was already granted.
	CheckingPermission,
	/// Submitting agreement creation.
	CreatingAgreement,
	/// Creation submitted; waiting for the on-chain confirmation event.
	AwaitingConfirmation,
	/// Confirmation observed; locking payment.
	LockingPayment,
	/// Payment locked; authorization complete.
	PaymentLocked,
	/// Fetching content through the signed URL.
	Fetching,
	/// Content fetched and persisted.
	Succeeded,
	/// A stage failed; terminal until reset.
	Failed,
}

impl ConsumeStage {
	/// Stable name used in logs and error tags.
	pub fn as_str(&self) -> &'static str {
		match self {
			ConsumeStage::Idle => "idle",
			ConsumeStage::Resolving => "resolving",
			ConsumeStage::Ready => "ready",
			ConsumeStage::CheckingPermission => "checking_permission",
			ConsumeStage::CreatingAgreement => "creating_agreement",
			ConsumeStage::AwaitingConfirmation => "awaiting_confirmation",
			ConsumeStage::LockingPayment => "locking_payment",
			ConsumeStage::PaymentLocked => "payment_locked",
			ConsumeStage::Fetching => "fetching",
			ConsumeStage::Succeeded => "succeeded",
			ConsumeStage::Failed => "failed",
		}
	}
}

impl fmt::Display for ConsumeStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Discrete progress events emitted during the authorization sequence.
///
/// Each event maps to a fixed step index. Indices are contiguous and the
/// workflow emits them strictly in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizeProgress {
	/// Step 0: agreement creation submitted on-chain.
	AgreementSubmitted { agreement_id: AgreementId },
	/// Step 1: the agreement-created event was observed.
	AgreementConfirmed { agreement_id: AgreementId },
	/// Step 2: payment locked against the agreement.
	PaymentLocked { agreement_id: AgreementId },
}

impl AuthorizeProgress {
	/// Fixed step index for incremental status rendering.
	pub fn step_index(&self) -> u8 {
		match self {
			AuthorizeProgress::AgreementSubmitted { .. } => 0,
			AuthorizeProgress::AgreementConfirmed { .. } => 1,
			AuthorizeProgress::PaymentLocked { .. } => 2,
		}
	}

	/// Human-readable status line for the step.
	pub fn message(&self) -> &'static str {
		match self {
			AuthorizeProgress::AgreementSubmitted { .. } => "Creating agreement",
			AuthorizeProgress::AgreementConfirmed { .. } => "Agreement created",
			AuthorizeProgress::PaymentLocked { .. } => "Payment locked",
		}
	}

	/// The agreement this step belongs to.
	pub fn agreement_id(&self) -> &AgreementId {
		match self {
			AuthorizeProgress::AgreementSubmitted { agreement_id }
			| AuthorizeProgress::AgreementConfirmed { agreement_id }
			| AuthorizeProgress::PaymentLocked { agreement_id } => agreement_id,
		}
	}
}

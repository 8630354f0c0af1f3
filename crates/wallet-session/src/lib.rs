//! Session management for the wallet service.
//!
//! The session manager is the sole owner of wallet state. It restores the
//! persisted login method at startup, runs the login and logout flows, and
//! keeps the published [`wallet_types::Session`] snapshot fresh through
//! background pollers. Snapshots are replaced wholesale and published over
//! a watch channel, so observers either see the previous consistent state
//! or the next one, never a mixture.
//!
//! Refresh failures are absorbed: a poll tick that cannot reach the node
//! logs and leaves the last-known snapshot in place rather than tearing the
//! session down.

use thiserror::Error;
use wallet_store::StoreError;

pub mod manager;

pub use manager::SessionManager;

/// Errors surfaced by explicit session operations.
///
/// Background refreshes never return these; they absorb failures and keep
/// the last published snapshot.
#[derive(Debug, Error)]
pub enum SessionError {
	/// The wallet refused to grant any account.
	#[error("Login denied: {0}")]
	LoginDenied(String),
	/// The node or wallet provider could not be reached.
	#[error("Wallet provider unavailable: {0}")]
	ProviderUnavailable(String),
	/// A wallet credential could not be created or restored.
	#[error("Wallet error: {0}")]
	Wallet(String),
	/// The persistent store failed.
	#[error("Store error: {0}")]
	Store(#[from] StoreError),
	/// The background poller was started twice.
	#[error("Session poller already running")]
	AlreadyRunning,
}

//! Storage contracts and built-in credential store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, session::SessionCredential};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Client-side key/value storage holding the process-wide session credential.
///
/// Implementations model a single slot: the credential is written at login, read before every
/// outbound call, replaced on refresh, and cleared as one unit (access token, refresh token,
/// and user profile together) on logout or unrecoverable refresh failure.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the stored credential, if a session is active.
	fn load(&self) -> StoreFuture<'_, Option<SessionCredential>>;

	/// Persists or replaces the stored credential.
	fn save(&self, credential: SessionCredential) -> StoreFuture<'_, ()>;

	/// Removes the stored credential and every field persisted with it.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

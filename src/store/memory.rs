//! Thread-safe in-memory [`CredentialStore`] implementation for tests and short-lived tools.

// self
use crate::{
	_prelude::*,
	session::SessionCredential,
	store::{CredentialStore, StoreError, StoreFuture},
};

type Slot = Arc<RwLock<Option<SessionCredential>>>;

/// Keeps the credential in-process; the natural backend for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	fn load_now(slot: Slot) -> Option<SessionCredential> {
		slot.read().clone()
	}

	fn save_now(slot: Slot, credential: SessionCredential) -> Result<(), StoreError> {
		*slot.write() = Some(credential);

		Ok(())
	}

	fn clear_now(slot: Slot) -> Result<(), StoreError> {
		*slot.write() = None;

		Ok(())
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<SessionCredential>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(Self::load_now(slot)) })
	}

	fn save(&self, credential: SessionCredential) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move { Self::save_now(slot, credential) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move { Self::clear_now(slot) })
	}
}

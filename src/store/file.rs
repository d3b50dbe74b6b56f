//! Simple file-backed [`CredentialStore`] for CLIs and desktop shells.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	session::SessionCredential,
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Persists the credential to a JSON file after each mutation.
///
/// Writes go through a temporary sibling file followed by a rename, so a crash mid-write never
/// leaves a torn credential on disk.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Option<SessionCredential>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<Option<SessionCredential>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let credential = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

		Ok(Some(credential))
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, contents: &Option<SessionCredential>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		match contents {
			Some(credential) => {
				let serialized =
					serde_json::to_vec_pretty(credential).map_err(|e| StoreError::Serialization {
						message: format!("Failed to serialize credential snapshot: {e}"),
					})?;
				let mut tmp_path = self.path.clone();

				tmp_path.set_extension("tmp");

				{
					let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
						message: format!("Failed to create {}: {e}", tmp_path.display()),
					})?;

					file.write_all(&serialized).map_err(|e| StoreError::Backend {
						message: format!("Failed to write {}: {e}", tmp_path.display()),
					})?;
					file.sync_all().map_err(|e| StoreError::Backend {
						message: format!("Failed to sync {}: {e}", tmp_path.display()),
					})?;
				}

				fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
					message: format!("Failed to replace {}: {e}", self.path.display()),
				})
			},
			None =>
				if self.path.exists() {
					fs::remove_file(&self.path).map_err(|e| StoreError::Backend {
						message: format!("Failed to remove {}: {e}", self.path.display()),
					})
				} else {
					Ok(())
				},
		}
	}
}
impl CredentialStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<SessionCredential>> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn save(&self, credential: SessionCredential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			*guard = Some(credential);
			self.persist_locked(&guard)
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			*guard = None;
			self.persist_locked(&guard)
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::session::TokenSecret;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"auth_relay_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn build_credential() -> SessionCredential {
		SessionCredential::builder("access-token")
			.refresh_token("refresh-token")
			.user_data(serde_json::json!({"id": 7}))
			.build()
			.expect("Failed to build file-store test credential.")
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(build_credential()))
			.expect("Failed to save fixture credential to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.load())
			.expect("Failed to load fixture credential from file store.")
			.expect("File store lost credential after reopen.");

		assert_eq!(fetched.access_token.expose(), "access-token");
		assert_eq!(fetched.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-token"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn clear_removes_snapshot_from_disk() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(build_credential()))
			.expect("Failed to save fixture credential to file store.");

		assert!(path.exists());

		rt.block_on(store.clear()).expect("Failed to clear file store.");

		assert!(!path.exists());
		assert!(
			rt.block_on(store.load()).expect("Failed to load after clear.").is_none(),
			"Cleared store should report no active session.",
		);
	}
}

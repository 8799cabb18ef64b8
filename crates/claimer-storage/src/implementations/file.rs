//! File-based storage backend.
//!
//! Each key is one file under the base directory. Files start with a fixed
//! header carrying the expiry timestamp, so expired rows can be dropped
//! without decoding their payload.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use claimer_types::{current_timestamp, ImplementationRegistry, LedgerKey};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Fixed-size file header for TTL support.
///
/// Binary layout (32 bytes total):
/// - [0-3]: Magic bytes "DCLM"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-31]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"DCLM";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs().max(1))
		};
		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unknown file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires_bytes),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Default TTL per ledger namespace.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<LedgerKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_<namespace>` integer keys, e.g. `ttl_executions = 604800`.
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for ledger_key in LedgerKey::all() {
				let config_key = format!("ttl_{}", ledger_key.as_str());
				if let Some(seconds) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.filter(|v| *v >= 0)
				{
					ttls.insert(ledger_key, Duration::from_secs(seconds as u64));
				}
			}
		}

		Self { ttls }
	}

	fn get_ttl(&self, ledger_key: LedgerKey) -> Duration {
		self.ttls
			.get(&ledger_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	/// Gets the default TTL for a key from its namespace prefix.
	fn get_ttl_for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<LedgerKey>().ok())
			.map(|ledger_key| self.ttl_config.get_ttl(ledger_key))
			.unwrap_or(Duration::ZERO)
	}

	async fn read_entry(&self, key: &str) -> Result<Option<(FileHeader, Vec<u8>)>, StorageError> {
		let data = match fs::read(self.get_file_path(key)).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		let header = FileHeader::deserialize(&data)?;
		Ok(Some((header, data[FileHeader::SIZE..].to_vec())))
	}

	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut removed = 0;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
					continue;
				},
			};
			match FileHeader::deserialize(&data) {
				Ok(header) if header.is_expired() => {
					if let Err(e) = fs::remove_file(&path).await {
						tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
					} else {
						removed += 1;
					}
				},
				Ok(_) => {},
				Err(e) => tracing::debug!("Skipping file {:?}: {}", path, e),
			}
		}
		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match self.read_entry(key).await? {
			Some((header, payload)) if !header.is_expired() => Ok(payload),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));
		let header = FileHeader::new(ttl);

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(&value);

		// Write to a temp file then rename
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(matches!(
			self.read_entry(key).await?,
			Some((header, _)) if !header.is_expired()
		))
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for ledger files (default: "./data/ledger")
/// - `ttl_executions`: TTL in seconds for execution records (default: 0, never)
/// - `ttl_bundles`: TTL in seconds for admitted bundles (default: 0, never)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = match config.get("storage_path") {
		None => "./data/ledger",
		Some(value) => value.as_str().ok_or_else(|| {
			StorageError::Configuration("storage_path must be a string".into())
		})?,
	};

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_write_read_delete() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf(), TtlConfig::default());

		storage
			.set_bytes("executions:b-1", b"{\"ok\":true}".to_vec(), None)
			.await
			.unwrap();
		assert!(temp_dir.path().join("executions_b-1.bin").exists());
		assert_eq!(
			storage.get_bytes("executions:b-1").await.unwrap(),
			b"{\"ok\":true}".to_vec()
		);

		storage.delete("executions:b-1").await.unwrap();
		assert!(!storage.exists("executions:b-1").await.unwrap());
		// Deleting twice is fine
		storage.delete("executions:b-1").await.unwrap();
	}

	#[tokio::test]
	async fn test_expired_files_are_hidden_and_cleaned() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf(), TtlConfig::default());

		// Write a header whose deadline is already in the past
		let stale = FileHeader {
			version: FileHeader::VERSION,
			expires_at: 1,
		};
		let mut data = stale.serialize().to_vec();
		data.extend_from_slice(b"old");
		std::fs::write(temp_dir.path().join("bundles_stale.bin"), data).unwrap();
		storage
			.set_bytes("bundles:fresh", b"new".to_vec(), Some(Duration::from_secs(3600)))
			.await
			.unwrap();

		assert!(!storage.exists("bundles:stale").await.unwrap());
		assert!(matches!(
			storage.get_bytes("bundles:stale").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("bundles:fresh").await.unwrap());
	}

	#[test]
	fn test_namespace_ttl_from_config() {
		let config: toml::Value = toml::from_str(
			r#"
storage_path = "/tmp/ledger"
ttl_executions = 86400
"#,
		)
		.unwrap();
		let ttl_config = TtlConfig::from_config(&config);
		assert_eq!(
			ttl_config.get_ttl(LedgerKey::Executions),
			Duration::from_secs(86400)
		);
		assert_eq!(ttl_config.get_ttl(LedgerKey::Bundles), Duration::ZERO);
	}

	#[test]
	fn test_header_round_trip() {
		let header = FileHeader::new(Duration::ZERO);
		let parsed = FileHeader::deserialize(&header.serialize()).unwrap();
		assert_eq!(parsed, header);
		assert!(!parsed.is_expired());
	}
}

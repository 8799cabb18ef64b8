//! Multi-file configuration.
//!
//! `include = [...]` in the main file pulls in further files. A top-level
//! section may come from one file only, except `[integrations]`, whose
//! entries are gathered from every file with one owner per integration name.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use toml::{Table, Value};

const INCLUDE: &str = "include";
const INTEGRATIONS: &str = "integrations";

/// Reads a main configuration file together with its includes.
pub struct ConfigLoader {
	base_dir: PathBuf,
	visited: HashSet<PathBuf>,
	/// Section (or `integrations.<name>`) to the file that defined it.
	origins: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_dir: impl AsRef<Path>) -> Self {
		Self {
			base_dir: base_dir.as_ref().to_path_buf(),
			visited: HashSet::new(),
			origins: HashMap::new(),
		}
	}

	/// Loads `file`, merges its includes and validates the result.
	pub async fn load_config(&mut self, file: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let path = self.locate(file.as_ref())?;
		let mut root = self.read_table(&path).await?;
		let includes = take_includes(&mut root)?;
		self.claim_sections(&root, &path)?;

		for include in includes {
			let path = self.locate(&include)?;
			let table = self.read_table(&path).await?;
			if table.contains_key(INCLUDE) {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					path.display()
				)));
			}
			self.claim_sections(&table, &path)?;
			merge(&mut root, table);
		}

		let text = toml::to_string(&root)
			.map_err(|e| ConfigError::Parse(format!("Failed to combine configuration: {}", e)))?;
		text.parse()
	}

	async fn read_table(&mut self, path: &Path) -> Result<Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await?;
		if !self.visited.insert(canonical) {
			return Err(ConfigError::Validation(format!(
				"Circular include: {} loaded twice",
				path.display()
			)));
		}
		let content = tokio::fs::read_to_string(path).await?;
		Ok(toml::from_str(&resolve_env_vars(&content)?)?)
	}

	fn claim_sections(&mut self, table: &Table, path: &Path) -> Result<(), ConfigError> {
		for (key, value) in table {
			match (key.as_str(), value) {
				(INTEGRATIONS, Value::Table(integrations)) => {
					for name in integrations.keys() {
						self.claim(format!("{}.{}", INTEGRATIONS, name), path)?;
					}
				},
				_ => self.claim(key.clone(), path)?,
			}
		}
		Ok(())
	}

	fn claim(&mut self, section: String, path: &Path) -> Result<(), ConfigError> {
		if let Some(owner) = self.origins.get(&section) {
			return Err(ConfigError::Validation(format!(
				"Section '{}' defined in both {} and {}",
				section,
				owner.display(),
				path.display()
			)));
		}
		self.origins.insert(section, path.to_path_buf());
		Ok(())
	}

	fn locate(&self, file: &Path) -> Result<PathBuf, ConfigError> {
		let path = if file.is_absolute() {
			file.to_path_buf()
		} else {
			self.base_dir.join(file)
		};
		if !path.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", path.display()),
			)));
		}
		Ok(path)
	}
}

/// Removes and returns the `include` list of the main file.
fn take_includes(root: &mut Table) -> Result<Vec<PathBuf>, ConfigError> {
	match root.remove(INCLUDE) {
		None => Ok(Vec::new()),
		Some(Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(Value::Array(paths)) => paths
			.into_iter()
			.map(|path| match path {
				Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"include must list file paths".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"include must be a path or a list of paths".into(),
		)),
	}
}

fn merge(root: &mut Table, table: Table) {
	for (key, value) in table {
		let integrations = match value {
			Value::Table(integrations) if key == INTEGRATIONS => integrations,
			value => {
				root.insert(key, value);
				continue;
			},
		};
		let target = root
			.entry(INTEGRATIONS)
			.or_insert_with(|| Value::Table(Table::new()));
		if let Value::Table(target) = target {
			for (name, integration) in integrations {
				target.insert(name, integration);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const NETWORKS: &str = r#"
[networks.base]
claim_recipient = "0x8ba1f109551bd432803012645ac136ddd64dba72"
native_usd = 3000.0

[networks.polygon]
claim_recipient = "0x8ba1f109551bd432803012645ac136ddd64dba72"
native_usd = 0.5
"#;

	const BACKENDS: &str = r#"
[storage]
primary = "file"
cleanup_interval_seconds = 600
[storage.implementations.file]
storage_path = "./data/ledger"

[pricing]
primary = "mock"
[pricing.implementations.mock]
"#;

	const SYNTHETIC: &str = r#"
[integrations.synthetic]
wallet_count = 2
"#;

	const DISTRIBUTOR: &str = r#"
[integrations.distributor]
enabled = false
chain = "base"
"#;

	fn write(dir: &TempDir, name: &str, content: &str) {
		fs::write(dir.path().join(name), content).unwrap();
	}

	#[tokio::test]
	async fn test_single_file_config() {
		let dir = TempDir::new().unwrap();
		let content = format!(
			"[claimer]\nid = \"single\"\nmock_mode = true\n{}{}{}",
			NETWORKS, BACKENDS, SYNTHETIC
		);
		write(&dir, "config.toml", &content);

		let config = ConfigLoader::new(dir.path())
			.load_config("config.toml")
			.await
			.unwrap();

		assert_eq!(config.claimer.id, "single");
		assert_eq!(config.networks.len(), 2);
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			"include = [\"networks.toml\", \"backends.toml\"]\n\n[claimer]\nid = \"modular\"\nmock_mode = true\n\n[integrations.synthetic]\n",
		);
		write(&dir, "networks.toml", NETWORKS);
		write(&dir, "backends.toml", BACKENDS);

		let config = Config::from_file(dir.path().join("main.toml").to_str().unwrap())
			.await
			.unwrap();

		assert_eq!(config.claimer.id, "modular");
		assert_eq!(config.storage.primary, "file");
		assert_eq!(config.storage.cleanup_interval_seconds, 600);
	}

	#[tokio::test]
	async fn test_integrations_gathered_across_files() {
		let dir = TempDir::new().unwrap();
		let main = format!(
			"include = [\"synthetic.toml\", \"distributor.toml\"]\n\n[claimer]\nid = \"split\"\nmock_mode = true\n{}{}",
			NETWORKS, BACKENDS
		);
		write(&dir, "main.toml", &main);
		write(&dir, "synthetic.toml", SYNTHETIC);
		write(&dir, "distributor.toml", DISTRIBUTOR);

		let config = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap();

		assert_eq!(config.integrations.len(), 2);
		assert_eq!(
			config.integrations["synthetic"]
				.get("wallet_count")
				.and_then(|v| v.as_integer()),
			Some(2)
		);
		assert!(config.integrations.contains_key("distributor"));
	}

	#[tokio::test]
	async fn test_integration_defined_twice_is_rejected() {
		let dir = TempDir::new().unwrap();
		let main = format!(
			"include = [\"synthetic.toml\"]\n\n[claimer]\nid = \"twice\"\nmock_mode = true\n{}{}{}",
			NETWORKS, BACKENDS, SYNTHETIC
		);
		write(&dir, "main.toml", &main);
		write(&dir, "synthetic.toml", SYNTHETIC);

		let error = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error.contains("Section 'integrations.synthetic' defined in both"));
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			"include = [\"duplicate.toml\"]\n\n[claimer]\nid = \"first\"\n",
		);
		write(&dir, "duplicate.toml", "[claimer]\nid = \"second\"\n");

		let error = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error.contains("Section 'claimer' defined in both"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"self.toml",
			"include = [\"self.toml\"]\n\n[claimer]\nid = \"loop\"\n",
		);

		let error = ConfigLoader::new(dir.path())
			.load_config("self.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error.contains("Circular include"));
	}

	#[tokio::test]
	async fn test_nested_include_is_rejected() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			"include = [\"middle.toml\"]\n\n[claimer]\nid = \"nested\"\n",
		);
		write(&dir, "middle.toml", "include = [\"networks.toml\"]\n");
		write(&dir, "networks.toml", NETWORKS);

		let error = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error.contains("Nested include"));
	}
}

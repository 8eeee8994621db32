use std::{
    env, fs,
    path::{Path, PathBuf},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    encryption::Encryptor,
    error::{EventError, Result},
    snowflake::MAX_WORKER_ID,
};

pub const DEFAULT_SNAPSHOT_FREQUENCY: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    /// A snapshot is written every this-many events per aggregate.
    /// Zero disables automatic snapshots.
    #[serde(default = "default_snapshot_frequency")]
    pub snapshot_frequency: u64,
    pub data_encryption_key: Option<String>,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_snowflake_worker_id")]
    pub snowflake_worker_id: u16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            data_dir: default_data_dir(),
            snapshot_frequency: default_snapshot_frequency(),
            data_encryption_key: None,
            list_page_size: default_list_page_size(),
            page_limit: default_page_limit(),
            snowflake_worker_id: default_snowflake_worker_id(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub data_dir: Option<PathBuf>,
    pub snapshot_frequency: Option<u64>,
    pub data_encryption_key: Option<String>,
    pub list_page_size: Option<usize>,
    pub page_limit: Option<usize>,
    pub snowflake_worker_id: Option<u16>,
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path = default_config_root()?;
    path.push("config.toml");
    Ok(path)
}

pub fn load_or_default(path: Option<PathBuf>) -> Result<(CoreConfig, PathBuf)> {
    let config_path = if let Some(path) = path {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        path
    } else {
        default_config_path()?
    };

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let cfg: CoreConfig = toml::from_str(&contents)?;
        cfg.validate()?;
        cfg.ensure_data_dir()?;
        Ok((cfg, config_path))
    } else {
        let cfg = CoreConfig::default();
        cfg.ensure_data_dir()?;
        cfg.save(&config_path)?;
        Ok((cfg, config_path))
    }
}

impl CoreConfig {
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.snowflake_worker_id > MAX_WORKER_ID {
            return Err(EventError::Config(format!(
                "snowflake worker id {} exceeds maximum {}",
                self.snowflake_worker_id, MAX_WORKER_ID
            )));
        }
        if self.page_limit == 0 {
            return Err(EventError::Config(
                "page_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply_update(&mut self, update: ConfigUpdate) {
        if let Some(dir) = update.data_dir {
            self.data_dir = dir;
        }
        if let Some(frequency) = update.snapshot_frequency {
            self.snapshot_frequency = frequency;
        }
        if let Some(dek) = update.data_encryption_key {
            self.data_encryption_key = Some(dek);
        }
        if let Some(list_page_size) = update.list_page_size {
            self.list_page_size = list_page_size;
        }
        if let Some(page_limit) = update.page_limit {
            self.page_limit = page_limit;
        }
        if let Some(worker_id) = update.snowflake_worker_id {
            self.snowflake_worker_id = worker_id;
        }
        self.updated_at = Utc::now();
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn event_store_path(&self) -> PathBuf {
        self.data_dir.join("event_store")
    }

    pub fn encryptor(&self) -> Result<Option<Encryptor>> {
        match self.data_encryption_key.as_deref() {
            Some(key) => Ok(Some(Encryptor::new_from_base64(key)?)),
            None => Ok(None),
        }
    }
}

pub fn generate_data_encryption_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

fn default_config_root() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        Ok(home.join(".callvault"))
    } else {
        env::current_dir()
            .map(|dir| dir.join(".callvault"))
            .map_err(|err| EventError::Config(err.to_string()))
    }
}

fn default_data_dir() -> PathBuf {
    default_config_root().unwrap_or_else(|_| PathBuf::from(".callvault"))
}

fn default_snapshot_frequency() -> u64 {
    DEFAULT_SNAPSHOT_FREQUENCY
}

fn default_list_page_size() -> usize {
    10
}

fn default_page_limit() -> usize {
    1000
}

fn default_snowflake_worker_id() -> u16 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_frequency_defaults_when_absent() {
        let cfg: CoreConfig = toml::from_str(
            r#"
data_dir = "/tmp/callvault-test"
created_at = "2025-01-01T00:00:00Z"
updated_at = "2025-01-01T00:00:00Z"
"#,
        )
        .expect("minimal config should parse");
        assert_eq!(cfg.snapshot_frequency, DEFAULT_SNAPSHOT_FREQUENCY);
        assert_eq!(cfg.list_page_size, 10);
    }

    #[test]
    fn applies_updates() {
        let mut config = CoreConfig::default();
        config.apply_update(ConfigUpdate {
            snapshot_frequency: Some(25),
            page_limit: Some(500),
            ..ConfigUpdate::default()
        });
        assert_eq!(config.snapshot_frequency, 25);
        assert_eq!(config.page_limit, 500);
    }

    #[test]
    fn zero_frequency_disables_snapshots() {
        let mut config = CoreConfig::default();
        config.apply_update(ConfigUpdate {
            snapshot_frequency: Some(0),
            ..ConfigUpdate::default()
        });
        assert_eq!(config.snapshot_frequency, 0);
        config.validate().expect("zero frequency is valid");
    }

    #[test]
    fn rejects_out_of_range_worker_id() {
        let mut config = CoreConfig::default();
        config.snowflake_worker_id = MAX_WORKER_ID + 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EventError::Config(_)));
    }

    #[test]
    fn generated_keys_build_an_encryptor() {
        let mut config = CoreConfig::default();
        config.data_encryption_key = Some(generate_data_encryption_key());
        assert!(config.encryptor().unwrap().is_some());

        config.data_encryption_key = None;
        assert!(config.encryptor().unwrap().is_none());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = CoreConfig::default();
        config.data_dir = dir.path().join("data");
        config.snapshot_frequency = 50;
        config.save(&path).unwrap();

        let (loaded, loaded_path) = load_or_default(Some(path.clone())).unwrap();
        assert_eq!(loaded_path, path);
        assert_eq!(loaded.snapshot_frequency, 50);
        assert_eq!(loaded.data_dir, config.data_dir);
    }
}

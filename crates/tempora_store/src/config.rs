use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tempora_core::{TemporaError, TemporaResult};

const CONFIG_FILE: &str = "tempora.json";
const SQLITE_FILE: &str = "tempora.sqlite";

pub const DEFAULT_MAX_ATTRIBUTES: usize = 1_000;
pub const DEFAULT_FETCH_PAGE_SIZE: u32 = 500;
pub const DEFAULT_MAX_FETCH_INSTANCES: usize = 100_000;

pub const FAILPOINT_AFTER_SNAPSHOT_UPSERT: &str = "after_snapshot_upsert";
pub const FAILPOINT_AFTER_RECORD_UPSERT: &str = "after_record_upsert";
pub const FAILPOINT_AFTER_INSTANCE_INSERT: &str = "after_instance_insert";

/// Backend selection, tagged by `backend` in the JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

impl DatabaseConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::Postgres { .. } => "postgres",
            Self::Mysql { .. } => "mysql",
        }
    }

    /// Server URL for the networked backends.
    pub fn server_url(&self) -> Option<&str> {
        match self {
            Self::Sqlite { .. } => None,
            Self::Postgres { url } | Self::Mysql { url } => Some(url),
        }
    }

    /// SQLite file, relative paths resolved against `base_dir`.
    pub fn sqlite_file(&self, base_dir: &Path) -> Option<PathBuf> {
        let Self::Sqlite { path } = self else {
            return None;
        };
        let file = PathBuf::from(path.as_deref().unwrap_or(SQLITE_FILE));
        Some(if file.is_absolute() {
            file
        } else {
            base_dir.join(file)
        })
    }

    /// Connection string handed to the pool.
    pub fn connection_string(&self, base_dir: &Path) -> TemporaResult<String> {
        match self.sqlite_file(base_dir) {
            Some(file) => Ok(format!("sqlite://{}?mode=rwc", file.to_string_lossy())),
            None => self
                .server_url()
                .map(str::to_string)
                .ok_or_else(|| TemporaError::validation("database url missing")),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Temporal attributes accepted in one ingested document.
    pub max_attributes: Option<usize>,
    /// Rows per page when streaming instances.
    pub fetch_page_size: Option<u32>,
    /// Instances returned for one record by an unpaged fetch.
    pub max_fetch_instances: Option<usize>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_attributes: Some(DEFAULT_MAX_ATTRIBUTES),
            fetch_page_size: Some(DEFAULT_FETCH_PAGE_SIZE),
            max_fetch_instances: Some(DEFAULT_MAX_FETCH_INSTANCES),
        }
    }
}

/// Contents of `tempora.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemporaConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    pub failpoints: Option<Vec<String>>,
}

impl TemporaConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
            failpoints: None,
        }
    }

    /// Arms a named failpoint; used by rollback tests.
    pub fn with_failpoint(mut self, name: impl Into<String>) -> Self {
        self.failpoints.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    /// Reads `tempora.json` under `base_dir`, writing a SQLite default first when absent.
    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> TemporaResult<Self> {
        fs::create_dir_all(base_dir).map_err(|err| io_error("create config dir", err))?;
        let file = base_dir.join(CONFIG_FILE);
        if file.exists() {
            return read_config(&file);
        }
        let config = Self::default_sqlite(default_sqlite_path.to_string_lossy());
        write_config(&file, &config)?;
        Ok(config)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> TemporaResult<PathBuf> {
        self.database.sqlite_file(base_dir).ok_or_else(|| {
            TemporaError::validation(format!(
                "sqlite path requested for {} backend",
                self.database.name()
            ))
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.database.name()
    }

    pub fn connection_url(&self) -> Option<&str> {
        self.database.server_url()
    }
}

fn read_config(file: &Path) -> TemporaResult<TemporaConfig> {
    let raw = fs::read_to_string(file).map_err(|err| io_error("read config", err))?;
    serde_json::from_str(&raw)
        .map_err(|err| TemporaError::validation(format!("{}: {err}", file.display())))
}

fn write_config(file: &Path, config: &TemporaConfig) -> TemporaResult<()> {
    let body = serde_json::to_string_pretty(config)
        .map_err(|err| TemporaError::persistence(format!("encode config: {err}")))?;
    fs::write(file, body).map_err(|err| io_error("write config", err))
}

fn io_error(action: &str, err: std::io::Error) -> TemporaError {
    TemporaError::persistence(format!("{action}: {err}"))
}

use std::path::{Path, PathBuf};

use crate::{TemporaConfig, TemporaResult, TemporaStore};

const SQLITE_FILE: &str = "tempora.sqlite";

/// Config under `base`; a fresh directory gets a SQLite default written to `tempora.json`.
pub fn load_or_init_config(base: &Path) -> TemporaResult<TemporaConfig> {
    TemporaConfig::load_or_init(base, &default_sqlite_path(base))
}

/// Loads the config under `base`, connects, and runs pending migrations.
pub async fn open_store(base: &Path) -> TemporaResult<TemporaStore> {
    TemporaStore::connect(&load_or_init_config(base)?, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(SQLITE_FILE)
}

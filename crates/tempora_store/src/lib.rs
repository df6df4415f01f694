pub mod config;
pub mod datastore;
mod db;
pub mod migration;
pub mod store;

pub use config::{
    DatabaseConfig, FAILPOINT_AFTER_INSTANCE_INSERT, FAILPOINT_AFTER_RECORD_UPSERT,
    FAILPOINT_AFTER_SNAPSHOT_UPSERT, LimitsConfig, PoolConfig, TemporaConfig,
};
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use store::TemporaStore;
pub use tempora_core::*;

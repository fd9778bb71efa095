//! Concrete adapter implementations for ports.

#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod csv_adapter;
pub mod file_config_adapter;

use crate::domain::error::TacalcError;
use crate::ports::config_port::ConfigPort;
use crate::ports::storage_port::StoragePort;

/// Open the backend named by `[database] backend` (default `sqlite`).
pub fn open_storage(config: &dyn ConfigPort) -> Result<Box<dyn StoragePort>, TacalcError> {
    let backend = config.get_string_or("database", "backend", "sqlite");
    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(sqlite_adapter::SqliteAdapter::from_config(config)?)),
        #[cfg(feature = "postgres")]
        "postgres" => Ok(Box::new(postgres_adapter::PostgresAdapter::from_config(
            config,
        )?)),
        other => Err(TacalcError::ConfigInvalid {
            section: "database".into(),
            key: "backend".into(),
            reason: format!("backend '{}' is not available in this build", other),
        }),
    }
}

//! Combined storage port implemented by each database backend.

use crate::domain::error::TacalcError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::registry::CatalogEntry;
use crate::ports::bar_port::PriceBarPort;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::definition_port::DefinitionStore;

pub trait StoragePort: PriceBarPort + CatalogPort + DefinitionStore + Send + Sync {
    /// Create missing tables; safe to call repeatedly.
    fn initialize_schema(&self) -> Result<(), TacalcError>;

    /// Validate and upsert bars in one transaction.
    fn insert_bars(&self, bars: &[PriceBar]) -> Result<usize, TacalcError>;

    /// Upsert catalog rows by name.
    fn seed_catalog(&self, entries: &[CatalogEntry]) -> Result<(), TacalcError>;
}

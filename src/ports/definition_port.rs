//! Indicator definition store port.

use crate::domain::definition::{IndicatorDefinition, IndicatorPatch, NewIndicator};
use crate::domain::error::TacalcError;

pub trait DefinitionStore {
    /// Insert a new definition. Name uniqueness is enforced by storage.
    fn create(&self, new: NewIndicator) -> Result<IndicatorDefinition, TacalcError>;

    /// Look up by id, falling back to name.
    fn read(&self, id_or_name: &str) -> Result<Option<IndicatorDefinition>, TacalcError>;

    /// Read-merge-write of the fields present in `patch`.
    fn update(&self, id: &str, patch: IndicatorPatch) -> Result<IndicatorDefinition, TacalcError>;

    /// Delete by id; `Ok(false)` if nothing was deleted.
    fn try_delete(&self, id: &str) -> Result<bool, TacalcError>;

    /// Page of definitions ordered by name.
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndicatorDefinition>, TacalcError>;

    /// Best-effort delete. Storage failures are logged and reported as `false`,
    /// indistinguishable from "not found"; use [`DefinitionStore::try_delete`]
    /// when the difference matters.
    fn delete(&self, id: &str) -> bool {
        match self.try_delete(id) {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(id, error = %e, "failed to delete indicator");
                false
            }
        }
    }
}

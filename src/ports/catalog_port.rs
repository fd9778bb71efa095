//! Function catalog read port.

use crate::domain::error::TacalcError;
use crate::domain::registry::{CatalogEntry, FunctionRegistry};

pub trait CatalogPort {
    fn list_functions(&self) -> Result<Vec<CatalogEntry>, TacalcError>;

    /// Build a registry from the stored catalog.
    fn load_registry(&self) -> Result<FunctionRegistry, TacalcError> {
        FunctionRegistry::build(&self.list_functions()?)
    }
}

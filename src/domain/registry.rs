//! Function registry: the immutable name→transform table used by the
//! validator (which names may be called) and the evaluator (what they do).
//!
//! Built once from catalog rows. The catalog says which functions exist and
//! how they are implemented; native implementations come from
//! [`crate::domain::indicator`].

use crate::domain::error::TacalcError;
use crate::domain::indicator::{elementwise, moving, rolling};
use crate::domain::validator::NameSet;
use crate::domain::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A numeric transform callable from expressions.
pub trait Transform: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, TacalcError>;
}

impl<F> Transform for F
where
    F: Fn(&[Value]) -> Result<Value, TacalcError> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, TacalcError> {
        self(args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplementationKind {
    Native,
    /// Reserved for delegation to a storage-level computation; not buildable.
    Sql,
}

impl ImplementationKind {
    /// `"python"` is accepted as a legacy alias for native.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "native" | "python" => Some(ImplementationKind::Native),
            "sql" => Some(ImplementationKind::Sql),
            _ => None,
        }
    }
}

impl fmt::Display for ImplementationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImplementationKind::Native => write!(f, "native"),
            ImplementationKind::Sql => write!(f, "sql"),
        }
    }
}

/// One `(name, impl_type)` row as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub impl_type: String,
}

impl CatalogEntry {
    pub fn new(name: &str, impl_type: &str) -> Self {
        Self {
            name: name.to_string(),
            impl_type: impl_type.to_string(),
        }
    }
}

pub const NATIVE_FUNCTIONS: [&str; 12] = [
    "sma",
    "ema",
    "wilder",
    "diff",
    "cumsum",
    "max",
    "min",
    "abs",
    "shift",
    "rolling_max",
    "rolling_min",
    "stdev",
];

/// The default catalog: every native function.
pub fn native_catalog() -> Vec<CatalogEntry> {
    NATIVE_FUNCTIONS
        .iter()
        .map(|name| CatalogEntry::new(name, "native"))
        .collect()
}

fn native_transform(name: &str) -> Option<Arc<dyn Transform>> {
    let transform: Arc<dyn Transform> = match name {
        "sma" => Arc::new(moving::sma),
        "ema" => Arc::new(moving::ema),
        "wilder" => Arc::new(moving::wilder),
        "diff" => Arc::new(elementwise::diff),
        "cumsum" => Arc::new(elementwise::cumsum),
        "max" => Arc::new(elementwise::max),
        "min" => Arc::new(elementwise::min),
        "abs" => Arc::new(elementwise::abs),
        "shift" => Arc::new(elementwise::shift),
        "rolling_max" => Arc::new(rolling::rolling_max),
        "rolling_min" => Arc::new(rolling::rolling_min),
        "stdev" => Arc::new(rolling::stdev),
        _ => return None,
    };
    Some(transform)
}

#[derive(Clone)]
pub struct FunctionRegistryEntry {
    pub name: String,
    pub kind: ImplementationKind,
    pub transform: Arc<dyn Transform>,
}

impl fmt::Debug for FunctionRegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistryEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: BTreeMap<String, FunctionRegistryEntry>,
}

impl FunctionRegistry {
    /// Build from catalog rows. Fails on the first row that cannot be resolved.
    pub fn build(rows: &[CatalogEntry]) -> Result<Self, TacalcError> {
        let mut entries = BTreeMap::new();
        for row in rows {
            let kind = ImplementationKind::parse(&row.impl_type).ok_or_else(|| {
                TacalcError::UnsupportedFunctionKind {
                    name: row.name.clone(),
                    kind: row.impl_type.clone(),
                }
            })?;
            let transform = match kind {
                ImplementationKind::Native => native_transform(&row.name).ok_or_else(|| {
                    TacalcError::MissingNativeImplementation {
                        name: row.name.clone(),
                    }
                })?,
                ImplementationKind::Sql => {
                    return Err(TacalcError::UnsupportedFunctionKind {
                        name: row.name.clone(),
                        kind: kind.to_string(),
                    });
                }
            };
            if entries.contains_key(&row.name) {
                tracing::warn!(function = %row.name, "duplicate catalog row, keeping the last");
            }
            entries.insert(
                row.name.clone(),
                FunctionRegistryEntry {
                    name: row.name.clone(),
                    kind,
                    transform,
                },
            );
        }
        tracing::debug!(functions = entries.len(), "function registry built");
        Ok(Self { entries })
    }

    /// Registry holding every native function.
    pub fn native() -> Self {
        let entries = NATIVE_FUNCTIONS
            .iter()
            .filter_map(|name| {
                native_transform(name).map(|transform| {
                    (
                        name.to_string(),
                        FunctionRegistryEntry {
                            name: name.to_string(),
                            kind: ImplementationKind::Native,
                            transform,
                        },
                    )
                })
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Transform> {
        self.entries.get(name).map(|e| e.transform.as_ref())
    }

    pub fn entry(&self, name: &str) -> Option<&FunctionRegistryEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NameSet for FunctionRegistry {
    fn contains_name(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

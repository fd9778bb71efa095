//! SQLite storage adapter: price bars, function catalog and indicator
//! definitions.
//!
//! Structured fields (`dependencies`, `parameters`, `exec_plan`) are stored
//! as JSON text; timestamps as fixed-width RFC 3339 strings with microsecond
//! precision so they sort lexically.

use crate::domain::definition::{IndicatorDefinition, IndicatorPatch, NewIndicator, now_micros};
use crate::domain::error::TacalcError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::registry::CatalogEntry;
use crate::ports::bar_port::PriceBarPort;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::definition_port::DefinitionStore;
use crate::ports::storage_port::StoragePort;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use std::time::Duration;

const DEFINITION_COLUMNS: &str = "id, indicator_name, category, description, formula, \
     dependencies, parameters, exec_plan, created_at, updated_at";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> TacalcError {
    TacalcError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> TacalcError {
    TacalcError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// Map a UNIQUE violation on `indicator_name` to `DuplicateName`.
fn write_err(e: rusqlite::Error, name: &str) -> TacalcError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            TacalcError::DuplicateName {
                name: name.to_string(),
            }
        }
        _ => query_err(e),
    }
}

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

/// Definition row as stored, before JSON and timestamp decoding.
struct DefinitionRow {
    id: String,
    indicator_name: String,
    category: String,
    description: String,
    formula: String,
    dependencies: String,
    parameters: String,
    exec_plan: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DefinitionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            indicator_name: row.get(1)?,
            category: row.get(2)?,
            description: row.get(3)?,
            formula: row.get(4)?,
            dependencies: row.get(5)?,
            parameters: row.get(6)?,
            exec_plan: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_definition(self) -> Result<IndicatorDefinition, TacalcError> {
        let time = |s: &str| {
            ts_from_sql(s).map_err(|e| TacalcError::Database {
                reason: format!("bad timestamp '{}' for indicator {}: {}", s, self.id, e),
            })
        };
        let created_at = time(&self.created_at)?;
        let updated_at = time(&self.updated_at)?;
        Ok(IndicatorDefinition {
            dependencies: serde_json::from_str(&self.dependencies)?,
            parameters: serde_json::from_str(&self.parameters)?,
            exec_plan: self
                .exec_plan
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            id: self.id,
            indicator_name: self.indicator_name,
            category: self.category,
            description: self.description,
            formula: self.formula,
            created_at,
            updated_at,
        })
    }
}

struct EncodedDefinition {
    dependencies: String,
    parameters: String,
    exec_plan: Option<String>,
    created_at: String,
    updated_at: String,
}

fn encode(def: &IndicatorDefinition) -> Result<EncodedDefinition, TacalcError> {
    Ok(EncodedDefinition {
        dependencies: serde_json::to_string(&def.dependencies)?,
        parameters: serde_json::to_string(&def.parameters)?,
        exec_plan: def
            .exec_plan
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        created_at: ts_to_sql(&def.created_at),
        updated_at: ts_to_sql(&def.updated_at),
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TacalcError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| TacalcError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open(path: &str, pool_size: u32) -> Result<Self, TacalcError> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TacalcError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn read_by_id(
        conn: &rusqlite::Connection,
        id: &str,
    ) -> Result<Option<IndicatorDefinition>, TacalcError> {
        let sql = format!(
            "SELECT {} FROM indicator_definitions WHERE id = ?1",
            DEFINITION_COLUMNS
        );
        conn.query_row(&sql, params![id], DefinitionRow::from_row)
            .optional()
            .map_err(query_err)?
            .map(DefinitionRow::into_definition)
            .transpose()
    }
}

impl StoragePort for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), TacalcError> {
        let conn = self.pool.get().map_err(pool_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS price_bars (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                ts TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, timeframe, ts)
            );
            CREATE TABLE IF NOT EXISTS indicator_functions (
                name TEXT PRIMARY KEY,
                impl_type TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS indicator_definitions (
                id TEXT PRIMARY KEY,
                indicator_name TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                formula TEXT NOT NULL,
                dependencies TEXT NOT NULL DEFAULT '{}',
                parameters TEXT NOT NULL DEFAULT '{}',
                exec_plan TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }

    fn insert_bars(&self, bars: &[PriceBar]) -> Result<usize, TacalcError> {
        for bar in bars {
            bar.validate()?;
        }

        let mut conn = self.pool.get().map_err(pool_err)?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO price_bars
                 (symbol, timeframe, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    bar.symbol,
                    bar.timeframe,
                    ts_to_sql(&bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        tracing::info!(count = bars.len(), "price bars stored");
        Ok(bars.len())
    }

    fn seed_catalog(&self, entries: &[CatalogEntry]) -> Result<(), TacalcError> {
        let mut conn = self.pool.get().map_err(pool_err)?;
        let tx = conn.transaction().map_err(query_err)?;
        for entry in entries {
            tx.execute(
                "INSERT OR REPLACE INTO indicator_functions (name, impl_type) VALUES (?1, ?2)",
                params![entry.name, entry.impl_type],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(())
    }
}

impl PriceBarPort for SqliteAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<PriceBar>, TacalcError> {
        let conn = self.pool.get().map_err(pool_err)?;

        let query = "SELECT symbol, timeframe, ts, open, high, low, close, volume
                     FROM price_bars
                     WHERE symbol = ?1 AND timeframe = ?2
                     ORDER BY ts DESC
                     LIMIT ?3";

        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = stmt
            .query_map(params![symbol, timeframe, limit], |row| {
                let ts_str: String = row.get(2)?;
                let timestamp = ts_from_sql(&ts_str).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(PriceBar {
                    symbol: row.get(0)?,
                    timeframe: row.get(1)?,
                    timestamp,
                    open: row.get(3)?,
                    high: row.get(4)?,
                    low: row.get(5)?,
                    close: row.get(6)?,
                    volume: row.get(7)?,
                })
            })
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_err)?);
        }
        bars.reverse();

        Ok(bars)
    }
}

impl CatalogPort for SqliteAdapter {
    fn list_functions(&self) -> Result<Vec<CatalogEntry>, TacalcError> {
        let conn = self.pool.get().map_err(pool_err)?;
        let mut stmt = conn
            .prepare("SELECT name, impl_type FROM indicator_functions ORDER BY name")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CatalogEntry {
                    name: row.get(0)?,
                    impl_type: row.get(1)?,
                })
            })
            .map_err(query_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(query_err)?);
        }
        Ok(entries)
    }
}

impl DefinitionStore for SqliteAdapter {
    fn create(&self, new: NewIndicator) -> Result<IndicatorDefinition, TacalcError> {
        new.validate()?;
        let def = new.into_definition(uuid::Uuid::new_v4().to_string(), now_micros());
        let enc = encode(&def)?;

        let conn = self.pool.get().map_err(pool_err)?;
        let sql = format!(
            "INSERT INTO indicator_definitions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            DEFINITION_COLUMNS
        );
        conn.execute(
            &sql,
            params![
                def.id,
                def.indicator_name,
                def.category,
                def.description,
                def.formula,
                enc.dependencies,
                enc.parameters,
                enc.exec_plan,
                enc.created_at,
                enc.updated_at
            ],
        )
        .map_err(|e| write_err(e, &def.indicator_name))?;

        tracing::info!(id = %def.id, name = %def.indicator_name, "indicator created");
        Ok(def)
    }

    fn read(&self, id_or_name: &str) -> Result<Option<IndicatorDefinition>, TacalcError> {
        let conn = self.pool.get().map_err(pool_err)?;
        let sql = format!(
            "SELECT {} FROM indicator_definitions
             WHERE id = ?1 OR indicator_name = ?1
             ORDER BY id = ?1 DESC
             LIMIT 1",
            DEFINITION_COLUMNS
        );
        conn.query_row(&sql, params![id_or_name], DefinitionRow::from_row)
            .optional()
            .map_err(query_err)?
            .map(DefinitionRow::into_definition)
            .transpose()
    }

    fn update(&self, id: &str, patch: IndicatorPatch) -> Result<IndicatorDefinition, TacalcError> {
        let mut conn = self.pool.get().map_err(pool_err)?;
        // Write lock before the read; concurrent updaters queue on busy_timeout.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let mut def = Self::read_by_id(&tx, id)?.ok_or_else(|| TacalcError::NotFound {
            id: id.to_string(),
        })?;
        patch.apply(&mut def, now_micros())?;
        let enc = encode(&def)?;

        tx.execute(
            "UPDATE indicator_definitions
             SET indicator_name = ?2, category = ?3, description = ?4, formula = ?5,
                 dependencies = ?6, parameters = ?7, exec_plan = ?8,
                 created_at = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                def.id,
                def.indicator_name,
                def.category,
                def.description,
                def.formula,
                enc.dependencies,
                enc.parameters,
                enc.exec_plan,
                enc.created_at,
                enc.updated_at
            ],
        )
        .map_err(|e| write_err(e, &def.indicator_name))?;
        tx.commit().map_err(query_err)?;

        tracing::info!(id = %def.id, name = %def.indicator_name, "indicator updated");
        Ok(def)
    }

    fn try_delete(&self, id: &str) -> Result<bool, TacalcError> {
        let conn = self.pool.get().map_err(pool_err)?;
        let affected = conn
            .execute(
                "DELETE FROM indicator_definitions WHERE id = ?1",
                params![id],
            )
            .map_err(query_err)?;
        if affected > 0 {
            tracing::info!(id, "indicator deleted");
        }
        Ok(affected > 0)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndicatorDefinition>, TacalcError> {
        let conn = self.pool.get().map_err(pool_err)?;
        let sql = format!(
            "SELECT {} FROM indicator_definitions ORDER BY indicator_name LIMIT ?1 OFFSET ?2",
            DEFINITION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit, offset], DefinitionRow::from_row)
            .map_err(query_err)?;

        let mut defs = Vec::new();
        for row in rows {
            defs.push(row.map_err(query_err)?.into_definition()?);
        }
        Ok(defs)
    }
}

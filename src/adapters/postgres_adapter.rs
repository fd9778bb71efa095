//! PostgreSQL storage adapter.
//!
//! Same tables as the SQLite adapter, with `TIMESTAMPTZ` timestamps and
//! `JSONB` for the structured definition fields.

use crate::domain::definition::{
    ExecPlan, IndicatorDefinition, IndicatorPatch, JsonMap, NewIndicator, now_micros,
};
use crate::domain::error::TacalcError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::registry::CatalogEntry;
use crate::ports::bar_port::PriceBarPort;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::definition_port::DefinitionStore;
use crate::ports::storage_port::StoragePort;
use chrono::{DateTime, Utc};
use postgres::error::SqlState;
use postgres::types::Json;
use postgres::{GenericClient, NoTls, Row};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;

const DEFINITION_COLUMNS: &str = "id, indicator_name, category, description, formula, \
     dependencies, parameters, exec_plan, created_at, updated_at";

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

fn pool_err(e: r2d2::Error) -> TacalcError {
    TacalcError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> TacalcError {
    TacalcError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn write_err(e: postgres::Error, name: &str) -> TacalcError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return TacalcError::DuplicateName {
            name: name.to_string(),
        };
    }
    query_err(e)
}

fn row_to_definition(row: &Row) -> Result<IndicatorDefinition, TacalcError> {
    let dependencies: Json<JsonMap> = row.try_get(5).map_err(query_err)?;
    let parameters: Json<JsonMap> = row.try_get(6).map_err(query_err)?;
    let exec_plan: Option<Json<ExecPlan>> = row.try_get(7).map_err(query_err)?;
    Ok(IndicatorDefinition {
        id: row.try_get(0).map_err(query_err)?,
        indicator_name: row.try_get(1).map_err(query_err)?,
        category: row.try_get(2).map_err(query_err)?,
        description: row.try_get(3).map_err(query_err)?,
        formula: row.try_get(4).map_err(query_err)?,
        dependencies: dependencies.0,
        parameters: parameters.0,
        exec_plan: exec_plan.map(|p| p.0),
        created_at: row.try_get(8).map_err(query_err)?,
        updated_at: row.try_get(9).map_err(query_err)?,
    })
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TacalcError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| TacalcError::ConfigMissing {
                section: "database".into(),
                key: "conninfo".into(),
            })?;

        let pg_config: postgres::Config =
            connection_string
                .parse()
                .map_err(|e: postgres::Error| TacalcError::ConfigInvalid {
                    section: "postgres".into(),
                    key: "connection_string".into(),
                    reason: e.to_string(),
                })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    /// Read a row and hold its lock until the surrounding transaction ends.
    fn lock_by_id(
        client: &mut impl GenericClient,
        id: &str,
    ) -> Result<Option<IndicatorDefinition>, TacalcError> {
        let sql = format!(
            "SELECT {} FROM indicator_definitions WHERE id = $1 FOR UPDATE",
            DEFINITION_COLUMNS
        );
        client
            .query_opt(sql.as_str(), &[&id])
            .map_err(query_err)?
            .as_ref()
            .map(row_to_definition)
            .transpose()
    }
}

impl StoragePort for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS price_bars (
                    symbol TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    ts TIMESTAMPTZ NOT NULL,
                    open DOUBLE PRECISION NOT NULL,
                    high DOUBLE PRECISION NOT NULL,
                    low DOUBLE PRECISION NOT NULL,
                    close DOUBLE PRECISION NOT NULL,
                    volume DOUBLE PRECISION NOT NULL,
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
                    dependencies JSONB NOT NULL DEFAULT '{}',
                    parameters JSONB NOT NULL DEFAULT '{}',
                    exec_plan JSONB,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                );",
            )
            .map_err(query_err)
    }

    fn insert_bars(&self, bars: &[PriceBar]) -> Result<usize, TacalcError> {
        for bar in bars {
            bar.validate()?;
        }

        let mut client = self.pool.get().map_err(pool_err)?;
        let mut tx = client.transaction().map_err(query_err)?;
        for bar in bars {
            tx.execute(
                "INSERT INTO price_bars (symbol, timeframe, ts, open, high, low, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (symbol, timeframe, ts) DO UPDATE
                 SET open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low,
                     close = EXCLUDED.close, volume = EXCLUDED.volume",
                &[
                    &bar.symbol,
                    &bar.timeframe,
                    &bar.timestamp,
                    &bar.open,
                    &bar.high,
                    &bar.low,
                    &bar.close,
                    &bar.volume,
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;

        tracing::info!(count = bars.len(), "price bars stored");
        Ok(bars.len())
    }

    fn seed_catalog(&self, entries: &[CatalogEntry]) -> Result<(), TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        let mut tx = client.transaction().map_err(query_err)?;
        for entry in entries {
            tx.execute(
                "INSERT INTO indicator_functions (name, impl_type) VALUES ($1, $2)
                 ON CONFLICT (name) DO UPDATE SET impl_type = EXCLUDED.impl_type",
                &[&entry.name, &entry.impl_type],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }
}

impl PriceBarPort for PostgresAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<PriceBar>, TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = client
            .query(
                "SELECT symbol, timeframe, ts, open, high, low, close, volume
                 FROM price_bars
                 WHERE symbol = $1 AND timeframe = $2
                 ORDER BY ts DESC
                 LIMIT $3",
                &[&symbol, &timeframe, &limit],
            )
            .map_err(query_err)?;

        let mut bars: Vec<PriceBar> = rows
            .into_iter()
            .map(|row| {
                let timestamp: DateTime<Utc> = row.get(2);
                PriceBar {
                    symbol: row.get(0),
                    timeframe: row.get(1),
                    timestamp,
                    open: row.get(3),
                    high: row.get(4),
                    low: row.get(5),
                    close: row.get(6),
                    volume: row.get(7),
                }
            })
            .collect();
        bars.reverse();

        Ok(bars)
    }
}

impl CatalogPort for PostgresAdapter {
    fn list_functions(&self) -> Result<Vec<CatalogEntry>, TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        let rows = client
            .query(
                "SELECT name, impl_type FROM indicator_functions ORDER BY name",
                &[],
            )
            .map_err(query_err)?;
        Ok(rows
            .into_iter()
            .map(|row| CatalogEntry {
                name: row.get(0),
                impl_type: row.get(1),
            })
            .collect())
    }
}

impl DefinitionStore for PostgresAdapter {
    fn create(&self, new: NewIndicator) -> Result<IndicatorDefinition, TacalcError> {
        new.validate()?;
        let def = new.into_definition(uuid::Uuid::new_v4().to_string(), now_micros());

        let mut client = self.pool.get().map_err(pool_err)?;
        let sql = format!(
            "INSERT INTO indicator_definitions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            DEFINITION_COLUMNS
        );
        client
            .execute(
                sql.as_str(),
                &[
                    &def.id,
                    &def.indicator_name,
                    &def.category,
                    &def.description,
                    &def.formula,
                    &Json(&def.dependencies),
                    &Json(&def.parameters),
                    &def.exec_plan.as_ref().map(Json),
                    &def.created_at,
                    &def.updated_at,
                ],
            )
            .map_err(|e| write_err(e, &def.indicator_name))?;

        tracing::info!(id = %def.id, name = %def.indicator_name, "indicator created");
        Ok(def)
    }

    fn read(&self, id_or_name: &str) -> Result<Option<IndicatorDefinition>, TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        let sql = format!(
            "SELECT {} FROM indicator_definitions
             WHERE id = $1 OR indicator_name = $1
             ORDER BY id = $1 DESC
             LIMIT 1",
            DEFINITION_COLUMNS
        );
        client
            .query_opt(sql.as_str(), &[&id_or_name])
            .map_err(query_err)?
            .as_ref()
            .map(row_to_definition)
            .transpose()
    }

    fn update(&self, id: &str, patch: IndicatorPatch) -> Result<IndicatorDefinition, TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        let mut tx = client.transaction().map_err(query_err)?;

        let mut def = Self::lock_by_id(&mut tx, id)?.ok_or_else(|| TacalcError::NotFound {
            id: id.to_string(),
        })?;
        patch.apply(&mut def, now_micros())?;

        tx.execute(
            "UPDATE indicator_definitions
             SET indicator_name = $2, category = $3, description = $4, formula = $5,
                 dependencies = $6, parameters = $7, exec_plan = $8, updated_at = $9
             WHERE id = $1",
            &[
                &def.id,
                &def.indicator_name,
                &def.category,
                &def.description,
                &def.formula,
                &Json(&def.dependencies),
                &Json(&def.parameters),
                &def.exec_plan.as_ref().map(Json),
                &def.updated_at,
            ],
        )
        .map_err(|e| write_err(e, &def.indicator_name))?;
        tx.commit().map_err(query_err)?;

        tracing::info!(id = %def.id, name = %def.indicator_name, "indicator updated");
        Ok(def)
    }

    fn try_delete(&self, id: &str) -> Result<bool, TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        let affected = client
            .execute("DELETE FROM indicator_definitions WHERE id = $1", &[&id])
            .map_err(query_err)?;
        if affected > 0 {
            tracing::info!(id, "indicator deleted");
        }
        Ok(affected > 0)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndicatorDefinition>, TacalcError> {
        let mut client = self.pool.get().map_err(pool_err)?;
        let sql = format!(
            "SELECT {} FROM indicator_definitions ORDER BY indicator_name LIMIT $1 OFFSET $2",
            DEFINITION_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = client
            .query(sql.as_str(), &[&limit, &offset])
            .map_err(query_err)?;
        rows.iter().map(row_to_definition).collect()
    }
}

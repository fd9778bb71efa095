//! CLI definition and dispatch.
//!
//! Results go to stdout as JSON; diagnostics and logs go to stderr.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::adapters::csv_adapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::open_storage;
use crate::domain::config_validation::{EngineSettings, validate_engine_config};
use crate::domain::definition::{IndicatorPatch, JsonMap, NewIndicator, now_micros};
use crate::domain::environment::COLUMN_ALIASES;
use crate::domain::error::TacalcError;
use crate::domain::evaluation::{EvaluationRequest, evaluate_named_indicator};
use crate::domain::exec_plan::check_definition;
use crate::domain::ohlcv::BASE_COLUMNS;
use crate::domain::registry::{FunctionRegistry, native_catalog};
use crate::domain::timeframe::Timeframe;
use crate::domain::validator::validate;
use crate::ports::config_port::ConfigPort;
use crate::ports::storage_port::StoragePort;

#[derive(Parser, Debug)]
#[command(name = "tacalc", about = "Sandboxed custom technical-indicator engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create tables and seed the native function catalog
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Import OHLCV bars from a CSV file
    ImportBars {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: String,
    },
    /// List the function catalog
    Functions {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create an indicator from a JSON file
    Create {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show an indicator by id or name
    Show {
        #[arg(short, long)]
        config: PathBuf,
        indicator: String,
    },
    /// Apply a JSON patch to an indicator
    Update {
        #[arg(short, long)]
        config: PathBuf,
        id: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete an indicator by id
    Delete {
        #[arg(short, long)]
        config: PathBuf,
        id: String,
    },
    /// List indicators ordered by name
    List {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Validate a stored indicator or a single expression
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, conflicts_with = "expr")]
        indicator: Option<String>,
        #[arg(long)]
        expr: Option<String>,
        /// Extra variable names visible to --expr
        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Evaluate an indicator over stored bars
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        indicator: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: String,
        #[arg(long)]
        lookback: Option<usize>,
        /// Parameter override as NAME=VALUE; VALUE is JSON or a bare string
        #[arg(long = "param")]
        params: Vec<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn execute(command: Command) -> Result<(), TacalcError> {
    match command {
        Command::Init { config } => run_init(&config),
        Command::ImportBars {
            config,
            file,
            symbol,
            timeframe,
        } => run_import_bars(&config, &file, &symbol, &timeframe),
        Command::Functions { config } => run_functions(&config),
        Command::Create { config, file } => run_create(&config, &file),
        Command::Show { config, indicator } => run_show(&config, &indicator),
        Command::Update { config, id, file } => run_update(&config, &id, &file),
        Command::Delete { config, id } => run_delete(&config, &id),
        Command::List {
            config,
            limit,
            offset,
        } => run_list(&config, limit, offset),
        Command::Check {
            config,
            indicator,
            expr,
            vars,
        } => run_check(config.as_deref(), indicator.as_deref(), expr.as_deref(), &vars),
        Command::Evaluate {
            config,
            indicator,
            symbol,
            timeframe,
            lookback,
            params,
        } => {
            let request = EvaluationRequest {
                indicator,
                symbol,
                timeframe,
                lookback,
                overrides: JsonMap::new(),
            };
            run_evaluate(&config, request, &params)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TacalcError> {
    let config = FileConfigAdapter::from_file(path)?;
    validate_engine_config(&config)?;
    init_logging(&config);
    Ok(config)
}

/// `RUST_LOG` wins over `[logging] level`; repeated calls are no-ops.
fn init_logging(config: &dyn ConfigPort) {
    let level = config.get_string_or("logging", "level", "info");
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tacalc={}", level)));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn open(config_path: &Path) -> Result<(FileConfigAdapter, Box<dyn StoragePort>), TacalcError> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    Ok((config, storage))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), TacalcError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TacalcError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn run_init(config_path: &Path) -> Result<(), TacalcError> {
    let (_, storage) = open(config_path)?;
    storage.initialize_schema()?;
    storage.seed_catalog(&native_catalog())?;
    eprintln!("Schema ready, {} native functions registered", native_catalog().len());
    Ok(())
}

fn run_import_bars(
    config_path: &Path,
    file: &Path,
    symbol: &str,
    timeframe: &str,
) -> Result<(), TacalcError> {
    timeframe.parse::<Timeframe>()?;
    let (_, storage) = open(config_path)?;
    let bars = csv_adapter::read_bars(file, symbol, timeframe)?;
    let count = storage.insert_bars(&bars)?;
    eprintln!("Imported {} bars for {} {}", count, symbol, timeframe);
    Ok(())
}

fn run_functions(config_path: &Path) -> Result<(), TacalcError> {
    let (_, storage) = open(config_path)?;
    print_json(&storage.list_functions()?)
}

fn run_create(config_path: &Path, file: &Path) -> Result<(), TacalcError> {
    let new: NewIndicator = read_json(file)?;
    new.validate()?;
    let (_, storage) = open(config_path)?;
    if new.exec_plan.is_some() {
        let candidate = new.clone().into_definition(String::new(), now_micros());
        check_definition(&candidate, &storage.load_registry()?)?;
    }
    print_json(&storage.create(new)?)
}

fn run_show(config_path: &Path, indicator: &str) -> Result<(), TacalcError> {
    let (_, storage) = open(config_path)?;
    let def = storage
        .read(indicator)?
        .ok_or_else(|| TacalcError::NotFound {
            id: indicator.to_string(),
        })?;
    print_json(&def)
}

fn run_update(config_path: &Path, id: &str, file: &Path) -> Result<(), TacalcError> {
    let patch: IndicatorPatch = read_json(file)?;
    let (_, storage) = open(config_path)?;
    if patch.exec_plan.is_some() || patch.parameters.is_some() {
        let mut candidate = storage
            .read(id)?
            .ok_or_else(|| TacalcError::NotFound { id: id.to_string() })?;
        patch.clone().apply(&mut candidate, now_micros())?;
        if candidate.exec_plan.is_some() {
            check_definition(&candidate, &storage.load_registry()?)?;
        }
    }
    print_json(&storage.update(id, patch)?)
}

fn run_delete(config_path: &Path, id: &str) -> Result<(), TacalcError> {
    let (_, storage) = open(config_path)?;
    if !storage.try_delete(id)? {
        return Err(TacalcError::NotFound { id: id.to_string() });
    }
    eprintln!("Deleted {}", id);
    Ok(())
}

fn run_list(config_path: &Path, limit: usize, offset: usize) -> Result<(), TacalcError> {
    let (_, storage) = open(config_path)?;
    print_json(&storage.list(limit, offset)?)
}

fn run_check(
    config_path: Option<&Path>,
    indicator: Option<&str>,
    expr: Option<&str>,
    vars: &[String],
) -> Result<(), TacalcError> {
    match (indicator, expr) {
        (Some(indicator), _) => {
            let config_path = config_path.ok_or_else(|| TacalcError::ConfigMissing {
                section: "cli".into(),
                key: "--config".into(),
            })?;
            let (_, storage) = open(config_path)?;
            let registry = storage.load_registry()?;
            let def = storage
                .read(indicator)?
                .ok_or_else(|| TacalcError::NotFound {
                    id: indicator.to_string(),
                })?;
            check_definition(&def, &registry)?;
            eprintln!("Indicator '{}' is valid", def.indicator_name);
            Ok(())
        }
        (None, Some(source)) => {
            let registry = match config_path {
                Some(path) => open(path)?.1.load_registry()?,
                None => FunctionRegistry::native(),
            };
            let names: BTreeSet<String> = BASE_COLUMNS
                .iter()
                .chain(COLUMN_ALIASES.iter().map(|(alias, _)| alias))
                .map(|s| s.to_string())
                .chain(vars.iter().cloned())
                .collect();
            match validate(source, &registry, &names) {
                Ok(expr) => {
                    println!("{}", expr);
                    Ok(())
                }
                Err(TacalcError::SyntaxRejected(e)) => {
                    eprintln!("{}", e.display_with_context(source));
                    Err(TacalcError::SyntaxRejected(e))
                }
                Err(e) => Err(e),
            }
        }
        (None, None) => Err(TacalcError::InvalidDefinition {
            reason: "check needs --indicator or --expr".into(),
        }),
    }
}

fn run_evaluate(
    config_path: &Path,
    mut request: EvaluationRequest,
    params: &[String],
) -> Result<(), TacalcError> {
    request.overrides = parse_overrides(params)?;
    let (config, storage) = open(config_path)?;
    let settings = EngineSettings::from_config(&config)?;
    let registry = storage.load_registry()?;
    let output = evaluate_named_indicator(&*storage, &*storage, &registry, &settings, &request)?;
    print_json(&output)
}

/// Parse `NAME=VALUE` pairs; values that are not valid JSON become strings.
pub fn parse_overrides(params: &[String]) -> Result<JsonMap, TacalcError> {
    let mut overrides = JsonMap::new();
    for param in params {
        let (name, raw) = param
            .split_once('=')
            .ok_or_else(|| TacalcError::InvalidDefinition {
                reason: format!("parameter override '{}' must be NAME=VALUE", param),
            })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TacalcError::InvalidDefinition {
                reason: format!("parameter override '{}' has an empty name", param),
            });
        }
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        overrides.insert(name.to_string(), value);
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_parse_json_and_fall_back_to_strings() {
        let params = vec![
            "n=14".to_string(),
            "label=fast".to_string(),
            "weights=[1, 2]".to_string(),
            "off=null".to_string(),
        ];
        let overrides = parse_overrides(&params).unwrap();
        assert_eq!(overrides["n"], json!(14));
        assert_eq!(overrides["label"], json!("fast"));
        assert_eq!(overrides["weights"], json!([1, 2]));
        assert_eq!(overrides["off"], serde_json::Value::Null);
    }

    #[test]
    fn overrides_reject_malformed_pairs() {
        assert!(parse_overrides(&["n".to_string()]).is_err());
        assert!(parse_overrides(&["=3".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_evaluate() {
        let cli = Cli::try_parse_from([
            "tacalc",
            "evaluate",
            "-c",
            "tacalc.ini",
            "rsi_14",
            "--symbol",
            "BTCUSDT",
            "--timeframe",
            "5m",
            "--param",
            "n=10",
        ])
        .unwrap();
        match cli.command {
            Command::Evaluate {
                indicator,
                timeframe,
                params,
                lookback,
                ..
            } => {
                assert_eq!(indicator, "rsi_14");
                assert_eq!(timeframe, "5m");
                assert_eq!(params, vec!["n=10"]);
                assert_eq!(lookback, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn check_rejects_both_modes() {
        let result = Cli::try_parse_from([
            "tacalc",
            "check",
            "--indicator",
            "x",
            "--expr",
            "close",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn check_expression_without_config() {
        assert!(run_check(None, None, Some("sma(close, 3) - close"), &[]).is_ok());
        assert!(run_check(None, None, Some("n * close"), &["n".to_string()]).is_ok());
        assert!(matches!(
            run_check(None, None, Some("__import__('os')"), &[]),
            Err(TacalcError::UnknownFunction { .. })
        ));
        assert!(matches!(
            run_check(None, None, Some("close.real"), &[]),
            Err(TacalcError::SyntaxRejected(_))
        ));
        assert!(run_check(None, None, None, &[]).is_err());
    }
}

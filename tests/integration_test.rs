//! End-to-end indicator evaluation: stored definition, price bars,
//! resampling, exec plan and output shaping.

mod common;

use approx::assert_abs_diff_eq;
use chrono::Duration;
use common::*;
use serde_json::json;
use std::sync::Arc;
use tacalc::adapters::sqlite_adapter::SqliteAdapter;
use tacalc::domain::config_validation::EngineSettings;
use tacalc::domain::definition::{IndicatorPatch, JsonMap};
use tacalc::domain::error::TacalcError;
use tacalc::domain::evaluation::{EvaluationRequest, OutputPoint, evaluate_named_indicator};
use tacalc::domain::exec_plan;
use tacalc::domain::ohlcv::PriceFrame;
use tacalc::domain::registry::{FunctionRegistry, native_catalog};
use tacalc::domain::value::Value;
use tacalc::ports::catalog_port::CatalogPort;
use tacalc::ports::definition_port::DefinitionStore;
use tacalc::ports::storage_port::StoragePort;

fn request(indicator: &str, timeframe: &str, lookback: usize) -> EvaluationRequest {
    EvaluationRequest {
        indicator: indicator.to_string(),
        symbol: "BTCUSDT".to_string(),
        timeframe: timeframe.to_string(),
        lookback: Some(lookback),
        overrides: JsonMap::new(),
    }
}

fn spread_indicator() -> tacalc::domain::definition::NewIndicator {
    indicator(
        "sma_spread",
        Some(plan(
            &[("fast", "sma(close, fast_n)"), ("slow", "sma(close, slow_n)")],
            "fast - slow",
        )),
        object(json!({"fast_n": 2, "slow_n": 4})),
    )
}

mod mock_ports {
    use super::*;

    fn setup() -> (MockStore, MockBarPort) {
        let store = MockStore::new();
        store.create(spread_indicator()).unwrap();
        let bars = MockBarPort::new().with_bars(minute_bars("BTCUSDT", 60, 100.0));
        (store, bars)
    }

    #[test]
    fn base_timeframe_evaluation() {
        let (store, bars) = setup();
        let registry = FunctionRegistry::native();
        let output = evaluate_named_indicator(
            &store,
            &bars,
            &registry,
            &EngineSettings::default(),
            &request("sma_spread", "1m", 5),
        )
        .unwrap();

        let points: Vec<OutputPoint> = output.values().cloned().collect();
        assert_eq!(
            points,
            vec![
                OutputPoint::Missing,
                OutputPoint::Missing,
                OutputPoint::Missing,
                OutputPoint::Scalar(1.0),
                OutputPoint::Scalar(1.0),
            ]
        );
        assert_eq!(
            *output.keys().next_back().unwrap(),
            t0() + Duration::minutes(59)
        );
        assert_eq!(
            bars.requests.borrow().as_slice(),
            &[("BTCUSDT".to_string(), "1m".to_string(), 5)]
        );
    }

    #[test]
    fn overrides_replace_parameters() {
        let (store, bars) = setup();
        let mut req = request("sma_spread", "1m", 5);
        req.overrides = object(json!({"slow_n": 3}));
        let output = evaluate_named_indicator(
            &store,
            &bars,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &req,
        )
        .unwrap();
        let points: Vec<OutputPoint> = output.values().cloned().collect();
        assert_eq!(points[1], OutputPoint::Missing);
        assert_eq!(points[2], OutputPoint::Scalar(0.5));
        assert_eq!(points[4], OutputPoint::Scalar(0.5));

        let stored = store.read("sma_spread").unwrap().unwrap();
        assert_eq!(stored.parameters["slow_n"], json!(4));
    }

    #[test]
    fn resampled_evaluation_fetches_enough_base_bars() {
        let store = MockStore::new();
        store
            .create(indicator("close_only", Some(plan(&[], "close")), JsonMap::new()))
            .unwrap();
        let bars = MockBarPort::new().with_bars(minute_bars("BTCUSDT", 60, 100.0));

        let output = evaluate_named_indicator(
            &store,
            &bars,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &request("close_only", "5m", 3),
        )
        .unwrap();

        assert_eq!(
            bars.requests.borrow().as_slice(),
            &[("BTCUSDT".to_string(), "1m".to_string(), 20)]
        );
        let entries: Vec<_> = output.into_iter().collect();
        assert_eq!(
            entries,
            vec![
                (t0() + Duration::minutes(45), OutputPoint::Scalar(149.0)),
                (t0() + Duration::minutes(50), OutputPoint::Scalar(154.0)),
                (t0() + Duration::minutes(55), OutputPoint::Scalar(159.0)),
            ]
        );
    }

    #[test]
    fn comprehension_produces_vector_points() {
        let store = MockStore::new();
        store
            .create(indicator(
                "ribbon",
                Some(plan(&[], "[sma(close, n) for n in windows]")),
                object(json!({"windows": [1, 2]})),
            ))
            .unwrap();
        let bars = MockBarPort::new().with_bars(minute_bars("BTCUSDT", 3, 100.0));

        let output = evaluate_named_indicator(
            &store,
            &bars,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &request("ribbon", "1m", 3),
        )
        .unwrap();
        let points: Vec<OutputPoint> = output.values().cloned().collect();
        assert_eq!(points[0], OutputPoint::Vector(vec![Some(100.0), None]));
        assert_eq!(
            points[2],
            OutputPoint::Vector(vec![Some(102.0), Some(101.5)])
        );
    }

    #[test]
    fn missing_exec_plan() {
        let store = MockStore::new();
        store
            .create(indicator("no_plan", None, JsonMap::new()))
            .unwrap();
        let bars = MockBarPort::new().with_bars(minute_bars("BTCUSDT", 5, 100.0));
        let err = evaluate_named_indicator(
            &store,
            &bars,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &request("no_plan", "1m", 5),
        )
        .unwrap_err();
        assert!(matches!(err, TacalcError::MissingExecPlan { .. }));
    }

    #[test]
    fn unknown_indicator_is_not_found() {
        let (store, bars) = setup();
        let err = evaluate_named_indicator(
            &store,
            &bars,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &request("nope", "1m", 5),
        )
        .unwrap_err();
        assert!(matches!(err, TacalcError::NotFound { .. }));
        assert!(bars.requests.borrow().is_empty());
    }

    #[test]
    fn hostile_step_is_rejected_before_evaluation() {
        let store = MockStore::new();
        for (name, expr) in [
            ("dunder", "close.__class__"),
            ("import", "__import__('os')"),
            ("lambda", "(lambda: 1)()"),
        ] {
            store
                .create(indicator(name, Some(plan(&[("x", expr)], "x")), JsonMap::new()))
                .unwrap();
        }
        let bars = MockBarPort::new().with_bars(minute_bars("BTCUSDT", 5, 100.0));
        let eval = |name: &str| {
            evaluate_named_indicator(
                &store,
                &bars,
                &FunctionRegistry::native(),
                &EngineSettings::default(),
                &request(name, "1m", 5),
            )
        };

        assert!(matches!(eval("dunder"), Err(TacalcError::SyntaxRejected(_))));
        assert!(matches!(
            eval("import"),
            Err(TacalcError::UnknownFunction { .. })
        ));
        assert!(matches!(eval("lambda"), Err(TacalcError::SyntaxRejected(_))));
    }

    #[test]
    fn null_parameter_read_is_environment_error() {
        let store = MockStore::new();
        store
            .create(indicator(
                "needs_n",
                Some(plan(&[("x", "sma(close, n)")], "x")),
                object(json!({"n": null})),
            ))
            .unwrap();
        let bars = MockBarPort::new().with_bars(minute_bars("BTCUSDT", 5, 100.0));
        let err = evaluate_named_indicator(
            &store,
            &bars,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &request("needs_n", "1m", 5),
        )
        .unwrap_err();
        assert!(matches!(err, TacalcError::EnvironmentError { .. }));

        let mut req = request("needs_n", "1m", 5);
        req.overrides = object(json!({"n": 2}));
        assert!(
            evaluate_named_indicator(
                &store,
                &bars,
                &FunctionRegistry::native(),
                &EngineSettings::default(),
                &req,
            )
            .is_ok()
        );
    }

    #[test]
    fn bar_port_errors_propagate() {
        let (store, _) = setup();
        let bars = MockBarPort::new().with_error("BTCUSDT", "connection reset");
        let err = evaluate_named_indicator(
            &store,
            &bars,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &request("sma_spread", "1m", 5),
        )
        .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn invalid_timeframe_rejected() {
        let (store, bars) = setup();
        for tf in ["7x", "90s"] {
            let err = evaluate_named_indicator(
                &store,
                &bars,
                &FunctionRegistry::native(),
                &EngineSettings::default(),
                &request("sma_spread", tf, 5),
            )
            .unwrap_err();
            assert!(
                matches!(err, TacalcError::InvalidTimeframe { .. }),
                "{tf}: {err}"
            );
        }
    }

    #[test]
    fn delete_collapses_storage_failure_to_false() {
        let store = MockStore::new().with_delete_error("disk I/O error");
        let id = store.create(spread_indicator()).unwrap().id;

        let err = store.try_delete(&id).unwrap_err();
        assert!(matches!(err, TacalcError::DatabaseQuery { .. }));
        assert!(!store.delete(&id));
        assert!(store.read(&id).unwrap().is_some());
    }

    #[test]
    fn delete_reports_removed_rows() {
        let (store, _) = setup();
        let id = store.read("sma_spread").unwrap().unwrap().id;
        assert!(store.delete(&id));
        assert!(!store.delete(&id));
    }
}

mod sqlite_store {
    use super::*;

    fn storage() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter.seed_catalog(&native_catalog()).unwrap();
        adapter
    }

    #[test]
    fn evaluate_from_stored_bars_and_catalog() {
        let storage = storage();
        storage
            .insert_bars(&minute_bars("BTCUSDT", 60, 100.0))
            .unwrap();
        let created = storage.create(spread_indicator()).unwrap();
        let registry = storage.load_registry().unwrap();

        let output = evaluate_named_indicator(
            &storage,
            &storage,
            &registry,
            &EngineSettings::default(),
            &request(&created.id, "5m", 4),
        )
        .unwrap();

        assert_eq!(output.len(), 4);
        // 5m closes step by 5, so sma(2) - sma(4) is 5.0 once both are warm.
        let last = output.values().next_back().unwrap();
        assert_eq!(*last, OutputPoint::Scalar(5.0));
    }

    #[test]
    fn update_then_evaluate_uses_new_plan() {
        let storage = storage();
        storage
            .insert_bars(&minute_bars("BTCUSDT", 10, 100.0))
            .unwrap();
        let created = storage.create(spread_indicator()).unwrap();
        let patch = IndicatorPatch {
            exec_plan: Some(plan(&[], "close * 2")),
            ..Default::default()
        };
        storage.update(&created.id, patch).unwrap();

        let output = evaluate_named_indicator(
            &storage,
            &storage,
            &FunctionRegistry::native(),
            &EngineSettings::default(),
            &request("sma_spread", "1m", 1),
        )
        .unwrap();
        assert_eq!(
            output.values().next().unwrap(),
            &OutputPoint::Scalar(218.0)
        );
    }

    #[test]
    fn concurrent_creates_with_same_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tacalc.db");
        let storage = SqliteAdapter::open(path.to_str().unwrap(), 4).unwrap();
        storage.initialize_schema().unwrap();
        let storage = Arc::new(storage);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = Arc::clone(&storage);
                std::thread::spawn(move || storage.create(spread_indicator()))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let created = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(TacalcError::DuplicateName { .. })))
            .count();
        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(storage.list(10, 0).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_updates_all_apply() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tacalc.db");
        let storage = SqliteAdapter::open(path.to_str().unwrap(), 8).unwrap();
        storage.initialize_schema().unwrap();
        let id = storage.create(spread_indicator()).unwrap().id;
        let storage = Arc::new(storage);

        for round in 0..5 {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let storage = Arc::clone(&storage);
                    let id = id.clone();
                    std::thread::spawn(move || {
                        // Even threads patch the description, odd ones the category.
                        let patch = if i % 2 == 0 {
                            IndicatorPatch {
                                description: Some(format!("d{round}-{i}")),
                                ..Default::default()
                            }
                        } else {
                            IndicatorPatch {
                                category: Some(format!("c{round}-{i}")),
                                ..Default::default()
                            }
                        };
                        storage.update(&id, patch)
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }

            let stored = storage.read(&id).unwrap().unwrap();
            assert!(stored.description.starts_with(&format!("d{round}-")));
            assert!(stored.category.starts_with(&format!("c{round}-")));
        }
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn registry_is_shared_across_evaluations() {
        let registry = Arc::new(FunctionRegistry::native());
        let bars = minute_bars("BTCUSDT", 30, 100.0);
        let frame = Arc::new(PriceFrame::from_bars(&bars));
        let store = MockStore::new();
        let def = store.create(spread_indicator()).unwrap();
        let def = Arc::new(def);

        let handles: Vec<_> = (2..6)
            .map(|slow| {
                let registry = Arc::clone(&registry);
                let frame = Arc::clone(&frame);
                let def = Arc::clone(&def);
                std::thread::spawn(move || {
                    let overrides = object(json!({"slow_n": slow}));
                    exec_plan::run(&def, &frame, &registry, &overrides)
                })
            })
            .collect();

        for (slow, handle) in (2..6).zip(handles) {
            let value = handle.join().unwrap().unwrap();
            let Value::Series(s) = value else {
                panic!("expected series");
            };
            let expected = (slow as f64 - 2.0) / 2.0;
            assert_abs_diff_eq!(s[29], expected, epsilon = 1e-9);
        }
    }
}

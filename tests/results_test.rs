//! Result aggregation integration tests: grouping by parameter tuple,
//! column flattening, and the silent-skip policy for missing fields.

use std::path::Path;

use anyhow::Result;
use tempfile::TempDir;

use sweepstore::config::Settings;
use sweepstore::experiment::Experiment;
use sweepstore::value::{Map, Value};
use sweepstore::Error;

fn settings_for(root: &Path) -> Settings {
    Settings {
        experiment_index: root.join("experiment.index"),
        ..Settings::default()
    }
}

fn sweep_payload(n: i64, p: f64, energies: &[f64]) -> Map {
    let mut parameters = Map::new();
    parameters.insert("N".to_string(), Value::Int(n));
    parameters.insert("P".to_string(), Value::Float(p));
    let mut results = Map::new();
    results.insert(
        "energy".to_string(),
        Value::Float(energies.iter().sum::<f64>()),
    );
    results.insert(
        "energies".to_string(),
        Value::Seq(energies.iter().map(|&e| Value::Float(e)).collect()),
    );
    let mut map = Map::new();
    map.insert("parameters".to_string(), Value::Map(parameters));
    map.insert("results".to_string(), Value::Map(results));
    map
}

fn sweep_experiment(root: &TempDir) -> Result<Experiment> {
    let mut experiment = Experiment::builder(root.path().join("exp"))
        .settings(settings_for(root.path()))
        .open()?;
    // Two measurements at N=2, one at N=4.
    for (n, p, energies) in [
        (2, 0.1, [-1.0, -2.0]),
        (2, 0.2, [-1.5, -2.5]),
        (4, 0.1, [-3.0, -4.0]),
    ] {
        let mut m = experiment.new_measurement()?;
        m.start();
        m.end();
        m.save_data(sweep_payload(n, p, &energies))?;
    }
    Ok(experiment)
}

#[test]
fn test_one_table_per_distinct_parameter_tuple() -> Result<()> {
    let root = TempDir::new()?;
    let experiment = sweep_experiment(&root)?;

    let tables = experiment.retrieve_results(
        &[("P", "parameters/P"), ("E", "results/energy")],
        &[("N", "parameters/N")],
    )?;

    assert_eq!(tables.len(), 2);
    let first = &tables[0];
    assert_eq!(first.parameters().get("N")?, &Value::Int(2));
    assert_eq!(first.columns(), ["P", "E"]);
    assert_eq!(
        first.rows(),
        [
            vec![Value::Float(0.1), Value::Float(-3.0)],
            vec![Value::Float(0.2), Value::Float(-4.0)],
        ]
    );
    assert_eq!(first.measurement_ids(), [Some(1), Some(2)]);

    let second = &tables[1];
    assert_eq!(second.parameters().get("N")?, &Value::Int(4));
    assert_eq!(second.rows().len(), 1);
    Ok(())
}

#[test]
fn test_sequence_columns_flatten_into_numbered_names() -> Result<()> {
    let root = TempDir::new()?;
    let experiment = sweep_experiment(&root)?;

    let tables = experiment.retrieve_results(
        &[("e", "results/energies")],
        &[("N", "parameters/N")],
    )?;

    let first = &tables[0];
    assert_eq!(first.columns(), ["e_1", "e_2"]);
    assert_eq!(
        first.rows()[0],
        vec![Value::Float(-1.0), Value::Float(-2.0)]
    );
    Ok(())
}

#[test]
fn test_records_missing_a_field_are_skipped() -> Result<()> {
    let root = TempDir::new()?;
    let mut experiment = sweep_experiment(&root)?;

    // A fourth measurement without the "energy" field does not contribute
    // and does not fail the aggregation.
    let mut m = experiment.new_measurement()?;
    let mut map = Map::new();
    let mut parameters = Map::new();
    parameters.insert("N".to_string(), Value::Int(2));
    map.insert("parameters".to_string(), Value::Map(parameters));
    m.save_data(map)?;

    let tables = experiment.retrieve_results(
        &[("E", "results/energy")],
        &[("N", "parameters/N")],
    )?;
    let total_rows: usize = tables.iter().map(|t| t.rows().len()).sum();
    assert_eq!(total_rows, 3);
    Ok(())
}

#[test]
fn test_mismatched_column_signature_is_fatal() -> Result<()> {
    let root = TempDir::new()?;
    let mut experiment = sweep_experiment(&root)?;

    // Same parameter tuple (N=2) but a different number of energies, so the
    // flattened column signature changes.
    let mut m = experiment.new_measurement()?;
    m.save_data(sweep_payload(2, 0.3, &[-1.0, -2.0, -3.0]))?;

    let result = experiment.retrieve_results(
        &[("e", "results/energies")],
        &[("N", "parameters/N")],
    );
    assert!(matches!(result, Err(Error::State(_))));
    Ok(())
}

#[test]
fn test_wildcard_paths_in_aggregation() -> Result<()> {
    let root = TempDir::new()?;
    let experiment = sweep_experiment(&root)?;

    // The wildcard expands every parameter value into the grouping tuple.
    let tables = experiment.retrieve_results(
        &[("E", "results/energy")],
        &[("ps", "parameters/*")],
    )?;
    assert_eq!(tables.len(), 3);
    Ok(())
}

#[test]
fn test_aggregation_over_an_inactive_experiment() -> Result<()> {
    let root = TempDir::new()?;
    let mut experiment = sweep_experiment(&root)?;
    experiment.deactivate()?;

    let tables = experiment.retrieve_results(
        &[("P", "parameters/P"), ("E", "results/energy")],
        &[("N", "parameters/N")],
    )?;
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].rows().len(), 2);
    Ok(())
}

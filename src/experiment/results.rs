//! Result retrieval: parameter sets and rectangular result tables.
//!
//! Aggregation turns a pile of measurement records into one table per
//! distinct parameter tuple. Each record is evaluated against two path-
//! query definitions: the parameter-set definition derives the grouping
//! tuple, the table definition derives the row. A record failing any of
//! those lookups simply does not contribute (it has not computed that
//! quantity); that is the one place in the crate where a failure is
//! swallowed.

use std::fmt;

use crate::value::path::DataPath;
use crate::value::Value;
use crate::{Error, Result};

use super::Measurement;

/// A named tuple of parameter values, interpreted through a definition of
/// `(short name, path)` pairs.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    definition: Vec<(String, String)>,
    values: Vec<Value>,
}

impl ParameterSet {
    /// Build a parameter set; the number of values must equal the number of
    /// definition entries.
    ///
    /// # Errors
    ///
    /// Returns a state error on an arity mismatch.
    pub fn new(definition: Vec<(String, String)>, values: Vec<Value>) -> Result<Self> {
        if definition.len() != values.len() {
            return Err(Error::State(
                "parameter set definition and provided parameters do not agree".to_string(),
            ));
        }
        Ok(Self { definition, values })
    }

    /// The `(short name, path)` definition.
    #[must_use]
    pub fn definition(&self) -> &[(String, String)] {
        &self.definition
    }

    /// The parameter values, in definition order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Whether `name` is a short name or path of this set.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.definition
            .iter()
            .any(|(short, path)| short == name || path == name)
    }

    /// The value for a short name or path.
    ///
    /// # Errors
    ///
    /// Returns a lookup error when the name is not part of the definition.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.definition
            .iter()
            .position(|(short, path)| short == name || path == name)
            .map(|i| &self.values[i])
            .ok_or_else(|| {
                Error::Lookup(format!(
                    "parameter \"{name}\" does not exist in this parameter set"
                ))
            })
    }

    /// The value at a definition position.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, ((short, _), value)) in self.definition.iter().zip(&self.values).enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{short}={value:?}")?;
        }
        write!(f, ")")
    }
}

/// One rectangular table of results for one distinct parameter tuple.
#[derive(Debug, Clone)]
pub struct ResultTable {
    parameters: ParameterSet,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    measurement_ids: Vec<Option<u64>>,
}

impl ResultTable {
    /// The parameter tuple all rows of this table share.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Column names, with sequence-valued entries flattened to
    /// `name_1, name_2, …`.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Table rows, one per contributing measurement.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Ids of the contributing measurements, row by row.
    #[must_use]
    pub fn measurement_ids(&self) -> &[Option<u64>] {
        &self.measurement_ids
    }
}

/// Element-wise NaN-aware tuple equality.
pub(crate) fn values_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.content_eq(y))
}

/// Group measurement records into result tables.
///
/// See [`Experiment::retrieve_results`](super::Experiment::retrieve_results)
/// for the caller-facing contract.
pub(crate) fn aggregate(
    measurements: &[Measurement],
    table_def: &[(&str, &str)],
    pset_def: &[(&str, &str)],
) -> Result<Vec<ResultTable>> {
    let table_paths: Vec<(String, DataPath)> = table_def
        .iter()
        .map(|(name, path)| ((*name).to_string(), DataPath::parse(path)))
        .collect();
    let pset_paths: Vec<(String, DataPath)> = pset_def
        .iter()
        .map(|(name, path)| ((*name).to_string(), DataPath::parse(path)))
        .collect();

    struct Group {
        key: Vec<Value>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        ids: Vec<Option<u64>>,
    }
    let mut groups: Vec<Group> = Vec::new();

    'records: for measurement in measurements {
        let record = measurement.record();

        let mut key = Vec::with_capacity(pset_paths.len());
        for (_, path) in &pset_paths {
            match path.lookup(&record) {
                Ok(value) => key.push(value),
                Err(Error::Lookup(_)) => continue 'records,
                Err(e) => return Err(e),
            }
        }

        let mut columns = Vec::with_capacity(table_paths.len());
        let mut row = Vec::with_capacity(table_paths.len());
        for (name, path) in &table_paths {
            let value = match path.lookup(&record) {
                Ok(value) => value,
                Err(Error::Lookup(_)) => continue 'records,
                Err(e) => return Err(e),
            };
            if let Value::Seq(items) = value {
                flatten_sequence(name, &items, &mut columns, &mut row);
            } else {
                columns.push(name.clone());
                row.push(value);
            }
        }

        match groups.iter_mut().find(|g| values_eq(&g.key, &key)) {
            Some(group) => {
                if group.columns != columns {
                    return Err(Error::State(
                        "different columns in the results table for the same set of parameters"
                            .to_string(),
                    ));
                }
                group.rows.push(row);
                group.ids.push(measurement.id());
            }
            None => groups.push(Group {
                key,
                columns,
                rows: vec![row],
                ids: vec![measurement.id()],
            }),
        }
    }

    let definition: Vec<(String, String)> = pset_def
        .iter()
        .map(|(name, path)| ((*name).to_string(), (*path).to_string()))
        .collect();
    groups
        .into_iter()
        .map(|group| {
            Ok(ResultTable {
                parameters: ParameterSet::new(definition.clone(), group.key)?,
                columns: group.columns,
                rows: group.rows,
                measurement_ids: group.ids,
            })
        })
        .collect()
}

/// Flatten a sequence-valued column into `name_1, name_2, …` entries,
/// recursing into nested sequences (`name_1_2`).
fn flatten_sequence(name: &str, items: &[Value], columns: &mut Vec<String>, row: &mut Vec<Value>) {
    for (i, item) in items.iter().enumerate() {
        let sub_name = format!("{name}_{}", i + 1);
        if let Value::Seq(nested) = item {
            flatten_sequence(&sub_name, nested, columns, row);
        } else {
            columns.push(sub_name);
            row.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_set_arity() {
        let definition = vec![("n".to_string(), "parameters/n".to_string())];
        assert!(ParameterSet::new(definition.clone(), vec![]).is_err());
        assert!(ParameterSet::new(definition, vec![Value::Int(1)]).is_ok());
    }

    #[test]
    fn test_parameter_set_lookup_by_either_name() {
        let definition = vec![("n".to_string(), "parameters/n".to_string())];
        let pset = ParameterSet::new(definition, vec![Value::Int(4)]).unwrap();
        assert_eq!(pset.get("n").unwrap(), &Value::Int(4));
        assert_eq!(pset.get("parameters/n").unwrap(), &Value::Int(4));
        assert!(pset.get("m").is_err());
        assert!(pset.has("n"));
        assert!(!pset.has("m"));
    }

    #[test]
    fn test_flatten_sequence_names() {
        let mut columns = Vec::new();
        let mut row = Vec::new();
        flatten_sequence(
            "e",
            &[
                Value::Int(1),
                Value::Seq(vec![Value::Int(2), Value::Int(3)]),
            ],
            &mut columns,
            &mut row,
        );
        assert_eq!(columns, vec!["e_1", "e_2_1", "e_2_2"]);
        assert_eq!(row, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}

//! Resolved configuration values.
//!
//! The core never parses configuration files; an embedding application
//! loads these values however it likes (the struct derives serde for that
//! purpose) and hands them over fully resolved.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::Format;

/// Resolved settings for archives, experiments and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Experiment filename template; `${experiment_id}` expands to a
    /// zero-padded six-digit id or the literal `none`.
    pub experiment_file: String,
    /// Location of the shared experiment counter, used as given (absolute,
    /// or relative to the process working directory).
    pub experiment_index: PathBuf,
    /// Measurement filename template; `${measurement_id}` expands like the
    /// experiment id.
    pub measurement_file: String,
    /// Measurement counter filename, relative to the experiment directory.
    pub measurement_index: String,
    /// Format used when none can be inferred from existing files.
    pub default_format: Format,
    /// Whether archives are written with indentation.
    pub pretty_print: bool,
    /// Indent width for pretty-printed archives.
    pub indent: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            experiment_file: "experiment.${experiment_id}".to_string(),
            experiment_index: PathBuf::from("experiment.index"),
            measurement_file: "measurement.${measurement_id}".to_string(),
            measurement_index: "measurement.index".to_string(),
            default_format: Format::Json,
            pretty_print: true,
            indent: 2,
        }
    }
}

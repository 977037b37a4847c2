//! # Sweepstore: File-Backed Persistence for Parameter-Sweep Experiments
//!
//! Sweepstore persists scientific-experiment data (parameter sweeps and
//! their measured results) as human-readable XML or JSON files behind a
//! uniform, format-agnostic value model.
//!
//! ## Architecture (leaf to root)
//!
//! - [`value`]: a dynamic tree of primitives, ordered mappings, sequences,
//!   typed arrays, and captured objects, plus path queries over it
//! - [`codec`]: bidirectional mappings between the value model and the two
//!   text formats, with float specials (`NaN`, `Infinity`, `-Infinity`) as
//!   first-class tokens in both
//! - [`archive`]: per-basename persistence that infers the on-disk format,
//!   resolves ambiguity, and offers a backup-rename write for crash safety
//! - [`index`]: a lock-file-guarded monotonic counter for id allocation
//! - [`experiment`]: the Active/Inactive storage state machine over
//!   measurements, with read-back verification on every transition, a
//!   parameter-sweep driver, and result aggregation into tables
//!
//! ## Example
//!
//! ```rust,no_run
//! use sweepstore::experiment::Experiment;
//! use sweepstore::value::{Map, Value};
//!
//! let mut experiment = Experiment::open("example_dir")?;
//! let mut measurement = experiment.new_measurement()?;
//! measurement.start();
//! let mut payload = Map::new();
//! payload.insert("result".to_string(), Value::Float(0.5));
//! measurement.end();
//! measurement.save_data(payload)?;
//! # Ok::<(), sweepstore::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod experiment;
pub mod index;
pub mod value;

pub use error::{Error, Result};

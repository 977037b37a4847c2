//! Measurement records.
//!
//! A measurement is one computed data point of an experiment: an id, start
//! and end timestamps, and an arbitrary payload mapping. In an Active
//! experiment each measurement is backed by its own archive file; in an
//! Inactive experiment measurements live as embedded records inside the
//! experiment's archive and carry no file of their own.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::archive::{archive_exists, Archive};
use crate::config::Settings;
use crate::value::path::DataPath;
use crate::value::{Map, Serializer, Stateful, Value};
use crate::{Error, Result};

use super::{decode_id, id_value, parse_timestamp, timestamp_now, timestamp_value};

/// Archive name and root tag of measurement files.
pub(crate) const MEASUREMENT_ARCHIVE_NAME: &str = "measurement";

/// One measured data point.
#[derive(Debug, Clone)]
pub struct Measurement {
    id: Option<u64>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    data: Map,
    archive: Option<Archive>,
}

impl Measurement {
    /// Bind a measurement to its own archive file, loading the file when
    /// any encoding of it already exists.
    ///
    /// # Errors
    ///
    /// Returns an ambiguity error for several existing encodings and a
    /// format error when an existing file does not decode to a measurement
    /// record.
    pub fn create(
        filename: impl AsRef<Path>,
        id: Option<u64>,
        settings: &Settings,
    ) -> Result<Self> {
        let filename = filename.as_ref();
        let archive = Archive::open(filename, Some(MEASUREMENT_ARCHIVE_NAME), settings)?;
        let mut measurement = Self {
            id,
            start_date: None,
            end_date: None,
            data: Map::new(),
            archive: Some(archive),
        };
        if archive_exists(filename) {
            measurement.load()?;
        }
        Ok(measurement)
    }

    /// Build a measurement from an embedded record (no backing file). The
    /// record's `info` block is normalized the same way [`Measurement::set_data`]
    /// normalizes it.
    ///
    /// # Errors
    ///
    /// Returns a format error when the record is not a mapping or is
    /// missing its `info` block.
    pub fn from_record(record: Value) -> Result<Self> {
        let Value::Map(data) = record else {
            return Err(Error::Format(
                "measurement record is not a mapping".to_string(),
            ));
        };
        if data.get("info").and_then(Value::as_map).is_none() {
            return Err(Error::Format(
                "measurement record is missing its \"info\" block".to_string(),
            ));
        }
        let mut measurement = Self {
            id: None,
            start_date: None,
            end_date: None,
            data: Map::new(),
            archive: None,
        };
        measurement.set_data(data);
        let (id, start, end) = {
            let info = measurement
                .data
                .get("info")
                .and_then(Value::as_map)
                .ok_or_else(|| {
                    Error::Format("measurement record is missing its \"info\" block".to_string())
                })?;
            (
                info.get("measurement_id").cloned(),
                info.get("start_date").cloned(),
                info.get("end_date").cloned(),
            )
        };
        measurement.id = decode_id(id.as_ref())?;
        measurement.start_date = parse_timestamp(start.as_ref())?;
        measurement.end_date = parse_timestamp(end.as_ref())?;
        Ok(measurement)
    }

    /// The measurement id, if one has been assigned.
    #[must_use]
    pub const fn id(&self) -> Option<u64> {
        self.id
    }

    /// The start timestamp, if the measurement has started.
    #[must_use]
    pub const fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    /// The end timestamp, if the measurement has ended.
    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// The full record mapping (payload plus normalized `info` block).
    #[must_use]
    pub const fn data(&self) -> &Map {
        &self.data
    }

    /// The backing archive file, for file-backed measurements.
    #[must_use]
    pub fn filename(&self) -> Option<&Path> {
        self.archive.as_ref().map(Archive::filename)
    }

    /// The record as a value tree.
    #[must_use]
    pub fn record(&self) -> Value {
        Value::Map(self.data.clone())
    }

    /// Stamp the start timestamp with the current time.
    pub fn start(&mut self) {
        self.start_date = Some(timestamp_now());
    }

    /// Stamp the end timestamp with the current time.
    pub fn end(&mut self) {
        self.end_date = Some(timestamp_now());
    }

    /// Replace the payload, normalizing the `info` block: `measurement_id`,
    /// `start_date` and `end_date` always come first (filled from this
    /// measurement), with any caller-supplied `info` entries merged over
    /// them.
    pub fn set_data(&mut self, payload: Map) {
        let mut info = Map::new();
        info.insert("measurement_id".to_string(), id_value(self.id));
        info.insert("start_date".to_string(), timestamp_value(self.start_date));
        info.insert("end_date".to_string(), timestamp_value(self.end_date));

        let mut data = Map::with_capacity(payload.len() + 1);
        let supplied = payload.get("info").and_then(Value::as_map).cloned();
        if let Some(supplied) = supplied {
            for (key, value) in supplied {
                info.insert(key, value);
            }
            for (key, value) in payload {
                if key == "info" {
                    data.insert(key, Value::Map(info.clone()));
                } else {
                    data.insert(key, value);
                }
            }
        } else {
            data.insert("info".to_string(), Value::Map(info));
            data.extend(payload);
        }
        self.data = data;
    }

    /// Write the record to the backing archive.
    ///
    /// # Errors
    ///
    /// Returns a state error for embedded measurements (no backing file)
    /// and IO/format errors from the archive.
    pub fn save(&self) -> Result<()> {
        let archive = self.archive.as_ref().ok_or_else(|| {
            Error::State("cannot save a measurement that has no backing file".to_string())
        })?;
        archive.save(&Value::Map(self.data.clone()))
    }

    /// Replace the payload and write it to the backing archive.
    ///
    /// # Errors
    ///
    /// Same as [`Measurement::save`].
    pub fn save_data(&mut self, payload: Map) -> Result<()> {
        self.set_data(payload);
        self.save()
    }

    /// Capture a payload object through the state-extraction protocol and
    /// write it; the record carries the object's type tag as its
    /// `__class__` marker.
    ///
    /// # Errors
    ///
    /// Same as [`Measurement::save`].
    pub fn save_object(&mut self, payload: &dyn Stateful) -> Result<()> {
        let data = Serializer::lower(&Serializer::capture(payload)).unwrap_or_default();
        self.save_data(data)
    }

    /// Reload the record from the backing archive.
    ///
    /// # Errors
    ///
    /// Returns a state error for embedded measurements, plus IO/format
    /// errors from the archive.
    pub fn load(&mut self) -> Result<()> {
        let archive = self.archive.as_ref().ok_or_else(|| {
            Error::State("cannot load a measurement that has no backing file".to_string())
        })?;
        let document = archive.load()?;
        let loaded = Self::from_record(document)?;
        self.id = loaded.id;
        self.start_date = loaded.start_date;
        self.end_date = loaded.end_date;
        self.data = loaded.data;
        Ok(())
    }

    /// Look up a value inside the record by path (e.g.
    /// `"parameters/N"` or `"results/energies/2"`).
    ///
    /// # Errors
    ///
    /// Returns a lookup error when the path does not resolve.
    pub fn get(&self, path: &str) -> Result<Value> {
        DataPath::parse(path).lookup(&self.record())
    }
}

//! Experiment persistence state machine.
//!
//! An experiment owns a directory. Its measurements live in one of two
//! storage states:
//!
//! - **Active**: every measurement is its own archive file, named by a
//!   template over its id; ids come from a lock-guarded counter file in the
//!   directory.
//! - **Inactive**: all measurements are embedded as a list inside the
//!   experiment's own archive; no per-measurement files and no counter file
//!   exist.
//!
//! [`Experiment::deactivate`] and [`Experiment::activate`] move between the
//! states. Both write the destination representation first, read it back,
//! and compare count and per-record content (NaN-aware) against what was
//! read from the source representation before deleting anything; a mismatch
//! is a fatal integrity error that deliberately leaves the directory as-is
//! for manual inspection; there is no automatic rollback.
//!
//! Experiment saves go through the backup-rename write, so the previous
//! file content survives a crash as `<file>.backup`.

mod measurement;
mod results;

pub use measurement::Measurement;
pub use results::{ParameterSet, ResultTable};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use tracing::{debug, info};

use crate::archive::{archive_exists, Archive};
use crate::codec::Format;
use crate::config::Settings;
use crate::index::{IndexFile, IndexKind};
use crate::value::path::DataPath;
use crate::value::{Map, Value};
use crate::{Error, Result};

use measurement::MEASUREMENT_ARCHIVE_NAME;

/// Archive name and root tag of experiment files.
const EXPERIMENT_ARCHIVE_NAME: &str = "experiment";

/// Template placeholder for experiment ids.
const EXPERIMENT_ID_KEY: &str = "experiment_id";
/// Template placeholder for measurement ids.
const MEASUREMENT_ID_KEY: &str = "measurement_id";

/// Storage state of an experiment's measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    /// Measurements are individual archive files plus a counter file.
    Active,
    /// Measurements are embedded in the experiment's archive.
    Inactive,
}

/// A persisted experiment: metadata, a measurement store, and a parameter
/// sweep driver.
#[derive(Debug)]
pub struct Experiment {
    dir: PathBuf,
    id: Option<u64>,
    description: Option<String>,
    tags: Vec<String>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    embedded: Option<Vec<Value>>,
    archive: Archive,
    mindex: IndexFile,
    settings: Settings,
    pset_definition: Vec<(String, String)>,
    psets: Vec<Vec<Value>>,
}

/// Builder for opening or creating an [`Experiment`].
#[derive(Debug)]
pub struct ExperimentBuilder {
    dir: PathBuf,
    id: Option<u64>,
    description: Option<String>,
    tags: Vec<String>,
    settings: Settings,
}

impl ExperimentBuilder {
    /// Builder over an experiment directory.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            id: None,
            description: None,
            tags: Vec::new(),
            settings: Settings::default(),
        }
    }

    /// Expect (when loading) or assign (when creating) this experiment id.
    #[must_use]
    pub fn id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Description for a newly created experiment.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Tags for a newly created experiment.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Use non-default settings.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Load or create the experiment.
    ///
    /// # Errors
    ///
    /// See [`Experiment::open`].
    pub fn open(self) -> Result<Experiment> {
        Experiment::from_builder(self)
    }
}

impl Experiment {
    /// Load or create an experiment in `dir` with default settings.
    ///
    /// The directory is created when absent. With no matching experiment
    /// file on disk a new experiment is created: an id is drawn from the
    /// shared experiment counter when that counter exists (otherwise the id
    /// stays unassigned), and a fresh measurement counter is written. With
    /// exactly one matching file the experiment is loaded, adopting the id
    /// encoded in the filename when the caller supplied none. With several
    /// matching files the one matching the supplied id is loaded.
    ///
    /// # Errors
    ///
    /// Returns an ambiguity error when several files match but none fits
    /// the supplied id, an identity error when a loaded file records a
    /// different id than the caller supplied, and IO/format errors from
    /// the underlying archives.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        ExperimentBuilder::new(dir).open()
    }

    /// Start building with a custom id, description, tags or settings.
    #[must_use]
    pub fn builder(dir: impl AsRef<Path>) -> ExperimentBuilder {
        ExperimentBuilder::new(dir)
    }

    fn from_builder(builder: ExperimentBuilder) -> Result<Self> {
        let ExperimentBuilder {
            dir,
            id,
            description,
            tags,
            settings,
        } = builder;

        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let eindex = IndexFile::new(&settings.experiment_index, IndexKind::Experiment, &settings)?;
        let mindex = IndexFile::new(
            dir.join(&settings.measurement_index),
            IndexKind::Measurement,
            &settings,
        )?;
        let matches = matching_files(&dir, &settings.experiment_file, EXPERIMENT_ID_KEY)?;

        match matches.len() {
            0 => {
                let id = match id {
                    Some(id) => Some(id),
                    None if eindex.exists() => Some(eindex.increment()?),
                    None => None,
                };
                let filename =
                    dir.join(fill_template(&settings.experiment_file, EXPERIMENT_ID_KEY, id));
                let archive = Archive::open(filename, Some(EXPERIMENT_ARCHIVE_NAME), &settings)?;
                let mut experiment = Self {
                    dir,
                    id,
                    description,
                    tags,
                    start_date: None,
                    end_date: None,
                    embedded: None,
                    archive,
                    mindex,
                    settings,
                    pset_definition: Vec::new(),
                    psets: Vec::new(),
                };
                experiment.mindex.create()?;
                experiment.save()?;
                experiment.load()?;
                info!(
                    dir = %experiment.dir.display(),
                    id = %display_id(experiment.id),
                    "created experiment"
                );
                Ok(experiment)
            }
            1 => {
                let (file_id, stem) = &matches[0];
                let id = id.or(*file_id);
                let archive =
                    Archive::open(dir.join(stem), Some(EXPERIMENT_ARCHIVE_NAME), &settings)?;
                let mut experiment = Self {
                    dir,
                    id,
                    description,
                    tags,
                    start_date: None,
                    end_date: None,
                    embedded: None,
                    archive,
                    mindex,
                    settings,
                    pset_definition: Vec::new(),
                    psets: Vec::new(),
                };
                experiment.load()?;
                Ok(experiment)
            }
            _ => {
                let stem = id
                    .and_then(|want| {
                        matches
                            .iter()
                            .find(|(file_id, _)| *file_id == Some(want))
                            .map(|(_, stem)| stem.clone())
                    })
                    .ok_or_else(|| {
                        Error::Ambiguity(
                            "found multiple experiment files, none of which match the provided experiment id"
                                .to_string(),
                        )
                    })?;
                let archive =
                    Archive::open(dir.join(stem), Some(EXPERIMENT_ARCHIVE_NAME), &settings)?;
                let mut experiment = Self {
                    dir,
                    id,
                    description,
                    tags,
                    start_date: None,
                    end_date: None,
                    embedded: None,
                    archive,
                    mindex,
                    settings,
                    pset_definition: Vec::new(),
                    psets: Vec::new(),
                };
                experiment.load()?;
                Ok(experiment)
            }
        }
    }

    /// The experiment directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The experiment id, if one is assigned.
    #[must_use]
    pub const fn id(&self) -> Option<u64> {
        self.id
    }

    /// The experiment's archive file.
    #[must_use]
    pub fn filename(&self) -> &Path {
        self.archive.filename()
    }

    /// The description, if set.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the description (persisted on the next save).
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// The tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Replace the tags (persisted on the next save).
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
    }

    /// The start timestamp, if the experiment has been started.
    #[must_use]
    pub const fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    /// The end timestamp, if the experiment has been ended.
    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// Current storage state.
    #[must_use]
    pub const fn storage_state(&self) -> StorageState {
        if self.embedded.is_none() {
            StorageState::Active
        } else {
            StorageState::Inactive
        }
    }

    /// Whether measurements are stored as individual files.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.embedded.is_none()
    }

    /// Stamp the start timestamp with the current time.
    pub fn start(&mut self) {
        self.start_date = Some(timestamp_now());
    }

    /// Stamp the end timestamp with the current time.
    pub fn end(&mut self) {
        self.end_date = Some(timestamp_now());
    }

    /// Serialize metadata (and, when Inactive, the embedded measurements)
    /// to the experiment archive with a backup-rename write.
    ///
    /// # Errors
    ///
    /// Returns IO/format errors from the archive; a failed write leaves
    /// the previous content as `<file>.backup`.
    pub fn save(&self) -> Result<()> {
        let mut doc = Map::new();
        doc.insert("info".to_string(), Value::Map(self.info_block()));
        if let Some(embedded) = &self.embedded {
            doc.insert("measurements".to_string(), Value::Seq(embedded.clone()));
        }
        self.archive.save_with_backup(&Value::Map(doc))
    }

    /// Reload metadata (and the embedded measurements) from the archive.
    ///
    /// # Errors
    ///
    /// Returns an identity error when the file records a different id than
    /// this experiment carries, plus IO/format errors.
    pub fn load(&mut self) -> Result<()> {
        let document = self.archive.load()?;
        let map = document
            .as_map()
            .ok_or_else(|| Error::Format("experiment document is not a mapping".to_string()))?;
        let info = map.get("info").and_then(Value::as_map).ok_or_else(|| {
            Error::Format("experiment document is missing its \"info\" block".to_string())
        })?;

        let recorded = decode_id(info.get(EXPERIMENT_ID_KEY))?;
        if let Some(expected) = self.id {
            if recorded != Some(expected) {
                return Err(Error::Identity {
                    expected: expected.to_string(),
                    found: display_id(recorded),
                    file: self.archive.filename().to_path_buf(),
                });
            }
        }
        self.id = recorded;

        if let Some(value) = info.get("description") {
            self.description = match value {
                Value::Null => None,
                Value::Str(s) => Some(s.clone()),
                other => {
                    return Err(Error::Format(format!(
                        "experiment description {other:?} is not a string"
                    )))
                }
            };
        }
        if let Some(value) = info.get("tags") {
            self.tags = decode_tags(value)?;
        }
        if let Some(value) = info.get("start_date") {
            self.start_date = parse_timestamp(Some(value))?;
        }
        if let Some(value) = info.get("end_date") {
            self.end_date = parse_timestamp(Some(value))?;
        }

        self.embedded = match map.get("measurements") {
            None => None,
            Some(Value::Seq(items)) => Some(items.clone()),
            Some(other) => {
                return Err(Error::Format(format!(
                    "embedded measurements {other:?} are not a sequence"
                )))
            }
        };
        Ok(())
    }

    /// Allocate the next measurement id from the counter and return a fresh
    /// file-backed measurement for the caller to fill in and save.
    ///
    /// # Errors
    ///
    /// Returns a state error when the experiment is Inactive or a file for
    /// the allocated id already exists, and a resource-busy error when the
    /// counter is locked.
    pub fn new_measurement(&mut self) -> Result<Measurement> {
        if !self.is_active() {
            return Err(Error::State(
                "cannot create a new measurement for an inactive experiment".to_string(),
            ));
        }
        let id = self.mindex.increment()?;
        let filename = self.measurement_path(Some(id));
        if archive_exists(&filename) {
            return Err(Error::State(format!(
                "cannot create measurement with id {id}: the measurement already exists"
            )));
        }
        debug!(dir = %self.dir.display(), id, "allocated measurement");
        Measurement::create(filename, Some(id), &self.settings)
    }

    /// All measurements, from files (Active, in id order, skipping gaps) or
    /// from the embedded list (Inactive).
    ///
    /// # Errors
    ///
    /// Returns IO/format errors from the measurement archives.
    pub fn measurements(&self) -> Result<Vec<Measurement>> {
        if self.is_active() {
            self.file_measurements()
        } else {
            self.memory_measurements()
        }
    }

    /// Number of measurements in the current storage state.
    ///
    /// # Errors
    ///
    /// Returns IO errors from scanning the directory (Active only).
    pub fn measurement_count(&self) -> Result<usize> {
        match &self.embedded {
            Some(embedded) => Ok(embedded.len()),
            None => {
                let last = self.mindex.get()?;
                let files = self.matching_measurement_files()?;
                Ok(files
                    .iter()
                    .filter(|(id, _)| id.is_some_and(|id| id >= 1 && id <= last))
                    .count())
            }
        }
    }

    /// Move Active → Inactive: read every measurement file in id order,
    /// embed the records in the experiment archive, verify the written
    /// file by reloading and comparing count and per-record content, then
    /// delete the measurement files and the counter.
    ///
    /// # Errors
    ///
    /// Returns a state error when the experiment is already Inactive and a
    /// fatal integrity error when the read-back comparison disagrees; in
    /// that case nothing is deleted and the directory is left for manual
    /// inspection.
    pub fn deactivate(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::State("experiment already is inactive".to_string()));
        }
        let files = self.file_measurements()?;
        let records: Vec<Value> = files.iter().map(Measurement::record).collect();

        self.embedded = Some(records.clone());
        self.save()?;
        self.load()?;

        let reloaded = self.embedded.as_deref().unwrap_or_default();
        let verified = reloaded.len() == records.len()
            && reloaded
                .iter()
                .zip(&records)
                .all(|(a, b)| a.content_eq(b));
        if !verified {
            return Err(Error::Integrity(
                "could not deactivate experiment; leaving it in a possibly inconsistent state, please investigate by hand"
                    .to_string(),
            ));
        }

        for measurement in &files {
            if let Some(path) = measurement.filename() {
                fs::remove_file(path)?;
            }
        }
        self.mindex.remove()?;
        info!(dir = %self.dir.display(), count = records.len(), "deactivated experiment");
        Ok(())
    }

    /// Move Inactive → Active: write every embedded record as its own file
    /// (refusing to overwrite), seed a fresh counter with the largest id
    /// observed, verify the files by reading them back and comparing count
    /// and per-record content, then clear the embedded list.
    ///
    /// # Errors
    ///
    /// Returns a state error when the experiment is already Active or a
    /// target file exists, and a fatal integrity error when the read-back
    /// comparison disagrees (same policy as [`Experiment::deactivate`]).
    pub fn activate(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::State("experiment already is active".to_string()));
        }
        let records = self.embedded.clone().unwrap_or_default();
        let sources = records
            .iter()
            .map(|record| Measurement::from_record(record.clone()))
            .collect::<Result<Vec<_>>>()?;

        let mut last_id = 0;
        for source in &sources {
            let filename = self.measurement_path(source.id());
            if archive_exists(&filename) {
                return Err(Error::State(format!(
                    "cannot create measurement with id {}: the measurement already exists",
                    display_id(source.id())
                )));
            }
            let mut target = Measurement::create(&filename, source.id(), &self.settings)?;
            target.set_data(source.data().clone());
            target.save()?;
            if let Some(id) = source.id() {
                last_id = last_id.max(id);
            }
        }
        self.mindex.create()?;
        self.mindex.set(last_id)?;

        let files = self.file_measurements()?;
        let verified = files.len() == sources.len()
            && files
                .iter()
                .zip(&sources)
                .all(|(a, b)| a.record().content_eq(&b.record()));
        if !verified {
            return Err(Error::Integrity(
                "could not activate experiment; leaving it in a possibly inconsistent state, please investigate by hand"
                    .to_string(),
            ));
        }

        self.embedded = None;
        self.save()?;
        self.load()?;
        info!(dir = %self.dir.display(), count = sources.len(), "activated experiment");
        Ok(())
    }

    /// Clear the timestamps and delete every measurement (files and counter
    /// range when Active, the embedded list when Inactive), then save.
    ///
    /// # Errors
    ///
    /// Returns IO errors from file removal and archive errors from the
    /// save.
    pub fn reset(&mut self) -> Result<()> {
        self.start_date = None;
        self.end_date = None;
        if self.is_active() {
            let last = self.mindex.get()?;
            self.mindex.create()?;
            for (id, stem) in self.matching_measurement_files()? {
                let Some(id) = id else { continue };
                if id < 1 || id > last {
                    continue;
                }
                let archive =
                    Archive::open(self.dir.join(&stem), Some(MEASUREMENT_ARCHIVE_NAME), &self.settings)?;
                fs::remove_file(archive.filename())?;
            }
        } else {
            self.embedded = Some(Vec::new());
        }
        self.save()
    }

    /// Define the parameters of this experiment as `(short name, path)`
    /// pairs; the path locates each parameter inside a measurement record.
    pub fn define_parameter_set(&mut self, definition: &[(&str, &str)]) {
        self.pset_definition = definition
            .iter()
            .map(|(name, path)| ((*name).to_string(), (*path).to_string()))
            .collect();
    }

    /// Add one parameter tuple, interpreted through the defined parameter
    /// set.
    pub fn add_parameter_set(&mut self, values: Vec<Value>) {
        self.psets.push(values);
    }

    /// Remove all previously added parameter tuples.
    pub fn clear_parameter_sets(&mut self) {
        self.psets = Vec::new();
    }

    /// Run `function` for every parameter tuple that has no measurement
    /// yet, storing each result as a measurement, and stamp the experiment
    /// timestamps. Returns `(computed, total)` tuple counts.
    ///
    /// A tuple counts as computed when an existing record resolves all
    /// defined parameter paths to equal values; records failing a lookup
    /// are simply not counted.
    ///
    /// # Errors
    ///
    /// Returns the first error from the callback or from measurement
    /// allocation and saving.
    pub fn run<F>(&mut self, mut function: F) -> Result<(usize, usize)>
    where
        F: FnMut(&ParameterSet) -> Result<Map>,
    {
        let existing = self.existing_parameter_tuples()?;
        let todo: Vec<Vec<Value>> = self
            .psets
            .iter()
            .filter(|values| !existing.iter().any(|seen| results::values_eq(seen, values)))
            .cloned()
            .collect();

        self.start();
        for values in &todo {
            let pset = ParameterSet::new(self.pset_definition.clone(), values.clone())?;
            let mut measurement = self.new_measurement()?;
            measurement.start();
            let payload = function(&pset)?;
            measurement.end();
            measurement.save_data(payload)?;
        }
        self.end();
        self.save()?;
        Ok((todo.len(), self.psets.len()))
    }

    /// Group measurement records into one result table per distinct
    /// parameter tuple.
    ///
    /// `table_def` and `pset_def` are `(column name, path)` pairs. A record
    /// failing any lookup does not contribute. Sequence-valued columns are
    /// flattened into `name_1, name_2, …` sub-columns named by the first
    /// row of the group; a later row with a different column signature is a
    /// fatal error.
    ///
    /// # Errors
    ///
    /// Returns a state error on a column-signature mismatch and IO/format
    /// errors from reading measurements.
    pub fn retrieve_results(
        &self,
        table_def: &[(&str, &str)],
        pset_def: &[(&str, &str)],
    ) -> Result<Vec<ResultTable>> {
        results::aggregate(&self.measurements()?, table_def, pset_def)
    }

    fn info_block(&self) -> Map {
        let mut info = Map::new();
        info.insert(EXPERIMENT_ID_KEY.to_string(), id_value(self.id));
        info.insert(
            "description".to_string(),
            self.description
                .as_ref()
                .map_or(Value::Null, |s| Value::Str(s.clone())),
        );
        info.insert(
            "tags".to_string(),
            Value::Seq(self.tags.iter().map(|t| Value::Str(t.clone())).collect()),
        );
        info.insert("start_date".to_string(), timestamp_value(self.start_date));
        info.insert("end_date".to_string(), timestamp_value(self.end_date));
        info
    }

    fn file_measurements(&self) -> Result<Vec<Measurement>> {
        let mut out = Vec::new();
        for id in 1..=self.mindex.get()? {
            let filename = self.measurement_path(Some(id));
            if archive_exists(&filename) {
                out.push(Measurement::create(filename, Some(id), &self.settings)?);
            }
        }
        Ok(out)
    }

    fn memory_measurements(&self) -> Result<Vec<Measurement>> {
        self.embedded
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|record| Measurement::from_record(record.clone()))
            .collect()
    }

    fn existing_parameter_tuples(&self) -> Result<Vec<Vec<Value>>> {
        let paths: Vec<DataPath> = self
            .pset_definition
            .iter()
            .map(|(_, path)| DataPath::parse(path))
            .collect();
        let mut out = Vec::new();
        'records: for measurement in self.measurements()? {
            let record = measurement.record();
            let mut tuple = Vec::with_capacity(paths.len());
            for path in &paths {
                match path.lookup(&record) {
                    Ok(value) => tuple.push(value),
                    Err(Error::Lookup(_)) => continue 'records,
                    Err(e) => return Err(e),
                }
            }
            out.push(tuple);
        }
        Ok(out)
    }

    fn measurement_path(&self, id: Option<u64>) -> PathBuf {
        self.dir
            .join(fill_template(&self.settings.measurement_file, MEASUREMENT_ID_KEY, id))
    }

    fn matching_measurement_files(&self) -> Result<Vec<(Option<u64>, String)>> {
        matching_files(&self.dir, &self.settings.measurement_file, MEASUREMENT_ID_KEY)
    }
}

/// Substitute a `${key}` placeholder with a zero-padded six-digit id, or
/// the literal `none` when no id is assigned.
fn fill_template(template: &str, key: &str, id: Option<u64>) -> String {
    let placeholder = format!("${{{key}}}");
    let id_text = id.map_or_else(|| "none".to_string(), |n| format!("{n:06}"));
    template.replace(&placeholder, &id_text)
}

/// Match a filename stem (extension already stripped) against a template,
/// returning the embedded id (`None` for the `none` sentinel) on a match.
fn match_template(template: &str, key: &str, stem: &str) -> Option<Option<u64>> {
    let placeholder = format!("${{{key}}}");
    match template.find(&placeholder) {
        None => (stem == template).then_some(None),
        Some(pos) => {
            let prefix = &template[..pos];
            let suffix = &template[pos + placeholder.len()..];
            let middle = stem.strip_prefix(prefix)?.strip_suffix(suffix)?;
            if middle == "none" {
                Some(None)
            } else if !middle.is_empty() && middle.bytes().all(|b| b.is_ascii_digit()) {
                middle.parse::<u64>().ok().map(Some)
            } else {
                None
            }
        }
    }
}

/// Files in `dir` whose names match the template under any known extension,
/// as `(id, stem)` pairs, deduplicated and sorted by id.
fn matching_files(
    dir: &Path,
    template: &str,
    key: &str,
) -> Result<Vec<(Option<u64>, String)>> {
    let mut out: Vec<(Option<u64>, String)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        for format in Format::ALL {
            let Some(stem) = name.strip_suffix(&format!(".{}", format.extension())) else {
                continue;
            };
            if let Some(id) = match_template(template, key, stem) {
                if !out.iter().any(|(seen_id, seen)| *seen_id == id && seen == stem) {
                    out.push((id, stem.to_string()));
                }
            }
        }
    }
    out.sort();
    Ok(out)
}

pub(crate) fn timestamp_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

pub(crate) fn timestamp_value(timestamp: Option<DateTime<Utc>>) -> Value {
    timestamp.map_or(Value::Null, |t| {
        Value::Str(t.to_rfc3339_opts(SecondsFormat::Secs, true))
    })
}

pub(crate) fn parse_timestamp(value: Option<&Value>) -> Result<Option<DateTime<Utc>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| Error::Format(format!("invalid timestamp \"{s}\": {e}"))),
        Some(other) => Err(Error::Format(format!(
            "timestamp {other:?} is not a string"
        ))),
    }
}

#[allow(clippy::cast_possible_wrap)]
pub(crate) fn id_value(id: Option<u64>) -> Value {
    id.map_or(Value::Null, |n| Value::Int(n as i64))
}

pub(crate) fn decode_id(value: Option<&Value>) -> Result<Option<u64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Int(i)) => u64::try_from(*i)
            .map(Some)
            .map_err(|_| Error::Format(format!("id {i} is negative"))),
        Some(other) => Err(Error::Format(format!("id {other:?} is not an integer"))),
    }
}

pub(crate) fn display_id(id: Option<u64>) -> String {
    id.map_or_else(|| "none".to_string(), |n| n.to_string())
}

fn decode_tags(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Seq(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    Error::Format(format!("experiment tag {item:?} is not a string"))
                })
            })
            .collect(),
        other => Err(Error::Format(format!(
            "experiment tags {other:?} are not a sequence"
        ))),
    }
}

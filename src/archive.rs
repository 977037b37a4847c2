//! Archives: basename-scoped persistence units.
//!
//! An archive binds a basename to exactly one codec and one file. The
//! format comes from the basename's extension when it carries a recognized
//! one; otherwise from whichever encoded file already exists on disk (more
//! than one is an unrecoverable ambiguity); otherwise from the configured
//! default. Callers that only need to know whether *any* encoding of a
//! basename exists use [`archive_exists`] and never commit to a format.
//!
//! Two write paths exist. [`Archive::save`] is a plain truncate-and-write
//! (a torn write is possible; callers needing strict atomicity serialize
//! through the lock file). [`Archive::save_with_backup`] renames the old
//! file to `<path>.backup` first and removes the backup only after the new
//! content is on disk, so a crash mid-write leaves the prior content
//! recoverable; recovery is manual, never automatic.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec::{Format, JsonCodec, XmlCodec};
use crate::config::Settings;
use crate::value::{Serializer, Value};
use crate::{Error, Result};

/// A basename bound to one codec and one on-disk file.
#[derive(Debug, Clone)]
pub struct Archive {
    basename: PathBuf,
    filename: PathBuf,
    format: Format,
    name: Option<String>,
    pretty: bool,
    indent: usize,
    serializer: Serializer,
}

impl Archive {
    /// Bind `filename` to a format.
    ///
    /// When `filename` carries a recognized extension, basename and format
    /// follow from it directly. Otherwise the filesystem is inspected: no
    /// existing encoding uses the settings' default format, exactly one
    /// adopts that file's format.
    ///
    /// # Errors
    ///
    /// Returns an ambiguity error when several encodings of the basename
    /// exist.
    pub fn open(
        filename: impl AsRef<Path>,
        name: Option<&str>,
        settings: &Settings,
    ) -> Result<Self> {
        let (basename, format) = resolve_basename_and_format(filename.as_ref(), settings)?;
        let filename = path_with_extension(&basename, format);
        Ok(Self {
            basename,
            filename,
            format,
            name: name.map(ToString::to_string),
            pretty: settings.pretty_print,
            indent: settings.indent,
            serializer: Serializer::new(),
        })
    }

    /// Replace the serializer used by this archive's codec (e.g. to enable
    /// object restoration on load).
    #[must_use]
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// The file this archive reads and writes.
    #[must_use]
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The resolved format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Whether this archive's file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.filename.exists()
    }

    /// Load and decode the archive's file.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be read and a format error
    /// when its content does not decode.
    pub fn load(&self) -> Result<Value> {
        debug!(file = %self.filename.display(), format = %self.format, "loading archive");
        let text = fs::read_to_string(&self.filename)?;
        self.decode(self.format, &text)
    }

    /// Encode and write a value to the archive's file (plain truncate-and-
    /// write).
    ///
    /// # Errors
    ///
    /// Returns a format error when the value cannot be encoded and an IO
    /// error when the file cannot be written.
    pub fn save(&self, value: &Value) -> Result<()> {
        debug!(file = %self.filename.display(), format = %self.format, "saving archive");
        let text = self.encode(self.format, value)?;
        fs::write(&self.filename, text)?;
        Ok(())
    }

    /// Write a sibling file in another format, leaving this archive's
    /// resolved format and file untouched. With the archive's own format
    /// this is identical to [`Archive::save`].
    ///
    /// # Errors
    ///
    /// Same as [`Archive::save`].
    pub fn save_as(&self, value: &Value, format: Format) -> Result<()> {
        if format == self.format {
            return self.save(value);
        }
        let sibling = path_with_extension(&self.basename, format);
        debug!(file = %sibling.display(), format = %format, "saving sibling archive");
        let text = self.encode(format, value)?;
        fs::write(sibling, text)?;
        Ok(())
    }

    /// Save with the backup-rename pattern: an existing file is renamed to
    /// `<path>.backup` before the write, and the backup is removed only
    /// after the write succeeded. After a crash the backup is left in place
    /// for manual recovery.
    ///
    /// # Errors
    ///
    /// Same as [`Archive::save`]; a failed write leaves the backup file on
    /// disk.
    pub fn save_with_backup(&self, value: &Value) -> Result<()> {
        let backup = backup_path(&self.filename);
        if self.filename.exists() {
            fs::rename(&self.filename, &backup)?;
        }
        self.save(value)?;
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        Ok(())
    }

    fn encode(&self, format: Format, value: &Value) -> Result<String> {
        match format {
            Format::Json => JsonCodec::new(self.name.as_deref())
                .with_pretty(self.pretty)
                .with_indent(self.indent)
                .with_serializer(self.serializer.clone())
                .encode_to_string(value),
            Format::Xml => XmlCodec::new(self.name.as_deref())
                .with_pretty(self.pretty)
                .with_indent(self.indent)
                .with_serializer(self.serializer.clone())
                .encode_to_string(value),
        }
    }

    fn decode(&self, format: Format, text: &str) -> Result<Value> {
        match format {
            Format::Json => JsonCodec::new(self.name.as_deref())
                .with_serializer(self.serializer.clone())
                .decode_str(text),
            Format::Xml => XmlCodec::new(self.name.as_deref())
                .with_serializer(self.serializer.clone())
                .decode_str(text),
        }
    }
}

/// Whether any known encoding of `filename` exists: the literal path when
/// it already carries a recognized extension, or `<filename>.<ext>` for any
/// known extension otherwise.
#[must_use]
pub fn archive_exists(filename: impl AsRef<Path>) -> bool {
    let filename = filename.as_ref();
    if known_extension(filename).is_some() && filename.exists() {
        return true;
    }
    Format::ALL
        .into_iter()
        .any(|format| path_with_extension(filename, format).exists())
}

/// The backup sibling of a path: `<path>.backup`.
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(".backup");
    PathBuf::from(os)
}

/// `<basename>.<ext>` without touching any existing extension.
pub(crate) fn path_with_extension(basename: &Path, format: Format) -> PathBuf {
    let mut os: OsString = basename.as_os_str().to_os_string();
    os.push(".");
    os.push(format.extension());
    PathBuf::from(os)
}

fn known_extension(path: &Path) -> Option<Format> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Format::from_extension)
}

fn resolve_basename_and_format(filename: &Path, settings: &Settings) -> Result<(PathBuf, Format)> {
    // An explicit recognized extension pins both basename and format.
    if let Some(format) = known_extension(filename) {
        return Ok((filename.with_extension(""), format));
    }

    let candidates: Vec<Format> = Format::ALL
        .into_iter()
        .filter(|format| path_with_extension(filename, *format).exists())
        .collect();
    match candidates.as_slice() {
        [] => Ok((filename.to_path_buf(), settings.default_format)),
        [format] => Ok((filename.to_path_buf(), *format)),
        _ => Err(Error::Ambiguity(format!(
            "found multiple files for archive \"{}\"",
            filename.display()
        ))),
    }
}

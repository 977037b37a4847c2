//! Text codecs mapping the value model onto concrete on-disk encodings.
//!
//! Both codecs speak the same document conventions: an archive name becomes
//! the XML root tag / the single JSON top-level key, float specials travel
//! as the literal tokens `NaN`, `Infinity`, `-Infinity`, and the escape
//! hatches of the value model (typed arrays, captured objects) are lowered
//! to marked mappings by [`Serializer`](crate::value::Serializer). A value
//! encoded by one codec and moved to the other format decodes to the same
//! tree.

mod json;
mod xml;

pub use json::JsonCodec;
pub use xml::XmlCodec;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// On-disk archive format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON-style encoding (`.json`).
    Json,
    /// XML-style encoding (`.xml`).
    Xml,
}

impl Format {
    /// All known formats, in resolution scan order.
    pub const ALL: [Self; 2] = [Self::Json, Self::Xml];

    /// The filename extension for this format, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }

    /// The format matching a filename extension, if any.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
            .ok_or_else(|| Error::Configuration(format!("unsupported archive format: {s}")))
    }
}

/// Literal token for NaN in both encodings.
pub(crate) const NAN_TOKEN: &str = "NaN";
/// Literal token for +Infinity in both encodings.
pub(crate) const INF_TOKEN: &str = "Infinity";
/// Literal token for -Infinity in both encodings.
pub(crate) const NEG_INF_TOKEN: &str = "-Infinity";

/// Canonical text for a float: special tokens for non-finite values,
/// otherwise serde_json's shortest representation (which always carries a
/// fraction or an exponent, keeping floats distinguishable from integers).
pub(crate) fn format_float(f: f64) -> Result<String> {
    if f.is_nan() {
        Ok(NAN_TOKEN.to_string())
    } else if f == f64::INFINITY {
        Ok(INF_TOKEN.to_string())
    } else if f == f64::NEG_INFINITY {
        Ok(NEG_INF_TOKEN.to_string())
    } else {
        Ok(serde_json::to_string(&f)?)
    }
}

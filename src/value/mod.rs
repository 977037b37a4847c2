//! Dynamic value model for experiment data.
//!
//! Every document that enters or leaves an archive is a [`Value`] tree:
//! primitives, insertion-ordered mappings, sequences, and two escape hatches
//! for payloads the primitive set cannot express: dense numeric arrays
//! ([`TypedArray`]) and arbitrary caller objects captured through the
//! state-extraction protocol ([`ObjectRecord`], see [`state`]).
//!
//! Float specials (NaN, ±Infinity) are first-class members; both codecs
//! encode them as literal tokens. Because NaN breaks ordinary equality,
//! verification code compares trees with [`Value::content_eq`].

mod state;

pub mod path;

pub use state::{ObjectRecord, Serializer, Stateful, TypeRegistry, ARRAY_TAG, CLASS_KEY, TYPE_KEY};

use indexmap::IndexMap;

use crate::{Error, Result};

/// Insertion-ordered mapping from string keys to values.
pub type Map = IndexMap<String, Value>;

/// A node in the dynamic value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value; encodes as empty element text / JSON `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double-precision float, including NaN and ±Infinity.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered sequence.
    Seq(Vec<Value>),
    /// Insertion-ordered mapping with unique keys.
    Map(Map),
    /// Dense numeric array with an explicit shape.
    Array(TypedArray),
    /// Captured state of an arbitrary caller object.
    Object(ObjectRecord),
}

impl Value {
    /// Boolean payload, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload; an `Int` is widened.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String slice, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Sequence elements, if this is a `Seq`.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Self::Seq(s) => Some(s),
            _ => None,
        }
    }

    /// Mapping, if this is a `Map`.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Typed array, if this is an `Array`.
    #[must_use]
    pub const fn as_array(&self) -> Option<&TypedArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Whether this is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Mapping entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Sequence element by index.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.as_seq().and_then(|s| s.get(index))
    }

    /// Structural equality with NaN equal to NaN.
    ///
    /// Mappings compare entry-by-entry *in insertion order*; the same
    /// entries in a different order are not equal. This is the comparator
    /// used by the activate/deactivate read-back verification and by
    /// round-trip tests.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => float_eq(*a, *b),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Seq(a), Self::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.content_eq(y))
            }
            (Self::Map(a), Self::Map(b)) => map_content_eq(a, b),
            (Self::Array(a), Self::Array(b)) => {
                a.shape == b.shape
                    && a.data.len() == b.data.len()
                    && a.data.iter().zip(&b.data).all(|(x, y)| float_eq(*x, *y))
            }
            (Self::Object(a), Self::Object(b)) => {
                a.class_id == b.class_id && map_content_eq(&a.state, &b.state)
            }
            _ => false,
        }
    }
}

fn float_eq(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

fn map_content_eq(a: &Map, b: &Map) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && va.content_eq(vb))
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(s: Vec<Value>) -> Self {
        Self::Seq(s)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Self::Map(m)
    }
}

impl From<TypedArray> for Value {
    fn from(a: TypedArray) -> Self {
        Self::Array(a)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::Null, Into::into)
    }
}

/// Dense row-major numeric array with an explicit shape.
///
/// Typed arrays bypass the state-extraction protocol entirely: they encode
/// as `{"__type__": "array", "shape": [...], "data": [...]}` and are
/// reconstructed on decode regardless of whether object restoration is
/// enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TypedArray {
    /// Create a typed array, verifying that `data` holds exactly
    /// `shape.iter().product()` elements.
    ///
    /// # Errors
    ///
    /// Returns a format error on a shape/data length mismatch.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::Format(format!(
                "typed array data length {} does not match shape {:?} (expected {})",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array over `data`.
    #[must_use]
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// The array shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flattened row-major elements.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at a flat (row-major) index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.data.get(index).copied()
    }
}

//! State-extraction protocol and object restoration.
//!
//! Arbitrary caller objects enter the value model by implementing
//! [`Stateful`]: the object renders itself as an ordered mapping
//! (`extract_state`) and can be rebuilt from one (`inject_state`). On the
//! wire the captured state travels as an ordinary mapping carrying a
//! `__class__` entry with the object's type tag.
//!
//! Restoration is opt-in per [`Serializer`]. When enabled, decoded mappings
//! carrying `__class__` are resolved through a [`TypeRegistry`] populated by
//! the embedding application; an unregistered tag is a lookup error. When
//! disabled, such mappings pass through untouched so callers can inspect a
//! document without the concrete types being linked in.
//!
//! Typed arrays are not part of this protocol: their `__type__` marker is
//! recognized unconditionally.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{Map, TypedArray, Value};
use crate::{Error, Result};

/// Mapping key carrying the type tag of a captured object.
pub const CLASS_KEY: &str = "__class__";

/// Mapping key marking built-in encoded types.
pub const TYPE_KEY: &str = "__type__";

/// `__type__` value marking an encoded typed array.
pub const ARRAY_TAG: &str = "array";

/// Captured state of an arbitrary caller object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Type tag resolving the concrete type in a [`TypeRegistry`].
    pub class_id: String,
    /// Extracted state, without the `__class__` marker.
    pub state: Map,
}

/// Capability interface for payload objects.
///
/// Implemented by any type whose instances should survive a trip through an
/// archive. The type tag is an arbitrary stable string; the embedding
/// application registers the same tag with its [`TypeRegistry`] to enable
/// restoration.
pub trait Stateful {
    /// Stable type tag written as the `__class__` marker.
    fn type_tag(&self) -> &str;

    /// Render the object's state as an ordered mapping.
    fn extract_state(&self) -> Map;

    /// Rebuild the object's state from a decoded mapping.
    ///
    /// # Errors
    ///
    /// Returns an error when the mapping is missing required entries or
    /// holds values of the wrong kind.
    fn inject_state(&mut self, state: &Map) -> Result<()>;
}

type Factory = Box<dyn Fn() -> Box<dyn Stateful> + Send + Sync>;

/// Registry resolving type tags to factory closures.
///
/// Populated by the embedding application at startup; an unknown tag fails
/// with a typed lookup error instead of any dynamic import mechanism.
#[derive(Default)]
pub struct TypeRegistry {
    factories: BTreeMap<String, Factory>,
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a type tag. A later registration for the same
    /// tag replaces the earlier one.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Stateful> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Box::new(factory));
    }

    /// Whether a factory is registered for `tag`.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Build a live object from a captured record: construct a default
    /// instance via the registered factory and inject the record's state.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unregistered tag, or whatever
    /// `inject_state` reports.
    pub fn instantiate(&self, record: &ObjectRecord) -> Result<Box<dyn Stateful>> {
        let factory = self.factories.get(&record.class_id).ok_or_else(|| {
            Error::Lookup(format!(
                "no factory registered for type tag \"{}\"",
                record.class_id
            ))
        })?;
        let mut object = factory();
        object.inject_state(&record.state)?;
        Ok(object)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Lowers and raises the value model's escape hatches for the codecs.
///
/// Both codecs hand every mapping they decode through [`Serializer::raise`]
/// (bottom-up, one level at a time) and lower [`Value::Array`] /
/// [`Value::Object`] nodes to plain mappings on encode. Object restoration
/// is governed by the `restore_objects` flag; typed arrays are always
/// reconstructed.
#[derive(Clone)]
pub struct Serializer {
    restore_objects: bool,
    registry: Arc<TypeRegistry>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self {
            restore_objects: false,
            registry: Arc::new(TypeRegistry::new()),
        }
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("restore_objects", &self.restore_objects)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Serializer {
    /// Serializer that passes unknown-object mappings through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer that restores objects through `registry`.
    #[must_use]
    pub fn restoring(registry: Arc<TypeRegistry>) -> Self {
        Self {
            restore_objects: true,
            registry,
        }
    }

    /// Whether decoded `__class__` mappings are resolved to objects.
    #[must_use]
    pub const fn restores_objects(&self) -> bool {
        self.restore_objects
    }

    /// Capture a payload object as a [`Value::Object`] node.
    #[must_use]
    pub fn capture(object: &dyn Stateful) -> Value {
        Value::Object(ObjectRecord {
            class_id: object.type_tag().to_string(),
            state: object.extract_state(),
        })
    }

    /// Lower one escape-hatch node to its wire mapping.
    ///
    /// Returns `None` for values that encode natively. The returned mapping's
    /// values still need recursive encoding by the caller.
    #[must_use]
    pub fn lower(value: &Value) -> Option<Map> {
        match value {
            Value::Array(array) => {
                let mut wire = Map::new();
                wire.insert(TYPE_KEY.to_string(), Value::Str(ARRAY_TAG.to_string()));
                wire.insert(
                    "shape".to_string(),
                    Value::Seq(
                        array
                            .shape()
                            .iter()
                            .map(|&n| Value::Int(dim_to_int(n)))
                            .collect(),
                    ),
                );
                wire.insert(
                    "data".to_string(),
                    Value::Seq(array.data().iter().map(|&f| Value::Float(f)).collect()),
                );
                Some(wire)
            }
            Value::Object(record) => {
                let mut wire = record.state.clone();
                // The class marker goes after the state entries, matching the
                // on-disk layout produced by existing archives.
                wire.insert(CLASS_KEY.to_string(), Value::Str(record.class_id.clone()));
                Some(wire)
            }
            _ => None,
        }
    }

    /// Raise one decoded mapping back into the value model.
    ///
    /// Applied by the codecs to every mapping as it completes, children
    /// first, so nested arrays and objects resolve bottom-up.
    ///
    /// # Errors
    ///
    /// Returns a format error for a malformed typed-array mapping and a
    /// lookup error for an unregistered type tag (when restoration is
    /// enabled). Injection errors from the restored type propagate.
    pub fn raise(&self, map: Map) -> Result<Value> {
        if is_array_marker(map.get(TYPE_KEY)) {
            return decode_typed_array(&map).map(Value::Array);
        }
        if self.restore_objects {
            if let Some(Value::Str(class_id)) = map.get(CLASS_KEY) {
                let class_id = class_id.clone();
                let mut state = map;
                state.shift_remove(CLASS_KEY);
                let record = ObjectRecord { class_id, state };
                // Instantiating validates both the tag and the state; the
                // caller retrieves the live object through the registry.
                self.registry.instantiate(&record)?;
                return Ok(Value::Object(record));
            }
        }
        Ok(Value::Map(map))
    }
}

fn is_array_marker(marker: Option<&Value>) -> bool {
    matches!(marker, Some(Value::Str(tag)) if tag == ARRAY_TAG)
}

#[allow(clippy::cast_possible_wrap)]
const fn dim_to_int(n: usize) -> i64 {
    n as i64
}

fn decode_typed_array(map: &Map) -> Result<TypedArray> {
    let shape = map
        .get("shape")
        .and_then(Value::as_seq)
        .ok_or_else(|| Error::Format("typed array is missing its \"shape\" list".to_string()))?;
    let data = map
        .get("data")
        .and_then(Value::as_seq)
        .ok_or_else(|| Error::Format("typed array is missing its \"data\" list".to_string()))?;

    let mut dims = Vec::with_capacity(shape.len());
    for dim in shape {
        let n = dim
            .as_int()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| {
                Error::Format(format!("typed array shape entry {dim:?} is not a valid dimension"))
            })?;
        dims.push(n);
    }
    let mut values = Vec::with_capacity(data.len());
    for item in data {
        let f = item.as_float().ok_or_else(|| {
            Error::Format(format!("typed array data entry {item:?} is not numeric"))
        })?;
        values.push(f);
    }
    TypedArray::new(dims, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Oscillator {
        frequency: f64,
        label: String,
    }

    impl Stateful for Oscillator {
        fn type_tag(&self) -> &str {
            "test.Oscillator"
        }

        fn extract_state(&self) -> Map {
            let mut state = Map::new();
            state.insert("frequency".into(), Value::Float(self.frequency));
            state.insert("label".into(), Value::Str(self.label.clone()));
            state
        }

        fn inject_state(&mut self, state: &Map) -> Result<()> {
            self.frequency = state
                .get("frequency")
                .and_then(Value::as_float)
                .ok_or_else(|| Error::Lookup("frequency".into()))?;
            self.label = state
                .get("label")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Lookup("label".into()))?
                .to_string();
            Ok(())
        }
    }

    #[test]
    fn test_capture_and_lower_appends_class_marker_last() {
        let osc = Oscillator {
            frequency: 2.5,
            label: "probe".into(),
        };
        let captured = Serializer::capture(&osc);
        let wire = Serializer::lower(&captured).unwrap();
        let keys: Vec<_> = wire.keys().cloned().collect();
        assert_eq!(keys, vec!["frequency", "label", CLASS_KEY]);
    }

    #[test]
    fn test_raise_without_restore_passes_through() {
        let serializer = Serializer::new();
        let mut map = Map::new();
        map.insert(CLASS_KEY.into(), Value::Str("test.Oscillator".into()));
        let raised = serializer.raise(map.clone()).unwrap();
        assert_eq!(raised, Value::Map(map));
    }

    #[test]
    fn test_raise_with_restore_requires_registration() {
        let mut map = Map::new();
        map.insert("frequency".into(), Value::Float(1.0));
        map.insert("label".into(), Value::Str("x".into()));
        map.insert(CLASS_KEY.into(), Value::Str("test.Oscillator".into()));

        let empty = Serializer::restoring(Arc::new(TypeRegistry::new()));
        assert!(matches!(empty.raise(map.clone()), Err(Error::Lookup(_))));

        let mut registry = TypeRegistry::new();
        registry.register("test.Oscillator", || Box::new(Oscillator::default()));
        let serializer = Serializer::restoring(Arc::new(registry));
        match serializer.raise(map).unwrap() {
            Value::Object(record) => {
                assert_eq!(record.class_id, "test.Oscillator");
                assert!(!record.state.contains_key(CLASS_KEY));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_typed_array_raised_unconditionally() {
        let array = TypedArray::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let wire = Serializer::lower(&Value::Array(array.clone())).unwrap();
        let raised = Serializer::new().raise(wire).unwrap();
        assert_eq!(raised, Value::Array(array));
    }

    #[test]
    fn test_typed_array_shape_mismatch_is_format_error() {
        let mut wire = Map::new();
        wire.insert(TYPE_KEY.into(), Value::Str(ARRAY_TAG.into()));
        wire.insert(
            "shape".into(),
            Value::Seq(vec![Value::Int(2), Value::Int(3)]),
        );
        wire.insert(
            "data".into(),
            Value::Seq(vec![Value::Float(1.0), Value::Float(2.0)]),
        );
        assert!(matches!(Serializer::new().raise(wire), Err(Error::Format(_))));
    }

    #[test]
    fn test_instantiate_round_trip() {
        let mut registry = TypeRegistry::new();
        registry.register("test.Oscillator", || Box::new(Oscillator::default()));
        let osc = Oscillator {
            frequency: 7.25,
            label: "cavity".into(),
        };
        let record = ObjectRecord {
            class_id: "test.Oscillator".into(),
            state: osc.extract_state(),
        };
        let restored = registry.instantiate(&record).unwrap();
        assert_eq!(restored.type_tag(), "test.Oscillator");
    }
}

//! Property-based tests for the codecs.
//!
//! - Round-trip: decode(encode(v)) preserves every constructible value
//!   (NaN asserted through the NaN-aware comparator)
//! - Cross-format parity: a tree moved between the two formats survives
//! - Sequence header integrity: a tampered XML `count` never decodes
//!   silently
//!
//! Run with `ProptestConfig::with_cases(100)`.

use proptest::prelude::*;

use sweepstore::codec::{JsonCodec, XmlCodec};
use sweepstore::value::{Map, TypedArray, Value};

// ============================================================================
// Strategies
// ============================================================================

/// Keys that would collide with the wire conventions.
const RESERVED_KEYS: &[&str] = &["count", "item_version", "item", "__class__", "__type__"];

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}".prop_filter("reserved key", |k| !RESERVED_KEYS.contains(&k.as_str()))
}

fn arb_typed_array() -> impl Strategy<Value = Value> {
    prop::collection::vec(1usize..4, 1..3).prop_flat_map(|shape| {
        let len: usize = shape.iter().product();
        prop::collection::vec(any::<f64>(), len)
            .prop_map(move |data| Value::Array(TypedArray::new(shape.clone(), data).unwrap()))
    })
}

/// Leaf strings that survive the XML text grammar: non-empty, not numeric,
/// not a boolean or float-special token.
fn arb_xml_safe_string() -> impl Strategy<Value = String> {
    "[a-z][a-z ]{0,10}".prop_filter("boolean token", |s| s != "true" && s != "false")
}

fn arb_value(
    leaf_string: impl Strategy<Value = String> + 'static,
    min_map_entries: usize,
) -> BoxedStrategy<Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_map(Value::Float),
        leaf_string.prop_map(Value::Str),
        arb_typed_array(),
    ];
    leaf.prop_recursive(3, 24, 4, move |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Seq),
            prop::collection::vec((arb_key(), inner), min_map_entries..4)
                .prop_map(|entries| Value::Map(entries.into_iter().collect::<Map>())),
        ]
    })
    .boxed()
}

/// Values the JSON codec can round-trip: any string leaf, empty mappings
/// included.
fn arb_json_value() -> BoxedStrategy<Value> {
    arb_value("[ -~]{0,12}", 0)
}

/// Values the XML codec can round-trip: leaf strings restricted to text the
/// scalar grammar returns verbatim, and no empty mappings (a childless
/// element decodes as null).
fn arb_xml_value() -> BoxedStrategy<Value> {
    arb_value(arb_xml_safe_string(), 1)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: JSON round-trips every value, pretty or compact.
    #[test]
    fn prop_json_round_trip(value in arb_json_value(), pretty in any::<bool>()) {
        let codec = JsonCodec::new(Some("doc")).with_pretty(pretty);
        let text = codec.encode_to_string(&value).unwrap();
        let decoded = codec.decode_str(&text).unwrap();
        prop_assert!(decoded.content_eq(&value), "decoded {decoded:?} != {value:?}");
    }

    /// Property: XML round-trips every value, pretty or compact.
    #[test]
    fn prop_xml_round_trip(value in arb_xml_value(), pretty in any::<bool>()) {
        let codec = XmlCodec::new(Some("doc")).with_pretty(pretty);
        let text = codec.encode_to_string(&value).unwrap();
        let decoded = codec.decode_str(&text).unwrap();
        prop_assert!(decoded.content_eq(&value), "decoded {decoded:?} != {value:?}");
    }

    /// Property: a tree written as XML and rewritten as JSON decodes to the
    /// same tree (and vice versa).
    #[test]
    fn prop_cross_format_parity(value in arb_xml_value()) {
        let xml = XmlCodec::new(Some("doc"));
        let json = JsonCodec::new(Some("doc"));

        let via_xml = xml.decode_str(&xml.encode_to_string(&value).unwrap()).unwrap();
        let via_json = json.decode_str(&json.encode_to_string(&via_xml).unwrap()).unwrap();
        prop_assert!(via_json.content_eq(&value));
    }

    /// Property: an XML sequence whose declared count disagrees with its
    /// actual item count is always rejected, never truncated or padded.
    #[test]
    fn prop_tampered_sequence_header_is_rejected(
        items in prop::collection::vec(any::<i64>(), 1..6),
        delta in 1usize..3,
    ) {
        let codec = XmlCodec::new(Some("doc")).with_pretty(false);
        let value = Value::Seq(items.iter().copied().map(Value::Int).collect());
        let text = codec.encode_to_string(&value).unwrap();

        let honest = format!("<count>{}</count>", items.len());
        let tampered = format!("<count>{}</count>", items.len() + delta);
        let text = text.replacen(&honest, &tampered, 1);
        prop_assert!(codec.decode_str(&text).is_err());
    }
}

//! Codec integration tests: golden documents, malformed input, object
//! restoration, and cross-format parity.

use std::sync::Arc;

use sweepstore::codec::{JsonCodec, XmlCodec};
use sweepstore::value::{Map, Serializer, Stateful, TypeRegistry, TypedArray, Value};
use sweepstore::{Error, Result};

fn map(entries: Vec<(&str, Value)>) -> Map {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn simple_document() -> Value {
    Value::Map(map(vec![
        (
            "info",
            Value::Map(map(vec![
                ("program", Value::Str("ExampleSimulation".into())),
                ("version", Value::Str("32ef404-dirty".into())),
                ("measurement_id", Value::Int(3)),
                ("empty", Value::Null),
                ("start_date", Value::Str("2013-04-06T04:40:37Z".into())),
            ])),
        ),
        (
            "parameters",
            Value::Map(map(vec![
                ("N", Value::Int(2)),
                (
                    "m",
                    Value::Map(map(vec![
                        ("N_row", Value::Int(3)),
                        ("N_col", Value::Int(5)),
                    ])),
                ),
            ])),
        ),
        ("results", Value::Map(map(vec![("average", Value::Float(0.5))]))),
    ]))
}

const SIMPLE_XML: &str = "\
<measurement>
  <info>
    <program>ExampleSimulation</program>
    <version>32ef404-dirty</version>
    <measurement_id>3</measurement_id>
    <empty/>
    <start_date>2013-04-06T04:40:37Z</start_date>
  </info>
  <parameters>
    <N>2</N>
    <m>
      <N_row>3</N_row>
      <N_col>5</N_col>
    </m>
  </parameters>
  <results>
    <average>0.5</average>
  </results>
</measurement>
";

const SIMPLE_JSON: &str = "{
  \"measurement\": {
    \"info\": {
      \"program\": \"ExampleSimulation\",
      \"version\": \"32ef404-dirty\",
      \"measurement_id\": 3,
      \"empty\": null,
      \"start_date\": \"2013-04-06T04:40:37Z\"
    },
    \"parameters\": {
      \"N\": 2,
      \"m\": {
        \"N_row\": 3,
        \"N_col\": 5
      }
    },
    \"results\": {
      \"average\": 0.5
    }
  }
}";

#[test]
fn test_xml_golden_document() {
    let codec = XmlCodec::new(Some("measurement"));
    let encoded = codec.encode_to_string(&simple_document()).unwrap();
    assert_eq!(encoded, SIMPLE_XML);
    let decoded = codec.decode_str(SIMPLE_XML).unwrap();
    assert_eq!(decoded, simple_document());
}

#[test]
fn test_json_golden_document() {
    let codec = JsonCodec::new(Some("measurement"));
    let encoded = codec.encode_to_string(&simple_document()).unwrap();
    assert_eq!(encoded, SIMPLE_JSON);
    let decoded = codec.decode_str(SIMPLE_JSON).unwrap();
    assert_eq!(decoded, simple_document());
}

#[test]
fn test_pretty_printing_does_not_change_decoded_results() {
    let value = simple_document();
    for pretty in [true, false] {
        let xml = XmlCodec::new(Some("m")).with_pretty(pretty);
        assert_eq!(xml.decode_str(&xml.encode_to_string(&value).unwrap()).unwrap(), value);
        let json = JsonCodec::new(Some("m")).with_pretty(pretty);
        assert_eq!(
            json.decode_str(&json.encode_to_string(&value).unwrap()).unwrap(),
            value
        );
    }
}

#[test]
fn test_cross_format_parity() {
    let xml = XmlCodec::new(Some("measurement"));
    let json = JsonCodec::new(Some("measurement"));
    let tree = xml.decode_str(SIMPLE_XML).unwrap();
    let moved = json.encode_to_string(&tree).unwrap();
    assert_eq!(json.decode_str(&moved).unwrap(), tree);
}

#[test]
fn test_xml_sequence_encoding_is_bit_exact() {
    let codec = XmlCodec::new(Some("test")).with_pretty(false);
    let value = Value::Seq(vec![
        Value::Float(f64::NAN),
        Value::Float(f64::INFINITY),
        Value::Float(f64::NEG_INFINITY),
    ]);
    let encoded = codec.encode_to_string(&value).unwrap();
    assert_eq!(
        encoded,
        "<test><count>3</count><item_version>0</item_version>\
         <item>NaN</item><item>Infinity</item><item>-Infinity</item></test>"
    );
}

#[test]
fn test_xml_decodes_special_floats() {
    // The three special tokens inside a sequence.
    let codec = XmlCodec::new(Some("test"));
    let decoded = codec
        .decode_str(
            "<test><count>3</count><item_version>0</item_version>\
             <item>NaN</item><item>Infinity</item><item>-Infinity</item></test>",
        )
        .unwrap();
    let items = decoded.as_seq().unwrap();
    assert_eq!(items.len(), 3);
    assert!(matches!(items[0], Value::Float(f) if f.is_nan()));
    assert_eq!(items[1], Value::Float(f64::INFINITY));
    assert_eq!(items[2], Value::Float(f64::NEG_INFINITY));
}

#[test]
fn test_json_special_floats_are_bare_tokens() {
    let codec = JsonCodec::new(None).with_pretty(false);
    let value = Value::Seq(vec![
        Value::Float(f64::NAN),
        Value::Float(f64::INFINITY),
        Value::Float(f64::NEG_INFINITY),
    ]);
    assert_eq!(
        codec.encode_to_string(&value).unwrap(),
        "[NaN,Infinity,-Infinity]"
    );
    assert!(codec
        .decode_str("[NaN,Infinity,-Infinity]")
        .unwrap()
        .content_eq(&value));
}

#[test]
fn test_xml_empty_and_nested_lists() {
    let codec = XmlCodec::new(Some("r")).with_pretty(false);
    let value = Value::Map(map(vec![
        ("empty", Value::Seq(vec![])),
        (
            "mixed",
            Value::Seq(vec![
                Value::Int(1),
                Value::Str("text".into()),
                Value::Float(3.1415),
            ]),
        ),
        (
            "nested",
            Value::Seq(vec![Value::Seq(vec![Value::Int(1), Value::Int(2)])]),
        ),
    ]));
    let encoded = codec.encode_to_string(&value).unwrap();
    assert_eq!(codec.decode_str(&encoded).unwrap(), value);
}

#[test]
fn test_xml_sequence_count_mismatch_is_rejected() {
    let codec = XmlCodec::new(Some("m"));
    let text = "<m><bad><count>5</count><item_version>0</item_version>\
                <item>1</item><item>2</item><item>3</item></bad></m>";
    assert!(matches!(codec.decode_str(text), Err(Error::Format(_))));
}

#[test]
fn test_xml_sequence_with_stray_children_is_rejected() {
    let codec = XmlCodec::new(Some("m"));
    let text = "<m><bad><count>3</count><item_version>0</item_version>\
                <item>1</item><blah>2</blah><blub>3</blub></bad></m>";
    assert!(matches!(codec.decode_str(text), Err(Error::Format(_))));
}

#[test]
fn test_xml_duplicate_mapping_tags_are_rejected() {
    let codec = XmlCodec::new(Some("m"));
    let text = "<m><results><a>1</a><a>2</a><a>3</a></results></m>";
    assert!(matches!(codec.decode_str(text), Err(Error::Format(_))));
}

#[test]
fn test_xml_root_tag_mismatch_is_rejected_before_decoding() {
    let codec = XmlCodec::new(Some("blah"));
    assert!(matches!(codec.decode_str(SIMPLE_XML), Err(Error::Format(_))));
    // A codec without an expected root tag accepts anything.
    let lenient = XmlCodec::new(None);
    assert_eq!(lenient.decode_str(SIMPLE_XML).unwrap(), simple_document());
}

#[test]
fn test_json_top_level_entry_is_required() {
    let codec = JsonCodec::new(Some("measurement"));
    assert!(matches!(
        codec.decode_str("{\"blah\": 1}"),
        Err(Error::Format(_))
    ));
}

#[test]
fn test_json_malformed_document_is_rejected() {
    let codec = JsonCodec::new(Some("m"));
    assert!(matches!(
        codec.decode_str("{\"m\": {\"a\", 1}}"),
        Err(Error::Format(_))
    ));
}

#[test]
fn test_xml_boolean_canonical_forms() {
    let codec = XmlCodec::new(Some("t")).with_pretty(false);
    let value = Value::Map(map(vec![("on", Value::Bool(true)), ("off", Value::Bool(false))]));
    let encoded = codec.encode_to_string(&value).unwrap();
    assert_eq!(encoded, "<t><on>true</on><off>false</off></t>");
    assert_eq!(codec.decode_str(&encoded).unwrap(), value);
}

#[test]
fn test_xml_empty_string_decodes_as_null() {
    // Known asymmetry of the text format: an empty leaf is null.
    let codec = XmlCodec::new(Some("t")).with_pretty(false);
    let encoded = codec
        .encode_to_string(&Value::Str(String::new()))
        .unwrap();
    assert_eq!(codec.decode_str(&encoded).unwrap(), Value::Null);
}

#[test]
fn test_xml_numeric_looking_text_stays_numeric() {
    let codec = XmlCodec::new(Some("t"));
    assert_eq!(
        codec.decode_str("<t>-17</t>").unwrap(),
        Value::Int(-17)
    );
    assert_eq!(
        codec.decode_str("<t>2.5e-3</t>").unwrap(),
        Value::Float(0.0025)
    );
    // Leading zeros fail the grammar and stay strings.
    assert_eq!(
        codec.decode_str("<t>007</t>").unwrap(),
        Value::Str("007".into())
    );
}

#[test]
fn test_typed_array_round_trip_both_formats() {
    let array = TypedArray::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let value = Value::Map(map(vec![(
        "results",
        Value::Map(map(vec![("numpy_array", Value::Array(array.clone()))])),
    )]));

    let xml = XmlCodec::new(Some("m"));
    let decoded = xml.decode_str(&xml.encode_to_string(&value).unwrap()).unwrap();
    assert_eq!(
        decoded.get("results").and_then(|r| r.get("numpy_array")),
        Some(&Value::Array(array.clone()))
    );

    let json = JsonCodec::new(Some("m"));
    let decoded = json
        .decode_str(&json.encode_to_string(&value).unwrap())
        .unwrap();
    assert_eq!(
        decoded.get("results").and_then(|r| r.get("numpy_array")),
        Some(&Value::Array(array))
    );
}

#[test]
fn test_typed_array_wire_shape() {
    let codec = JsonCodec::new(None).with_pretty(false);
    let array = TypedArray::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let encoded = codec.encode_to_string(&Value::Array(array)).unwrap();
    assert_eq!(
        encoded,
        "{\"__type__\":\"array\",\"shape\":[2,2],\"data\":[1.0,2.0,3.0,4.0]}"
    );
}

#[test]
fn test_typed_array_shape_mismatch_is_rejected() {
    let codec = JsonCodec::new(None);
    let text = "{\"__type__\":\"array\",\"shape\":[2,3],\"data\":[1.0,2.0]}";
    assert!(matches!(codec.decode_str(text), Err(Error::Format(_))));
}

// ---------------------------------------------------------------------------
// Object restoration
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq)]
struct Coupling {
    strength: f64,
}

impl Stateful for Coupling {
    fn type_tag(&self) -> &str {
        "sim.Coupling"
    }

    fn extract_state(&self) -> Map {
        map(vec![("strength", Value::Float(self.strength))])
    }

    fn inject_state(&mut self, state: &Map) -> Result<()> {
        self.strength = state
            .get("strength")
            .and_then(Value::as_float)
            .ok_or_else(|| Error::Lookup("strength".into()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Lattice {
    sites: i64,
    coupling: Coupling,
}

impl Stateful for Lattice {
    fn type_tag(&self) -> &str {
        "sim.Lattice"
    }

    fn extract_state(&self) -> Map {
        map(vec![
            ("sites", Value::Int(self.sites)),
            ("coupling", Serializer::capture(&self.coupling)),
        ])
    }

    fn inject_state(&mut self, state: &Map) -> Result<()> {
        self.sites = state
            .get("sites")
            .and_then(Value::as_int)
            .ok_or_else(|| Error::Lookup("sites".into()))?;
        Ok(())
    }
}

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry.register("sim.Coupling", || Box::new(Coupling::default()));
    registry.register("sim.Lattice", || Box::new(Lattice::default()));
    Arc::new(registry)
}

#[test]
fn test_object_hierarchy_encodes_with_class_markers() {
    let lattice = Lattice {
        sites: 10,
        coupling: Coupling { strength: 0.2 },
    };
    let codec = JsonCodec::new(Some("sim")).with_pretty(false);
    let encoded = codec
        .encode_to_string(&Serializer::capture(&lattice))
        .unwrap();
    assert_eq!(
        encoded,
        "{\"sim\":{\"sites\":10,\"coupling\":{\"strength\":0.2,\
         \"__class__\":\"sim.Coupling\"},\"__class__\":\"sim.Lattice\"}}"
    );
}

#[test]
fn test_decode_without_restoration_keeps_plain_mappings() {
    let lattice = Lattice {
        sites: 10,
        coupling: Coupling { strength: 0.2 },
    };
    let captured = Serializer::capture(&lattice);
    let xml = XmlCodec::new(Some("sim"));
    let json = JsonCodec::new(Some("sim"));
    let decoded_docs = [
        xml.decode_str(&xml.encode_to_string(&captured).unwrap()).unwrap(),
        json.decode_str(&json.encode_to_string(&captured).unwrap()).unwrap(),
    ];
    for decoded in decoded_docs {
        assert_eq!(
            decoded.get("__class__"),
            Some(&Value::Str("sim.Lattice".into()))
        );
        assert_eq!(
            decoded.get("coupling").and_then(|c| c.get("strength")),
            Some(&Value::Float(0.2))
        );
    }
}

#[test]
fn test_decode_with_restoration_resolves_the_registry() {
    let lattice = Lattice {
        sites: 10,
        coupling: Coupling { strength: 0.2 },
    };
    let serializer = Serializer::restoring(registry());
    let codec = XmlCodec::new(Some("sim")).with_serializer(serializer);
    let encoded = codec
        .encode_to_string(&Serializer::capture(&lattice))
        .unwrap();
    match codec.decode_str(&encoded).unwrap() {
        Value::Object(record) => {
            assert_eq!(record.class_id, "sim.Lattice");
            assert!(matches!(
                record.state.get("coupling"),
                Some(Value::Object(inner)) if inner.class_id == "sim.Coupling"
            ));
        }
        other => panic!("expected a restored object, got {other:?}"),
    }
}

#[test]
fn test_restoration_of_unregistered_tag_is_lookup_error() {
    let serializer = Serializer::restoring(Arc::new(TypeRegistry::new()));
    let codec = JsonCodec::new(None).with_serializer(serializer);
    let result = codec.decode_str("{\"a\":1,\"__class__\":\"sim.Unknown\"}");
    assert!(matches!(result, Err(Error::Lookup(_))));
}

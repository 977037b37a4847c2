//! XML-style codec.
//!
//! The encoding layers the value model onto plain nested elements: mapping
//! keys become child tags, and sequences (which XML has no native notion
//! of) are spelled with a header convention, two leading children `count`
//! and `item_version` followed by one `item` element per entry:
//!
//! ```text
//! <energies>
//!   <count>3</count>
//!   <item_version>0</item_version>
//!   <item>1.5</item>
//!   <item>2.5</item>
//!   <item>NaN</item>
//! </energies>
//! ```
//!
//! Decoding a childless element runs its text through a strict scalar
//! grammar (integer, float with the three special tokens, boolean, else the
//! text verbatim; empty text is null). Decoding an element with children
//! first checks the sequence header; a header whose count disagrees with the
//! actual items, or stray non-`item` children, is a format error rather than
//! a silent truncation. Anything else is a mapping, where duplicate child
//! tags are a format error (indistinguishable from a malformed sequence).
//!
//! Attributes, comments and the XML declaration are accepted and ignored on
//! input and never produced on output. Pretty-printing only affects
//! whitespace between elements, never decoded results.

use crate::value::{Map, Serializer, Value};
use crate::{Error, Result};

use super::{format_float, INF_TOKEN, NAN_TOKEN, NEG_INF_TOKEN};

/// Root tag used when no archive name is configured.
const DEFAULT_ROOT_TAG: &str = "serialization";

/// Header tag holding a sequence's declared length.
const COUNT_TAG: &str = "count";
/// Header tag carried for compatibility; its value is always `0`.
const ITEM_VERSION_TAG: &str = "item_version";
/// Tag of every sequence entry.
const ITEM_TAG: &str = "item";

/// Bidirectional mapping between the value model and the XML-style text
/// format.
#[derive(Debug, Clone)]
pub struct XmlCodec {
    name: Option<String>,
    pretty: bool,
    indent: usize,
    serializer: Serializer,
}

impl XmlCodec {
    /// Codec with the given archive name (the expected root tag), pretty
    /// printing enabled at two-space indent, and a non-restoring serializer.
    #[must_use]
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(ToString::to_string),
            pretty: true,
            indent: 2,
            serializer: Serializer::new(),
        }
    }

    /// Toggle pretty printing.
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Set the pretty-print indent width.
    #[must_use]
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Replace the serializer (e.g. to enable object restoration).
    #[must_use]
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Encode a value to a document string.
    ///
    /// # Errors
    ///
    /// Returns a format error when the value cannot be represented.
    pub fn encode_to_string(&self, value: &Value) -> Result<String> {
        let root_tag = self.name.as_deref().unwrap_or(DEFAULT_ROOT_TAG);
        let root = self.encode_element(root_tag, value)?;
        let mut out = String::new();
        self.write_element(&root, &mut out, 0);
        if self.pretty {
            out.push('\n');
        }
        Ok(out)
    }

    /// Decode a document string.
    ///
    /// # Errors
    ///
    /// Returns a format error on malformed documents, a root-tag mismatch
    /// (when an archive name is configured), malformed sequence headers, or
    /// duplicate mapping tags.
    pub fn decode_str(&self, text: &str) -> Result<Value> {
        let root = parse_document(text)?;
        if let Some(expected) = &self.name {
            if &root.tag != expected {
                return Err(Error::Format(format!(
                    "expected XML root element \"{expected}\", but found \"{}\"",
                    root.tag
                )));
            }
        }
        self.decode_element(&root)
    }

    fn encode_element(&self, tag: &str, value: &Value) -> Result<Element> {
        let element = match value {
            Value::Null => Element::leaf(tag, String::new()),
            Value::Bool(b) => Element::leaf(tag, b.to_string()),
            Value::Int(i) => Element::leaf(tag, i.to_string()),
            Value::Float(f) => Element::leaf(tag, format_float(*f)?),
            Value::Str(s) => Element::leaf(tag, s.clone()),
            Value::Seq(items) => {
                let mut children = Vec::with_capacity(items.len() + 2);
                children.push(Element::leaf(COUNT_TAG, items.len().to_string()));
                children.push(Element::leaf(ITEM_VERSION_TAG, "0".to_string()));
                for item in items {
                    children.push(self.encode_element(ITEM_TAG, item)?);
                }
                Element::parent(tag, children)
            }
            Value::Map(map) => self.encode_map(tag, map)?,
            Value::Array(_) | Value::Object(_) => {
                let lowered = Serializer::lower(value)
                    .ok_or_else(|| Error::Format(format!("cannot encode value under <{tag}>")))?;
                self.encode_map(tag, &lowered)?
            }
        };
        Ok(element)
    }

    fn encode_map(&self, tag: &str, map: &Map) -> Result<Element> {
        let mut children = Vec::with_capacity(map.len());
        for (key, value) in map {
            children.push(self.encode_element(key, value)?);
        }
        Ok(Element::parent(tag, children))
    }

    fn write_element(&self, element: &Element, out: &mut String, depth: usize) {
        let pad = if self.pretty {
            " ".repeat(self.indent * depth)
        } else {
            String::new()
        };
        out.push_str(&pad);
        if element.children.is_empty() {
            if element.text.is_empty() {
                out.push_str(&format!("<{}/>", element.tag));
            } else {
                out.push_str(&format!(
                    "<{}>{}</{}>",
                    element.tag,
                    escape_text(&element.text),
                    element.tag
                ));
            }
        } else {
            out.push_str(&format!("<{}>", element.tag));
            for child in &element.children {
                if self.pretty {
                    out.push('\n');
                }
                self.write_element(child, out, depth + 1);
            }
            if self.pretty {
                out.push('\n');
                out.push_str(&pad);
            }
            out.push_str(&format!("</{}>", element.tag));
        }
    }

    fn decode_element(&self, element: &Element) -> Result<Value> {
        if element.children.is_empty() {
            return Ok(parse_scalar_text(&element.text));
        }

        let mut decoded = Vec::with_capacity(element.children.len());
        for child in &element.children {
            decoded.push((child.tag.as_str(), self.decode_element(child)?));
        }

        // Sequence header: first two children tagged count/item_version,
        // count holding an integer.
        if decoded.len() >= 2
            && decoded[0].0 == COUNT_TAG
            && matches!(decoded[0].1, Value::Int(_))
            && decoded[1].0 == ITEM_VERSION_TAG
        {
            let declared = decoded[0]
                .1
                .as_int()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| list_error(&element.tag, "its \"count\" is negative"))?;
            if decoded.len() != declared + 2 {
                return Err(list_error(
                    &element.tag,
                    "the number of items does not match \"count\"",
                ));
            }
            if decoded[2..].iter().any(|(tag, _)| *tag != ITEM_TAG) {
                return Err(list_error(&element.tag, "it contains invalid child elements"));
            }
            let items = decoded.drain(2..).map(|(_, value)| value).collect();
            return Ok(Value::Seq(items));
        }

        // Otherwise a mapping; duplicate tags are unsupported.
        let mut map = Map::with_capacity(decoded.len());
        for (tag, value) in decoded {
            if map.insert(tag.to_string(), value).is_some() {
                return Err(Error::Format(format!(
                    "element <{}> has multiple children tagged <{tag}>; duplicate tags are not supported",
                    element.tag
                )));
            }
        }
        self.serializer.raise(map)
    }
}

fn list_error(tag: &str, detail: &str) -> Error {
    Error::Format(format!("element <{tag}> looks like a list, but {detail}"))
}

/// Parse element text into a scalar value.
///
/// Empty text is null; the three float special tokens and the canonical
/// boolean forms are recognized first; then the numeric grammar (integer
/// when there is neither fraction nor exponent); any other text is returned
/// verbatim as a string.
fn parse_scalar_text(text: &str) -> Value {
    match text {
        "" => Value::Null,
        NAN_TOKEN => Value::Float(f64::NAN),
        INF_TOKEN => Value::Float(f64::INFINITY),
        NEG_INF_TOKEN => Value::Float(f64::NEG_INFINITY),
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => parse_number_text(text).unwrap_or_else(|| Value::Str(text.to_string())),
    }
}

/// Strict numeric grammar: `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`.
///
/// Leading zeros, a bare leading or trailing dot, and trailing garbage all
/// fail the grammar (the text stays a string). Integers that overflow `i64`
/// fall back to floats.
fn parse_number_text(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut i = 0;
    if bytes.first() == Some(&b'-') {
        i += 1;
    }
    match bytes.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => {
            i += 1;
            while matches!(bytes.get(i), Some(b'0'..=b'9')) {
                i += 1;
            }
        }
        _ => return None,
    }
    let mut is_float = false;
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        if !matches!(bytes.get(i), Some(b'0'..=b'9')) {
            return None;
        }
        while matches!(bytes.get(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        is_float = true;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        if !matches!(bytes.get(i), Some(b'0'..=b'9')) {
            return None;
        }
        while matches!(bytes.get(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        is_float = true;
    }
    if i != bytes.len() {
        return None;
    }
    if is_float {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        text.parse::<i64>().map(Value::Int).ok().or_else(|| {
            // Out of i64 range; keep the magnitude as a float.
            text.parse::<f64>().ok().map(Value::Float)
        })
    }
}

/// In-memory element: a tag, its direct text, and child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Element {
    tag: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn leaf(tag: &str, text: String) -> Self {
        Self {
            tag: tag.to_string(),
            text,
            children: Vec::new(),
        }
    }

    fn parent(tag: &str, children: Vec<Self>) -> Self {
        Self {
            tag: tag.to_string(),
            text: String::new(),
            children,
        }
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_text(text: &str) -> Result<String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let end = rest
            .find(';')
            .ok_or_else(|| Error::Format("unterminated entity reference".to_string()))?;
        let entity = &rest[1..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .transpose()
                    .ok()
                    .flatten()
                    .ok_or_else(|| {
                        Error::Format(format!("unknown entity reference \"&{entity};\""))
                    })?;
                let c = char::from_u32(code).ok_or_else(|| {
                    Error::Format(format!("invalid character reference \"&{entity};\""))
                })?;
                out.push(c);
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse a document into its root element.
fn parse_document(text: &str) -> Result<Element> {
    let mut parser = XmlParser {
        src: text,
        pos: 0,
    };
    parser.skip_misc();
    let root = parser.parse_element()?;
    parser.skip_misc();
    if parser.pos != parser.src.len() {
        return Err(parser.error("trailing content after root element"));
    }
    Ok(root)
}

struct XmlParser<'a> {
    src: &'a str,
    pos: usize,
}

impl XmlParser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::Format(format!("XML parse error at byte {}: {message}", self.pos))
    }

    fn bytes(&self) -> &[u8] {
        self.src.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn starts_with(&self, token: &str) -> bool {
        self.src[self.pos..].starts_with(token)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    /// Skip whitespace, the XML declaration, processing instructions and
    /// comments between elements.
    fn skip_misc(&mut self) {
        loop {
            self.skip_ws();
            if self.starts_with("<?") {
                match self.src[self.pos..].find("?>") {
                    Some(offset) => self.pos += offset + 2,
                    None => {
                        self.pos = self.src.len();
                        return;
                    }
                }
            } else if self.starts_with("<!--") {
                match self.src[self.pos..].find("-->") {
                    Some(offset) => self.pos += offset + 3,
                    None => {
                        self.pos = self.src.len();
                        return;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/' | b'=') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an element name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_element(&mut self) -> Result<Element> {
        if self.peek() != Some(b'<') {
            return Err(self.error("expected '<'"));
        }
        self.pos += 1;
        let tag = self.parse_name()?;

        // Attributes are tolerated and discarded.
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(self.error("expected '>' after '/'"));
                    }
                    self.pos += 1;
                    return Ok(Element::leaf(&tag, String::new()));
                }
                Some(_) => {
                    // attribute name="value"
                    self.parse_name()?;
                    self.skip_ws();
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_ws();
                        self.skip_quoted_value()?;
                    }
                }
                None => return Err(self.error("unexpected end of document in element tag")),
            }
        }

        let mut text = String::new();
        let mut children = Vec::new();
        loop {
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.parse_name()?;
                if close != tag {
                    return Err(self.error(&format!(
                        "mismatched closing tag </{close}> for <{tag}>"
                    )));
                }
                self.skip_ws();
                if self.peek() != Some(b'>') {
                    return Err(self.error("expected '>' in closing tag"));
                }
                self.pos += 1;
                break;
            }
            if self.starts_with("<!--") {
                match self.src[self.pos..].find("-->") {
                    Some(offset) => self.pos += offset + 3,
                    None => return Err(self.error("unterminated comment")),
                }
                continue;
            }
            match self.peek() {
                Some(b'<') => children.push(self.parse_element()?),
                Some(_) => {
                    let start = self.pos;
                    while self.peek().is_some_and(|b| b != b'<') {
                        self.pos += 1;
                    }
                    text.push_str(&unescape_text(&self.src[start..self.pos])?);
                }
                None => return Err(self.error(&format!("unexpected end of document inside <{tag}>"))),
            }
        }

        if children.is_empty() {
            Ok(Element::leaf(&tag, text))
        } else {
            // Text between child elements is indentation; only leaves carry
            // meaningful text.
            Ok(Element::parent(&tag, children))
        }
    }

    fn skip_quoted_value(&mut self) -> Result<()> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.pos += 1;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == quote {
                return Ok(());
            }
        }
        Err(self.error("unterminated attribute value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_text_grammar() {
        assert_eq!(parse_scalar_text(""), Value::Null);
        assert_eq!(parse_scalar_text("42"), Value::Int(42));
        assert_eq!(parse_scalar_text("-0"), Value::Int(0));
        assert_eq!(parse_scalar_text("2.5"), Value::Float(2.5));
        assert_eq!(parse_scalar_text("1e3"), Value::Float(1000.0));
        assert_eq!(parse_scalar_text("01"), Value::Str("01".to_string()));
        assert_eq!(parse_scalar_text(".5"), Value::Str(".5".to_string()));
        assert_eq!(parse_scalar_text("5."), Value::Str("5.".to_string()));
        assert_eq!(parse_scalar_text("true"), Value::Bool(true));
        assert!(matches!(parse_scalar_text("NaN"), Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        match parse_scalar_text("99999999999999999999") {
            Value::Float(f) => assert!(f > 9e19),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn test_leaf_round_trip() {
        let codec = XmlCodec::new(Some("test")).with_pretty(false);
        let s = codec.encode_to_string(&Value::Int(7)).unwrap();
        assert_eq!(s, "<test>7</test>");
        assert_eq!(codec.decode_str(&s).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_null_encodes_as_empty_element() {
        let codec = XmlCodec::new(Some("test")).with_pretty(false);
        assert_eq!(codec.encode_to_string(&Value::Null).unwrap(), "<test/>");
        assert_eq!(codec.decode_str("<test/>").unwrap(), Value::Null);
        assert_eq!(codec.decode_str("<test></test>").unwrap(), Value::Null);
    }

    #[test]
    fn test_escaping_round_trip() {
        let codec = XmlCodec::new(Some("test")).with_pretty(false);
        let value = Value::Str("a <b> & c".to_string());
        let s = codec.encode_to_string(&value).unwrap();
        assert_eq!(codec.decode_str(&s).unwrap(), value);
    }

    #[test]
    fn test_root_tag_mismatch() {
        let codec = XmlCodec::new(Some("expected"));
        assert!(matches!(
            codec.decode_str("<other>1</other>"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_attributes_and_comments_are_ignored() {
        let codec = XmlCodec::new(None);
        let value = codec
            .decode_str("<?xml version=\"1.0\"?><r a=\"x\"><!-- note --><n>1</n></r>")
            .unwrap();
        assert_eq!(value.get("n"), Some(&Value::Int(1)));
    }
}

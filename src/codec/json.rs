//! JSON-style codec.
//!
//! The document is the value itself, or `{"<name>": <value>}` when an
//! archive name is configured. Object key order is preserved on both sides,
//! and the float specials are emitted and accepted as the bare
//! (non-standard) tokens `NaN`, `Infinity` and `-Infinity` for parity with
//! the XML codec, which is why the parser here is crate-owned rather than
//! `serde_json`'s (that parser rejects the tokens outright). Primitive
//! token work (string escaping and unescaping, float formatting) still
//! delegates to `serde_json`.
//!
//! Duplicate keys within one object keep their first position and the last
//! value. Every completed object is passed through the serializer's raise
//! step, so typed arrays and (when enabled) captured objects are restored
//! bottom-up.

use crate::value::{Map, Serializer, Value};
use crate::{Error, Result};

use super::{format_float, INF_TOKEN, NAN_TOKEN, NEG_INF_TOKEN};

/// Bidirectional mapping between the value model and the JSON-style text
/// format.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    name: Option<String>,
    pretty: bool,
    indent: usize,
    serializer: Serializer,
}

impl JsonCodec {
    /// Codec with the given archive name (the top-level wrapping key),
    /// pretty printing enabled at two-space indent, and a non-restoring
    /// serializer.
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
        let mut out = String::new();
        if let Some(name) = &self.name {
            let mut wrapper = Map::new();
            wrapper.insert(name.clone(), value.clone());
            self.write_map(&wrapper, &mut out, 0)?;
        } else {
            self.write_value(value, &mut out, 0)?;
        }
        Ok(out)
    }

    /// Decode a document string.
    ///
    /// # Errors
    ///
    /// Returns a format error on malformed input or when a configured
    /// archive name is absent from the top level of the document.
    pub fn decode_str(&self, text: &str) -> Result<Value> {
        let mut parser = JsonParser {
            src: text,
            pos: 0,
            serializer: &self.serializer,
        };
        parser.skip_ws();
        let document = parser.parse_value()?;
        parser.skip_ws();
        if parser.pos != parser.src.len() {
            return Err(parser.error("trailing content after document"));
        }

        match &self.name {
            None => Ok(document),
            Some(name) => match document {
                Value::Map(mut map) if map.contains_key(name) => {
                    Ok(map.shift_remove(name).unwrap_or(Value::Null))
                }
                _ => Err(Error::Format(format!(
                    "did not find top-level entry \"{name}\" in JSON document"
                ))),
            },
        }
    }

    fn newline_pad(&self, out: &mut String, depth: usize) {
        if self.pretty {
            out.push('\n');
            out.push_str(&" ".repeat(self.indent * depth));
        }
    }

    fn write_value(&self, value: &Value, out: &mut String, depth: usize) -> Result<()> {
        match value {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)?),
            Value::Str(s) => out.push_str(&serde_json::to_string(s)?),
            Value::Seq(items) => {
                if items.is_empty() {
                    out.push_str("[]");
                } else {
                    out.push('[');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        self.newline_pad(out, depth + 1);
                        self.write_value(item, out, depth + 1)?;
                    }
                    self.newline_pad(out, depth);
                    out.push(']');
                }
            }
            Value::Map(map) => self.write_map(map, out, depth)?,
            Value::Array(_) | Value::Object(_) => {
                let lowered = Serializer::lower(value)
                    .ok_or_else(|| Error::Format("cannot encode value".to_string()))?;
                self.write_map(&lowered, out, depth)?;
            }
        }
        Ok(())
    }

    fn write_map(&self, map: &Map, out: &mut String, depth: usize) -> Result<()> {
        if map.is_empty() {
            out.push_str("{}");
            return Ok(());
        }
        out.push('{');
        for (i, (key, value)) in map.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.newline_pad(out, depth + 1);
            out.push_str(&serde_json::to_string(key)?);
            out.push(':');
            if self.pretty {
                out.push(' ');
            }
            self.write_value(value, out, depth + 1)?;
        }
        self.newline_pad(out, depth);
        out.push('}');
        Ok(())
    }
}

struct JsonParser<'a> {
    src: &'a str,
    pos: usize,
    serializer: &'a Serializer,
}

impl JsonParser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::Format(format!("JSON parse error at byte {}: {message}", self.pos))
    }

    fn bytes(&self) -> &[u8] {
        self.src.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect_token(&mut self, token: &str) -> Result<()> {
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.error(&format!("expected \"{token}\"")))
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'n') => {
                self.expect_token("null")?;
                Ok(Value::Null)
            }
            Some(b't') => {
                self.expect_token("true")?;
                Ok(Value::Bool(true))
            }
            Some(b'f') => {
                self.expect_token("false")?;
                Ok(Value::Bool(false))
            }
            Some(b'N') => {
                self.expect_token(NAN_TOKEN)?;
                Ok(Value::Float(f64::NAN))
            }
            Some(b'I') => {
                self.expect_token(INF_TOKEN)?;
                Ok(Value::Float(f64::INFINITY))
            }
            Some(b'-') if self.bytes().get(self.pos + 1) == Some(&b'I') => {
                self.expect_token(NEG_INF_TOKEN)?;
                Ok(Value::Float(f64::NEG_INFINITY))
            }
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            Some(b'"') => self.parse_string().map(Value::Str),
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(other) => Err(self.error(&format!("unexpected character '{}'", other as char))),
            None => Err(self.error("unexpected end of document")),
        }
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9')
        ) {
            self.pos += 1;
        }
        let token = &self.src[start..self.pos];
        if token.bytes().any(|b| matches!(b, b'.' | b'e' | b'E')) {
            token
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.error(&format!("invalid number \"{token}\"")))
        } else {
            token.parse::<i64>().map(Value::Int).or_else(|_| {
                token
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.error(&format!("invalid number \"{token}\"")))
            })
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let start = self.pos;
        // Opening quote.
        self.pos += 1;
        loop {
            match self.peek() {
                Some(b'\\') => self.pos += 2,
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
                None => return Err(self.error("unterminated string")),
            }
        }
        let token = self
            .src
            .get(start..self.pos)
            .ok_or_else(|| self.error("unterminated string"))?;
        // Escape handling (\", \\, \uXXXX, ...) is serde_json's.
        serde_json::from_str::<String>(token)
            .map_err(|e| self.error(&format!("invalid string token: {e}")))
    }

    fn parse_object(&mut self) -> Result<Value> {
        // Opening brace.
        self.pos += 1;
        let mut map = Map::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return self.serializer.raise(map);
        }
        loop {
            self.skip_ws();
            if self.peek() != Some(b'"') {
                return Err(self.error("expected a string key"));
            }
            let key = self.parse_string()?;
            self.skip_ws();
            self.expect_token(":")?;
            self.skip_ws();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
        self.serializer.raise(map)
    }

    fn parse_array(&mut self) -> Result<Value> {
        // Opening bracket.
        self.pos += 1;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Seq(items));
        }
        loop {
            self.skip_ws();
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
        Ok(Value::Seq(items))
    }
}

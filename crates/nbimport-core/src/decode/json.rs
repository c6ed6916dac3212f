//! Line-accurate JSON decoding.
//!
//! A strict recursive-descent decoder that builds a [`serde_json::Value`]
//! while remembering where each cell's `source` payload starts. The line is
//! computed while the owning object is being decoded and written into the
//! cell's `metadata` before the object is returned, so repeated key names or
//! look-alike text inside cell contents can never be mistaken for the real
//! position.

use serde_json::{Map, Number, Value};

use super::line_index::LineIndex;
use crate::error::DecodeError;

/// Key that marks an object as a notebook cell.
pub const CELL_DISCRIMINATOR: &str = "cell_type";

/// Key whose payload position defines a cell's line.
pub const SOURCE_KEY: &str = "source";

/// Metadata key injected into every cell object.
pub const COMPUTED_LINE_KEY: &str = "computed_line";

/// Same limit serde_json applies.
const MAX_DEPTH: usize = 128;

/// Decode `text` into a JSON tree, annotating every cell object with the
/// line at which its source payload begins.
pub fn decode_value(text: &str) -> Result<Value, DecodeError> {
    LineNoDecoder::new(text).decode()
}

/// Streaming decoder state.
pub struct LineNoDecoder<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    lines: LineIndex,
}

impl<'a> LineNoDecoder<'a> {
    /// Create a decoder over `text`.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            depth: 0,
            lines: LineIndex::new(text),
        }
    }

    /// Decode the whole input as a single JSON value.
    pub fn decode(mut self) -> Result<Value, DecodeError> {
        self.skip_whitespace();
        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.pos < self.bytes.len() {
            return Err(self.error("trailing characters after JSON value"));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> DecodeError {
        let (line, column) = self.lines.line_col(self.text, offset);
        DecodeError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> DecodeError {
        self.error_at(self.pos, message)
    }

    fn unexpected(&self, context: &str) -> DecodeError {
        match self.text.get(self.pos..).and_then(|rest| rest.chars().next()) {
            Some(ch) => self.error(format!("unexpected character `{ch}` {context}")),
            None => self.error(format!("unexpected end of input {context}")),
        }
    }

    fn enter(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("recursion limit exceeded"));
        }
        Ok(())
    }

    fn parse_value(&mut self) -> Result<Value, DecodeError> {
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => self.parse_string().map(Value::String),
            Some(b't') => self.parse_literal("true", Value::Bool(true)),
            Some(b'f') => self.parse_literal("false", Value::Bool(false)),
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            _ => Err(self.unexpected("while looking for a value")),
        }
    }

    fn parse_object(&mut self) -> Result<Value, DecodeError> {
        self.enter()?;
        self.pos += 1;

        let mut map = Map::new();
        let mut payload_offset = None;

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Object(map));
        }

        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.unexpected("where an object key was expected"));
            }
            let key = self.parse_string()?;

            self.skip_whitespace();
            if self.peek() != Some(b':') {
                return Err(self.unexpected("after object key"));
            }
            self.pos += 1;
            self.skip_whitespace();

            if key == SOURCE_KEY {
                payload_offset = Some(self.payload_start());
            }
            let value = self.parse_value()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.unexpected("in object")),
            }
        }

        self.depth -= 1;

        if map.contains_key(CELL_DISCRIMINATOR)
            && let Some(offset) = payload_offset
        {
            self.annotate_cell(&mut map, offset);
        }

        Ok(Value::Object(map))
    }

    /// Offset of the first character of the value starting at `self.pos`:
    /// the first element of a non-empty array, otherwise the value itself.
    fn payload_start(&self) -> usize {
        if self.peek() != Some(b'[') {
            return self.pos;
        }
        let mut offset = self.pos + 1;
        while matches!(
            self.bytes.get(offset),
            Some(b' ' | b'\t' | b'\n' | b'\r')
        ) {
            offset += 1;
        }
        match self.bytes.get(offset) {
            Some(b']') | None => self.pos,
            Some(_) => offset,
        }
    }

    fn annotate_cell(&self, map: &mut Map<String, Value>, offset: usize) {
        let line = self.lines.line_of(offset);
        let metadata = map
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));

        // A non-object `metadata` is left alone; schema validation reports it.
        if let Value::Object(metadata) = metadata {
            metadata.insert(COMPUTED_LINE_KEY.to_string(), Value::from(line));
        }
    }

    fn parse_array(&mut self) -> Result<Value, DecodeError> {
        self.enter()?;
        self.pos += 1;

        let mut items = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Array(items));
        }

        loop {
            self.skip_whitespace();
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.unexpected("in array")),
            }
        }

        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn parse_string(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();

        loop {
            // Runs stop only at ASCII bytes, so slicing stays on char boundaries.
            let run_start = self.pos;
            while let Some(byte) = self.peek() {
                if byte == b'"' || byte == b'\\' || byte < 0x20 {
                    break;
                }
                self.pos += 1;
            }
            out.push_str(&self.text[run_start..self.pos]);

            match self.peek() {
                None => return Err(self.error_at(start, "unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.parse_escape(&mut out)?;
                }
                Some(_) => return Err(self.error("control character in string")),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), DecodeError> {
        let Some(byte) = self.peek() else {
            return Err(self.error("unexpected end of input in escape"));
        };
        self.pos += 1;

        match byte {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'u' => {
                let ch = self.parse_unicode_escape()?;
                out.push(ch);
            }
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("in escape sequence"));
            }
        }
        Ok(())
    }

    fn parse_unicode_escape(&mut self) -> Result<char, DecodeError> {
        let escape_start = self.pos - 2;
        let first = self.parse_hex4()?;

        let code = match first {
            0xD800..=0xDBFF => {
                if self.bytes.get(self.pos) != Some(&b'\\')
                    || self.bytes.get(self.pos + 1) != Some(&b'u')
                {
                    return Err(self.error_at(escape_start, "lone leading surrogate in string"));
                }
                self.pos += 2;
                let second = self.parse_hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(self.error_at(escape_start, "invalid low surrogate in string"));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(self.error_at(escape_start, "lone trailing surrogate in string"));
            }
            other => other,
        };

        char::from_u32(code).ok_or_else(|| self.error_at(escape_start, "invalid unicode escape"))
    }

    fn parse_hex4(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.bytes;
        let Some(digits) = bytes.get(self.pos..self.pos + 4) else {
            return Err(self.error("unexpected end of input in unicode escape"));
        };

        let mut value = 0u32;
        for (i, &digit) in digits.iter().enumerate() {
            let Some(nibble) = char::from(digit).to_digit(16) else {
                return Err(self.error_at(self.pos + i, "invalid hex digit in unicode escape"));
            };
            value = value * 16 + nibble;
        }
        self.pos += 4;
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<Value, DecodeError> {
        let start = self.pos;

        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => self.skip_digits(),
            _ => return Err(self.unexpected("in number")),
        }

        let mut is_float = false;

        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.unexpected("after decimal point"));
            }
            self.skip_digits();
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.unexpected("in exponent"));
            }
            self.skip_digits();
        }

        let literal = &self.text[start..self.pos];

        if !is_float {
            if let Ok(value) = literal.parse::<u64>() {
                return Ok(Value::Number(Number::from(value)));
            }
            if let Ok(value) = literal.parse::<i64>() {
                return Ok(Value::Number(Number::from(value)));
            }
        }

        literal
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error_at(start, "number out of range"))
    }

    fn skip_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Result<Value, DecodeError> {
        if self.text[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(self.unexpected("while looking for a value"))
        }
    }
}

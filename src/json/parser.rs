//! Recursive-descent JSON parser: skip whitespace before every token, try
//! each alternative in turn, and accumulate into `Value`.

use super::{JsonError, Kind, Value};

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Cursor {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat_char(&mut self, c: u8) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_literal(&mut self, literal: &str) -> bool {
        self.skip_whitespace();
        let lit = literal.as_bytes();
        if self.bytes[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn read_hex4(&mut self) -> Option<u16> {
        let s = self.bytes.get(self.pos..self.pos + 4)?;
        let s = std::str::from_utf8(s).ok()?;
        let cp = u16::from_str_radix(s, 16).ok()?;
        self.pos += 4;
        Some(cp)
    }

    fn read_string(&mut self) -> Result<Option<String>, JsonError> {
        self.skip_whitespace();
        if self.peek() != Some(b'"') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(JsonError::UnexpectedEof),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Some(out));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"') => {
                            out.push('"');
                            self.pos += 1;
                        }
                        Some(b'\\') => {
                            out.push('\\');
                            self.pos += 1;
                        }
                        Some(b'/') => {
                            out.push('/');
                            self.pos += 1;
                        }
                        Some(b'b') => {
                            out.push('\u{8}');
                            self.pos += 1;
                        }
                        Some(b'f') => {
                            out.push('\u{c}');
                            self.pos += 1;
                        }
                        Some(b'n') => {
                            out.push('\n');
                            self.pos += 1;
                        }
                        Some(b'r') => {
                            out.push('\r');
                            self.pos += 1;
                        }
                        Some(b't') => {
                            out.push('\t');
                            self.pos += 1;
                        }
                        Some(b'u') => {
                            self.pos += 1;
                            // BMP only: surrogate pairs are not reassembled.
                            let cp = self
                                .read_hex4()
                                .ok_or(JsonError::InvalidEscape(start))?;
                            match char::from_u32(cp as u32) {
                                Some(c) => out.push(c),
                                None => out.push('\u{fffd}'),
                            }
                        }
                        _ => return Err(JsonError::InvalidEscape(self.pos)),
                    }
                }
                Some(_) => {
                    // Copy one UTF-8 scalar value at a time so multi-byte
                    // sequences in the source string survive intact.
                    let rest = std::str::from_utf8(&self.bytes[self.pos..])
                        .map_err(|_| JsonError::InvalidEscape(self.pos))?;
                    let c = rest.chars().next().ok_or(JsonError::UnexpectedEof)?;
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn read_number(&mut self) -> Option<f64> {
        self.skip_whitespace();
        let start = self.pos;
        let mut p = self.pos;
        let bytes = self.bytes;
        if bytes.get(p) == Some(&b'-') {
            p += 1;
        }
        let digits_start = p;
        while bytes.get(p).is_some_and(u8::is_ascii_digit) {
            p += 1;
        }
        if p == digits_start {
            return None;
        }
        if bytes.get(p) == Some(&b'.') {
            p += 1;
            let frac_start = p;
            while bytes.get(p).is_some_and(u8::is_ascii_digit) {
                p += 1;
            }
            if p == frac_start {
                return None;
            }
        }
        if matches!(bytes.get(p), Some(b'e') | Some(b'E')) {
            let mut q = p + 1;
            if matches!(bytes.get(q), Some(b'+') | Some(b'-')) {
                q += 1;
            }
            let exp_start = q;
            while bytes.get(q).is_some_and(u8::is_ascii_digit) {
                q += 1;
            }
            if q > exp_start {
                p = q;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..p]).ok()?;
        let num: f64 = text.parse().ok()?;
        self.pos = p;
        Some(num)
    }

    fn read_value(&mut self) -> Result<Value, JsonError> {
        self.skip_whitespace();
        if let Some(s) = self.read_string()? {
            return Ok(Value::String(s));
        }
        if let Some(n) = self.read_number() {
            return Ok(Value::Number(n));
        }
        if self.eat_literal("null") {
            return Ok(Value::Null);
        }
        if self.eat_literal("true") {
            return Ok(Value::Bool(true));
        }
        if self.eat_literal("false") {
            return Ok(Value::Bool(false));
        }
        if self.eat_char(b'{') {
            let mut entries = Vec::new();
            if !self.eat_char(b'}') {
                loop {
                    let key = self
                        .read_string()?
                        .ok_or_else(|| JsonError::UnexpectedChar(self.current_char(), self.pos))?;
                    if !self.eat_char(b':') {
                        return Err(JsonError::UnexpectedChar(self.current_char(), self.pos));
                    }
                    let value = self.read_value()?;
                    entries.push((key, value));
                    if self.eat_char(b',') {
                        continue;
                    }
                    break;
                }
                if !self.eat_char(b'}') {
                    return Err(JsonError::UnexpectedChar(self.current_char(), self.pos));
                }
            }
            return Ok(Value::Object(entries));
        }
        if self.eat_char(b'[') {
            let mut elements = Vec::new();
            if !self.eat_char(b']') {
                loop {
                    elements.push(self.read_value()?);
                    if self.eat_char(b',') {
                        continue;
                    }
                    break;
                }
                if !self.eat_char(b']') {
                    return Err(JsonError::UnexpectedChar(self.current_char(), self.pos));
                }
            }
            return Ok(Value::Array(elements));
        }
        Err(JsonError::UnexpectedChar(self.current_char(), self.pos))
    }

    fn current_char(&self) -> char {
        self.bytes
            .get(self.pos)
            .map(|&b| b as char)
            .unwrap_or('\0')
    }
}

/// Parses a complete JSON value from `input`. If `expected` is given, the
/// top-level value's kind must match it or the parse fails. Trailing
/// non-whitespace after the value is an error.
pub fn parse(input: &str, expected: Option<Kind>) -> Result<Value, JsonError> {
    let mut cursor = Cursor::new(input);
    let value = cursor.read_value()?;
    if let Some(k) = expected {
        if value.kind() != k {
            return Err(JsonError::WrongKind {
                expected: k,
                found: value.kind(),
            });
        }
    }
    cursor.skip_whitespace();
    if cursor.pos != cursor.bytes.len() {
        return Err(JsonError::TrailingData(cursor.pos));
    }
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_scalars() {
        assert_eq!(parse("null", None).unwrap(), Value::Null);
        assert_eq!(parse("true", None).unwrap(), Value::Bool(true));
        assert_eq!(parse("false", None).unwrap(), Value::Bool(false));
        assert_eq!(parse(" 42 ", None).unwrap(), Value::Number(42.0));
        assert_eq!(parse("-3.5e2", None).unwrap(), Value::Number(-350.0));
        assert_eq!(parse("\"hi\"", None).unwrap(), Value::String("hi".into()));
    }

    #[test]
    fn parses_nested_containers() {
        let v = parse(r#"{"a": [1, 2, {"b": true}], "c": null}"#, None).unwrap();
        assert_eq!(v.get_str("a").is_err(), true); // wrong kind, it's an array
        let a = v.get("a", Some(Kind::Array)).unwrap();
        assert_eq!(a.len().unwrap(), 3);
    }

    #[test]
    fn rejects_trailing_data() {
        assert!(matches!(
            parse("42 garbage", None),
            Err(JsonError::TrailingData(_))
        ));
    }

    #[test]
    fn rejects_wrong_expected_kind() {
        assert!(matches!(
            parse("42", Some(Kind::Object)),
            Err(JsonError::WrongKind { .. })
        ));
    }

    #[test]
    fn decodes_escapes_and_bmp_unicode() {
        let v = parse(r#""a\n\tbé""#, None).unwrap();
        assert_eq!(v.as_str(), Some("a\n\tb\u{e9}"));
    }

    #[test]
    fn surrogate_pairs_are_not_reassembled() {
        // 😀 is the UTF-16 surrogate pair for U+1F600 (grinning
        // face). Each half is an unpaired surrogate on its own and decodes
        // independently to U+FFFD rather than being combined.
        let v = parse("\"\\uD83D\\uDE00\"", None).unwrap();
        assert_eq!(v.as_str(), Some("\u{fffd}\u{fffd}"));
    }

    #[test]
    fn decodes_bmp_escape_above_ascii() {
        let v = parse(r#""é""#, None).unwrap();
        assert_eq!(v.as_str(), Some("\u{e9}"));
    }

    #[test]
    fn preserves_insertion_order() {
        let v = parse(r#"{"z": 1, "a": 2}"#, None).unwrap();
        let keys: Vec<&str> = v.entries().unwrap().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}

//! Encoding and decoding of MicroPython literal syntax.
//!
//! Statements sent to the device embed file names and file content as
//! string and bytes literals, and some device output comes back as literal
//! syntax (`print(os.listdir())`, `repr(chunk)`, `os.uname()`). The parsers
//! here implement only the small grammar those outputs use:
//!
//! ```text
//! list   := ws '[' ws ( str ( ws ',' ws str )* ( ws ',' )? )? ws ']' ws
//! bytes  := ws ( 'b' quoted ws )*
//! uname  := ws '(' ws ( ident ws '=' ws str ( ws ',' ws ident ws '=' ws str )* )? ws ')' ws
//! quoted := '\'' char* '\'' | '"' char* '"'
//! ```

use crate::error::{Error, Result};
use std::fmt::Write as _;

/// Encode a string as a single-quoted literal.
pub fn encode_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\x7f' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Encode bytes as a `b'...'` literal.
pub fn encode_bytes(value: &[u8]) -> String {
    let mut out = String::with_capacity(value.len() * 2 + 3);
    out.push_str("b'");
    for &b in value {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            },
        }
    }
    out.push('\'');
    out
}

/// Parse a list of string literals, e.g. `['a.txt', 'b.txt']`.
pub fn parse_str_list(text: &str) -> Result<Vec<String>> {
    let mut cur = Cursor::new(text.as_bytes());
    cur.skip_ws();
    cur.expect(b'[')?;

    let mut items = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(b']') {
            break;
        }
        if !items.is_empty() {
            cur.expect(b',')?;
            cur.skip_ws();
            // Trailing comma
            if cur.eat(b']') {
                break;
            }
        }
        let bytes = cur.quoted(false)?;
        items.push(into_string(bytes, &cur)?);
    }

    cur.finish()?;
    Ok(items)
}

/// Parse zero or more adjacent bytes literals and concatenate them.
///
/// `b'ab'b'\x00'` yields `[0x61, 0x62, 0x00]`; empty input yields no bytes.
pub fn parse_bytes_concat(text: &str) -> Result<Vec<u8>> {
    let mut cur = Cursor::new(text.as_bytes());
    let mut out = Vec::new();
    loop {
        cur.skip_ws();
        if cur.at_end() {
            break;
        }
        cur.expect(b'b')?;
        out.extend(cur.quoted(true)?);
    }
    Ok(out)
}

/// Parse a named-tuple style `(key='value', ...)` into ordered pairs.
pub fn parse_named_tuple(text: &str) -> Result<Vec<(String, String)>> {
    let mut cur = Cursor::new(text.as_bytes());
    cur.skip_ws();
    cur.expect(b'(')?;

    let mut fields = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(b')') {
            break;
        }
        if !fields.is_empty() {
            cur.expect(b',')?;
            cur.skip_ws();
        }
        let key = cur.ident()?;
        cur.skip_ws();
        cur.expect(b'=')?;
        cur.skip_ws();
        let bytes = cur.quoted(false)?;
        fields.push((key, into_string(bytes, &cur)?));
    }

    cur.finish()?;
    Ok(fields)
}

fn into_string(bytes: Vec<u8>, cur: &Cursor<'_>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| cur.error("string literal is not valid UTF-8"))
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, what: &str) -> Error {
        Error::Protocol(format!("malformed literal at offset {}: {what}", self.pos))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", char::from(expected))))
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.skip_ws();
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing data"))
        }
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn hex(&mut self, digits: usize) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|b| char::from(b).to_digit(16))
                .ok_or_else(|| self.error("invalid hex escape"))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn push_char(&self, out: &mut Vec<u8>, code: u32) -> Result<()> {
        let c = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        let mut buf = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }

    /// Parse a quoted literal body, returning its raw bytes.
    ///
    /// In bytes mode `\xNN` is a raw byte and `\u` is not an escape; in
    /// string mode `\xNN` is a code point and the result is UTF-8.
    fn quoted(&mut self, bytes_mode: bool) -> Result<Vec<u8>> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected quote")),
        };
        self.pos += 1;

        let mut out = Vec::new();
        loop {
            let b = self
                .bump()
                .ok_or_else(|| self.error("unterminated literal"))?;
            if b == quote {
                return Ok(out);
            }
            if b != b'\\' {
                out.push(b);
                continue;
            }

            let esc = self
                .bump()
                .ok_or_else(|| self.error("unterminated escape"))?;
            match esc {
                b'\\' | b'\'' | b'"' => out.push(esc),
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'a' => out.push(0x07),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0c),
                b'v' => out.push(0x0b),
                b'\n' => {},
                b'x' => {
                    let value = self.hex(2)?;
                    if bytes_mode {
                        out.push(u8::try_from(value).unwrap_or(u8::MAX));
                    } else {
                        self.push_char(&mut out, value)?;
                    }
                },
                b'u' if !bytes_mode => {
                    let value = self.hex(4)?;
                    self.push_char(&mut out, value)?;
                },
                b'U' if !bytes_mode => {
                    let value = self.hex(8)?;
                    self.push_char(&mut out, value)?;
                },
                b'0'..=b'7' => {
                    let mut value = u32::from(esc - b'0');
                    for _ in 0..2 {
                        match self.peek() {
                            Some(d @ b'0'..=b'7') => {
                                value = value * 8 + u32::from(d - b'0');
                                self.pos += 1;
                            },
                            _ => break,
                        }
                    }
                    if bytes_mode {
                        out.push(u8::try_from(value & 0xff).unwrap_or(u8::MAX));
                    } else {
                        self.push_char(&mut out, value)?;
                    }
                },
                // Unknown escapes are kept verbatim, as the interpreter does
                other => {
                    out.push(b'\\');
                    out.push(other);
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_str() {
        assert_eq!(encode_str("hello.txt"), "'hello.txt'");
        assert_eq!(encode_str("it's"), "'it\\'s'");
        assert_eq!(encode_str("a\\b"), "'a\\\\b'");
        assert_eq!(encode_str("tab\there"), "'tab\\there'");
        assert_eq!(encode_str("\u{1}"), "'\\x01'");
        assert_eq!(encode_str("héllo"), "'héllo'");
    }

    #[test]
    fn test_encode_bytes() {
        assert_eq!(encode_bytes(b""), "b''");
        assert_eq!(encode_bytes(b"hello"), "b'hello'");
        assert_eq!(encode_bytes(b"a'b\\c"), "b'a\\'b\\\\c'");
        assert_eq!(encode_bytes(b"\r\n\t"), "b'\\r\\n\\t'");
        assert_eq!(encode_bytes(&[0x00, 0x7f, 0xff]), "b'\\x00\\x7f\\xff'");
    }

    #[test]
    fn test_encode_bytes_is_parseable() {
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(parse_bytes_concat(&encode_bytes(&all)).unwrap(), all);
    }

    #[test]
    fn test_parse_str_list() {
        assert!(parse_str_list("[]").unwrap().is_empty());
        assert!(parse_str_list("[]\r\n").unwrap().is_empty());
        assert_eq!(
            parse_str_list("['a.txt', 'b.txt']\r\n").unwrap(),
            vec!["a.txt", "b.txt"]
        );
        assert_eq!(parse_str_list("[ 'a.txt']").unwrap(), vec!["a.txt"]);
        assert_eq!(parse_str_list("['a',]").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_parse_str_list_quotes_and_escapes() {
        assert_eq!(
            parse_str_list(r#"["it's", 'q\'s', 'tab\t', '\xe9', 'é']"#).unwrap(),
            vec!["it's", "q's", "tab\t", "é", "é"]
        );
    }

    #[test]
    fn test_parse_str_list_rejects_garbage() {
        assert!(parse_str_list("").is_err());
        assert!(parse_str_list("['a'").is_err());
        assert!(parse_str_list("['a' 'b']").is_err());
        assert!(parse_str_list("['a'] trailing").is_err());
        assert!(matches!(
            parse_str_list("[a]"),
            Err(Error::Protocol(msg)) if msg.contains("offset 1")
        ));
    }

    #[test]
    fn test_parse_bytes_concat() {
        assert!(parse_bytes_concat("").unwrap().is_empty());
        assert_eq!(parse_bytes_concat("b'hello'").unwrap(), b"hello");
        assert_eq!(
            parse_bytes_concat("b'ab'b\"c'd\"\r\nb'\\x00\\xff'").unwrap(),
            b"abc'd\x00\xff"
        );
        assert_eq!(parse_bytes_concat("b'\\0\\7'").unwrap(), b"\x00\x07");
    }

    #[test]
    fn test_parse_bytes_concat_rejects_garbage() {
        assert!(parse_bytes_concat("hello").is_err());
        assert!(parse_bytes_concat("b'abc").is_err());
        assert!(parse_bytes_concat("b'\\xzz'").is_err());
    }

    #[test]
    fn test_parse_named_tuple() {
        let text = "(sysname='microbit', nodename='microbit', release='1.0', \
                    version=\"micro:bit v1.0-b'e10a5ff' on 2018-6-8; \
                    MicroPython v1.9.2-34-gd64154c73 on 2017-09-01\", \
                    machine='micro:bit with nRF51822')\r\n";
        let fields = parse_named_tuple(text).unwrap();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], ("sysname".to_string(), "microbit".to_string()));
        assert_eq!(
            fields[3].1,
            "micro:bit v1.0-b'e10a5ff' on 2018-6-8; MicroPython v1.9.2-34-gd64154c73 on 2017-09-01"
        );
        assert_eq!(fields[4].1, "micro:bit with nRF51822");
    }

    #[test]
    fn test_parse_named_tuple_rejects_garbage() {
        assert!(parse_named_tuple("sysname='x'").is_err());
        assert!(parse_named_tuple("(='x')").is_err());
        assert!(parse_named_tuple("(a='x' b='y')").is_err());
    }
}

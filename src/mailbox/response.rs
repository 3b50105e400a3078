//! Minimal IMAP response reader.
//!
//! Covers what the scanner needs from RFC 9051 responses: tagged status
//! lines, `* n EXISTS`, and `* n FETCH (...)` with atoms, quoted strings,
//! `{n}` literals, `NIL` and nested lists. Section specifiers such as
//! `BODY[HEADER.FIELDS (DATE FROM)]` are read as a single atom.

use crate::error::TransportError;

/// A parsed IMAP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Atom(String),
    /// Quoted string or literal.
    Bytes(Vec<u8>),
    Nil,
    List(Vec<Value>),
}

impl Value {
    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Atom(a) => Some(a.as_bytes()),
            _ => None,
        }
    }
}

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

/// A tagged completion line, e.g. `A3 OK FETCH completed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged {
    pub tag: String,
    pub status: Status,
    pub text: String,
}

/// Items of interest from one `FETCH` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub sequence: u32,
    pub uid: Option<u32>,
    pub internal_date: Option<String>,
    /// Payload of the first `BODY[...]` item, if any.
    pub section: Option<Vec<u8>>,
}

/// Length of a literal announced at the end of a line (`{123}\r\n`).
pub fn literal_length(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"\r\n")?.strip_suffix(b"}")?;
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Parse a tagged completion line. Returns `None` for untagged/continuation lines.
pub fn parse_tagged(line: &[u8]) -> Option<Tagged> {
    if line.starts_with(b"* ") || line.starts_with(b"+") {
        return None;
    }
    let text = String::from_utf8_lossy(line);
    let mut parts = text.trim_end().splitn(3, ' ');
    let tag = parts.next()?.to_string();
    let status = match parts.next()?.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        _ => return None,
    };
    Some(Tagged {
        tag,
        status,
        text: parts.next().unwrap_or_default().to_string(),
    })
}

/// Parse `* n EXISTS`.
pub fn parse_exists(line: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(line).ok()?;
    let rest = text.strip_prefix("* ")?.trim_end();
    let (count, keyword) = rest.split_once(' ')?;
    if !keyword.eq_ignore_ascii_case("EXISTS") {
        return None;
    }
    count.parse().ok()
}

/// Parse a `* n FETCH (...)` response. Returns `Ok(None)` for other untagged data.
pub fn parse_fetch(response: &[u8]) -> Result<Option<FetchResponse>, TransportError> {
    let mut reader = Reader::new(response);
    if !reader.eat(b"* ") {
        return Ok(None);
    }
    let Value::Atom(number) = reader.value()? else {
        return Ok(None);
    };
    let Ok(sequence) = number.parse::<u32>() else {
        return Ok(None);
    };
    reader.eat(b" ");
    match reader.value()? {
        Value::Atom(keyword) if keyword.eq_ignore_ascii_case("FETCH") => {}
        _ => return Ok(None),
    }
    reader.eat(b" ");
    let Value::List(items) = reader.value()? else {
        return Err(TransportError::Protocol("FETCH without item list".into()));
    };

    let mut fetch = FetchResponse {
        sequence,
        ..FetchResponse::default()
    };
    let mut items = items.into_iter();
    while let Some(key) = items.next() {
        let Value::Atom(key) = key else {
            return Err(TransportError::Protocol("FETCH item name is not an atom".into()));
        };
        let value = items.next().unwrap_or(Value::Nil);
        let key = key.to_ascii_uppercase();
        if key == "UID" {
            fetch.uid = value
                .as_bytes()
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(|s| s.parse().ok());
        } else if key == "INTERNALDATE" {
            fetch.internal_date = value
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned());
        } else if key.starts_with("BODY[") && fetch.section.is_none() {
            if let Value::Bytes(bytes) = value {
                fetch.section = Some(bytes);
            }
        }
    }
    Ok(Some(fetch))
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, expected: &[u8]) -> bool {
        if self.input[self.pos..].starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> TransportError {
        TransportError::Protocol(format!("{message} at byte {}", self.pos))
    }

    fn value(&mut self) -> Result<Value, TransportError> {
        self.skip_spaces();
        match self.peek() {
            Some(b'(') => self.list(),
            Some(b'"') => self.quoted(),
            Some(b'{') => self.literal(),
            Some(b) if b != b')' && b != b'\r' && b != b'\n' => self.atom(),
            _ => Err(self.error("expected value")),
        }
    }

    fn list(&mut self) -> Result<Value, TransportError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                Some(_) => items.push(self.value()?),
                None => return Err(self.error("unterminated list")),
            }
        }
    }

    fn quoted(&mut self) -> Result<Value, TransportError> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Value::Bytes(out));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted string")),
            }
        }
    }

    fn literal(&mut self) -> Result<Value, TransportError> {
        let start = self.pos + 1;
        let close = self.input[start..]
            .iter()
            .position(|&b| b == b'}')
            .map(|p| start + p)
            .ok_or_else(|| self.error("unterminated literal size"))?;
        let digits = &self.input[start..close];
        let digits = digits.strip_suffix(b"+").unwrap_or(digits);
        let size: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("invalid literal size"))?;
        self.pos = close + 1;
        if !self.eat(b"\r\n") {
            return Err(self.error("expected CRLF after literal size"));
        }
        let end = self.pos + size;
        if end > self.input.len() {
            return Err(self.error("incomplete literal"));
        }
        let data = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(Value::Bytes(data))
    }

    fn atom(&mut self) -> Result<Value, TransportError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b' ' | b'(' | b')' | b'\r' | b'\n' if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        // Partial fetch suffix: BODY[]<0>
        if self.peek() == Some(b'<') {
            while let Some(b) = self.peek() {
                self.pos += 1;
                if b == b'>' {
                    break;
                }
            }
        }
        let atom = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if atom.eq_ignore_ascii_case("NIL") {
            Ok(Value::Nil)
        } else {
            Ok(Value::Atom(atom))
        }
    }
}

//! Sandboxed evaluator for JavaScript-style object and array literals.
//!
//! Accepts unquoted and single-quoted keys, single/double/backtick strings,
//! trailing commas, comments and `undefined`. Nothing is ever looked up:
//! any identifier in value position is rejected.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::value::number_value;

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiteralError {
    #[error("unexpected end of literal")]
    UnexpectedEnd,
    #[error("unexpected character '{0}' at offset {1}")]
    Unexpected(char, usize),
    #[error("identifier '{0}' is not a literal value")]
    Identifier(String),
    #[error("invalid number '{0}'")]
    Number(String),
    #[error("template interpolation is not allowed")]
    Interpolation,
    #[error("literal nested too deeply")]
    TooDeep,
}

/// Evaluate a literal. Only complete input is accepted.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_trivia();
    match parser.peek() {
        None => Ok(value),
        Some(c) => Err(LiteralError::Unexpected(c, parser.pos)),
    }
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<char, LiteralError> {
        let c = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(c)
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        match self.bump()? {
            c if c == expected => Ok(()),
            c => Err(LiteralError::Unexpected(c, self.pos - 1)),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.pos += 1;
            }
            let next = self.chars.get(self.pos + 1).copied();
            match (self.peek(), next) {
                (Some('/'), Some('/')) => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    while self.pos < self.chars.len()
                        && !(self.chars[self.pos] == '*'
                            && self.chars.get(self.pos + 1) == Some(&'/'))
                    {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                _ => return,
            }
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_trivia();
        match self.peek().ok_or(LiteralError::UnexpectedEnd)? {
            '{' => self.nested(Self::object),
            '[' => self.nested(Self::array),
            '"' | '\'' | '`' => self.string().map(Value::String),
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            c if is_ident_start(c) => {
                let word = self.identifier();
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" | "undefined" => Ok(Value::Null),
                    _ => Err(LiteralError::Identifier(word)),
                }
            }
            c => Err(LiteralError::Unexpected(c, self.pos)),
        }
    }

    fn nested(
        &mut self,
        body: fn(&mut Self) -> Result<Value, LiteralError>,
    ) -> Result<Value, LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(LiteralError::TooDeep);
        }
        let result = body(self);
        self.depth -= 1;
        result
    }

    fn object(&mut self) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = self.key()?;
            self.skip_trivia();
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_trivia();
            match self.bump()? {
                ',' => continue,
                '}' => return Ok(Value::Object(map)),
                c => return Err(LiteralError::Unexpected(c, self.pos - 1)),
            }
        }
    }

    fn key(&mut self) -> Result<String, LiteralError> {
        match self.peek().ok_or(LiteralError::UnexpectedEnd)? {
            '"' | '\'' | '`' => self.string(),
            c if is_ident_start(c) || c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| is_ident_part(c) || c == '.') {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            c => Err(LiteralError::Unexpected(c, self.pos)),
        }
    }

    fn array(&mut self) -> Result<Value, LiteralError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_trivia();
            match self.bump()? {
                ',' => continue,
                ']' => return Ok(Value::Array(items)),
                c => return Err(LiteralError::Unexpected(c, self.pos - 1)),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            let c = self.bump()?;
            if c == quote {
                return Ok(out);
            }
            if quote == '`' && c == '$' && self.peek() == Some('{') {
                return Err(LiteralError::Interpolation);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = self.bump()?;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{0008}'),
                'f' => out.push('\u{000C}'),
                'v' => out.push('\u{000B}'),
                '0' => out.push('\0'),
                'x' => out.push(self.hex_char(2)?),
                'u' if self.peek() == Some('{') => {
                    self.pos += 1;
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c != '}') {
                        self.pos += 1;
                    }
                    let hex: String = self.chars[start..self.pos].iter().collect();
                    self.expect('}')?;
                    out.push(decode_hex(&hex).ok_or(LiteralError::Number(hex))?);
                }
                'u' => out.push(self.hex_char(4)?),
                '\n' => {}
                other => out.push(other),
            }
        }
    }

    fn hex_char(&mut self, digits: usize) -> Result<char, LiteralError> {
        let start = self.pos;
        for _ in 0..digits {
            self.bump()?;
        }
        let hex: String = self.chars[start..self.pos].iter().collect();
        decode_hex(&hex).ok_or(LiteralError::Number(hex))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let sign = matches!(c, '-' | '+')
                && (self.pos == start || matches!(self.chars[self.pos - 1], 'e' | 'E'));
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        parse_js_number(&raw).ok_or(LiteralError::Number(raw))
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_part) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

/// Decimal, exponent, hex and `_`-separated numeric literals.
fn parse_js_number(raw: &str) -> Option<Value> {
    let cleaned = raw.replace('_', "");
    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let magnitude = match body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()? as f64,
        None if body.starts_with(|c: char| c.is_ascii_digit() || c == '.') => body.parse().ok()?,
        None => return None,
    };
    number_value(if negative { -magnitude } else { magnitude })
}

fn decode_hex(hex: &str) -> Option<char> {
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

//! Dot/bracket paths and the deep tree operations built on them.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("malformed path '{path}': {reason}")]
    Malformed { path: String, reason: String },
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `.name` or `["name"]`.
    Key(String),
    /// `[3]`.
    Index(usize),
}

impl Segment {
    /// Numeric reading of the segment; `items.0` and `items[0]` both index arrays.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Key(k) if !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()) => {
                k.parse().ok()
            }
            Segment::Key(_) => None,
        }
    }

    /// Key reading of the segment, used against maps.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

/// A parsed state path such as `players[0].stats["hit points"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse a path string.
    ///
    /// Syntax:
    /// - `a.b` → two keys
    /// - `a[0]` → key then index
    /// - `a["x.y"]` / `a['x.y']` → quoted key (may contain dots)
    /// - empty string → root
    pub fn parse(input: &str) -> Result<Path, PathError> {
        let malformed = |reason: &str| PathError::Malformed {
            path: input.to_string(),
            reason: reason.to_string(),
        };

        let chars: Vec<char> = input.trim().chars().collect();
        let len = chars.len();
        let mut segments = Vec::new();
        let mut name = String::new();
        // A segment just closed by `]` may be followed directly by `.` or `[`.
        let mut after_bracket = false;
        let mut i = 0;

        while i < len {
            match chars[i] {
                '.' => {
                    if name.is_empty() && !after_bracket {
                        return Err(malformed("empty segment"));
                    }
                    if !name.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut name)));
                    }
                    after_bracket = false;
                    i += 1;
                }
                '[' => {
                    if !name.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut name)));
                    }
                    i += 1;
                    let segment = if i < len && (chars[i] == '"' || chars[i] == '\'') {
                        let quote = chars[i];
                        i += 1;
                        let mut key = String::new();
                        while i < len && chars[i] != quote {
                            if chars[i] == '\\' && i + 1 < len {
                                i += 1;
                            }
                            key.push(chars[i]);
                            i += 1;
                        }
                        if i >= len {
                            return Err(malformed("unterminated quoted key"));
                        }
                        i += 1;
                        Segment::Key(key)
                    } else {
                        let start = i;
                        while i < len && chars[i] != ']' {
                            i += 1;
                        }
                        let raw: String = chars[start..i].iter().collect();
                        let raw = raw.trim();
                        if raw.is_empty() {
                            return Err(malformed("empty brackets"));
                        }
                        match raw.parse::<usize>() {
                            Ok(index) => Segment::Index(index),
                            Err(_) => Segment::Key(raw.to_string()),
                        }
                    };
                    if i >= len || chars[i] != ']' {
                        return Err(malformed("unclosed bracket"));
                    }
                    i += 1;
                    segments.push(segment);
                    after_bracket = true;
                }
                ']' => return Err(malformed("unmatched closing bracket")),
                c => {
                    if after_bracket {
                        return Err(malformed("expected '.' or '[' after ']'"));
                    }
                    name.push(c);
                    i += 1;
                }
            }
        }

        if !name.is_empty() {
            segments.push(Segment::Key(name));
        } else if len > 0 && !after_bracket {
            return Err(malformed("trailing '.'"));
        }

        Ok(Path { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, segment: Segment) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Path { segments }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Index(index) => write!(f, "[{}]", index)?,
                Segment::Key(key) if key.contains(['.', '[', ']']) || key.is_empty() => {
                    write!(f, "[{:?}]", key)?
                }
                Segment::Key(key) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
            }
        }
        Ok(())
    }
}

fn step<'a>(node: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(&segment.as_key()),
        Value::Array(items) => items.get(segment.as_index()?),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(&segment.as_key()),
        Value::Array(items) => items.get_mut(segment.as_index()?),
        _ => None,
    }
}

/// Read the value at `path`.
pub fn get<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments.iter().try_fold(root, step)
}

pub fn get_mut<'a>(root: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in &path.segments {
        node = step_mut(node, segment)?;
    }
    Some(node)
}

pub fn has(root: &Value, path: &Path) -> bool {
    get(root, path).is_some()
}

/// Write `value` at `path`, creating intermediate containers as needed.
///
/// A missing container becomes an array when the next segment is an index,
/// otherwise a map. Primitives in the way are replaced. Arrays written past
/// their end are padded with nulls.
pub fn set(root: &mut Value, path: &Path, value: Value) {
    let mut node = root;
    for (i, segment) in path.segments.iter().enumerate() {
        let next_is_index = matches!(path.segments.get(i + 1), Some(Segment::Index(_)));

        let slot = match (node, segment.as_index()) {
            (Value::Array(items), Some(index)) => {
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[index]
            }
            (Value::Object(map), _) => map.entry(segment.as_key()).or_insert(Value::Null),
            (other, Some(index)) if matches!(segment, Segment::Index(_)) => {
                *other = Value::Array(vec![Value::Null; index + 1]);
                &mut other[index]
            }
            (other, _) => {
                *other = Value::Object(Map::new());
                let key = segment.as_key();
                &mut other[key.as_str()]
            }
        };

        if i + 1 == path.segments.len() {
            *slot = value;
            return;
        }
        if !matches!(slot, Value::Object(_) | Value::Array(_)) {
            *slot = if next_is_index {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            };
        }
        node = slot;
    }
    *node = value;
}

/// Remove the value at `path`, returning it. Array elements are spliced out.
pub fn unset(root: &mut Value, path: &Path) -> Option<Value> {
    let (last, parent_path) = match path.parent() {
        Some(parent) => (path.last()?, parent),
        None => return None,
    };
    match get_mut(root, &parent_path)? {
        Value::Object(map) => map.shift_remove(&last.as_key()),
        Value::Array(items) => {
            let index = last.as_index()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Deep merge `source` into `target`.
///
/// Maps merge key by key, sequences merge position by position, anything
/// else in `source` replaces what is in `target`.
pub fn merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        dst.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(dst), Value::Array(src)) => {
            for (index, value) in src.into_iter().enumerate() {
                match dst.get_mut(index) {
                    Some(existing) => merge(existing, value),
                    None => dst.push(value),
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

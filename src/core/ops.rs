//! Command handlers for `set`, `insert`, `delete` and `add`.
//!
//! Handlers run synchronously against the live state. Each success reports
//! the diff strings it produced and, for variable-level changes, the change
//! to announce to listeners.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use serde_json::Value;
use thiserror::Error;

use super::command::{Command, CommandKind};
use super::executor::BatchSettings;
use super::template::apply_template;
use super::value_parser::{parse_command_value, parse_path_argument};
use crate::schema::game_data::GameData;
use crate::schema::infer::{clean_up_metadata, refresh_schema_at};
use crate::schema::node::{get_schema_for_path, SchemaNode};
use crate::schema::path::{self, Path, PathError, Segment};
use crate::schema::value::{
    coerce_number, deep_equal, display_value, kind_name, number_value, round_significant, Slot,
    SIGNIFICANT_DIGITS,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("path '{0}' does not exist")]
    PathNotFound(String),
    #[error("parent of '{0}' does not exist")]
    ParentNotFound(String),
    #[error("schema violation at '{path}': {reason}")]
    SchemaViolation { path: String, reason: String },
    #[error("type mismatch at '{path}': {reason}")]
    TypeMismatch { path: String, reason: String },
    #[error("nothing in '{path}' matches {selector}")]
    SelectorNotFound { path: String, selector: String },
    #[error("cannot add to '{path}': {reason}")]
    InvalidDelta { path: String, reason: String },
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl From<PathError> for CommandError {
    fn from(e: PathError) -> Self {
        CommandError::InvalidArguments(e.to_string())
    }
}

/// A variable-level change announced to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: Path,
    pub old: Value,
    pub new: Value,
}

/// Outcome of one successful command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Applied {
    /// Diff strings and where they land in the display and delta views.
    pub displays: Vec<(Path, String)>,
    pub change: Option<Change>,
}

impl Applied {
    fn at(path: Path, display: String, change: Option<Change>) -> Self {
        Self {
            displays: vec![(path, display)],
            change,
        }
    }
}

/// Run one command. The verb is canonicalized here, so aliases are accepted.
pub fn apply(
    command: &Command,
    game_data: &mut GameData,
    settings: &BatchSettings,
    rng: &mut StdRng,
) -> Result<Applied, CommandError> {
    match command.kind.canonical() {
        CommandKind::Set => set(command, game_data, settings, rng),
        CommandKind::Insert => insert(command, game_data, settings, rng),
        CommandKind::Delete => delete(command, game_data, rng),
        CommandKind::Add => add(command, game_data, rng),
        other => Err(CommandError::InvalidArguments(format!("unsupported verb '{}'", other))),
    }
}

fn with_reason(text: String, reason: &str) -> String {
    if reason.is_empty() {
        text
    } else {
        format!("{} ({})", text, reason)
    }
}

fn target_path(command: &Command) -> Result<Path, CommandError> {
    let raw = command
        .args
        .first()
        .ok_or_else(|| CommandError::InvalidArguments("missing path".to_string()))?;
    let path = Path::parse(&parse_path_argument(raw))?;
    if path.is_root() {
        return Err(CommandError::InvalidArguments("empty path".to_string()));
    }
    Ok(path)
}

fn schema_at<'a>(game_data: &'a GameData, path: &Path) -> Option<&'a SchemaNode> {
    game_data
        .schema
        .as_ref()
        .and_then(|schema| get_schema_for_path(&schema.root, path))
}

/// The path `set`/`add` actually write: slot 0 of an annotated scalar, else the path itself.
fn scalar_target(stat_data: &Value, path: &Path, unwrap: bool) -> Result<Path, CommandError> {
    let current =
        path::get(stat_data, path).ok_or_else(|| CommandError::PathNotFound(path.to_string()))?;
    match Slot::classify(current).scalar_slot() {
        Some(_) if unwrap => Ok(path.child(Segment::Index(0))),
        _ => Ok(path.clone()),
    }
}

/// Non-negative integral numbers only.
fn as_index(value: &Value) -> Option<usize> {
    let n = value.as_f64()?;
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn set(
    command: &Command,
    game_data: &mut GameData,
    settings: &BatchSettings,
    rng: &mut StdRng,
) -> Result<Applied, CommandError> {
    let path = target_path(command)?;
    // `(path, new)` or `(path, old, new)`; the old value is not checked.
    let raw_new = match command.args.len() {
        2 => &command.args[1],
        n if n >= 3 => &command.args[2],
        _ => return Err(CommandError::InvalidArguments("set expects a path and a value".to_string())),
    };
    let mut new = parse_command_value(raw_new, rng);

    let slot_path = scalar_target(&game_data.stat_data, &path, !settings.flags.strict_set)?;
    let old = path::get(&game_data.stat_data, &path).cloned().unwrap_or(Value::Null);
    let previous = path::get(&game_data.stat_data, &slot_path)
        .cloned()
        .unwrap_or(Value::Null);

    if previous.is_number() && !new.is_null() {
        let coerced = coerce_number(&new).and_then(number_value);
        new = coerced.ok_or_else(|| CommandError::TypeMismatch {
            path: path.to_string(),
            reason: format!("expected a number, got '{}'", display_value(&new)),
        })?;
    }

    path::set(&mut game_data.stat_data, &slot_path, new.clone());
    let updated = path::get(&game_data.stat_data, &path).cloned().unwrap_or(Value::Null);

    let display = format!("{}->{}", display_value(&previous), display_value(&new));
    Ok(Applied::at(
        path.clone(),
        with_reason(display, &command.reason),
        Some(Change {
            path,
            old,
            new: updated,
        }),
    ))
}

fn insert(
    command: &Command,
    game_data: &mut GameData,
    settings: &BatchSettings,
    rng: &mut StdRng,
) -> Result<Applied, CommandError> {
    let path = target_path(command)?;
    let reason = command.reason.as_str();
    let existing = path::get(&game_data.stat_data, &path).map(kind_name);
    let not_a_container = |kind: &str| CommandError::TypeMismatch {
        path: path.to_string(),
        reason: format!("cannot insert into a {}", kind),
    };

    if command.args.len() == 2 {
        let value = parse_command_value(&command.args[1], rng);
        return match existing {
            Some("array") => insert_element(game_data, settings, &path, None, value, reason),
            Some("object") => merge_into(game_data, settings, &path, value, reason),
            Some(kind) => Err(not_a_container(kind)),
            // A new path: insert under its existing parent.
            None => {
                let (Some(parent), Some(last)) = (path.parent(), path.last()) else {
                    return Err(CommandError::ParentNotFound(path.to_string()));
                };
                match path::get(&game_data.stat_data, &parent).map(kind_name) {
                    Some("object") => {
                        insert_key(game_data, settings, &parent, last.as_key(), value, reason)
                    }
                    Some("array") => {
                        let index = last.as_index().ok_or_else(|| {
                            CommandError::InvalidArguments(format!("'{}' is not an index", last.as_key()))
                        })?;
                        insert_element(game_data, settings, &parent, Some(index), value, reason)
                    }
                    Some(kind) => Err(CommandError::TypeMismatch {
                        path: parent.to_string(),
                        reason: format!("cannot insert into a {}", kind),
                    }),
                    None => Err(CommandError::ParentNotFound(path.to_string())),
                }
            }
        };
    }

    let selector = parse_command_value(&command.args[1], rng);
    let value = parse_command_value(&command.args[2], rng);
    match existing {
        Some("array") => {
            let index = as_index(&selector)
                .or_else(|| selector.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| {
                    CommandError::InvalidArguments(format!(
                        "'{}' is not an array index",
                        display_value(&selector)
                    ))
                })?;
            insert_element(game_data, settings, &path, Some(index), value, reason)
        }
        Some("object") => insert_key(game_data, settings, &path, display_value(&selector), value, reason),
        Some(kind) => Err(not_a_container(kind)),
        None => {
            let parent = path.parent().unwrap_or_default();
            if !path::has(&game_data.stat_data, &parent) {
                return Err(CommandError::ParentNotFound(path.to_string()));
            }
            if let (Some(SchemaNode::Object(object)), Some(last)) =
                (schema_at(game_data, &parent), path.last())
            {
                if !object.accepts_key(&last.as_key()) {
                    return Err(CommandError::SchemaViolation {
                        path: parent.to_string(),
                        reason: format!("object does not accept new key '{}'", last.as_key()),
                    });
                }
            }
            path::set(&mut game_data.stat_data, &path, Value::Object(Default::default()));
            insert_key(game_data, settings, &path, display_value(&selector), value, reason)
        }
    }
}

/// Append (`index == None`) or splice into the array at `container`.
fn insert_element(
    game_data: &mut GameData,
    settings: &BatchSettings,
    container: &Path,
    index: Option<usize>,
    value: Value,
    reason: &str,
) -> Result<Applied, CommandError> {
    let node = schema_at(game_data, container);
    if let Some(SchemaNode::Array(array)) = node {
        if !array.extensible {
            return Err(CommandError::SchemaViolation {
                path: container.to_string(),
                reason: "array is not extensible".to_string(),
            });
        }
    }
    let template = node.and_then(SchemaNode::template).cloned();
    let flags = settings.flags;
    let value = apply_template(
        value,
        template.as_ref(),
        flags.strict_template,
        flags.concat_template_array,
    );

    let Some(Value::Array(items)) = path::get_mut(&mut game_data.stat_data, container) else {
        return Err(CommandError::PathNotFound(container.to_string()));
    };
    let old = Value::Array(items.clone());
    let at = index.map_or(items.len(), |i| i.min(items.len()));
    if index.is_some_and(|i| i > items.len()) {
        tracing::debug!(
            target: "narrative_state::executor",
            path = %container,
            index = ?index,
            len = items.len(),
            "insert index past the end; appending"
        );
    }
    items.insert(at, value);

    refresh_schema_at(game_data, container, settings.flags);
    let inserted = cleaned(&mut game_data.stat_data, &container.child(Segment::Index(at)));
    let new = path::get(&game_data.stat_data, container).cloned().unwrap_or(Value::Null);

    Ok(Applied::at(
        container.clone(),
        with_reason(format!("inserted {}", inserted), reason),
        Some(Change {
            path: container.clone(),
            old,
            new,
        }),
    ))
}

/// Set `key` on the object at `container`, applying the object's template.
fn insert_key(
    game_data: &mut GameData,
    settings: &BatchSettings,
    container: &Path,
    key: String,
    value: Value,
    reason: &str,
) -> Result<Applied, CommandError> {
    let node = schema_at(game_data, container);
    if let Some(SchemaNode::Object(object)) = node {
        if !object.accepts_key(&key) {
            return Err(CommandError::SchemaViolation {
                path: container.to_string(),
                reason: format!("object does not accept new key '{}'", key),
            });
        }
    }
    let template = node.and_then(SchemaNode::template).cloned();
    let flags = settings.flags;
    let value = apply_template(
        value,
        template.as_ref(),
        flags.strict_template,
        flags.concat_template_array,
    );

    let child = container.child(Segment::Key(key));
    let old = path::get(&game_data.stat_data, &child).cloned().unwrap_or(Value::Null);
    path::set(&mut game_data.stat_data, &child, value);

    refresh_schema_at(game_data, container, settings.flags);
    let inserted = cleaned(&mut game_data.stat_data, &child);

    Ok(Applied::at(
        child.clone(),
        with_reason(format!("inserted {}", inserted), reason),
        Some(Change {
            path: child,
            old,
            new: inserted,
        }),
    ))
}

/// Deep-merge a map into the object at `container`. Templates never apply here.
fn merge_into(
    game_data: &mut GameData,
    settings: &BatchSettings,
    container: &Path,
    value: Value,
    reason: &str,
) -> Result<Applied, CommandError> {
    let Value::Object(fields) = value else {
        return Err(CommandError::TypeMismatch {
            path: container.to_string(),
            reason: "only a map can be merged into an object".to_string(),
        });
    };
    if let Some(SchemaNode::Object(object)) = schema_at(game_data, container) {
        if let Some(key) = fields.keys().find(|key| !object.accepts_key(key)) {
            return Err(CommandError::SchemaViolation {
                path: container.to_string(),
                reason: format!("object does not accept new key '{}'", key),
            });
        }
    }

    let old = path::get(&game_data.stat_data, container).cloned().unwrap_or(Value::Null);
    let keys: Vec<String> = fields.keys().cloned().collect();
    if let Some(target) = path::get_mut(&mut game_data.stat_data, container) {
        path::merge(target, Value::Object(fields));
    }
    refresh_schema_at(game_data, container, settings.flags);

    let displays = keys
        .into_iter()
        .map(|key| {
            let child = container.child(Segment::Key(key));
            let inserted = cleaned(&mut game_data.stat_data, &child);
            (child, with_reason(format!("inserted {}", inserted), reason))
        })
        .collect();
    let new = path::get(&game_data.stat_data, container).cloned().unwrap_or(Value::Null);

    Ok(Applied {
        displays,
        change: Some(Change {
            path: container.clone(),
            old,
            new,
        }),
    })
}

/// Strip inference metadata from the value at `path` and return a copy of it.
fn cleaned(stat_data: &mut Value, path: &Path) -> Value {
    match path::get_mut(stat_data, path) {
        Some(value) => {
            clean_up_metadata(value);
            value.clone()
        }
        None => Value::Null,
    }
}

fn delete(
    command: &Command,
    game_data: &mut GameData,
    rng: &mut StdRng,
) -> Result<Applied, CommandError> {
    let path = target_path(command)?;
    let reason = command.reason.as_str();
    if command.args.len() == 1 {
        return delete_path(game_data, &path, reason);
    }

    let selector = parse_command_value(&command.args[1], rng);
    match path::get(&game_data.stat_data, &path).map(kind_name) {
        Some("array") => remove_element(game_data, &path, &selector, reason),
        Some("object") => remove_entry(game_data, &path, &selector, reason),
        Some(kind) => Err(CommandError::TypeMismatch {
            path: path.to_string(),
            reason: format!("cannot remove from a {}", kind),
        }),
        None => Err(CommandError::PathNotFound(path.to_string())),
    }
}

fn delete_path(
    game_data: &mut GameData,
    path: &Path,
    reason: &str,
) -> Result<Applied, CommandError> {
    if !path::has(&game_data.stat_data, path) {
        return Err(CommandError::PathNotFound(path.to_string()));
    }
    let parent = path.parent().unwrap_or_default();
    let key = path.last().map(Segment::as_key).unwrap_or_default();
    match schema_at(game_data, &parent) {
        Some(SchemaNode::Object(object)) if object.is_required(&key) => {
            return Err(CommandError::SchemaViolation {
                path: path.to_string(),
                reason: format!("'{}' is required", key),
            });
        }
        Some(SchemaNode::Array(array)) if !array.extensible => {
            return Err(CommandError::SchemaViolation {
                path: parent.to_string(),
                reason: "array is not extensible".to_string(),
            });
        }
        _ => {}
    }

    let removed = path::unset(&mut game_data.stat_data, path).unwrap_or(Value::Null);
    Ok(Applied::at(
        path.clone(),
        with_reason(format!("removed {}", removed), reason),
        Some(Change {
            path: path.clone(),
            old: removed,
            new: Value::Null,
        }),
    ))
}

/// Remove one element by index, else by the first deep-equal match.
fn remove_element(
    game_data: &mut GameData,
    container: &Path,
    selector: &Value,
    reason: &str,
) -> Result<Applied, CommandError> {
    if let Some(SchemaNode::Array(array)) = schema_at(game_data, container) {
        if !array.extensible {
            return Err(CommandError::SchemaViolation {
                path: container.to_string(),
                reason: "array is not extensible".to_string(),
            });
        }
    }
    let Some(Value::Array(items)) = path::get_mut(&mut game_data.stat_data, container) else {
        return Err(CommandError::PathNotFound(container.to_string()));
    };
    let index = as_index(selector)
        .filter(|&i| i < items.len())
        .or_else(|| items.iter().position(|item| deep_equal(item, selector)))
        .ok_or_else(|| CommandError::SelectorNotFound {
            path: container.to_string(),
            selector: display_value(selector),
        })?;
    let removed = items.remove(index);

    // Element-level removal announces no change to listeners.
    Ok(Applied::at(
        container.clone(),
        with_reason(format!("removed {}", removed), reason),
        None,
    ))
}

/// Remove one entry by its position among the keys, else by literal key.
fn remove_entry(
    game_data: &mut GameData,
    container: &Path,
    selector: &Value,
    reason: &str,
) -> Result<Applied, CommandError> {
    let Some(Value::Object(map)) = path::get(&game_data.stat_data, container) else {
        return Err(CommandError::PathNotFound(container.to_string()));
    };
    let key = as_index(selector)
        .and_then(|i| map.keys().nth(i).cloned())
        .unwrap_or_else(|| display_value(selector));
    if !map.contains_key(&key) {
        return Err(CommandError::SelectorNotFound {
            path: container.to_string(),
            selector: key,
        });
    }
    if let Some(SchemaNode::Object(object)) = schema_at(game_data, container) {
        if object.is_required(&key) {
            return Err(CommandError::SchemaViolation {
                path: container.to_string(),
                reason: format!("'{}' is required", key),
            });
        }
    }

    let child = container.child(Segment::Key(key));
    let removed = path::unset(&mut game_data.stat_data, &child).unwrap_or(Value::Null);
    Ok(Applied::at(child, with_reason(format!("removed {}", removed), reason), None))
}

fn add(command: &Command, game_data: &mut GameData, rng: &mut StdRng) -> Result<Applied, CommandError> {
    let path = target_path(command)?;
    if command.args.len() != 2 {
        return Err(CommandError::InvalidArguments("add expects a path and a delta".to_string()));
    }
    let delta = parse_command_value(&command.args[1], rng);

    let slot_path = scalar_target(&game_data.stat_data, &path, true)?;
    let old = path::get(&game_data.stat_data, &path).cloned().unwrap_or(Value::Null);
    let previous = path::get(&game_data.stat_data, &slot_path)
        .cloned()
        .unwrap_or(Value::Null);

    let invalid = |reason: String| CommandError::InvalidDelta {
        path: path.to_string(),
        reason,
    };
    let step = coerce_number(&delta)
        .ok_or_else(|| invalid(format!("delta '{}' is not a number", display_value(&delta))))?;

    let updated = match &previous {
        Value::Number(n) => {
            let sum = n.as_f64().unwrap_or(0.0) + step;
            number_value(round_significant(sum, SIGNIFICANT_DIGITS))
                .ok_or_else(|| invalid("result is not finite".to_string()))?
        }
        Value::String(text) => {
            let date = parse_date(text)
                .ok_or_else(|| invalid(format!("'{}' is neither a number nor a date", text)))?;
            let shifted = TimeDelta::try_milliseconds(step.round() as i64)
                .and_then(|offset| date.checked_add_signed(offset))
                .ok_or_else(|| invalid("date out of range".to_string()))?;
            Value::String(format_date(shifted))
        }
        other => return Err(invalid(format!("cannot add to a {}", kind_name(other)))),
    };

    path::set(&mut game_data.stat_data, &slot_path, updated.clone());
    let new = path::get(&game_data.stat_data, &path).cloned().unwrap_or(Value::Null);

    let display = format!("{}->{}", display_value(&previous), display_value(&updated));
    Ok(Applied::at(
        path.clone(),
        with_reason(display, &command.reason),
        Some(Change { path, old, new }),
    ))
}

/// Dates accepted by `add`: RFC 3339, `YYYY-MM-DD` and `YYYY-MM-DD HH:MM[:SS]`.
/// Plain numeric strings are never dates.
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.parse::<f64>().is_ok() {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::extract_commands;
    use crate::schema::game_data::{RootFlags, StateSchema};
    use crate::schema::infer::generate_schema;
    use rand::SeedableRng;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn settings() -> BatchSettings {
        BatchSettings {
            flags: RootFlags::default(),
            notify_errors: false,
        }
    }

    fn run(text: &str, game_data: &mut GameData) -> Result<Applied, CommandError> {
        run_with(text, game_data, &settings())
    }

    fn run_with(
        text: &str,
        game_data: &mut GameData,
        settings: &BatchSettings,
    ) -> Result<Applied, CommandError> {
        let mut rng = StdRng::seed_from_u64(3);
        let commands = extract_commands(text);
        assert_eq!(commands.len(), 1, "expected one command in {text}");
        apply(&commands[0], game_data, settings, &mut rng)
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn with_schema(data: Value) -> GameData {
        let mut gd = GameData::new(data);
        gd.schema = Some(StateSchema {
            root: generate_schema(&gd.stat_data, None, false),
            flags: RootFlags::default(),
        });
        clean_up_metadata(&mut gd.stat_data);
        gd
    }

    #[test]
    fn set_replaces_and_reports() {
        let mut gd = GameData::new(json!({"health": 100}));
        let applied = run("_.set('health', 100, 80);//hit", &mut gd).unwrap();
        assert_eq!(gd.stat_data["health"], json!(80));
        assert_eq!(applied.displays, vec![(Path::parse("health").unwrap(), "100->80 (hit)".to_string())]);
        let change = applied.change.unwrap();
        assert_eq!(change.old, json!(100));
        assert_eq!(change.new, json!(80));
    }

    #[test]
    fn set_ignores_the_old_value_argument() {
        let mut gd = GameData::new(json!({"health": 100}));
        run("_.set('health', 5, 80);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["health"], json!(80));
    }

    #[test]
    fn set_requires_an_existing_path() {
        let mut gd = GameData::new(json!({"players": []}));
        let err = run("_.set('players[0].level', 5);", &mut gd).unwrap_err();
        assert_eq!(err, CommandError::PathNotFound("players[0].level".to_string()));
        assert_eq!(gd.stat_data, json!({"players": []}));
    }

    #[test]
    fn set_updates_described_slot_unless_strict() {
        let mut gd = GameData::new(json!({"hp": [100, "hit points"]}));
        let applied = run("_.set('hp', 90);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["hp"], json!([90, "hit points"]));
        assert_eq!(applied.displays[0].1, "100->90");

        let strict = BatchSettings {
            flags: RootFlags {
                strict_set: true,
                ..RootFlags::default()
            },
            notify_errors: false,
        };
        run_with("_.set('hp', 70);", &mut gd, &strict).unwrap();
        assert_eq!(gd.stat_data["hp"], json!(70));
    }

    #[test]
    fn set_coerces_numeric_slots() {
        let mut gd = GameData::new(json!({"gold": 10}));
        run("_.set('gold', '25');", &mut gd).unwrap();
        assert_eq!(gd.stat_data["gold"], json!(25));

        let err = run("_.set('gold', 'lots');", &mut gd).unwrap_err();
        assert!(matches!(err, CommandError::TypeMismatch { .. }));
        assert_eq!(gd.stat_data["gold"], json!(25));
    }

    #[test]
    fn insert_appends_to_extensible_arrays_only() {
        let mut gd = with_schema(json!({"items": ["$__META_EXTENSIBLE__$"]}));
        assert_eq!(gd.stat_data, json!({"items": []}));
        let applied = run("_.assign('items', 'sword');", &mut gd).unwrap();
        assert_eq!(gd.stat_data["items"], json!(["sword"]));
        assert_eq!(applied.displays[0].1, "inserted \"sword\"");

        let mut closed = with_schema(json!({"items": ["a"]}));
        let err = run("_.insert('items', 'b');", &mut closed).unwrap_err();
        assert!(matches!(err, CommandError::SchemaViolation { .. }));
        assert_eq!(closed.stat_data["items"], json!(["a"]));
    }

    #[test]
    fn insert_splices_at_clamped_index() {
        let mut gd = with_schema(json!({"q": ["$__META_EXTENSIBLE__$", 1, 2, 3]}));
        run("_.insert('q', 1, 9);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["q"], json!([1, 9, 2, 3]));

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            run("_.insert('q', 99, 4);", &mut gd).unwrap();
        });
        assert_eq!(gd.stat_data["q"], json!([1, 9, 2, 3, 4]));
        let output = logs.text();
        assert!(output.contains("insert index past the end"), "{output}");
        assert!(output.contains("len=4"), "{output}");
    }

    #[test]
    fn insert_without_schema_keeps_inserted_metadata() {
        let mut gd = GameData::new(json!({"bag": {}}));
        let applied = run(
            r#"_.insert('bag', 'pouch', {"$meta": {"extensible": true, "template": {"coins": 0}}});"#,
            &mut gd,
        )
        .unwrap();
        assert_eq!(gd.stat_data, json!({"bag": {"pouch": {}}}));
        assert!(!applied.displays[0].1.contains("$meta"));

        let pouch = get_schema_for_path(
            &gd.schema.as_ref().unwrap().root,
            &Path::parse("bag.pouch").unwrap(),
        )
        .unwrap();
        assert!(pouch.as_object().unwrap().extensible);
        assert_eq!(pouch.template(), Some(&json!({"coins": 0})));

        run("_.insert('bag.pouch', 'gem', {a: 1});", &mut gd).unwrap();
        assert_eq!(gd.stat_data["bag"]["pouch"]["gem"], json!({"coins": 0, "a": 1}));
    }

    #[test]
    fn insert_applies_templates_to_new_entries() {
        let mut gd = with_schema(json!({
            "inventory": {"$meta": {"extensible": true, "template": {"qty": 1, "rarity": "common"}}}
        }));
        let applied = run("_.insert('inventory', 'rope', {rarity: 'rare'});", &mut gd).unwrap();
        assert_eq!(
            gd.stat_data["inventory"]["rope"],
            json!({"qty": 1, "rarity": "rare"})
        );
        assert_eq!(applied.displays[0].0, Path::parse("inventory.rope").unwrap());
    }

    #[test]
    fn object_merge_skips_templates() {
        let mut gd = with_schema(json!({
            "flags": {"$meta": {"extensible": true, "template": {"seen": false}}, "a": 1}
        }));
        run("_.insert('flags', {b: 2});", &mut gd).unwrap();
        assert_eq!(gd.stat_data["flags"], json!({"a": 1, "b": 2}));
    }

    #[test]
    fn insert_rejects_undeclared_keys_on_closed_objects() {
        let mut gd = with_schema(json!({"stats": {"str": 5}}));
        let err = run("_.insert('stats', 'dex', 3);", &mut gd).unwrap_err();
        assert!(matches!(err, CommandError::SchemaViolation { .. }));
        run("_.insert('stats', 'str', 6);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["stats"]["str"], json!(6));
    }

    #[test]
    fn insert_creates_missing_container_under_existing_parent() {
        let mut gd = GameData::new(json!({"world": {}}));
        run("_.insert('world.towns', 'ashford', 'village');", &mut gd).unwrap();
        assert_eq!(gd.stat_data["world"]["towns"], json!({"ashford": "village"}));

        let err = run("_.insert('nowhere.towns', 'x', 1);", &mut gd).unwrap_err();
        assert!(matches!(err, CommandError::ParentNotFound(_)));
    }

    #[test]
    fn insert_into_primitive_fails() {
        let mut gd = GameData::new(json!({"name": "Ann"}));
        let err = run("_.insert('name', 'x');", &mut gd).unwrap_err();
        assert!(matches!(err, CommandError::TypeMismatch { .. }));
    }

    #[test]
    fn delete_whole_path_respects_required() {
        let mut gd = with_schema(json!({"hp": 10, "bag": {"$meta": {"extensible": true}, "gem": 1}}));
        let err = run("_.delete('hp');", &mut gd).unwrap_err();
        assert!(matches!(err, CommandError::SchemaViolation { .. }));

        let applied = run("_.remove('bag.gem');//sold", &mut gd).unwrap();
        assert_eq!(gd.stat_data["bag"], json!({}));
        assert_eq!(applied.displays[0].1, "removed 1 (sold)");
        assert!(applied.change.is_some());
    }

    #[test]
    fn delete_from_closed_array_is_rejected() {
        let mut gd = with_schema(json!({"items": ["a", "b"]}));
        for text in ["_.delete('items', 'a');", "_.delete('items[0]');"] {
            let err = run(text, &mut gd).unwrap_err();
            assert!(matches!(err, CommandError::SchemaViolation { .. }), "{text}");
            assert_eq!(gd.stat_data, json!({"items": ["a", "b"]}), "{text}");
        }
    }

    #[test]
    fn delete_element_by_index_or_value() {
        let mut gd = GameData::new(json!({"items": ["a", "b", "c", 7]}));
        let applied = run("_.unset('items', 'b');", &mut gd).unwrap();
        assert_eq!(gd.stat_data["items"], json!(["a", "c", 7]));
        assert!(applied.change.is_none());

        run("_.delete('items', 0);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["items"], json!(["c", 7]));

        run("_.delete('items', 7);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["items"], json!(["c"]));

        let err = run("_.delete('items', 'zzz');", &mut gd).unwrap_err();
        assert!(matches!(err, CommandError::SelectorNotFound { .. }));
    }

    #[test]
    fn delete_entry_by_position_or_key() {
        let mut gd = GameData::new(json!({"m": {"x": 1, "y": 2, "z": 3}}));
        run("_.delete('m', 1);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["m"], json!({"x": 1, "z": 3}));
        let applied = run("_.delete('m', 'z');", &mut gd).unwrap();
        assert_eq!(gd.stat_data["m"], json!({"x": 1}));
        assert_eq!(applied.displays[0].0, Path::parse("m.z").unwrap());
    }

    #[test]
    fn add_numbers_with_rounding() {
        let mut gd = GameData::new(json!({"mana": 50, "gold": [0.1, "coins"]}));
        let applied = run("_.add('mana', 10*2+5);//regen", &mut gd).unwrap();
        assert_eq!(gd.stat_data["mana"], json!(75));
        assert_eq!(applied.displays[0].1, "50->75 (regen)");

        run("_.add('gold', 0.2);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["gold"], json!([0.3, "coins"]));
    }

    #[test]
    fn add_milliseconds_to_dates() {
        let mut gd = GameData::new(json!({"clock": "2024-03-01T10:00:00Z", "day": "2024-03-01"}));
        run("_.add('clock', 90000);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["clock"], json!("2024-03-01T10:01:30.000Z"));
        run("_.add('day', 86400000);", &mut gd).unwrap();
        assert_eq!(gd.stat_data["day"], json!("2024-03-02T00:00:00.000Z"));
    }

    #[test]
    fn add_rejects_other_targets() {
        let mut gd = GameData::new(json!({"name": "Ann", "count": "12", "list": []}));
        for text in ["_.add('name', 1);", "_.add('count', 1);", "_.add('list', 1);"] {
            let err = run(text, &mut gd).unwrap_err();
            assert!(matches!(err, CommandError::InvalidDelta { .. }), "{text}");
        }
        let err = run("_.add('missing', 1);", &mut gd).unwrap_err();
        assert!(matches!(err, CommandError::PathNotFound(_)));
    }

    #[test]
    fn date_parsing_excludes_plain_numbers() {
        assert!(parse_date("12").is_none());
        assert!(parse_date("1.5").is_none());
        assert!(parse_date("2024-01-02 03:04").is_some());
        assert!(parse_date("tomorrow").is_none());
    }
}

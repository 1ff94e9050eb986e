//! Command extraction: finds `_.<verb>(...);` calls in free text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The verb of a command as written in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Set,
    Insert,
    Assign,
    Remove,
    Unset,
    Delete,
    Add,
}

impl CommandKind {
    pub const ALL: [CommandKind; 7] = [
        CommandKind::Set,
        CommandKind::Insert,
        CommandKind::Assign,
        CommandKind::Remove,
        CommandKind::Unset,
        CommandKind::Delete,
        CommandKind::Add,
    ];

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Insert => "insert",
            Self::Assign => "assign",
            Self::Remove => "remove",
            Self::Unset => "unset",
            Self::Delete => "delete",
            Self::Add => "add",
        }
    }

    pub fn from_verb(verb: &str) -> Option<CommandKind> {
        Self::ALL.into_iter().find(|kind| kind.verb() == verb)
    }

    /// Collapse aliases: `remove`/`unset` → `delete`, `assign` → `insert`.
    pub fn canonical(self) -> CommandKind {
        match self {
            Self::Remove | Self::Unset => Self::Delete,
            Self::Assign => Self::Insert,
            other => other,
        }
    }

    /// Whether `count` arguments satisfy this verb's contract.
    pub fn accepts_arity(self, count: usize) -> bool {
        match self.canonical() {
            Self::Set | Self::Insert => count >= 2,
            Self::Delete => count >= 1,
            Self::Add => count == 2,
            _ => false,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// One extracted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    /// The call as written, from `_` through the terminating `;`.
    pub full_match: String,
    /// Raw argument substrings, still quoted/bracketed as written.
    pub args: Vec<String>,
    /// Trailing `//` comment, trimmed; empty when absent.
    pub reason: String,
}

fn is_escaped(chars: &[char], index: usize) -> bool {
    index > 0 && chars[index - 1] == '\\'
}

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '`')
}

/// Extract every well-formed command from `input`, in text order.
///
/// Malformed calls (unbalanced parentheses, no `;` right after the closing
/// parenthesis, too few arguments) are skipped silently.
pub fn extract_commands(input: &str) -> Vec<Command> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut commands = Vec::new();
    let mut i = 0;

    while i + 1 < len {
        if chars[i] != '_' || chars[i + 1] != '.' {
            i += 1;
            continue;
        }

        let Some((kind, open)) = match_verb(&chars, i + 2) else {
            i += 1;
            continue;
        };

        let Some(close) = find_matching_paren(&chars, open) else {
            i = open + 1;
            continue;
        };

        if close + 1 >= len || chars[close + 1] != ';' {
            i = close + 1;
            continue;
        }
        let semicolon = close + 1;

        let (reason, end) = read_reason(&chars, semicolon + 1);
        let inner: String = chars[open + 1..close].iter().collect();
        let args = split_arguments(&inner);

        if kind.accepts_arity(args.len()) {
            commands.push(Command {
                kind,
                full_match: chars[i..=semicolon].iter().collect(),
                args,
                reason,
            });
        }
        i = end;
    }

    commands
}

/// Match `<verb>(` at `start`, returning the verb and the index of `(`.
fn match_verb(chars: &[char], start: usize) -> Option<(CommandKind, usize)> {
    CommandKind::ALL.into_iter().find_map(|kind| {
        let verb: Vec<char> = kind.verb().chars().collect();
        let open = start + verb.len();
        let matches = chars.get(start..open) == Some(verb.as_slice())
            && chars.get(open) == Some(&'(');
        matches.then_some((kind, open))
    })
}

/// Find the `)` closing the `(` at `open`, ignoring parentheses inside quotes.
fn find_matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for j in open..chars.len() {
        let c = chars[j];
        if let Some(q) = quote {
            if c == q && !is_escaped(chars, j) {
                quote = None;
            }
            continue;
        }
        match c {
            c if is_quote(c) && !is_escaped(chars, j) => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read an optional `//` comment starting after `start` (spaces/tabs allowed
/// before it). Returns the trimmed reason and the index to resume scanning at.
fn read_reason(chars: &[char], start: usize) -> (String, usize) {
    let mut k = start;
    while k < chars.len() && (chars[k] == ' ' || chars[k] == '\t') {
        k += 1;
    }
    if k + 1 < chars.len() && chars[k] == '/' && chars[k + 1] == '/' {
        let body_start = k + 2;
        let mut end = body_start;
        while end < chars.len() && chars[end] != '\n' && chars[end] != '\r' {
            end += 1;
        }
        let reason: String = chars[body_start..end].iter().collect();
        return (reason.trim().to_string(), end);
    }
    (String::new(), start)
}

/// Split an argument list on top-level commas.
///
/// Commas nested in `()`, `[]`, `{}` or inside quotes do not split.
pub fn split_arguments(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (j, &c) in chars.iter().enumerate() {
        if let Some(q) = quote {
            current.push(c);
            if c == q && !is_escaped(&chars, j) {
                quote = None;
            }
            continue;
        }
        match c {
            c if is_quote(c) && !is_escaped(&chars, j) => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let last = current.trim();
    if !last.is_empty() {
        args.push(last.to_string());
    }
    args
}

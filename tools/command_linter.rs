/// Command Linter: checks that every `_.<verb>(...)` call in a text is well formed.
///
/// Usage: command_linter <file_or_dir> [--verbose]

use narrative_state::core::command::{extract_commands, Command, CommandKind};
use narrative_state::core::value_parser::{parse_command_value, parse_path_argument};
use narrative_state::schema::path::Path as StatePath;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: command_linter <file_or_dir> [--verbose]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let verbose = args[2..].iter().any(|a| a == "--verbose");

    let mut files = Vec::new();
    if target.is_file() {
        files.push(target.to_path_buf());
    } else if target.is_dir() {
        collect_text_files(target, &mut files);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut total = 0;

    for file in &files {
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("  ERROR reading {}: {}", file.display(), e);
                continue;
            }
        };
        let (commands, file_errors, file_warnings) = lint_text(&text);
        total += commands.len();
        if verbose {
            println!("  {}: {} commands", file.display(), commands.len());
            for command in &commands {
                print_command(command);
            }
        }
        let name = file.display();
        errors.extend(file_errors.into_iter().map(|e| format!("{}: {}", name, e)));
        warnings.extend(file_warnings.into_iter().map(|w| format!("{}: {}", name, w)));
    }

    println!("\n=== Command Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} files, {} commands, {} errors, {} warnings",
        files.len(),
        total,
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_text_files(dir: &Path, files: &mut Vec<std::path::PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_text_files(&path, files);
            } else if matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("txt" | "md")
            ) {
                files.push(path);
            }
        }
    }
}

fn print_command(command: &Command) {
    let mut rng = StdRng::seed_from_u64(0);
    let values: Vec<String> = command.args[1..]
        .iter()
        .map(|raw| parse_command_value(raw, &mut rng).to_string())
        .collect();
    println!(
        "    {} ({}) path={} values=[{}]{}",
        command.kind,
        command.kind.canonical(),
        parse_path_argument(&command.args[0]),
        values.join(", "),
        if command.reason.is_empty() {
            String::new()
        } else {
            format!(" reason={}", command.reason)
        }
    );
}

/// Returns the extracted commands, errors and warnings.
fn lint_text(text: &str) -> (Vec<Command>, Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let commands = extract_commands(text);

    // Byte spans of the extracted calls, found in textual order.
    let mut spans = Vec::with_capacity(commands.len());
    let mut cursor = 0;
    for command in &commands {
        if let Some(found) = text[cursor..].find(&command.full_match) {
            let start = cursor + found;
            cursor = start + command.full_match.len();
            spans.push(start..cursor);
        }
    }

    // Every call site that names a known verb should have been extracted.
    // Lookalikes inside an extracted call's arguments are not call sites.
    let mut call_sites = 0;
    for (offset, _) in text.match_indices("_.") {
        if spans.iter().any(|span| offset > span.start && offset < span.end) {
            continue;
        }
        let rest = &text[offset + 2..];
        let verb: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if !rest[verb.len()..].starts_with('(') {
            continue;
        }
        match CommandKind::from_verb(&verb) {
            Some(_) => call_sites += 1,
            None => warnings.push(format!("unknown verb '_.{}('", verb)),
        }
    }
    if call_sites > commands.len() {
        errors.push(format!(
            "{} call(s) are malformed and will be skipped",
            call_sites - commands.len()
        ));
    }

    for command in &commands {
        let raw = parse_path_argument(&command.args[0]);
        if let Err(e) = StatePath::parse(&raw) {
            errors.push(format!("{}: {}", command.full_match, e));
        } else if raw.is_empty() {
            errors.push(format!("{}: empty path", command.full_match));
        }
        if command.kind != command.kind.canonical() {
            warnings.push(format!(
                "{}: '{}' is an alias of '{}'",
                command.full_match,
                command.kind,
                command.kind.canonical()
            ));
        }
    }

    (commands, errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_calls_inside_arguments_are_not_counted() {
        let text = r"_.set('note', 'contains _.set(\'x\', 1); text');";
        let (commands, errors, warnings) = lint_text(text);
        assert_eq!(commands.len(), 1);
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let text = "_.set('hp', 1);\n_.set('gold', 0)";
        let (commands, errors, _) = lint_text(text);
        assert_eq!(commands.len(), 1);
        assert_eq!(errors, vec!["1 call(s) are malformed and will be skipped".to_string()]);
    }

    #[test]
    fn aliases_and_unknown_verbs_warn() {
        let (_, errors, warnings) = lint_text("_.assign('bag', 1);\n_.grow('bag', 2);");
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 2, "{:?}", warnings);
        assert!(warnings.iter().any(|w| w.contains("unknown verb '_.grow('")));
    }
}

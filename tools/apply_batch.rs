/// Apply Batch: runs one text through the engine against a JSON state file.
///
/// Usage: apply_batch --state <file.json> --text <file> [--config <file.ron>] [--write]
///
/// Prints the resulting game data as JSON. With `--write` the state file is
/// updated in place. Set `RUST_LOG=narrative_state=debug` for engine logs.

use narrative_state::core::config::EngineConfig;
use narrative_state::core::executor::StateEngine;
use narrative_state::schema::game_data::GameData;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut state_path = None;
    let mut text_path = None;
    let mut config_path = None;
    let mut write = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--state" if i + 1 < args.len() => {
                i += 1;
                state_path = Some(args[i].clone());
            }
            "--text" if i + 1 < args.len() => {
                i += 1;
                text_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--write" => write = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let (Some(state_path), Some(text_path)) = (state_path, text_path) else {
        print_usage();
        process::exit(1);
    };

    let config = match config_path {
        Some(path) => EngineConfig::load_from_ron(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load config: {}", e);
            process::exit(1);
        }),
        None => EngineConfig::default(),
    };

    let mut game_data = load_game_data(&state_path);
    let text = std::fs::read_to_string(&text_path).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to read {}: {}", text_path, e);
        process::exit(1);
    });

    let mut engine = StateEngine::builder().config(config).build();
    let report = futures::executor::block_on(engine.apply_batch(&text, &mut game_data));

    if let Some(failure) = &report.failure {
        eprintln!("Last failure: {} ({})", failure.command, failure.error);
    }
    eprintln!(
        "Applied {} command(s), modified: {}",
        report.applied, report.modified
    );

    let output = match serde_json::to_string_pretty(&game_data) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("ERROR: Failed to serialize game data: {}", e);
            process::exit(1);
        }
    };

    if write {
        if let Err(e) = std::fs::write(&state_path, &output) {
            eprintln!("ERROR: Failed to write {}: {}", state_path, e);
            process::exit(1);
        }
    }
    println!("{}", output);
}

/// Accepts either a full game data document or a bare state tree.
fn load_game_data(path: &str) -> GameData {
    let contents = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to read {}: {}", path, e);
        process::exit(1);
    });
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap_or_else(|e| {
        eprintln!("ERROR: {} is not valid JSON: {}", path, e);
        process::exit(1);
    });
    if value.get("stat_data").is_some() {
        serde_json::from_value(value).unwrap_or_else(|e| {
            eprintln!("ERROR: {} is not valid game data: {}", path, e);
            process::exit(1);
        })
    } else {
        GameData::new(value)
    }
}

fn print_usage() {
    println!("Usage: apply_batch --state <file.json> --text <file> [--config <file.ron>] [--write]");
}

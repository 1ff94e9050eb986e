//! WASM bindings for narrative-state, used by the browser-side state viewer.

use wasm_bindgen::prelude::*;

use narrative_state::core::command::Command;
use narrative_state::core::config::EngineConfig;
use narrative_state::core::executor::StateEngine;
use narrative_state::schema::game_data::GameData;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct BatchOutput {
    game_data: GameData,
    modified: bool,
    applied: usize,
    failure: Option<FailureInfo>,
}

#[derive(serde::Serialize)]
struct FailureInfo {
    command: String,
    error: String,
}

/// Return the commands found in `text` as a JSON array.
#[wasm_bindgen]
pub fn extract_commands(text: &str) -> Result<String, JsValue> {
    let commands: Vec<Command> = narrative_state::core::command::extract_commands(text);
    serde_json::to_string(&commands)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

/// Apply the commands embedded in `text` to a game data document.
///
/// `game_data_json` may be a full game data object or a bare state tree.
/// `config_ron` optionally overrides the engine config. Returns the updated
/// game data plus the batch outcome as JSON.
#[wasm_bindgen]
pub fn apply_commands(
    game_data_json: &str,
    text: &str,
    config_ron: Option<String>,
) -> Result<String, JsValue> {
    let value: serde_json::Value = serde_json::from_str(game_data_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid game data JSON: {e}")))?;
    let mut game_data = if value.get("stat_data").is_some() {
        serde_json::from_value(value)
            .map_err(|e| JsValue::from_str(&format!("Invalid game data: {e}")))?
    } else {
        GameData::new(value)
    };
    let config = match config_ron {
        Some(source) => EngineConfig::parse_ron(&source)
            .map_err(|e| JsValue::from_str(&format!("Config parse error: {e}")))?,
        None => EngineConfig::default(),
    };

    let mut engine = StateEngine::builder().config(config).build();
    let report = futures::executor::block_on(engine.apply_batch(text, &mut game_data));

    let output = BatchOutput {
        game_data,
        modified: report.modified,
        applied: report.applied,
        failure: report.failure.map(|f| FailureInfo {
            command: f.command,
            error: f.error.to_string(),
        }),
    };
    serde_json::to_string(&output)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

/// Return JSON array of the recognised verbs.
#[wasm_bindgen]
pub fn verbs() -> String {
    serde_json::to_string(&["set", "insert", "assign", "remove", "unset", "delete", "add"])
        .unwrap_or_else(|_| "[]".to_string())
}

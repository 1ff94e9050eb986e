//! Host-supplied collaborators: lifecycle listeners, macro substitution and
//! the error sink.
//!
//! Every listener call is awaited in order before the engine moves on, and
//! listeners run in registration order.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::command::Command;
use crate::core::executor::CommandFailure;
use crate::schema::game_data::GameData;
use crate::schema::path::Path;

/// A single variable change, handed to [`UpdateListener::single_updated`].
///
/// `display` and `delta` are the batch's in-progress diff trees. They are
/// only reachable for the duration of the call.
pub struct SingleUpdate<'a> {
    pub stat_data: &'a mut Value,
    pub display: &'a mut Value,
    pub delta: &'a mut Value,
    pub path: &'a Path,
    pub old: &'a Value,
    pub new: &'a Value,
}

/// Observer for the four points of a batch.
///
/// All methods default to doing nothing so hosts implement only what they need.
#[async_trait]
pub trait UpdateListener: Send + Sync {
    /// Before any command runs.
    async fn update_started(&self, _game_data: &mut GameData) {}

    /// After extraction and alias canonicalization. The list may be edited.
    async fn command_parsed(&self, _game_data: &GameData, _commands: &mut Vec<Command>) {}

    async fn single_updated(&self, _update: SingleUpdate<'_>) {}

    /// After the diff views are published, before schema reconciliation.
    async fn update_ended(&self, _game_data: &mut GameData) {}
}

/// Text pass run over a batch before extraction.
#[async_trait]
pub trait MacroSubstitutor: Send + Sync {
    async fn substitute(&self, text: &str) -> String;
}

/// Leaves text untouched.
pub struct NoMacros;

#[async_trait]
impl MacroSubstitutor for NoMacros {
    async fn substitute(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Receives the last failure of a batch when error surfacing is enabled.
pub trait ErrorSink: Send + Sync {
    fn report(&self, failure: &CommandFailure);
}

/// Default sink: a warning on the executor target.
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, failure: &CommandFailure) {
        tracing::warn!(
            target: "narrative_state::executor",
            command = %failure.command,
            error = %failure.error,
            "command failed"
        );
    }
}

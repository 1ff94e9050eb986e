//! Batch execution: extract commands from a text, run them in order against
//! the game state, and publish the display and delta views.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};

use crate::core::command::{extract_commands, Command};
use crate::core::config::EngineConfig;
use crate::core::events::{
    ErrorSink, LogSink, MacroSubstitutor, NoMacros, SingleUpdate, UpdateListener,
};
use crate::core::ops::{self, CommandError};
use crate::schema::game_data::{GameData, RootFlags};
use crate::schema::infer::{clean_up_metadata, reconcile_and_apply_schema};
use crate::schema::path;

/// Settings in effect for one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSettings {
    pub flags: RootFlags,
    pub notify_errors: bool,
}

/// A command that failed, with the matched text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    pub command: String,
    pub error: CommandError,
}

/// Result of one batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    /// At least one command succeeded.
    pub modified: bool,
    pub applied: usize,
    /// The last failure of the batch, if any.
    pub failure: Option<CommandFailure>,
}

/// The state mutation engine. Built via `StateEngine::builder()`.
pub struct StateEngine {
    config: EngineConfig,
    listeners: Vec<Box<dyn UpdateListener>>,
    macros: Box<dyn MacroSubstitutor>,
    error_sink: Box<dyn ErrorSink>,
    rng: StdRng,
}

/// Builder for constructing a `StateEngine`.
pub struct StateEngineBuilder {
    config: EngineConfig,
    listeners: Vec<Box<dyn UpdateListener>>,
    macros: Option<Box<dyn MacroSubstitutor>>,
    error_sink: Option<Box<dyn ErrorSink>>,
}

impl StateEngine {
    pub fn builder() -> StateEngineBuilder {
        StateEngineBuilder {
            config: EngineConfig::default(),
            listeners: Vec::new(),
            macros: None,
            error_sink: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply every command found in `text`. Returns whether anything changed.
    pub async fn update_variables(&mut self, text: &str, game_data: &mut GameData) -> bool {
        self.apply_batch(text, game_data).await.modified
    }

    /// Apply every command found in `text` and report the outcome.
    ///
    /// Commands run in textual order. A failing command is skipped and the
    /// batch continues. The schema is reconciled only when something changed.
    pub async fn apply_batch(&mut self, text: &str, game_data: &mut GameData) -> BatchReport {
        let text = self.macros.substitute(text).await;
        let mut commands = extract_commands(&text);

        let settings = BatchSettings {
            flags: game_data
                .flags_or(self.config.default_flags)
                .overlay_meta(&game_data.stat_data),
            notify_errors: self.config.notify_errors,
        };
        let mut display = game_data.stat_data.clone();
        let mut delta = Value::Object(Map::new());

        for listener in &self.listeners {
            listener.update_started(game_data).await;
        }

        for command in commands.iter_mut() {
            command.kind = command.kind.canonical();
        }
        for listener in &self.listeners {
            listener.command_parsed(game_data, &mut commands).await;
        }

        let mut report = BatchReport::default();
        for command in &commands {
            match ops::apply(command, game_data, &settings, &mut self.rng) {
                Ok(applied) => {
                    report.modified = true;
                    report.applied += 1;
                    for (at, shown) in applied.displays {
                        path::set(&mut display, &at, Value::String(shown.clone()));
                        path::set(&mut delta, &at, Value::String(shown));
                    }
                    if let Some(change) = applied.change {
                        for listener in &self.listeners {
                            listener
                                .single_updated(SingleUpdate {
                                    stat_data: &mut game_data.stat_data,
                                    display: &mut display,
                                    delta: &mut delta,
                                    path: &change.path,
                                    old: &change.old,
                                    new: &change.new,
                                })
                                .await;
                        }
                    }
                }
                Err(error) => {
                    tracing::debug!(
                        target: "narrative_state::executor",
                        command = %command.full_match,
                        %error,
                        "command skipped"
                    );
                    report.failure = Some(CommandFailure {
                        command: command.full_match.clone(),
                        error,
                    });
                }
            }
        }

        clean_up_metadata(&mut display);
        game_data.display_data = display;
        game_data.delta_data = delta;

        for listener in &self.listeners {
            listener.update_ended(game_data).await;
        }

        if report.modified {
            reconcile_and_apply_schema(game_data, self.config.default_flags);
            clean_up_metadata(&mut game_data.stat_data);
        }

        if let Some(failure) = &report.failure {
            if settings.notify_errors {
                self.error_sink.report(failure);
            }
        }

        tracing::debug!(
            target: "narrative_state::executor",
            commands = commands.len(),
            applied = report.applied,
            modified = report.modified,
            "batch finished"
        );
        report
    }

    /// Run a single already-extracted command outside of a batch.
    ///
    /// No listeners fire and the diff views are left alone.
    pub fn apply_command(
        &mut self,
        command: &Command,
        game_data: &mut GameData,
    ) -> Result<(), CommandError> {
        let settings = BatchSettings {
            flags: game_data
                .flags_or(self.config.default_flags)
                .overlay_meta(&game_data.stat_data),
            notify_errors: self.config.notify_errors,
        };
        ops::apply(command, game_data, &settings, &mut self.rng).map(|_| ())
    }
}

impl StateEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Register a listener. Listeners run in registration order.
    pub fn listener(mut self, listener: impl UpdateListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn macros(mut self, macros: impl MacroSubstitutor + 'static) -> Self {
        self.macros = Some(Box::new(macros));
        self
    }

    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.error_sink = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> StateEngine {
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        StateEngine {
            config: self.config,
            listeners: self.listeners,
            macros: self.macros.unwrap_or_else(|| Box::new(NoMacros)),
            error_sink: self.error_sink.unwrap_or_else(|| Box::new(LogSink)),
            rng,
        }
    }
}

//! Narrative State: a command-driven mutation engine for game state.
//!
//! Generated prose carries embedded calls such as `_.set('hp', 100, 80);//hit`.
//! The engine extracts them, resolves their arguments into typed values,
//! validates each change against a schema inferred from the state itself,
//! and applies the batch while building display and delta views for the UI.

pub mod core;
pub mod schema;

pub use crate::core::config::EngineConfig;
pub use crate::core::executor::{BatchReport, StateEngine};
pub use crate::schema::game_data::GameData;

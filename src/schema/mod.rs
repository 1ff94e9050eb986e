//! Data model: state values, paths, schema nodes and the game data aggregate.

pub mod game_data;
pub mod infer;
pub mod node;
pub mod path;
pub mod value;

//! Command extraction, value resolution and batch execution.

pub mod calculus;
pub mod command;
pub mod config;
pub mod events;
pub mod executor;
pub mod expr;
pub mod literal;
pub mod math;
pub mod ops;
pub mod template;
pub mod value_parser;

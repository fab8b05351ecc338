//! CLI command handlers

pub mod commands;

pub use commands::{calculate, examples, fields, load_engine, run, test, validate};

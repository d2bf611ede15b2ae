//! CLI library components for the compliance engine.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;

// crates/cli/src/lib.rs
//! `datadict-import`: drive import jobs from a terminal.

pub mod cli;
pub mod commands;
pub mod input;
pub mod output;

pub use cli::{Cli, Commands};
pub use commands::run;
pub use output::Outcome;

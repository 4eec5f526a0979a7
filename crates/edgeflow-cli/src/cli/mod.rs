//! # CLI Layer
//!
//! The only place that knows about terminal I/O, exit codes and output
//! formatting. Library errors are wrapped with `anyhow` context here.
//!
//! ## Module Structure
//!
//! - `setup`: Argument parsing via clap
//! - `commands`: Config resolution and per-command handlers
//! - `logging`: `tracing-subscriber` initialization
//! - `render`: Output formatting

mod commands;
mod logging;
mod render;
pub mod setup;

pub use commands::run;

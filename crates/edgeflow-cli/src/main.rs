//! # Edgeflow CLI
//!
//! The binary is intentionally thin: the CLI lives in `src/cli/`, while this
//! file only invokes `cli::run()` and handles process termination.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (crates/edgeflow-cli/src/cli/)                   │
//! │  - clap argument parsing (setup.rs)                         │
//! │  - config + state wiring and dispatch (commands.rs)         │
//! │  - tracing subscriber on stderr (logging.rs)                │
//! │  - plain text output (render.rs)                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  edgeflow library                                           │
//! │  - ListFile / TailFile passes, state stores, repositories   │
//! │  - No knowledge of stdout/stderr or process exits           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every invocation runs at most one pass. Scheduling repeated passes is left
//! to whatever calls the binary (cron, a systemd timer, a shell loop).

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

//! # Edgeflow Architecture
//!
//! Edgeflow is the storage and incremental-ingestion core of an edge dataflow
//! agent. It is a **library first**: the `edgeflow` binary is one thin client
//! of it, and a scheduler embedding processors is another.
//!
//! ## The Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (edgeflow-cli)                                         │
//! │  - Loads config, installs logging, runs one pass            │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Processors (listing/, tail/)                               │
//! │  - on_schedule: validate and compile configuration          │
//! │  - on_trigger: load state, decide, transfer, store state    │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//! ┌────────────────────────────┐  ┌─────────────────────────────┐
//! │  State (state/)            │  │  Content (store/)           │
//! │  - StateStore trait        │  │  - ContentRepository trait  │
//! │  - JSON file, in-memory    │  │  - Volatile, file system    │
//! │                            │  │  - Claim reference counts   │
//! └────────────────────────────┘  └─────────────────────────────┘
//! ```
//!
//! ## Delivery Guarantee
//!
//! Both processors load their state once before deciding anything and store
//! it once after every transfer of the pass. A crash in between repeats the
//! pass on restart: records are delivered at least once, never skipped.
//!
//! ## No I/O Assumptions in Core
//!
//! Library code reports through return values and `tracing` events. It never
//! writes to stdout/stderr and never exits the process.
//!
//! ## Module Overview
//!
//! - [`store`]: Content claims, byte streams, repositories and reference counting
//! - [`state`]: Key-value state persistence for processors
//! - [`listing`]: Incremental directory listing (`ListFile`)
//! - [`tail`]: Log tailing with rotation and truncation handling (`TailFile`)
//! - [`flow`]: Flow files and the session they are transferred to
//! - [`config`]: Layered configuration
//! - [`units`]: Time period and data size parsing
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod flow;
pub mod listing;
pub mod state;
pub mod store;
pub mod tail;
pub mod units;

pub use error::{EdgeflowError, Result};

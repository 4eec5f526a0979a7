//! # Log Tailing
//!
//! A tailing pass reads what was appended to one or more files since the last
//! pass and emits each new record (or batch of records) as a flow file whose
//! content lives in the content repository.
//!
//! ## What Is Remembered
//!
//! Per tailed file: its path, the byte position read up to, a CRC32 of the
//! bytes before that position and the time of the last read. The checksum is
//! what tells "the same file, grown" apart from "a different file under the
//! same name".
//!
//! ## Tracking Status
//!
//! Every pass classifies each file before reading it:
//!
//! - **Unknown**: no state. Start per the initial start position.
//! - **Tracked**: the prefix still has the stored checksum. Read from the
//!   stored position.
//! - **RotatedAway**: the active file is gone, shorter, or different, and a
//!   file matching the rolling pattern carries the stored prefix. That file is
//!   drained from the stored position, newer rotated files after it, then the
//!   active file from 0.
//! - **Truncated**: same symptoms, no rotated copy. Start over at 0.
//!
//! ## Records
//!
//! Only complete records (ending in the delimiter) are read from the active
//! file; a trailing partial record waits for the next pass. Rotated files will
//! not grow again, so they are read to the end.
//!
//! State is loaded once at the start of a pass and stored once at its end.

pub mod checksum;
pub mod legacy;
pub mod reader;
pub mod rotation;
pub mod state;
pub mod tail_file;

pub use legacy::parse_legacy_state;
pub use rotation::RollingPattern;
pub use state::{TailState, TrackingStatus};
pub use tail_file::{InitialStartPosition, ResultMode, TailFile, TailMode, TailReport};

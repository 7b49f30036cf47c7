//! Log ingestion for whoall
//!
//! This crate tails the game client's log file, parses `/who` result lines,
//! and keeps the deduplicated table of recently seen players.

mod error;
mod filter;
mod ingest;
mod parser;
mod store;
mod tail;
mod watcher;

pub use error::{TailError, WatchError};
pub use filter::PlayerFilter;
pub use ingest::{BatchReport, IngestConfig, IngestLoop, IngestState};
pub use parser::{FRESHNESS_WINDOW_MINUTES, LineRejection, LogParser};
pub use store::{PlayerStore, UpsertOutcome};
pub use tail::{LogTail, read_new_since};
pub use watcher::{ChangeNotifier, DirtySignal};

// Re-export types used in our public API
pub use whoall_types::{PlayerRecord, PlayerRow, Sighting, Snapshot};

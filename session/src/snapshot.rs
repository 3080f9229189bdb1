use engine::SearchLine;
use serde::{Deserialize, Serialize};

/// Complete, immutable snapshot of session state.
/// Sent to subscribers on every mutation and returned by `snapshot()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    /// True once the engine handshake completed. Never becomes true again
    /// after a fatal transport failure.
    pub ready: bool,
    pub searching: bool,
    /// FEN of the position most recently handed to the engine, when known.
    /// This is what notation conversion of reported lines starts from.
    pub fen: Option<String>,
    /// Best-known line per variation, ordered by variation index.
    pub lines: Vec<SearchLine>,
    pub best_move: Option<String>,
    /// The most recent raw engine output lines, oldest first.
    pub raw_log: Vec<String>,
    /// Set exactly once, on fatal transport failure.
    pub last_error: Option<String>,
}

pub mod aggregator;
pub mod transport;
pub mod uci;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use aggregator::{LineAggregator, SearchLine};
pub use transport::{EngineTransport, TransportError};
pub use uci::{parse_line, EngineCommand, GoParams, SearchInfo, UciMessage};

use serde::{Deserialize, Serialize};

/// Evaluation reported by the engine, relative to the side to move.
///
/// Any sign flipping for display (always-from-white scores and the like) is a
/// presentation concern and happens outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Score in hundredths of a pawn.
    Centipawns(i32),
    /// Forced mate in N moves; negative when the side to move is being mated.
    Mate(i32),
}

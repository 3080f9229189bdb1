use engine::GoParams;
use tokio::sync::{broadcast, oneshot};

use crate::events::SessionEvent;
use crate::snapshot::SessionSnapshot;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error("session reply dropped")]
    ReplyDropped,
}

/// Engine options applied by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Number of principal variations to track (the engine's `MultiPV`).
    pub multi_pv: u32,
    /// Search threads, passed through to the engine verbatim.
    pub threads: u32,
    /// Left unset by default: a skill level makes the engine randomize its
    /// play, which defeats reproducible analysis.
    pub skill_level: Option<u8>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            multi_pv: 1,
            threads: 1,
            skill_level: None,
        }
    }
}

/// Commands sent to the session actor. Mutating commands are
/// fire-and-forget; search results surface through the event stream, never
/// through a reply. Only the read operations carry a oneshot.
pub(crate) enum SessionCommand {
    Initialize {
        options: EngineOptions,
    },
    SetPosition {
        fen: String,
    },
    SetPositionFromMoves {
        moves: Vec<String>,
    },
    Analyze {
        params: GoParams,
    },
    Stop,
    SetOption {
        name: String,
        value: String,
    },
    NewGame,
    GetSnapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<(SessionSnapshot, broadcast::Receiver<SessionEvent>)>,
    },
    Shutdown,
}

//! Engine session management.
//!
//! One session owns one engine process (through an
//! [`EngineTransport`](engine::EngineTransport)) and reconciles its streamed
//! output into a queryable snapshot of the current best lines. All mutable
//! state lives inside a single actor task; callers talk to it through a
//! cheap cloneable [`SessionHandle`].

mod actor;
mod state;

pub mod commands;
pub mod events;
pub mod handle;
pub mod notation;
pub mod registry;
pub mod snapshot;

pub use commands::{EngineOptions, SessionError};
pub use events::SessionEvent;
pub use handle::SessionHandle;
pub use registry::SessionRegistry;
pub use snapshot::SessionSnapshot;

// Re-exported so consumers don't need a direct `engine` dependency for the
// common types that cross this API.
pub use engine::{GoParams, Score, SearchLine};

use std::path::PathBuf;

use engine::{EngineTransport, TransportError};
use tokio::sync::{broadcast, mpsc};

use state::SessionState;

/// How to reach the engine binary.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Explicit engine binary. When absent, conventional install locations
    /// and `PATH` are probed; if nothing is found the session starts in the
    /// terminal error state.
    pub engine_path: Option<PathBuf>,
}

/// Spawn a session actor for a fresh engine process.
///
/// Never blocks on engine startup: commands issued before the engine
/// finishes its handshake are queued and replayed in order. A transport
/// that fails to initialize leaves the session permanently non-ready with
/// `last_error` set; the handle stays usable for inspection.
pub fn spawn_session(config: &SessionConfig) -> SessionHandle {
    spawn_session_with_id(uuid::Uuid::new_v4().to_string(), config)
}

/// Spawn a session over an already-built transport. Used by tests and by
/// callers that manage engine processes themselves.
pub fn spawn_session_with_transport(transport: EngineTransport) -> SessionHandle {
    spawn_actor(uuid::Uuid::new_v4().to_string(), Ok(transport))
}

pub(crate) fn spawn_session_with_id(id: String, config: &SessionConfig) -> SessionHandle {
    spawn_actor(id, build_transport(config))
}

fn build_transport(config: &SessionConfig) -> Result<EngineTransport, TransportError> {
    let path = match &config.engine_path {
        Some(path) => path.clone(),
        None => engine::transport::find_engine_binary().ok_or(TransportError::EngineNotFound)?,
    };
    EngineTransport::spawn(&path)
}

fn spawn_actor(id: String, transport: Result<EngineTransport, TransportError>) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, _) = broadcast::channel(256);

    let state = SessionState::new(id.clone(), transport);
    tokio::spawn(actor::run_session(state, cmd_rx, event_tx));

    SessionHandle::new(id, cmd_tx)
}

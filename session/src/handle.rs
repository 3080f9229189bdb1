use engine::GoParams;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::commands::{EngineOptions, SessionCommand, SessionError};
use crate::events::SessionEvent;
use crate::snapshot::SessionSnapshot;

/// Cheap, cloneable handle to a session actor.
///
/// Every mutating operation is fire-and-forget: it returns once the command
/// is enqueued, and its effect shows up later through [`subscribe`] or
/// [`snapshot`]. Searches are long-running and multi-valued, so no
/// operation resolves with search output.
///
/// [`subscribe`]: Self::subscribe
/// [`snapshot`]: Self::snapshot
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(id: String, cmd_tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { id, cmd_tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Apply engine options. Idempotent per session: only the first call
    /// has any effect.
    pub async fn initialize(&self, options: EngineOptions) -> Result<(), SessionError> {
        self.send(SessionCommand::Initialize { options }).await
    }

    /// Hand the engine a position by FEN. Does not start a search; callers
    /// re-issue [`analyze`](Self::analyze) when they want fresh lines for
    /// the new position.
    pub async fn set_position(&self, fen: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SetPosition { fen: fen.into() }).await
    }

    /// Hand the engine a position as a move list from the starting position.
    pub async fn set_position_from_moves(&self, moves: Vec<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SetPositionFromMoves { moves }).await
    }

    /// Start a search episode. Any lines from a previous episode are cleared
    /// before the search command goes out.
    pub async fn analyze(&self, params: GoParams) -> Result<(), SessionError> {
        self.send(SessionCommand::Analyze { params }).await
    }

    /// Ask the engine to stop searching. Advisory: a `bestmove` that arrives
    /// afterwards is still recorded.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn set_option(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::SetOption {
            name: name.into(),
            value: value.into(),
        })
        .await
    }

    /// Reset the engine for an unrelated game; clears all search state and
    /// the remembered position.
    pub async fn new_game(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::NewGame).await
    }

    /// Current state, as of the moment the actor processes this request.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetSnapshot { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::ReplyDropped)
    }

    /// Current state plus a stream of every subsequent snapshot. The stream
    /// ends when the session is torn down.
    pub async fn subscribe(
        &self,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Subscribe { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::ReplyDropped)
    }

    /// Tear the session down, quitting and reaping the engine process.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

use std::collections::VecDeque;

use engine::{EngineCommand, EngineTransport, LineAggregator, TransportError};

use crate::snapshot::SessionSnapshot;

/// How many raw engine output lines the session keeps for diagnostics.
pub(crate) const RAW_LOG_CAPACITY: usize = 100;

/// Something happened on the engine's line channel.
pub(crate) enum TransportSignal {
    Line(String),
    /// The engine process died or closed its output. Terminal.
    Closed,
}

/// Internal mutable state, owned entirely by the session actor. No locks.
pub(crate) struct SessionState {
    pub session_id: String,
    transport: Option<EngineTransport>,
    /// True once the first `readyok` arrived. Gates all transmission.
    pub ready: bool,
    pub searching: bool,
    /// Guards `initialize` idempotence.
    pub initialized: bool,
    /// Commands issued before readiness, in arrival order.
    pending: VecDeque<EngineCommand>,
    pub aggregator: LineAggregator,
    /// FEN of the position most recently given to the engine.
    pub fen: Option<String>,
    raw_log: VecDeque<String>,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn new(session_id: String, transport: Result<EngineTransport, TransportError>) -> Self {
        let (transport, last_error) = match transport {
            Ok(t) => (Some(t), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            session_id,
            transport,
            ready: false,
            searching: false,
            initialized: false,
            pending: VecDeque::new(),
            aggregator: LineAggregator::new(),
            fen: None,
            raw_log: VecDeque::with_capacity(RAW_LOG_CAPACITY),
            last_error,
        }
    }

    /// A fatal transport failure was observed; nothing is transmitted after
    /// this and `ready` stays false for the rest of the session's life.
    pub fn failed(&self) -> bool {
        self.last_error.is_some()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Build a full snapshot of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            ready: self.ready,
            searching: self.searching,
            fen: self.fen.clone(),
            lines: self.aggregator.lines(),
            best_move: self.aggregator.best_move().map(str::to_string),
            raw_log: self.raw_log.iter().cloned().collect(),
            last_error: self.last_error.clone(),
        }
    }

    /// Wait for the next line from the engine. Pends forever once the
    /// transport is gone so the actor's select loop stays quiescent.
    pub async fn next_signal(&mut self) -> TransportSignal {
        match self.transport.as_mut() {
            Some(transport) => match transport.recv().await {
                Some(line) => TransportSignal::Line(line),
                None => TransportSignal::Closed,
            },
            None => std::future::pending().await,
        }
    }

    /// Route a command toward the engine: transmitted immediately when the
    /// handshake has completed, otherwise held back in arrival order.
    pub async fn dispatch(&mut self, cmd: EngineCommand) {
        if self.failed() {
            tracing::trace!("dropping command after fatal transport failure");
            return;
        }
        if !self.ready {
            tracing::debug!(queued = self.pending.len() + 1, "engine not ready; queueing command");
            self.pending.push_back(cmd);
            return;
        }
        self.transmit(cmd).await;
    }

    /// Replay everything queued before readiness, in arrival order.
    pub async fn flush_pending(&mut self) {
        let pending: Vec<EngineCommand> = self.pending.drain(..).collect();
        for cmd in pending {
            self.transmit(cmd).await;
        }
    }

    /// Transmit one command, applying its state side effects.
    pub async fn transmit(&mut self, cmd: EngineCommand) {
        match &cmd {
            EngineCommand::Go(_) => {
                // Fresh episode: nothing from the previous search may leak
                // into the new snapshot.
                self.aggregator.reset();
                self.searching = true;
            }
            EngineCommand::Stop => {
                self.searching = false;
            }
            EngineCommand::SetPosition { .. } | EngineCommand::SetPositionFromMoves { .. }
                if self.searching =>
            {
                // Results for the old position must not be attributed to the
                // new one; the engine needs a stop before the new position.
                self.send_line(EngineCommand::Stop.to_wire()).await;
                self.searching = false;
            }
            _ => {}
        }
        self.send_line(cmd.to_wire()).await;
    }

    pub async fn send_line(&mut self, line: String) {
        if let Some(transport) = &self.transport {
            transport.send(line).await;
        }
    }

    /// Append one raw engine output line, evicting the oldest past capacity.
    pub fn record_line(&mut self, line: &str) {
        if self.raw_log.len() == RAW_LOG_CAPACITY {
            self.raw_log.pop_front();
        }
        self.raw_log.push_back(line.to_string());
    }

    /// Enter the terminal error state.
    pub fn fail(&mut self, reason: &str) {
        self.ready = false;
        self.searching = false;
        self.last_error = Some(reason.to_string());
        self.pending.clear();
        // Dropping the transport reaps the child via kill_on_drop.
        self.transport = None;
    }

    pub fn take_transport(&mut self) -> Option<EngineTransport> {
        self.transport.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_state() -> SessionState {
        SessionState::new(
            "test".to_string(),
            Err(TransportError::EngineNotFound),
        )
    }

    #[test]
    fn test_transport_failure_is_visible_from_birth() {
        let state = failed_state();
        assert!(state.failed());
        let snap = state.snapshot();
        assert!(!snap.ready);
        assert!(snap.last_error.is_some());
    }

    #[tokio::test]
    async fn test_commands_are_dropped_after_failure() {
        let mut state = failed_state();
        state.dispatch(EngineCommand::Stop).await;
        state
            .dispatch(EngineCommand::SetPosition {
                fen: "8/8/8/8/8/8/8/4K2k w - - 0 1".to_string(),
            })
            .await;
        assert!(state.snapshot().raw_log.is_empty());
    }

    #[test]
    fn test_raw_log_evicts_oldest() {
        let mut state = failed_state();
        for i in 0..(RAW_LOG_CAPACITY + 20) {
            state.record_line(&format!("line {}", i));
        }
        let snap = state.snapshot();
        assert_eq!(snap.raw_log.len(), RAW_LOG_CAPACITY);
        assert_eq!(snap.raw_log.first().map(String::as_str), Some("line 20"));
        assert_eq!(snap.raw_log.last().map(String::as_str), Some("line 119"));
    }
}

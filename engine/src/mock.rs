//! Scripted engine transport for tests.
//!
//! Only compiled in test mode or with the `mock` feature. Gives tests both
//! ends of a transport: the [`EngineTransport`] to hand to a session, and a
//! [`ScriptedEngine`] to play the engine's role line by line.

use tokio::sync::mpsc;

use crate::transport::EngineTransport;

/// The engine's side of a mock transport.
pub struct ScriptedEngine {
    line_tx: mpsc::Sender<String>,
    sent_rx: mpsc::Receiver<String>,
}

/// Build a transport backed by in-memory channels instead of a process.
pub fn scripted_transport() -> (EngineTransport, ScriptedEngine) {
    let (input_tx, sent_rx) = mpsc::channel(64);
    let (line_tx, line_rx) = mpsc::channel(256);
    let transport = EngineTransport::from_parts(input_tx, line_rx);
    let driver = ScriptedEngine { line_tx, sent_rx };
    (transport, driver)
}

impl ScriptedEngine {
    /// Emit one line of "engine output".
    pub async fn emit(&self, line: &str) {
        self.line_tx
            .send(line.to_string())
            .await
            .expect("session dropped its transport");
    }

    /// Next line the session transmitted, waiting up to two seconds.
    pub async fn expect_sent(&mut self) -> String {
        tokio::time::timeout(std::time::Duration::from_secs(2), self.sent_rx.recv())
            .await
            .expect("timed out waiting for a transmitted line")
            .expect("session closed its transport input")
    }

    /// A transmitted line if one is already buffered, without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent_rx.try_recv().ok()
    }

    /// Simulate the engine process dying: the session's `recv` starts
    /// returning `None`.
    pub fn die(self) {
        drop(self.line_tx);
    }
}

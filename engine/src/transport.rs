use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;

/// Failures wiring up the engine process. All of these are terminal for the
/// session that requested the transport; there is no retry at this layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no engine binary found in conventional locations or PATH")]
    EngineNotFound,
    #[error("failed to spawn engine process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine process has no stdin")]
    NoStdin,
    #[error("engine process has no stdout")]
    NoStdout,
}

/// Duplex line channel to an engine process.
///
/// Owns the child and two pump tasks: stdout lines are delivered in FIFO
/// order through [`recv`](Self::recv), and lines passed to
/// [`send`](Self::send) are written to stdin one per line. No chess
/// semantics live here. When the engine dies or closes stdout, `recv`
/// returns `None` permanently; that is the fatal-error signal the session
/// layer reacts to.
pub struct EngineTransport {
    child: Option<Child>,
    input_tx: mpsc::Sender<String>,
    line_rx: mpsc::Receiver<String>,
}

impl EngineTransport {
    /// Spawn the engine binary at `path` and start the stdio pump tasks.
    pub fn spawn(path: &Path) -> Result<Self, TransportError> {
        tracing::info!(binary = %path.display(), "spawning engine process");
        let mut child = tokio::process::Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(TransportError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(TransportError::NoStdout)?;

        let (input_tx, input_rx) = mpsc::channel::<String>(64);
        let (line_tx, line_rx) = mpsc::channel::<String>(256);

        tokio::spawn(pump_stdout(stdout, line_tx));
        tokio::spawn(pump_stdin(stdin, input_rx));

        Ok(Self {
            child: Some(child),
            input_tx,
            line_rx,
        })
    }

    pub(crate) fn from_parts(
        input_tx: mpsc::Sender<String>,
        line_rx: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            child: None,
            input_tx,
            line_rx,
        }
    }

    /// Queue one line for transmission. Errors are swallowed: if the writer
    /// task is gone the engine is dead, and that surfaces through `recv`.
    pub async fn send(&self, line: String) {
        if self.input_tx.send(line).await.is_err() {
            tracing::debug!("engine stdin channel closed; dropping outbound line");
        }
    }

    /// Next line of engine output, or `None` once the engine has terminated.
    pub async fn recv(&mut self) -> Option<String> {
        self.line_rx.recv().await
    }

    /// Ask the engine to quit, then reap or kill the child.
    pub async fn shutdown(mut self) {
        let _ = self.input_tx.send("quit".to_string()).await;
        if let Some(mut child) = self.child.take() {
            let wait = tokio::time::timeout(std::time::Duration::from_secs(1), child.wait());
            if wait.await.is_err() {
                tracing::warn!("engine ignored quit; killing process");
                let _ = child.kill().await;
            }
        }
    }
}

async fn pump_stdout(stdout: tokio::process::ChildStdout, line_tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::info!("engine stdout closed");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim_end();
                tracing::trace!("UCI << {}", trimmed);
                if line_tx.send(trimmed.to_string()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("error reading engine stdout: {}", e);
                break;
            }
        }
    }
}

async fn pump_stdin(mut stdin: tokio::process::ChildStdin, mut input_rx: mpsc::Receiver<String>) {
    while let Some(line) = input_rx.recv().await {
        tracing::trace!("UCI >> {}", line);
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            tracing::error!("failed to write to engine stdin: {}", e);
            break;
        }
        if let Err(e) = stdin.write_all(b"\n").await {
            tracing::error!("failed to write to engine stdin: {}", e);
            break;
        }
        if let Err(e) = stdin.flush().await {
            tracing::error!("failed to flush engine stdin: {}", e);
            break;
        }
    }
}

/// Look for a Stockfish binary in conventional install locations, then PATH.
///
/// Only consulted when the caller has not configured an explicit path; an
/// explicit path is used as-is and never second-guessed.
pub fn find_engine_binary() -> Option<PathBuf> {
    const CANDIDATES: &[&str] = &[
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
    ];

    for candidate in CANDIDATES {
        let path = Path::new(candidate);
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join("stockfish");
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}

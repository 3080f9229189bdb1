//! Diagnostic CLI: run one analysis against a local UCI engine and print the
//! reported variations as they deepen. Debug surface only; the interesting
//! logic all lives in the `session` and `engine` crates.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use session::{
    notation, spawn_session, EngineOptions, GoParams, Score, SearchLine, SessionConfig,
    SessionEvent,
};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Parser)]
#[command(name = "analyzer", about = "Analyze a chess position with a UCI engine")]
struct Cli {
    /// Engine binary. Conventional install locations and PATH are probed
    /// when omitted.
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Position to analyze, as FEN.
    #[arg(long, default_value = START_FEN)]
    fen: String,

    /// Search depth.
    #[arg(long, default_value_t = 18)]
    depth: u32,

    /// Search time budget in milliseconds; overrides --depth when set.
    #[arg(long)]
    movetime: Option<u64>,

    /// Number of variations to track.
    #[arg(long, default_value_t = 3)]
    multipv: u32,

    /// Engine search threads.
    #[arg(long, default_value_t = 1)]
    threads: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let handle = spawn_session(&SessionConfig {
        engine_path: cli.engine.clone(),
    });
    let (_, mut events) = handle.subscribe().await.context("session unavailable")?;

    handle
        .initialize(EngineOptions {
            multi_pv: cli.multipv,
            threads: cli.threads,
            skill_level: None,
        })
        .await?;
    handle.set_position(cli.fen.clone()).await?;
    handle
        .analyze(GoParams {
            depth: Some(cli.depth),
            movetime: cli.movetime,
        })
        .await?;

    println!("analyzing {}", cli.fen);

    use tokio::sync::broadcast::error::RecvError;

    // Reprint a variation whenever it deepens; stop on the final bestmove.
    let mut printed: HashMap<u32, u32> = HashMap::new();
    loop {
        let snapshot = match events.recv().await {
            Ok(SessionEvent::StateChanged(snapshot)) => snapshot,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "dropped intermediate snapshots");
                continue;
            }
            Err(RecvError::Closed) => bail!("session closed before the search finished"),
        };

        if let Some(error) = &snapshot.last_error {
            bail!("engine failed: {}", error);
        }

        for line in &snapshot.lines {
            if printed.get(&line.variation) != Some(&line.depth) {
                printed.insert(line.variation, line.depth);
                println!("{}", render_line(line, &cli.fen));
            }
        }

        if let Some(best) = &snapshot.best_move {
            if !snapshot.searching {
                println!("bestmove {}", best);
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn render_line(line: &SearchLine, fen: &str) -> String {
    let sans = notation::convert_to_notation(fen, &line.moves);
    let pv = if sans.len() == line.moves.len() {
        sans.join(" ")
    } else {
        // Conversion came up short; the raw tokens are still meaningful.
        line.moves.join(" ")
    };
    format!(
        "  {}. depth {:>2}  {:>8}  {}",
        line.variation,
        line.depth,
        render_score(line.score),
        pv
    )
}

fn render_score(score: Score) -> String {
    match score {
        Score::Centipawns(cp) => format!("{:+.2}", f64::from(cp) / 100.0),
        Score::Mate(n) => format!("mate {}", n),
    }
}

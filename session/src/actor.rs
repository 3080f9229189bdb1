use engine::{parse_line, EngineCommand, UciMessage};
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

use crate::commands::SessionCommand;
use crate::events::SessionEvent;
use crate::notation;
use crate::state::{SessionState, TransportSignal};

/// The session actor loop.
/// Owns all mutable state. Processes commands and engine lines sequentially.
pub(crate) async fn run_session(
    state: SessionState,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
) {
    let session_id = state.session_id.clone();
    run_session_inner(state, cmd_rx, event_tx)
        .instrument(tracing::info_span!("engine_session", id = %session_id))
        .await;
}

async fn run_session_inner(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
) {
    tracing::info!("engine session started");

    if state.has_transport() {
        // Handshake goes out before any public command can be transmitted;
        // everything public queues behind readiness.
        state.send_line(EngineCommand::Uci.to_wire()).await;
    } else {
        tracing::error!(error = ?state.last_error, "engine transport failed to initialize");
        publish(&state, &event_tx);
    }

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Shutdown) | None => {
                        tracing::info!("engine session shutting down");
                        if let Some(transport) = state.take_transport() {
                            transport.shutdown().await;
                        }
                        break;
                    }
                    Some(cmd) => handle_command(&mut state, cmd, &event_tx).await,
                }
            }

            signal = state.next_signal() => {
                match signal {
                    TransportSignal::Line(line) => {
                        handle_engine_line(&mut state, &line, &event_tx).await;
                    }
                    TransportSignal::Closed => {
                        tracing::error!("engine terminated unexpectedly");
                        state.fail("engine terminated unexpectedly");
                        publish(&state, &event_tx);
                    }
                }
            }
        }
    }

    tracing::info!("engine session exited");
    // Dropping event_tx closes every subscriber's stream.
}

async fn handle_command(
    state: &mut SessionState,
    cmd: SessionCommand,
    event_tx: &broadcast::Sender<SessionEvent>,
) {
    // Read operations keep working after a fatal failure so callers can
    // inspect the wreckage; everything else becomes a no-op.
    match &cmd {
        SessionCommand::GetSnapshot { .. } | SessionCommand::Subscribe { .. } => {}
        _ if state.failed() => {
            tracing::debug!("ignoring command after fatal transport failure");
            return;
        }
        _ => {}
    }

    match cmd {
        SessionCommand::Initialize { options } => {
            if state.initialized {
                tracing::debug!("session already initialized; ignoring");
                return;
            }
            state.initialized = true;
            tracing::info!(
                multi_pv = options.multi_pv,
                threads = options.threads,
                skill_level = ?options.skill_level,
                "applying engine options"
            );
            state
                .dispatch(EngineCommand::SetOption {
                    name: "MultiPV".to_string(),
                    value: options.multi_pv.max(1).to_string(),
                })
                .await;
            state
                .dispatch(EngineCommand::SetOption {
                    name: "Threads".to_string(),
                    value: options.threads.max(1).to_string(),
                })
                .await;
            if let Some(level) = options.skill_level {
                state
                    .dispatch(EngineCommand::SetOption {
                        name: "Skill Level".to_string(),
                        value: level.to_string(),
                    })
                    .await;
            }
            state.dispatch(EngineCommand::IsReady).await;
            publish(state, event_tx);
        }
        SessionCommand::SetPosition { fen } => {
            state.fen = Some(fen.clone());
            state.dispatch(EngineCommand::SetPosition { fen }).await;
            publish(state, event_tx);
        }
        SessionCommand::SetPositionFromMoves { moves } => {
            // The engine's internal position can't be queried back, so the
            // resulting position is reconstructed through the rules engine.
            let (board, applied) = notation::replay_from_start(&moves);
            if applied < moves.len() {
                tracing::warn!(
                    applied,
                    total = moves.len(),
                    "move replay stopped at an illegal or malformed move"
                );
            }
            state.fen = Some(board.to_string());
            state
                .dispatch(EngineCommand::SetPositionFromMoves { moves })
                .await;
            publish(state, event_tx);
        }
        SessionCommand::Analyze { params } => {
            state.dispatch(EngineCommand::Go(params)).await;
            publish(state, event_tx);
        }
        SessionCommand::Stop => {
            // Transmitted only when ready; before that there is nothing to
            // cancel and a queued stop would fire at the wrong time.
            if state.ready {
                state.transmit(EngineCommand::Stop).await;
            } else {
                state.searching = false;
            }
            publish(state, event_tx);
        }
        SessionCommand::SetOption { name, value } => {
            state.dispatch(EngineCommand::SetOption { name, value }).await;
            state.dispatch(EngineCommand::IsReady).await;
            publish(state, event_tx);
        }
        SessionCommand::NewGame => {
            state.aggregator.reset();
            state.fen = None;
            state.dispatch(EngineCommand::NewGame).await;
            state.dispatch(EngineCommand::IsReady).await;
            publish(state, event_tx);
        }
        SessionCommand::GetSnapshot { reply } => {
            let _ = reply.send(state.snapshot());
        }
        SessionCommand::Subscribe { reply } => {
            let _ = reply.send((state.snapshot(), event_tx.subscribe()));
        }
        SessionCommand::Shutdown => unreachable!(),
    }
}

async fn handle_engine_line(
    state: &mut SessionState,
    line: &str,
    event_tx: &broadcast::Sender<SessionEvent>,
) {
    state.record_line(line);

    match parse_line(line) {
        UciMessage::UciOk => {
            tracing::debug!("engine speaks the protocol; probing for idle");
            state.send_line(EngineCommand::IsReady.to_wire()).await;
        }
        UciMessage::ReadyOk => {
            if !state.ready {
                state.ready = true;
                tracing::info!("engine ready; flushing queued commands");
                state.flush_pending().await;
            }
        }
        UciMessage::Info(info) => {
            state.aggregator.ingest_info(&info);
        }
        UciMessage::BestMove { mv, .. } => {
            // Accepted even after a stop(): cancellation is advisory and a
            // trailing result is not an error.
            tracing::debug!(%mv, "search finished");
            state.aggregator.ingest_best_move(&mv);
            state.searching = false;
        }
        UciMessage::Id { field, value } => {
            tracing::debug!(%field, %value, "engine identification");
        }
        UciMessage::Unrecognized { .. } => {}
    }

    publish(state, event_tx);
}

fn publish(state: &SessionState, event_tx: &broadcast::Sender<SessionEvent>) {
    let _ = event_tx.send(SessionEvent::StateChanged(state.snapshot()));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use engine::mock::{scripted_transport, ScriptedEngine};
    use engine::GoParams;

    use crate::commands::EngineOptions;
    use crate::handle::SessionHandle;
    use crate::snapshot::SessionSnapshot;
    use crate::{spawn_session, spawn_session_with_transport, SessionConfig};

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn spawn_scripted() -> (SessionHandle, ScriptedEngine) {
        let (transport, driver) = scripted_transport();
        let handle = spawn_session_with_transport(transport);
        (handle, driver)
    }

    async fn complete_handshake(driver: &mut ScriptedEngine) {
        assert_eq!(driver.expect_sent().await, "uci");
        driver.emit("uciok").await;
        assert_eq!(driver.expect_sent().await, "isready");
        driver.emit("readyok").await;
    }

    async fn wait_for<F>(handle: &SessionHandle, pred: F) -> SessionSnapshot
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snap = handle.snapshot().await.expect("session actor gone");
                if pred(&snap) {
                    return snap;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for session state")
    }

    async fn assert_no_further_traffic(driver: &mut ScriptedEngine) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(driver.try_next_sent(), None);
    }

    #[tokio::test]
    async fn test_commands_queue_until_ready_then_flush_in_order() {
        let (handle, mut driver) = spawn_scripted();

        handle.set_position(START_FEN).await.unwrap();
        handle.set_option("Hash", "64").await.unwrap();
        handle
            .analyze(GoParams {
                depth: Some(10),
                movetime: None,
            })
            .await
            .unwrap();

        // Nothing but the handshake goes out before the engine confirms idle.
        assert_eq!(driver.expect_sent().await, "uci");
        assert_no_further_traffic(&mut driver).await;

        driver.emit("uciok").await;
        assert_eq!(driver.expect_sent().await, "isready");
        assert_no_further_traffic(&mut driver).await;

        driver.emit("readyok").await;
        assert_eq!(
            driver.expect_sent().await,
            format!("position fen {}", START_FEN)
        );
        assert_eq!(driver.expect_sent().await, "setoption name Hash value 64");
        assert_eq!(driver.expect_sent().await, "isready");
        assert_eq!(driver.expect_sent().await, "go depth 10");

        // Flushed exactly once.
        assert_no_further_traffic(&mut driver).await;
    }

    #[tokio::test]
    async fn test_multipv_analysis_scenario() {
        let (handle, mut driver) = spawn_scripted();

        handle
            .initialize(EngineOptions {
                multi_pv: 3,
                threads: 1,
                skill_level: None,
            })
            .await
            .unwrap();
        handle.set_position(START_FEN).await.unwrap();
        handle
            .analyze(GoParams {
                depth: Some(10),
                movetime: None,
            })
            .await
            .unwrap();

        complete_handshake(&mut driver).await;
        assert_eq!(driver.expect_sent().await, "setoption name MultiPV value 3");
        assert_eq!(driver.expect_sent().await, "setoption name Threads value 1");
        assert_eq!(driver.expect_sent().await, "isready");
        assert_eq!(
            driver.expect_sent().await,
            format!("position fen {}", START_FEN)
        );
        assert_eq!(driver.expect_sent().await, "go depth 10");

        driver.emit("readyok").await; // reply to the option probe
        driver
            .emit("info depth 10 multipv 1 score cp 30 pv e2e4 e7e5 g1f3")
            .await;
        driver
            .emit("info depth 10 multipv 2 score cp 25 pv d2d4 d7d5")
            .await;
        driver.emit("bestmove e2e4").await;

        let snap = wait_for(&handle, |s| !s.searching && s.best_move.is_some()).await;
        assert_eq!(snap.lines.len(), 2);
        assert_eq!(snap.lines[0].variation, 1);
        assert_eq!(snap.lines[0].moves, vec!["e2e4", "e7e5", "g1f3"]);
        assert_eq!(snap.lines[1].variation, 2);
        assert_eq!(snap.best_move.as_deref(), Some("e2e4"));
        assert!(snap.ready);
    }

    #[tokio::test]
    async fn test_new_search_clears_previous_episode() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle
            .analyze(GoParams {
                depth: Some(10),
                movetime: None,
            })
            .await
            .unwrap();
        assert_eq!(driver.expect_sent().await, "go depth 10");
        driver
            .emit("info depth 10 multipv 1 score cp 30 pv e2e4")
            .await;
        wait_for(&handle, |s| s.lines.len() == 1).await;

        // Second episode without an intervening bestmove.
        handle
            .analyze(GoParams {
                depth: Some(12),
                movetime: None,
            })
            .await
            .unwrap();
        assert_eq!(driver.expect_sent().await, "go depth 12");
        let snap = wait_for(&handle, |s| s.lines.is_empty()).await;
        assert!(snap.best_move.is_none());

        driver
            .emit("info depth 3 multipv 2 score cp -4 pv d2d4")
            .await;
        let snap = wait_for(&handle, |s| s.lines.len() == 1).await;
        assert_eq!(snap.lines[0].variation, 2);
        assert_eq!(snap.lines[0].depth, 3);
    }

    #[tokio::test]
    async fn test_stop_tolerates_a_trailing_bestmove() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle.analyze(GoParams::default()).await.unwrap();
        assert_eq!(driver.expect_sent().await, "go depth 20");
        wait_for(&handle, |s| s.searching).await;

        handle.stop().await.unwrap();
        assert_eq!(driver.expect_sent().await, "stop");
        wait_for(&handle, |s| !s.searching).await;

        // The engine replies anyway; the result is kept, not an error.
        driver.emit("bestmove e2e4").await;
        let snap = wait_for(&handle, |s| s.best_move.is_some()).await;
        assert_eq!(snap.best_move.as_deref(), Some("e2e4"));
        assert!(snap.last_error.is_none());
        assert!(!snap.searching);
    }

    #[tokio::test]
    async fn test_position_change_during_search_sends_stop_first() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle.analyze(GoParams::default()).await.unwrap();
        assert_eq!(driver.expect_sent().await, "go depth 20");
        wait_for(&handle, |s| s.searching).await;

        handle.set_position(START_FEN).await.unwrap();
        assert_eq!(driver.expect_sent().await, "stop");
        assert_eq!(
            driver.expect_sent().await,
            format!("position fen {}", START_FEN)
        );

        // The episode is only reset by the next analyze, which the caller
        // issues explicitly.
        let snap = wait_for(&handle, |s| !s.searching).await;
        assert_eq!(snap.fen.as_deref(), Some(START_FEN));
        assert_no_further_traffic(&mut driver).await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_terminal() {
        let handle = spawn_session(&SessionConfig {
            engine_path: Some("/nonexistent/path/to/engine".into()),
        });

        let snap = wait_for(&handle, |s| s.last_error.is_some()).await;
        assert!(!snap.ready);

        // Public calls become safe no-ops.
        handle.analyze(GoParams::default()).await.unwrap();
        handle.set_position(START_FEN).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snap = handle.snapshot().await.unwrap();
        assert!(!snap.ready);
        assert!(!snap.searching);
        assert!(snap.lines.is_empty());
        assert!(snap.last_error.is_some());
    }

    #[tokio::test]
    async fn test_engine_death_mid_session_is_terminal() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;
        wait_for(&handle, |s| s.ready).await;

        driver.die();

        let snap = wait_for(&handle, |s| s.last_error.is_some()).await;
        assert!(!snap.ready);

        handle.analyze(GoParams::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.snapshot().await.unwrap().searching);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle.initialize(EngineOptions::default()).await.unwrap();
        assert_eq!(driver.expect_sent().await, "setoption name MultiPV value 1");
        assert_eq!(driver.expect_sent().await, "setoption name Threads value 1");
        assert_eq!(driver.expect_sent().await, "isready");

        handle.initialize(EngineOptions::default()).await.unwrap();
        assert_no_further_traffic(&mut driver).await;
    }

    #[tokio::test]
    async fn test_skill_level_only_set_when_requested() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle
            .initialize(EngineOptions {
                multi_pv: 2,
                threads: 4,
                skill_level: Some(5),
            })
            .await
            .unwrap();
        assert_eq!(driver.expect_sent().await, "setoption name MultiPV value 2");
        assert_eq!(driver.expect_sent().await, "setoption name Threads value 4");
        assert_eq!(
            driver.expect_sent().await,
            "setoption name Skill Level value 5"
        );
        assert_eq!(driver.expect_sent().await, "isready");
    }

    #[tokio::test]
    async fn test_new_game_clears_search_state() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle.set_position(START_FEN).await.unwrap();
        assert_eq!(
            driver.expect_sent().await,
            format!("position fen {}", START_FEN)
        );
        handle.analyze(GoParams::default()).await.unwrap();
        assert_eq!(driver.expect_sent().await, "go depth 20");
        driver
            .emit("info depth 8 multipv 1 score cp 15 pv e2e4")
            .await;
        driver.emit("bestmove e2e4").await;
        wait_for(&handle, |s| s.best_move.is_some()).await;

        handle.new_game().await.unwrap();
        assert_eq!(driver.expect_sent().await, "ucinewgame");
        assert_eq!(driver.expect_sent().await, "isready");

        let snap = wait_for(&handle, |s| s.lines.is_empty()).await;
        assert!(snap.best_move.is_none());
        assert!(snap.fen.is_none());
    }

    #[tokio::test]
    async fn test_stop_before_ready_is_not_queued() {
        let (handle, mut driver) = spawn_scripted();

        handle.stop().await.unwrap();

        complete_handshake(&mut driver).await;
        assert_no_further_traffic(&mut driver).await;
    }

    #[tokio::test]
    async fn test_set_position_from_moves_reconstructs_the_position() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle
            .set_position_from_moves(vec!["e2e4".into(), "e7e5".into()])
            .await
            .unwrap();
        assert_eq!(
            driver.expect_sent().await,
            "position startpos moves e2e4 e7e5"
        );

        let snap = wait_for(&handle, |s| s.fen.is_some()).await;
        let fen = snap.fen.unwrap();
        assert!(
            fen.starts_with("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w"),
            "unexpected reconstructed fen: {}",
            fen
        );
    }

    #[tokio::test]
    async fn test_illegal_move_in_replay_truncates_reconstruction() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        // Second token is illegal; the wire command still goes out verbatim,
        // the reconstructed position stops after the first move.
        handle
            .set_position_from_moves(vec!["e2e4".into(), "e2e4".into()])
            .await
            .unwrap();
        assert_eq!(
            driver.expect_sent().await,
            "position startpos moves e2e4 e2e4"
        );

        let snap = wait_for(&handle, |s| s.fen.is_some()).await;
        let fen = snap.fen.unwrap();
        assert!(
            fen.starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"),
            "unexpected reconstructed fen: {}",
            fen
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_every_mutation_in_order() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;
        wait_for(&handle, |s| s.ready).await;

        let (initial, mut events) = handle.subscribe().await.unwrap();
        assert!(initial.ready);

        handle.set_position(START_FEN).await.unwrap();
        assert_eq!(
            driver.expect_sent().await,
            format!("position fen {}", START_FEN)
        );

        let snap = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let crate::SessionEvent::StateChanged(snap) =
                    events.recv().await.expect("event stream closed");
                if snap.fen.is_some() {
                    return snap;
                }
            }
        })
        .await
        .expect("no snapshot event arrived");
        assert_eq!(snap.fen.as_deref(), Some(START_FEN));
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscriptions_and_handle() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;
        wait_for(&handle, |s| s.ready).await;

        let (_, mut events) = handle.subscribe().await.unwrap();
        handle.shutdown().await;

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return true,
                    Err(_) => continue,
                }
            }
        })
        .await
        .expect("subscription never closed");
        assert!(closed);

        assert!(handle.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_raw_log_keeps_the_last_hundred_lines() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        for i in 0..120 {
            driver.emit(&format!("debug chatter {}", i)).await;
        }

        let snap = wait_for(&handle, |s| {
            s.raw_log.last().map(String::as_str) == Some("debug chatter 119")
        })
        .await;
        assert_eq!(snap.raw_log.len(), 100);
        // uciok + readyok + 120 chatter lines arrived; the oldest 22 fell off.
        assert_eq!(
            snap.raw_log.first().map(String::as_str),
            Some("debug chatter 20")
        );
    }

    #[tokio::test]
    async fn test_go_movetime_takes_precedence() {
        let (handle, mut driver) = spawn_scripted();
        complete_handshake(&mut driver).await;

        handle
            .analyze(GoParams {
                depth: Some(15),
                movetime: Some(800),
            })
            .await
            .unwrap();
        assert_eq!(driver.expect_sent().await, "go movetime 800");
    }
}

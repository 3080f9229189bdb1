/// Search depth used when `go` is issued with neither a depth nor a movetime.
///
/// Bounded so an unparameterized `analyze` always terminates.
pub const DEFAULT_SEARCH_DEPTH: u32 = 20;

/// Parameters for the `go` command. When both are set, `movetime` governs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoParams {
    pub depth: Option<u32>,
    pub movetime: Option<u64>,
}

/// A single outbound engine command. Immutable once constructed; one wire
/// line per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Uci,
    IsReady,
    NewGame,
    SetPosition { fen: String },
    SetPositionFromMoves { moves: Vec<String> },
    Go(GoParams),
    Stop,
    SetOption { name: String, value: String },
    Quit,
}

impl EngineCommand {
    /// Serialize to the engine's wire format, without a trailing newline.
    pub fn to_wire(&self) -> String {
        match self {
            EngineCommand::Uci => "uci".to_string(),
            EngineCommand::IsReady => "isready".to_string(),
            EngineCommand::NewGame => "ucinewgame".to_string(),
            EngineCommand::SetPosition { fen } => format!("position fen {}", fen),
            EngineCommand::SetPositionFromMoves { moves } => {
                if moves.is_empty() {
                    "position startpos".to_string()
                } else {
                    format!("position startpos moves {}", moves.join(" "))
                }
            }
            EngineCommand::Go(params) => {
                if let Some(movetime) = params.movetime.filter(|&ms| ms > 0) {
                    format!("go movetime {}", movetime)
                } else if let Some(depth) = params.depth {
                    format!("go depth {}", depth)
                } else {
                    format!("go depth {}", DEFAULT_SEARCH_DEPTH)
                }
            }
            EngineCommand::Stop => "stop".to_string(),
            EngineCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            EngineCommand::Quit => "quit".to_string(),
        }
    }
}

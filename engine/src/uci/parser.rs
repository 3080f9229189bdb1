use crate::Score;

/// One line of engine output, parsed.
///
/// Parsing is total: a line that matches no known report shape comes back as
/// `Unrecognized` rather than an error, since engines freely emit
/// identification and debug lines that must be logged but otherwise ignored.
#[derive(Debug, Clone)]
pub enum UciMessage {
    /// `uciok`: the engine speaks the protocol.
    UciOk,
    /// `readyok`: the engine has drained its command backlog.
    ReadyOk,
    /// `id name ...` / `id author ...`
    Id { field: String, value: String },
    /// `bestmove <move> [ponder <move>]`
    BestMove { mv: String, ponder: Option<String> },
    /// `info ...` search report with at least one recognized field.
    Info(SearchInfo),
    /// Anything else, kept verbatim for the raw log.
    Unrecognized { raw: String },
}

/// Fields of an `info` report. Every field is optional on the wire; the
/// aggregator decides which combinations are usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time_ms: Option<u64>,
    /// Principal variation as engine-native move tokens (`e2e4`, `e7e8q`).
    pub pv: Vec<String>,
}

impl SearchInfo {
    fn is_empty(&self) -> bool {
        self.depth.is_none()
            && self.seldepth.is_none()
            && self.multipv.is_none()
            && self.score.is_none()
            && self.nodes.is_none()
            && self.nps.is_none()
            && self.time_ms.is_none()
            && self.pv.is_empty()
    }
}

/// Parse a single line of engine output.
pub fn parse_line(line: &str) -> UciMessage {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => UciMessage::UciOk,
        Some(&"readyok") => UciMessage::ReadyOk,

        Some(&"id") if tokens.len() >= 3 => UciMessage::Id {
            field: tokens[1].to_string(),
            value: tokens[2..].join(" "),
        },

        Some(&"bestmove") if tokens.len() >= 2 => {
            let ponder = if tokens.len() >= 4 && tokens[2] == "ponder" {
                Some(tokens[3].to_string())
            } else {
                None
            };
            UciMessage::BestMove {
                mv: tokens[1].to_string(),
                ponder,
            }
        }

        Some(&"info") => {
            let info = parse_info(&tokens[1..]);
            if info.is_empty() {
                UciMessage::Unrecognized {
                    raw: line.to_string(),
                }
            } else {
                UciMessage::Info(info)
            }
        }

        _ => UciMessage::Unrecognized {
            raw: line.to_string(),
        },
    }
}

fn parse_info(tokens: &[&str]) -> SearchInfo {
    let mut info = SearchInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "seldepth" => {
                i += 1;
                info.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                info.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                info.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                let kind = tokens.get(i + 1).copied();
                let value = tokens.get(i + 2).and_then(|s| s.parse::<i32>().ok());
                info.score = match (kind, value) {
                    (Some("cp"), Some(v)) => Some(Score::Centipawns(v)),
                    (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                    _ => None,
                };
                i += 2;
            }
            "pv" => {
                // Terminal field: everything after `pv` is the move sequence.
                info.pv = tokens[i + 1..].iter().map(|s| s.to_string()).collect();
                break;
            }
            "string" => {
                // Terminal field: free-form engine commentary, not search data.
                break;
            }
            _ => {
                // Unknown key; skip it so newer engines don't break us.
            }
        }
        i += 1;
    }

    info
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::uci::SearchInfo;
use crate::Score;

/// Best-known state of one principal variation within a search episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLine {
    /// 1-based MultiPV index.
    pub variation: u32,
    pub score: Score,
    pub depth: u32,
    pub seldepth: Option<u32>,
    /// Engine-native move tokens, root move first.
    pub moves: Vec<String>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time_ms: Option<u64>,
}

/// Folds the stream of `info` reports for one search episode into the
/// best-known line per variation index, plus the terminal `bestmove`.
///
/// Replacement is monotonic in depth: a report only displaces the stored
/// line for its variation when it is at least as deep, so a shallow report
/// arriving late (out of order) can never clobber a deeper one.
#[derive(Debug, Default)]
pub struct LineAggregator {
    lines: BTreeMap<u32, SearchLine>,
    best_move: Option<String>,
}

impl LineAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one `info` report. Reports missing any of multipv, score,
    /// depth, or pv carry nothing displayable and are ignored whole.
    /// Returns whether the snapshot changed.
    pub fn ingest_info(&mut self, info: &SearchInfo) -> bool {
        let (Some(variation), Some(score), Some(depth)) = (info.multipv, info.score, info.depth)
        else {
            return false;
        };
        if info.pv.is_empty() {
            return false;
        }

        if let Some(existing) = self.lines.get(&variation) {
            if depth < existing.depth {
                tracing::trace!(
                    variation,
                    depth,
                    stored = existing.depth,
                    "discarding out-of-order shallow report"
                );
                return false;
            }
        }

        self.lines.insert(
            variation,
            SearchLine {
                variation,
                score,
                depth,
                seldepth: info.seldepth,
                moves: info.pv.clone(),
                nodes: info.nodes,
                nps: info.nps,
                time_ms: info.time_ms,
            },
        );
        true
    }

    /// Record the terminal `bestmove` of the episode.
    pub fn ingest_best_move(&mut self, mv: &str) {
        self.best_move = Some(mv.to_string());
    }

    /// Start a fresh episode. Nothing from a previous search survives.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.best_move = None;
    }

    /// All tracked lines, ordered by variation index.
    pub fn lines(&self) -> Vec<SearchLine> {
        self.lines.values().cloned().collect()
    }

    pub fn best_move(&self) -> Option<&str> {
        self.best_move.as_deref()
    }
}

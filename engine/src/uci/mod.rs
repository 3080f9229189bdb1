pub mod commands;
pub mod parser;

pub use commands::{EngineCommand, GoParams, DEFAULT_SEARCH_DEPTH};
pub use parser::{parse_line, SearchInfo, UciMessage};

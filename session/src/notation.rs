//! Display conversion for engine-native move tokens.
//!
//! The engine reports lines as coordinate tokens (`e2e4`, `e7e8q`). Turning
//! those into human-readable SAN requires replaying them through the rules
//! engine from a known starting position. Conversion never fails: the first
//! malformed or illegal token truncates the output and whatever was
//! converted so far is returned.

use cozy_chess::{Board, File, GameStatus, Move, Piece, Rank, Square};

/// Convert a move sequence to SAN, starting from `fen`.
///
/// Stops at the first token that does not parse or is not legal in the
/// position reached so far; an unparseable FEN yields an empty result.
pub fn convert_to_notation(fen: &str, moves: &[String]) -> Vec<String> {
    let Ok(mut board) = fen.parse::<Board>() else {
        tracing::debug!(fen, "unparseable fen; nothing to convert");
        return Vec::new();
    };

    let mut out = Vec::with_capacity(moves.len());
    for token in moves {
        let Some(mv) = parse_move_token(token) else {
            break;
        };
        let mv = normalize_castling(mv, &board);
        let legal = legal_moves(&board);
        if !legal.contains(&mv) {
            break;
        }
        out.push(san_for_move(&board, mv, &legal));
        board.play(mv);
    }
    out
}

/// Replay a move list from the standard starting position.
///
/// Returns the reached position and how many tokens were applied; stops at
/// the first illegal or malformed token.
pub fn replay_from_start(moves: &[String]) -> (Board, usize) {
    let mut board = Board::default();
    let mut applied = 0;
    for token in moves {
        let Some(mv) = parse_move_token(token) else {
            break;
        };
        let mv = normalize_castling(mv, &board);
        if !legal_moves(&board).contains(&mv) {
            break;
        }
        board.play(mv);
        applied += 1;
    }
    (board, applied)
}

/// Parse a coordinate move token (`e2e4`, `e7e8q`).
pub fn parse_move_token(token: &str) -> Option<Move> {
    let bytes = token.as_bytes();
    if !(4..=5).contains(&bytes.len()) {
        return None;
    }
    let from = parse_square(&bytes[0..2])?;
    let to = parse_square(&bytes[2..4])?;
    let promotion = match bytes.get(4) {
        None => None,
        Some(b'q') => Some(Piece::Queen),
        Some(b'r') => Some(Piece::Rook),
        Some(b'b') => Some(Piece::Bishop),
        Some(b'n') => Some(Piece::Knight),
        Some(_) => return None,
    };
    Some(Move {
        from,
        to,
        promotion,
    })
}

fn parse_square(bytes: &[u8]) -> Option<Square> {
    let file = File::try_index(bytes[0].checked_sub(b'a')? as usize)?;
    let rank = Rank::try_index(bytes[1].checked_sub(b'1')? as usize)?;
    Some(Square::new(file, rank))
}

/// Map a standard castling token (king moves two files, e.g. `e1g1`) onto
/// the rules engine's king-takes-rook encoding, when that castling move is
/// actually legal. Everything else passes through untouched.
fn normalize_castling(mv: Move, board: &Board) -> Move {
    if board.piece_on(mv.from) != Some(Piece::King) || mv.promotion.is_some() {
        return mv;
    }
    let back_rank = mv.from.rank();
    if !matches!(back_rank, Rank::First | Rank::Eighth) || mv.from.file() != File::E {
        return mv;
    }
    let rook_file = match mv.to.file() {
        File::G => File::H,
        File::C => File::A,
        _ => return mv,
    };

    let candidate = Move {
        from: mv.from,
        to: Square::new(rook_file, back_rank),
        promotion: None,
    };
    if legal_moves(board).contains(&candidate) {
        candidate
    } else {
        mv
    }
}

fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|batch| {
        moves.extend(batch);
        false
    });
    moves
}

/// SAN for a move known to be in `legal` for `board`.
fn san_for_move(board: &Board, mv: Move, legal: &[Move]) -> String {
    let Some(piece) = board.piece_on(mv.from) else {
        return move_token(mv);
    };
    let mover = board.side_to_move();

    // King onto an own piece is the rules engine's castling encoding.
    if piece == Piece::King && board.color_on(mv.to) == Some(mover) {
        let base = if mv.to.file() > mv.from.file() {
            "O-O"
        } else {
            "O-O-O"
        };
        return format!("{}{}", base, check_suffix(board, mv));
    }

    let is_capture = board.color_on(mv.to).is_some()
        || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

    let mut san = String::new();
    if piece == Piece::Pawn {
        if is_capture {
            san.push(file_char(mv.from.file()));
        }
    } else {
        san.push(piece_char(piece));
        san.push_str(&disambiguation(board, mv, piece, legal));
    }
    if is_capture {
        san.push('x');
    }
    san.push_str(&square_token(mv.to));
    if let Some(promotion) = mv.promotion {
        san.push('=');
        san.push(piece_char(promotion));
    }
    san.push_str(check_suffix(board, mv));
    san
}

/// Minimal from-square qualifier when another piece of the same kind could
/// also reach the destination: file if unique, else rank, else both.
fn disambiguation(board: &Board, mv: Move, piece: Piece, legal: &[Move]) -> String {
    let rivals: Vec<Square> = legal
        .iter()
        .filter(|m| m.to == mv.to && m.from != mv.from && board.piece_on(m.from) == Some(piece))
        .map(|m| m.from)
        .collect();

    if rivals.is_empty() {
        String::new()
    } else if !rivals.iter().any(|r| r.file() == mv.from.file()) {
        file_char(mv.from.file()).to_string()
    } else if !rivals.iter().any(|r| r.rank() == mv.from.rank()) {
        rank_char(mv.from.rank()).to_string()
    } else {
        square_token(mv.from)
    }
}

fn check_suffix(board: &Board, mv: Move) -> &'static str {
    let mut after = board.clone();
    after.play(mv);
    if after.checkers().is_empty() {
        ""
    } else if after.status() == GameStatus::Won {
        "#"
    } else {
        "+"
    }
}

fn piece_char(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

fn file_char(file: File) -> char {
    (b'a' + file as u8) as char
}

fn rank_char(rank: Rank) -> char {
    (b'1' + rank as u8) as char
}

fn square_token(sq: Square) -> String {
    format!("{}{}", file_char(sq.file()), rank_char(sq.rank()))
}

fn move_token(mv: Move) -> String {
    let mut s = format!("{}{}", square_token(mv.from), square_token(mv.to));
    if let Some(promotion) = mv.promotion {
        s.push(piece_char(promotion).to_ascii_lowercase());
    }
    s
}

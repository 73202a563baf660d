//! 局面引擎
//!
//! 同步引擎本身不实现国际象棋规则，所有规则判断都委托给 [`PositionEngine`]。
//! [`ChessEngine`] 是基于 `chess` crate 的默认实现。

use std::fmt;
use std::str::FromStr;

use chess::{BitBoard, Board, ChessMove, Color, File, MoveGen, Piece, Rank};
use protocol::{PieceKind, Promotion, Side, Square, UciMove};
use thiserror::Error;

/// 局面无法加载
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid position: {0}")]
pub struct InvalidPosition(pub String);

/// 双方子力统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialBalance {
    /// [白方, 黑方]，按 `PieceKind::ALL` 顺序
    counts: [[u8; 6]; 2],
}

impl MaterialBalance {
    pub fn new(white: [u8; 6], black: [u8; 6]) -> Self {
        Self {
            counts: [white, black],
        }
    }

    /// 一方某种棋子的数量
    pub fn count(&self, side: Side, kind: PieceKind) -> u8 {
        self.counts[side.index()][kind_index(kind)]
    }

    /// 白方数量减黑方数量
    pub fn difference(&self, kind: PieceKind) -> i8 {
        self.count(Side::White, kind) as i8 - self.count(Side::Black, kind) as i8
    }

    /// 一方被吃掉的某种棋子数量（升变可能让数量超过初始值，此时为 0）
    pub fn captured(&self, side: Side, kind: PieceKind) -> u8 {
        kind.initial_count().saturating_sub(self.count(side, kind))
    }
}

fn kind_index(kind: PieceKind) -> usize {
    match kind {
        PieceKind::Pawn => 0,
        PieceKind::Knight => 1,
        PieceKind::Bishop => 2,
        PieceKind::Rook => 3,
        PieceKind::Queen => 4,
        PieceKind::King => 5,
    }
}

/// 局面引擎协作者
pub trait PositionEngine {
    /// 引擎内部走法表示
    type Move: Copy + fmt::Debug;

    /// 从局面字符串初始化
    fn init_from_position(&mut self, position: &str) -> Result<(), InvalidPosition>;

    /// 将线上走法转换为引擎走法（例如王车易位的不同写法）
    fn normalize_move(&self, raw: &UciMove) -> Option<Self::Move>;

    fn is_legal(&self, mv: &Self::Move) -> bool;

    /// 执行走法（调用方保证合法）
    fn play(&mut self, mv: Self::Move);

    /// 导出当前局面
    fn export_position(&self) -> String;

    /// 当前走子方
    fn turn(&self) -> Side;

    /// 子力统计
    fn material(&self) -> MaterialBalance;
}

/// 基于 `chess` crate 的默认引擎
#[derive(Debug, Clone, Default)]
pub struct ChessEngine {
    board: Board,
}

impl ChessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn square(sq: Square) -> chess::Square {
        chess::Square::make_square(
            Rank::from_index(sq.rank() as usize),
            File::from_index(sq.file() as usize),
        )
    }

    fn piece(kind: PieceKind) -> Piece {
        match kind {
            PieceKind::Pawn => Piece::Pawn,
            PieceKind::Knight => Piece::Knight,
            PieceKind::Bishop => Piece::Bishop,
            PieceKind::Rook => Piece::Rook,
            PieceKind::Queen => Piece::Queen,
            PieceKind::King => Piece::King,
        }
    }

    fn promotion(promotion: Promotion) -> Piece {
        Self::piece(promotion.kind())
    }

    fn count(&self, color: Color, kind: PieceKind) -> u8 {
        let bits: BitBoard = *self.board.pieces(Self::piece(kind)) & *self.board.color_combined(color);
        bits.popcnt() as u8
    }
}

impl PositionEngine for ChessEngine {
    type Move = ChessMove;

    fn init_from_position(&mut self, position: &str) -> Result<(), InvalidPosition> {
        self.board =
            Board::from_str(position).map_err(|_| InvalidPosition(position.to_string()))?;
        Ok(())
    }

    fn normalize_move(&self, raw: &UciMove) -> Option<ChessMove> {
        let from = Self::square(raw.from);
        let mut to = Self::square(raw.to);
        let mover = self.board.side_to_move();

        // 王吃己方车的易位写法（e1h1）转换为标准写法（e1g1）
        if self.board.piece_on(from) == Some(Piece::King)
            && self.board.piece_on(to) == Some(Piece::Rook)
            && self.board.color_on(to) == Some(mover)
            && raw.from.rank() == raw.to.rank()
        {
            let file = if raw.to.file() > raw.from.file() {
                File::G
            } else {
                File::C
            };
            to = chess::Square::make_square(from.get_rank(), file);
        }

        Some(ChessMove::new(from, to, raw.promotion.map(Self::promotion)))
    }

    fn is_legal(&self, mv: &ChessMove) -> bool {
        MoveGen::new_legal(&self.board).any(|m| m == *mv)
    }

    fn play(&mut self, mv: ChessMove) {
        self.board = self.board.make_move_new(mv);
    }

    fn export_position(&self) -> String {
        self.board.to_string()
    }

    fn turn(&self) -> Side {
        match self.board.side_to_move() {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }

    fn material(&self) -> MaterialBalance {
        let mut white = [0u8; 6];
        let mut black = [0u8; 6];
        for kind in PieceKind::ALL {
            white[kind_index(kind)] = self.count(Color::White, kind);
            black[kind_index(kind)] = self.count(Color::Black, kind);
        }
        MaterialBalance::new(white, black)
    }
}

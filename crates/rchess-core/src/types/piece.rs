//! 駒種（PieceType）と駒（Piece）

use super::Color;

/// 駒種
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PieceType {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl PieceType {
    /// 駒種の数
    pub const NUM: usize = 6;

    pub const ALL: [PieceType; PieceType::NUM] = [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
        PieceType::King,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn from_index(idx: usize) -> Option<PieceType> {
        match idx {
            0 => Some(PieceType::Pawn),
            1 => Some(PieceType::Knight),
            2 => Some(PieceType::Bishop),
            3 => Some(PieceType::Rook),
            4 => Some(PieceType::Queen),
            5 => Some(PieceType::King),
            _ => None,
        }
    }

    /// 小文字の駒文字
    pub const fn to_char(self) -> char {
        match self {
            PieceType::Pawn => 'p',
            PieceType::Knight => 'n',
            PieceType::Bishop => 'b',
            PieceType::Rook => 'r',
            PieceType::Queen => 'q',
            PieceType::King => 'k',
        }
    }

    pub fn from_char(c: char) -> Option<PieceType> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceType::Pawn),
            'n' => Some(PieceType::Knight),
            'b' => Some(PieceType::Bishop),
            'r' => Some(PieceType::Rook),
            'q' => Some(PieceType::Queen),
            'k' => Some(PieceType::King),
            _ => None,
        }
    }
}

/// 駒（手番 + 駒種、`NONE` は空き升）
///
/// 内部表現は `color << 3 | (piece_type + 1)`。白は 1..=6、黒は 9..=14。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Piece(u8);

impl Piece {
    /// 駒インデックスの上限（配列サイズ用）
    pub const NUM: usize = 16;

    pub const NONE: Piece = Piece(0);

    #[inline]
    pub const fn new(color: Color, pt: PieceType) -> Piece {
        Piece(((color as u8) << 3) | (pt as u8 + 1))
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub const fn color(self) -> Color {
        debug_assert!(self.0 != 0);
        Color::from_index((self.0 >> 3) as usize)
    }

    /// 駒種（空き升では None）
    #[inline]
    pub const fn piece_type(self) -> Option<PieceType> {
        if self.0 == 0 {
            None
        } else {
            PieceType::from_index(((self.0 & 7) - 1) as usize)
        }
    }

    /// 駒種（空き升でないことが確定している場合）
    #[inline]
    pub const fn kind(self) -> PieceType {
        debug_assert!(self.0 != 0);
        match PieceType::from_index(((self.0 & 7).wrapping_sub(1)) as usize) {
            Some(pt) => pt,
            None => PieceType::Pawn,
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 色を入れ替えた駒
    #[inline]
    pub const fn flip_color(self) -> Piece {
        if self.0 == 0 { self } else { Piece(self.0 ^ 8) }
    }

    /// FEN の駒文字（白は大文字）
    pub fn to_char(self) -> char {
        match self.piece_type() {
            None => '.',
            Some(pt) => {
                let c = pt.to_char();
                if self.color() == Color::White { c.to_ascii_uppercase() } else { c }
            }
        }
    }

    pub fn from_char(c: char) -> Option<Piece> {
        let pt = PieceType::from_char(c)?;
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        Some(Piece::new(color, pt))
    }
}

impl std::fmt::Debug for Piece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Piece({})", self.to_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_encoding() {
        let p = Piece::new(Color::Black, PieceType::Knight);
        assert_eq!(p.color(), Color::Black);
        assert_eq!(p.kind(), PieceType::Knight);
        assert_eq!(p.flip_color(), Piece::new(Color::White, PieceType::Knight));
        assert_eq!(Piece::NONE.piece_type(), None);
    }

    #[test]
    fn test_piece_char() {
        assert_eq!(Piece::from_char('Q'), Some(Piece::new(Color::White, PieceType::Queen)));
        assert_eq!(Piece::new(Color::Black, PieceType::King).to_char(), 'k');
        assert_eq!(Piece::from_char('x'), None);
    }
}

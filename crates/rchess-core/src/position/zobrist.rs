//! Zobristハッシュ

use crate::types::{File, Piece, Square};

/// Zobristハッシュ用乱数テーブル
pub struct Zobrist {
    /// 手番用
    pub side: u64,
    /// 駒×升 [Piece.index()][Square.index()]
    pub psq: [[u64; Square::NUM]; Piece::NUM],
    /// アンパッサン升の筋
    pub enpassant: [u64; File::NUM],
    /// キャスリング権（4bit の全組み合わせ）
    pub castling: [u64; 16],
    /// 盤上にポーンが一枚もない時のポーンキー
    pub no_pawns: u64,
}

impl Zobrist {
    /// テーブル初期化
    pub const fn init() -> Self {
        let mut zobrist = Zobrist {
            side: 0,
            psq: [[0; Square::NUM]; Piece::NUM],
            enpassant: [0; File::NUM],
            castling: [0; 16],
            no_pawns: 0,
        };

        // XorShift64で疑似乱数生成
        let mut seed = 0x1070_372F_C0FF_EE42u64;

        seed = xorshift64(seed);
        zobrist.side = seed;

        seed = xorshift64(seed);
        zobrist.no_pawns = seed;

        // pc == 0 (Piece::NONE) は常に0を保つためスキップ
        let mut pc = 1;
        while pc < Piece::NUM {
            let mut sq = 0;
            while sq < Square::NUM {
                seed = xorshift64(seed);
                zobrist.psq[pc][sq] = seed;
                sq += 1;
            }
            pc += 1;
        }

        let mut f = 0;
        while f < File::NUM {
            seed = xorshift64(seed);
            zobrist.enpassant[f] = seed;
            f += 1;
        }

        // 権利なし(0)は0のまま
        let mut cr = 1;
        while cr < 16 {
            seed = xorshift64(seed);
            zobrist.castling[cr] = seed;
            cr += 1;
        }

        zobrist
    }
}

/// XorShift64疑似乱数生成（const fn対応）
const fn xorshift64(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

/// グローバルZobristテーブル
pub static ZOBRIST: Zobrist = Zobrist::init();

#[inline]
pub fn zobrist_psq(pc: Piece, sq: Square) -> u64 {
    ZOBRIST.psq[pc.index()][sq.index()]
}

/// 駒数に基づく駒割りキー（`count` 枚目の駒）
#[inline]
pub fn zobrist_material(pc: Piece, count: usize) -> u64 {
    ZOBRIST.psq[pc.index()][count & 63]
}

#[inline]
pub fn zobrist_enpassant(file: File) -> u64 {
    ZOBRIST.enpassant[file.index()]
}

#[inline]
pub fn zobrist_castling(rights: u8) -> u64 {
    ZOBRIST.castling[(rights & 15) as usize]
}

#[inline]
pub fn zobrist_side() -> u64 {
    ZOBRIST.side
}

#[inline]
pub fn zobrist_no_pawns() -> u64 {
    ZOBRIST.no_pawns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, PieceType};

    #[test]
    fn test_zobrist_init() {
        assert_ne!(ZOBRIST.side, 0);
        assert_eq!(zobrist_castling(0), 0);
        assert_eq!(zobrist_psq(Piece::NONE, Square::E4), 0);

        let wp = Piece::new(Color::White, PieceType::Pawn);
        let bp = Piece::new(Color::Black, PieceType::Pawn);
        assert_ne!(zobrist_psq(wp, Square::E2), zobrist_psq(wp, Square::E3));
        assert_ne!(zobrist_psq(wp, Square::E4), zobrist_psq(bp, Square::E4));
    }

    #[test]
    fn test_zobrist_xor_property() {
        let h1 = zobrist_enpassant(File::C);
        let h2 = zobrist_castling(0b1010);
        let combined = h1 ^ h2;
        assert_eq!(combined ^ h2, h1);
        assert_eq!(combined ^ h1, h2);
    }
}

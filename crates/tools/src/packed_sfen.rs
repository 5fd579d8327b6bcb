//! 学習レコード（PackedSfenValue）と局面の 32バイト圧縮
//!
//! # データ形式
//!
//! ## PackedSfenValue (40バイト/レコード, little endian)
//!
//! | フィールド  | サイズ | 説明                                    |
//! |-------------|--------|-----------------------------------------|
//! | sfen        | 32     | 圧縮局面 (256bit)                       |
//! | score       | 2      | 評価値 (i16)                            |
//! | move        | 2      | 最善手 (16bit Move)                     |
//! | game_ply    | 2      | 手数 (u16)                              |
//! | game_result | 1      | 勝敗 (i8: 1=勝ち, 0=引分, -1=負け)     |
//! | padding     | 1      | パディング                              |
//!
//! ## 圧縮局面 (32バイト = 256bit)
//!
//! ビットストリーム（下位ビットから）で以下の順に格納:
//! 1. 手番 (1bit): 0=白, 1=黒
//! 2. 白玉位置 (6bit)、黒玉位置 (6bit)
//! 3. 盤上の駒 (ハフマン符号 + 色1bit): a1..h8 の順、玉のマスはスキップ
//! 4. キャスリング権 (4bit)
//! 5. アンパッサン (1bit + 升6bit)
//! 6. 50手ルールカウンタ下位 6bit、手数 16bit、50手ルールカウンタ上位 1bit

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use rchess_core::position::{
    BLACK_OO, BLACK_OOO, FenError, Position, WHITE_OO, WHITE_OOO,
};
use rchess_core::types::{Color, Move, Piece, PieceType, Square};
use thiserror::Error;

/// 圧縮局面の復号エラー
#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid huffman code at square {0}")]
    InvalidCode(usize),
    #[error("both kings on the same square")]
    KingCollision,
    #[error("bit stream overflow")]
    Overflow,
    #[error("decoded position is invalid: {0}")]
    Fen(#[from] FenError),
}

/// PackedSfenValue (40バイト)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedSfenValue {
    /// 圧縮局面 (32バイト)
    pub sfen: [u8; 32],
    /// 評価値（手番側から見た値）
    pub score: i16,
    /// 最善手 (16bit Move)
    pub move16: u16,
    /// 手数
    pub game_ply: u16,
    /// 勝敗 (1=勝ち, 0=引分, -1=負け)
    pub game_result: i8,
    /// パディング
    pub padding: u8,
}

impl PackedSfenValue {
    /// サイズ (バイト)
    pub const SIZE: usize = 40;

    /// 局面からレコードを作る（勝敗は後から埋める）
    pub fn from_position(pos: &Position, score: i16, best_move: Move, game_ply: u16) -> Self {
        Self {
            sfen: pack_position(pos),
            score,
            move16: move_to_move16(best_move),
            game_ply,
            game_result: 0,
            padding: 0,
        }
    }

    /// バイト列から読み込む
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        let mut sfen = [0u8; 32];
        sfen.copy_from_slice(&bytes[0..32]);

        Some(Self {
            sfen,
            score: LittleEndian::read_i16(&bytes[32..34]),
            move16: LittleEndian::read_u16(&bytes[34..36]),
            game_ply: LittleEndian::read_u16(&bytes[36..38]),
            game_result: bytes[38] as i8,
            padding: bytes[39],
        })
    }

    /// バイト列にシリアライズ
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..32].copy_from_slice(&self.sfen);
        LittleEndian::write_i16(&mut bytes[32..34], self.score);
        LittleEndian::write_u16(&mut bytes[34..36], self.move16);
        LittleEndian::write_u16(&mut bytes[36..38], self.game_ply);
        bytes[38] = self.game_result as u8;
        bytes[39] = self.padding;
        bytes
    }

    /// 1レコード読み込む。ファイル終端なら `None`
    ///
    /// 末尾の 40バイトに満たない端数も終端として扱う。
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Option<Self>> {
        let mut buf = [0u8; Self::SIZE];
        match reader.read_exact(&mut buf) {
            Ok(()) => Ok(Self::from_bytes(&buf)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 1レコード書き込む
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// 最善手
    pub fn best_move(&self) -> Move {
        move16_to_move(self.move16)
    }
}

// ========== ビットストリーム ==========

/// ビットストリーム読み込み用構造体
struct BitStream<'a> {
    data: &'a [u8],
    bit_cursor: usize,
}

impl<'a> BitStream<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_cursor: 0 }
    }

    /// 1ビット読み込む。終端を超えたら 0 を返し、カーソルだけ進める
    fn read_one_bit(&mut self) -> u8 {
        let byte_idx = self.bit_cursor / 8;
        let bit_idx = self.bit_cursor & 7;
        self.bit_cursor += 1;
        match self.data.get(byte_idx) {
            Some(b) => (b >> bit_idx) & 1,
            None => 0,
        }
    }

    /// nビット読み込む (下位ビットから順に格納)
    fn read_n_bit(&mut self, n: usize) -> u32 {
        let mut result = 0u32;
        for i in 0..n {
            result |= (self.read_one_bit() as u32) << i;
        }
        result
    }

    fn overflowed(&self) -> bool {
        self.bit_cursor > self.data.len() * 8
    }
}

/// ビットストリーム書き込み用構造体
struct BitStreamWriter {
    data: [u8; 32],
    bit_cursor: usize,
}

impl BitStreamWriter {
    fn new() -> Self {
        Self { data: [0u8; 32], bit_cursor: 0 }
    }

    fn write_one_bit(&mut self, b: bool) {
        if self.bit_cursor < 256 {
            if b {
                self.data[self.bit_cursor / 8] |= 1 << (self.bit_cursor & 7);
            }
            self.bit_cursor += 1;
        }
    }

    /// nビット書き込む（下位ビットから順に）
    fn write_n_bit(&mut self, d: u32, n: usize) {
        for i in 0..n {
            self.write_one_bit((d >> i) & 1 != 0);
        }
    }

    fn finish(self) -> [u8; 32] {
        self.data
    }
}

// ========== ハフマン符号 ==========

/// ハフマン符号化テーブル（盤上の駒、色ビットは別）
///
/// | 駒種       | コード | ビット数 |
/// |------------|--------|----------|
/// | 空         | 0      | 1        |
/// | ポーン     | 0001   | 4        |
/// | ナイト     | 0011   | 4        |
/// | ビショップ | 0101   | 4        |
/// | ルーク     | 0111   | 4        |
/// | クイーン   | 1001   | 4        |
#[derive(Debug, Clone, Copy)]
struct HuffmanCode {
    code: u8,
    bits: u8,
}

const HUFFMAN_EMPTY: HuffmanCode = HuffmanCode { code: 0x00, bits: 1 };

/// [PieceType]（キングは使わない）
const HUFFMAN_TABLE: [HuffmanCode; 5] = [
    HuffmanCode { code: 0x01, bits: 4 }, // Pawn
    HuffmanCode { code: 0x03, bits: 4 }, // Knight
    HuffmanCode { code: 0x05, bits: 4 }, // Bishop
    HuffmanCode { code: 0x07, bits: 4 }, // Rook
    HuffmanCode { code: 0x09, bits: 4 }, // Queen
];

const MAX_HUFFMAN_BITS: u8 = 4;

/// ハフマン符号から駒種を復号する（空き升は `Ok(None)`）
fn decode_huffman_piece(stream: &mut BitStream, sq: usize) -> Result<Option<PieceType>, PackError> {
    let mut code = 0u8;
    let mut bits = 0u8;

    loop {
        code |= stream.read_one_bit() << bits;
        bits += 1;

        if code == HUFFMAN_EMPTY.code && bits == HUFFMAN_EMPTY.bits {
            return Ok(None);
        }
        if let Some(i) = HUFFMAN_TABLE.iter().position(|h| h.code == code && h.bits == bits) {
            return Ok(PieceType::from_index(i));
        }
        if bits >= MAX_HUFFMAN_BITS {
            return Err(PackError::InvalidCode(sq));
        }
    }
}

fn write_board_piece(stream: &mut BitStreamWriter, piece: Piece) {
    let Some(pt) = piece.piece_type() else {
        stream.write_n_bit(HUFFMAN_EMPTY.code as u32, HUFFMAN_EMPTY.bits as usize);
        return;
    };
    let huff = HUFFMAN_TABLE[pt.index()];
    stream.write_n_bit(huff.code as u32, huff.bits as usize);
    stream.write_one_bit(piece.color() == Color::Black);
}

// ========== pack / unpack ==========

const CASTLING_BITS: [(u8, char); 4] =
    [(WHITE_OO, 'K'), (WHITE_OOO, 'Q'), (BLACK_OO, 'k'), (BLACK_OOO, 'q')];

/// Position を 32バイトに圧縮する
///
/// Chess960 のキャスリング権は「最も外側のルーク」として復元される。
pub fn pack_position(pos: &Position) -> [u8; 32] {
    let mut stream = BitStreamWriter::new();

    stream.write_one_bit(pos.side_to_move() == Color::Black);
    stream.write_n_bit(pos.king_square(Color::White).raw() as u32, 6);
    stream.write_n_bit(pos.king_square(Color::Black).raw() as u32, 6);

    for sq in Square::all() {
        let piece = pos.piece_on(sq);
        if piece.piece_type() == Some(PieceType::King) {
            continue;
        }
        write_board_piece(&mut stream, piece);
    }

    let rights = pos.castling_rights();
    for (cr, _) in CASTLING_BITS {
        stream.write_one_bit(rights & cr != 0);
    }

    match pos.ep_square() {
        Some(ep) => {
            stream.write_one_bit(true);
            stream.write_n_bit(ep.raw() as u32, 6);
        }
        None => stream.write_one_bit(false),
    }

    let rule50 = pos.rule50_count().clamp(0, 127) as u32;
    let fullmove = (1 + (pos.game_ply() - i32::from(pos.side_to_move() == Color::Black)) / 2)
        .clamp(1, 0xFFFF) as u32;
    stream.write_n_bit(rule50, 6);
    stream.write_n_bit(fullmove, 8);
    stream.write_n_bit(fullmove >> 8, 8);
    stream.write_n_bit(rule50 >> 6, 1);

    stream.finish()
}

/// 圧縮局面を FEN に復号する
///
/// `mirror` が真なら左右反転（a↔h）した局面を返す。反転ではキャスリング権を落とす。
pub fn unpack_fen(packed: &[u8; 32], mirror: bool) -> Result<String, PackError> {
    let mut stream = BitStream::new(packed);
    let map = |sq: Square| if mirror { sq.mirror() } else { sq };

    let side_to_move = if stream.read_one_bit() == 0 { Color::White } else { Color::Black };

    let mut board = [Piece::NONE; Square::NUM];
    let white_king = Square::from_u8(stream.read_n_bit(6) as u8);
    let black_king = Square::from_u8(stream.read_n_bit(6) as u8);
    if white_king == black_king {
        return Err(PackError::KingCollision);
    }
    board[map(white_king).index()] = Piece::new(Color::White, PieceType::King);
    board[map(black_king).index()] = Piece::new(Color::Black, PieceType::King);

    for sq in Square::all() {
        if sq == white_king || sq == black_king {
            continue;
        }
        if let Some(pt) = decode_huffman_piece(&mut stream, sq.index())? {
            let color = if stream.read_one_bit() == 0 { Color::White } else { Color::Black };
            board[map(sq).index()] = Piece::new(color, pt);
        }
        if stream.overflowed() {
            return Err(PackError::Overflow);
        }
    }

    let mut castling = String::new();
    for (_, c) in CASTLING_BITS {
        if stream.read_one_bit() != 0 && !mirror {
            castling.push(c);
        }
    }
    if castling.is_empty() {
        castling.push('-');
    }

    let ep = if stream.read_one_bit() != 0 {
        let sq = map(Square::from_u8(stream.read_n_bit(6) as u8));
        sq.to_string()
    } else {
        "-".to_string()
    };

    let mut rule50 = stream.read_n_bit(6);
    let fullmove = stream.read_n_bit(8) | (stream.read_n_bit(8) << 8);
    rule50 |= stream.read_n_bit(1) << 6;

    if stream.overflowed() {
        return Err(PackError::Overflow);
    }

    Ok(format!(
        "{} {} {castling} {ep} {rule50} {}",
        board_to_fen(&board),
        if side_to_move == Color::White { 'w' } else { 'b' },
        fullmove.max(1)
    ))
}

/// 圧縮局面を `pos` に設定する
pub fn unpack_position(pos: &mut Position, packed: &[u8; 32], mirror: bool) -> Result<(), PackError> {
    let fen = unpack_fen(packed, mirror)?;
    pos.set_fen(&fen)?;
    Ok(())
}

fn board_to_fen(board: &[Piece; Square::NUM]) -> String {
    let mut s = String::new();
    for rank in (0..8).rev() {
        let mut empty = 0;
        for file in 0..8 {
            let pc = board[rank * 8 + file];
            if pc.is_none() {
                empty += 1;
                continue;
            }
            if empty > 0 {
                s.push_str(&empty.to_string());
                empty = 0;
            }
            s.push(pc.to_char());
        }
        if empty > 0 {
            s.push_str(&empty.to_string());
        }
        if rank > 0 {
            s.push('/');
        }
    }
    s
}

// ========== 指し手 ==========

/// Move を 16bit 形式に変換（内部表現そのまま）
#[inline]
pub fn move_to_move16(mv: Move) -> u16 {
    if mv == Move::NULL { 0 } else { mv.raw() }
}

#[inline]
pub fn move16_to_move(move16: u16) -> Move {
    Move::from_raw(move16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rchess_core::position::START_FEN;

    fn roundtrip(fen: &str) {
        let mut pos = Position::new();
        pos.set_fen(fen).unwrap();
        let packed = pack_position(&pos);
        let unpacked = unpack_fen(&packed, false).unwrap();
        assert_eq!(unpacked, pos.fen(), "fen = {fen}");
    }

    #[test]
    fn test_pack_unpack_roundtrip_startpos() {
        roundtrip(START_FEN);
    }

    #[test]
    fn test_pack_unpack_roundtrip_middlegame() {
        roundtrip("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        roundtrip("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b Kq - 3 3");
    }

    #[test]
    fn test_pack_unpack_roundtrip_en_passant_and_counters() {
        roundtrip("rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3");
        roundtrip("8/8/4k3/8/8/3K4/8/6Q1 b - - 99 300");
    }

    #[test]
    fn test_pack_unpack_roundtrip_promoted_material() {
        // クイーン4枚（成り駒も同じ符号で表せる）
        roundtrip("QQ6/8/8/8/8/4k3/8/QQ2K3 w - - 0 80");
    }

    #[test]
    fn test_unpack_mirror() {
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/8/8/P7/R3K3 w Q - 0 1").unwrap();
        let packed = pack_position(&pos);
        let fen = unpack_fen(&packed, true).unwrap();
        assert_eq!(fen, "3k4/8/8/8/8/8/7P/3K3R w - - 0 1");
        assert_eq!(fen, pos.mirrored_fen());
    }

    #[test]
    fn test_unpack_invalid_code() {
        // 白玉 a1, 黒玉 b1 の後に不正な符号 1111
        let mut stream = BitStreamWriter::new();
        stream.write_one_bit(false);
        stream.write_n_bit(0, 6);
        stream.write_n_bit(1, 6);
        stream.write_n_bit(0x0F, 4);
        let packed = stream.finish();
        assert!(matches!(unpack_fen(&packed, false), Err(PackError::InvalidCode(2))));
    }

    #[test]
    fn test_unpack_king_collision() {
        let packed = [0u8; 32];
        assert!(matches!(unpack_fen(&packed, false), Err(PackError::KingCollision)));
    }

    #[test]
    fn test_packed_sfen_value_bytes() {
        let pos = Position::startpos();
        let mut psv = PackedSfenValue::from_position(
            &pos,
            -123,
            Move::normal(Square::E2, Square::E4),
            17,
        );
        psv.game_result = -1;

        let bytes = psv.to_bytes();
        assert_eq!(bytes.len(), PackedSfenValue::SIZE);
        assert_eq!(&bytes[32..34], &(-123i16).to_le_bytes());
        assert_eq!(bytes[38], 0xFF);

        let restored = PackedSfenValue::from_bytes(&bytes).unwrap();
        assert_eq!(restored, psv);
        assert_eq!(restored.best_move(), Move::normal(Square::E2, Square::E4));
        assert!(PackedSfenValue::from_bytes(&bytes[..39]).is_none());
    }

    #[test]
    fn test_read_from_stops_at_eof() {
        let psv = PackedSfenValue { score: 5, game_ply: 3, ..Default::default() };
        let mut data = Vec::new();
        psv.write_to(&mut data).unwrap();
        psv.write_to(&mut data).unwrap();
        data.extend_from_slice(&[1, 2, 3]);

        let mut reader = &data[..];
        assert_eq!(PackedSfenValue::read_from(&mut reader).unwrap(), Some(psv));
        assert_eq!(PackedSfenValue::read_from(&mut reader).unwrap(), Some(psv));
        assert_eq!(PackedSfenValue::read_from(&mut reader).unwrap(), None);
    }
}

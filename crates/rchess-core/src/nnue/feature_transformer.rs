//! Feature Transformer
//!
//! 入力特徴量（HalfKP）を 256 次元 × 2 視点の中間表現に変換する。
//!
//! - 差分更新: 直近の計算済み祖先から DirtyPiece を辿って重み列を加減算
//! - 全計算: アクティブな特徴量をすべて足し直す
//!
//! 差分更新は玉移動・null move・探索打ち切り幅（MAX_ACCUMULATOR_LOOKBACK）を越えない。

use super::accumulator::IndexList;
use super::constants::{MAX_ACCUMULATOR_LOOKBACK, TRANSFORMED_FEATURE_DIMENSIONS};
use super::features::{Feature, HalfKP};
use crate::position::Position;
use crate::types::Color;
use std::io::{self, Read, Write};

/// 片側視点の累積値
pub type Accumulation = [i16; TRANSFORMED_FEATURE_DIMENSIONS];

/// Feature Transformer 出力次元（両視点）
pub const OUTPUT_DIMENSIONS: usize = TRANSFORMED_FEATURE_DIMENSIONS * 2;

/// Feature Transformer のパラメータ
#[derive(Clone)]
pub struct FeatureTransformer {
    /// バイアス
    pub biases: Box<[i16]>,
    /// 重み [feature][dimension]
    pub weights: Box<[i16]>,
}

impl FeatureTransformer {
    /// 構造ハッシュ
    pub const HASH: u32 = HalfKP::HASH ^ OUTPUT_DIMENSIONS as u32;

    /// ゼロ初期化
    pub fn new() -> Self {
        Self {
            biases: vec![0; TRANSFORMED_FEATURE_DIMENSIONS].into_boxed_slice(),
            weights: vec![0; HalfKP::DIMENSIONS * TRANSFORMED_FEATURE_DIMENSIONS]
                .into_boxed_slice(),
        }
    }

    /// アーキテクチャ文字列
    pub fn structure() -> String {
        format!(
            "{}[{}->{}x2]",
            HalfKP::NAME,
            HalfKP::DIMENSIONS,
            TRANSFORMED_FEATURE_DIMENSIONS
        )
    }

    /// 特徴量 `index` の重み列
    #[inline]
    pub fn weight_column(&self, index: usize) -> &[i16] {
        let offset = index * TRANSFORMED_FEATURE_DIMENSIONS;
        &self.weights[offset..offset + TRANSFORMED_FEATURE_DIMENSIONS]
    }

    #[inline]
    fn add_column(&self, acc: &mut Accumulation, index: usize) {
        for (a, &w) in acc.iter_mut().zip(self.weight_column(index)) {
            *a = a.wrapping_add(w);
        }
    }

    #[inline]
    fn sub_column(&self, acc: &mut Accumulation, index: usize) {
        for (a, &w) in acc.iter_mut().zip(self.weight_column(index)) {
            *a = a.wrapping_sub(w);
        }
    }

    // ========== 全計算 ==========

    /// 視点 `perspective` の累積値を局面から全計算
    pub fn refresh(&self, pos: &Position, perspective: Color) -> Accumulation {
        let mut acc = [0i16; TRANSFORMED_FEATURE_DIMENSIONS];
        acc.copy_from_slice(&self.biases);
        for &index in HalfKP::collect_active_indices(pos, perspective).iter() {
            self.add_column(&mut acc, index);
        }
        acc
    }

    // ========== 差分更新 ==========

    /// 差分更新の起点となる計算済み祖先を探す
    ///
    /// 戻り値は (祖先のインデックス, 祖先から現局面までに通る StateInfo のインデックス列)。
    /// 列は現局面側から並ぶ。
    fn find_usable_accumulator(
        pos: &Position,
        perspective: Color,
    ) -> Option<(usize, IndexList<MAX_ACCUMULATOR_LOOKBACK>)> {
        let mut path = IndexList::new();
        let mut idx = pos.state_index();
        for _ in 0..MAX_ACCUMULATOR_LOOKBACK {
            let st = pos.state_at(idx);
            // null move / ルートより前には遡らない
            if st.plies_from_null == 0 || HalfKP::needs_refresh(&st.dirty_piece, perspective) {
                return None;
            }
            if !path.push(idx) {
                return None;
            }
            let prev = st.previous?;
            if pos.state_at(prev).accumulator.computed_accumulation {
                return Some((prev, path));
            }
            idx = prev;
        }
        None
    }

    /// 差分更新を試みる（起点がなければ None）
    fn update_incremental(&self, pos: &Position, perspective: Color) -> Option<Accumulation> {
        let (source, mut path) = Self::find_usable_accumulator(pos, perspective)?;
        let king_sq = HalfKP::king_square(pos, perspective);

        let mut acc = *pos.state_at(source).accumulator.get(perspective);
        path.reverse();
        for &idx in path.iter() {
            let dp = &pos.state_at(idx).dirty_piece;
            let (removed, added) = HalfKP::collect_changed_indices(dp, perspective, king_sq);
            for &index in removed.iter() {
                self.sub_column(&mut acc, index);
            }
            for &index in added.iter() {
                self.add_column(&mut acc, index);
            }
        }
        Some(acc)
    }

    /// 現局面の Accumulator を計算済みにする
    pub fn update_accumulator(&self, pos: &mut Position) {
        if pos.state().accumulator.computed_accumulation {
            return;
        }
        let mut result = [[0i16; TRANSFORMED_FEATURE_DIMENSIONS]; Color::NUM];
        for perspective in Color::ALL {
            let acc = match self.update_incremental(pos, perspective) {
                Some(acc) => {
                    #[cfg(feature = "nnue-verify")]
                    if acc != self.refresh(pos, perspective) {
                        log::error!(
                            "accumulator mismatch: perspective={perspective:?} fen={}",
                            pos.fen()
                        );
                    }
                    acc
                }
                None => self.refresh(pos, perspective),
            };
            result[perspective.index()] = acc;
        }

        let accumulator = &mut pos.state_mut().accumulator;
        for perspective in Color::ALL {
            *accumulator.get_mut(perspective) = result[perspective.index()];
        }
        accumulator.computed_accumulation = true;
        accumulator.computed_score = false;
    }

    /// 現局面を全計算で計算済みにする（差分更新を使わない）
    pub fn refresh_accumulator(&self, pos: &mut Position) {
        let white = self.refresh(pos, Color::White);
        let black = self.refresh(pos, Color::Black);
        let accumulator = &mut pos.state_mut().accumulator;
        *accumulator.get_mut(Color::White) = white;
        *accumulator.get_mut(Color::Black) = black;
        accumulator.computed_accumulation = true;
        accumulator.computed_score = false;
    }

    /// 累積値を 0..=127 にクリップしてネットワーク入力にする（手番側が前半）
    pub fn transform(&self, pos: &mut Position, output: &mut [u8; OUTPUT_DIMENSIONS]) {
        self.update_accumulator(pos);
        let stm = pos.side_to_move();
        let accumulator = &pos.state().accumulator;
        for (half, perspective) in [stm, !stm].into_iter().enumerate() {
            let offset = half * TRANSFORMED_FEATURE_DIMENSIONS;
            for (out, &a) in output[offset..offset + TRANSFORMED_FEATURE_DIMENSIONS]
                .iter_mut()
                .zip(accumulator.get(perspective))
            {
                *out = a.clamp(0, 127) as u8;
            }
        }
    }

    // ========== 入出力 ==========

    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        read_i16_into(reader, &mut self.biases)?;
        read_i16_into(reader, &mut self.weights)
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_i16_from(writer, &self.biases)?;
        write_i16_from(writer, &self.weights)
    }
}

impl Default for FeatureTransformer {
    fn default() -> Self {
        Self::new()
    }
}

fn read_i16_into<R: Read>(reader: &mut R, dst: &mut [i16]) -> io::Result<()> {
    const CHUNK: usize = 1 << 16;
    let mut buf = vec![0u8; CHUNK * 2];
    for chunk in dst.chunks_mut(CHUNK) {
        let bytes = &mut buf[..chunk.len() * 2];
        reader.read_exact(bytes)?;
        for (v, b) in chunk.iter_mut().zip(bytes.chunks_exact(2)) {
            *v = i16::from_le_bytes([b[0], b[1]]);
        }
    }
    Ok(())
}

fn write_i16_from<W: Write>(writer: &mut W, src: &[i16]) -> io::Result<()> {
    const CHUNK: usize = 1 << 16;
    let mut buf = Vec::with_capacity(CHUNK * 2);
    for chunk in src.chunks(CHUNK) {
        buf.clear();
        for v in chunk {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        writer.write_all(&buf)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::generate_legal;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// 乱数で埋めた Feature Transformer
    fn random_transformer(seed: u64) -> FeatureTransformer {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut ft = FeatureTransformer::new();
        for b in ft.biases.iter_mut() {
            *b = rng.random_range(-64..64);
        }
        for w in ft.weights.iter_mut() {
            *w = rng.random_range(-32..32);
        }
        ft
    }

    #[test]
    fn test_structure_string() {
        assert_eq!(FeatureTransformer::structure(), "HalfKP(Friend)[41024->256x2]");
    }

    #[test]
    fn test_refresh_bare_kings_is_biases() {
        let ft = random_transformer(1);
        let mut pos = Position::new();
        pos.set_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let acc = ft.refresh(&pos, Color::White);
        assert_eq!(&acc[..], &ft.biases[..]);
    }

    #[test]
    fn test_read_write_roundtrip() {
        let ft = random_transformer(2);
        let mut buf = Vec::new();
        ft.write_parameters(&mut buf).unwrap();
        assert_eq!(buf.len(), (256 + 41024 * 256) * 2);

        let mut loaded = FeatureTransformer::new();
        loaded.read_parameters(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.biases, ft.biases);
        assert_eq!(loaded.weights, ft.weights);
    }

    #[test]
    fn test_null_move_keeps_accumulator() {
        let ft = random_transformer(3);
        let mut pos = Position::startpos();
        let m = pos.move_from_uci("e2e4").unwrap();
        pos.do_move(m);
        ft.update_accumulator(&mut pos);
        let before = pos.state().accumulator.clone();

        pos.do_null_move();
        assert!(pos.state().accumulator.computed_accumulation);
        for c in Color::ALL {
            assert_eq!(pos.state().accumulator.get(c), before.get(c));
        }
        assert!(!pos.state().accumulator.computed_score);

        let reply = pos.move_from_uci("d2d4").unwrap();
        pos.do_move(reply);
        ft.update_accumulator(&mut pos);
        for c in Color::ALL {
            assert_eq!(*pos.state().accumulator.get(c), ft.refresh(&pos, c));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// 差分更新と全計算は毎手一致する
        #[test]
        fn prop_incremental_matches_refresh(seed in any::<u64>(), eval_every in 1usize..4) {
            let ft = random_transformer(7);
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            let mut pos = Position::startpos();
            ft.update_accumulator(&mut pos);

            for ply in 0..60 {
                let moves = generate_legal(&pos);
                if moves.is_empty() {
                    break;
                }
                let m = moves[rng.random_range(0..moves.len())];
                pos.do_move(m);
                // 評価を間引いて、複数手を遡る差分更新も通す
                if ply % eval_every == 0 {
                    ft.update_accumulator(&mut pos);
                    for c in Color::ALL {
                        prop_assert_eq!(*pos.state().accumulator.get(c), ft.refresh(&pos, c));
                    }
                }
            }
        }
    }
}

//! ネットワーク層の実装
//!
//! - `InputSlice`: 入力ベクトルの切り出し（パラメータなし）
//! - `AffineTransform`: 全結合アフィン変換層（i8 重み、i32 バイアス・累積）
//! - `ClippedReLU`: 右シフト後に 0..=127 へクランプする活性化層
//!
//! 各層は構造ハッシュとアーキテクチャ文字列を持ち、前段の値から合成される。
//! 評価関数ファイルの読み込み時にこのハッシュでネットワーク形状を照合する。

use super::constants::WEIGHT_SCALE_BITS;
use std::io::{self, Read, Write};

/// パディング済み入力次元
pub const fn padded_input(input_dim: usize) -> usize {
    input_dim.div_ceil(32) * 32
}

/// 層の共通インターフェース
pub trait Layer {
    /// 入力次元
    const INPUT_DIMENSIONS: usize;
    /// 出力次元
    const OUTPUT_DIMENSIONS: usize;

    /// 前段の構造ハッシュから自身の構造ハッシュを求める
    fn hash_value(prev_hash: u32) -> u32;

    /// 前段の構造文字列を包んだ自身の構造文字列
    fn structure_string(prev: &str) -> String;

    /// パラメータを読み込む
    fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()>;

    /// パラメータを書き出す
    fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()>;
}

// =============================================================================
// InputSlice
// =============================================================================

/// 入力層（Feature Transformer の出力を切り出す）
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSlice<const OUTPUT_DIM: usize, const OFFSET: usize>;

impl<const OUTPUT_DIM: usize, const OFFSET: usize> InputSlice<OUTPUT_DIM, OFFSET> {
    /// 入力層の構造ハッシュ（前段を持たない）
    pub const HASH: u32 = 0xEC42_E90D ^ OUTPUT_DIM as u32 ^ ((OFFSET as u32) << 10);

    pub fn structure() -> String {
        format!("InputSlice[{}({}:{})]", OUTPUT_DIM, OFFSET, OFFSET + OUTPUT_DIM)
    }

    #[inline]
    pub fn propagate(input: &[u8]) -> &[u8] {
        &input[OFFSET..OFFSET + OUTPUT_DIM]
    }
}

// =============================================================================
// AffineTransform
// =============================================================================

/// アフィン変換層
#[derive(Clone)]
pub struct AffineTransform<const INPUT_DIM: usize, const OUTPUT_DIM: usize> {
    /// バイアス
    pub biases: Box<[i32]>,
    /// 重み [output][padded_input]
    pub weights: Box<[i8]>,
}

impl<const INPUT_DIM: usize, const OUTPUT_DIM: usize> AffineTransform<INPUT_DIM, OUTPUT_DIM> {
    pub const PADDED_INPUT: usize = padded_input(INPUT_DIM);

    /// ゼロ初期化
    pub fn new() -> Self {
        Self {
            biases: vec![0; OUTPUT_DIM].into_boxed_slice(),
            weights: vec![0; OUTPUT_DIM * Self::PADDED_INPUT].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn weight(&self, output: usize, input: usize) -> i8 {
        self.weights[output * Self::PADDED_INPUT + input]
    }

    #[inline]
    pub fn weight_mut(&mut self, output: usize, input: usize) -> &mut i8 {
        &mut self.weights[output * Self::PADDED_INPUT + input]
    }

    /// 順伝播
    pub fn propagate(&self, input: &[u8], output: &mut [i32; OUTPUT_DIM]) {
        debug_assert!(input.len() >= INPUT_DIM);
        for (i, out) in output.iter_mut().enumerate() {
            let row = &self.weights[i * Self::PADDED_INPUT..i * Self::PADDED_INPUT + INPUT_DIM];
            let mut sum = self.biases[i];
            for (&w, &x) in row.iter().zip(input) {
                sum += i32::from(w) * i32::from(x);
            }
            *out = sum;
        }
    }
}

impl<const INPUT_DIM: usize, const OUTPUT_DIM: usize> Default
    for AffineTransform<INPUT_DIM, OUTPUT_DIM>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const INPUT_DIM: usize, const OUTPUT_DIM: usize> Layer for AffineTransform<INPUT_DIM, OUTPUT_DIM> {
    const INPUT_DIMENSIONS: usize = INPUT_DIM;
    const OUTPUT_DIMENSIONS: usize = OUTPUT_DIM;

    fn hash_value(prev_hash: u32) -> u32 {
        let mut hash = 0xCC03_DAE4u32;
        hash = hash.wrapping_add(OUTPUT_DIM as u32);
        hash ^= prev_hash >> 1;
        hash ^= prev_hash << 31;
        hash
    }

    fn structure_string(prev: &str) -> String {
        format!("AffineTransform[{OUTPUT_DIM}<-{INPUT_DIM}]({prev})")
    }

    fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        let mut buf4 = [0u8; 4];
        for bias in self.biases.iter_mut() {
            reader.read_exact(&mut buf4)?;
            *bias = i32::from_le_bytes(buf4);
        }
        let mut buf = vec![0u8; self.weights.len()];
        reader.read_exact(&mut buf)?;
        for (w, b) in self.weights.iter_mut().zip(buf) {
            *w = b as i8;
        }
        Ok(())
    }

    fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for bias in self.biases.iter() {
            writer.write_all(&bias.to_le_bytes())?;
        }
        let buf: Vec<u8> = self.weights.iter().map(|&w| w as u8).collect();
        writer.write_all(&buf)
    }
}

// =============================================================================
// ClippedReLU
// =============================================================================

/// クリップ付き ReLU 層
///
/// i32 入力を WEIGHT_SCALE_BITS だけ右シフトし、0..=127 にクランプして u8 にする。
#[derive(Debug, Clone, Copy, Default)]
pub struct ClippedReLU<const DIM: usize>;

impl<const DIM: usize> ClippedReLU<DIM> {
    #[inline]
    pub fn propagate(input: &[i32; DIM], output: &mut [u8; DIM]) {
        for (out, &x) in output.iter_mut().zip(input) {
            *out = (x >> WEIGHT_SCALE_BITS).clamp(0, 127) as u8;
        }
    }
}

impl<const DIM: usize> Layer for ClippedReLU<DIM> {
    const INPUT_DIMENSIONS: usize = DIM;
    const OUTPUT_DIMENSIONS: usize = DIM;

    fn hash_value(prev_hash: u32) -> u32 {
        0x538D_24C7u32.wrapping_add(prev_hash)
    }

    fn structure_string(prev: &str) -> String {
        format!("ClippedReLU[{DIM}]({prev})")
    }

    fn read_parameters<R: Read>(&mut self, _reader: &mut R) -> io::Result<()> {
        Ok(())
    }

    fn write_parameters<W: Write>(&self, _writer: &mut W) -> io::Result<()> {
        Ok(())
    }
}

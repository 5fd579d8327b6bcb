//! 学習用ネットワーク
//!
//! HalfKP(Friend)[41024->256x2]-32-32-1 を f32 で持ち、順伝播・逆伝播・量子化を行う。
//!
//! - 出力 1.0 が評価値 600 に相当する
//! - 量子化すると `rchess_core::nnue::Network` と（丸め誤差を除いて）同じ値を返す
//! - 更新はモーメンタム付き SGD。FT の重みだけはスパースに直接更新する

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use rchess_core::nnue::constants::{
    FV_SCALE, HIDDEN1_DIMENSIONS, HIDDEN2_DIMENSIONS, MAX_ACTIVE_FEATURES, OUTPUT_DIMENSIONS,
    TRANSFORMED_FEATURE_DIMENSIONS, WEIGHT_SCALE_BITS,
};
use rchess_core::nnue::features::{Feature, HalfKP};
use rchess_core::nnue::layers::AffineTransform;
use rchess_core::nnue::{FeatureTransformer, Network};
use rchess_core::position::Position;
use rchess_core::types::Color;
use serde::{Deserialize, Serialize};

use super::loss::PONANZA_CONSTANT;
use crate::packed_sfen::PackedSfenValue;

/// FT 出力（両視点）
const FT_OUTPUT: usize = TRANSFORMED_FEATURE_DIMENSIONS * 2;

/// 活性化 1.0 ↔ 127
const ACTIVATION_SCALE: f32 = 127.0;

/// 量子化の倍率
#[derive(Debug, Clone, Copy)]
struct QuantScale {
    weight: f32,
    bias: f32,
}

impl QuantScale {
    /// i8 に収まる重みの絶対値の上限（float 側）
    fn max_weight(self) -> f32 {
        f32::from(i8::MAX) / self.weight
    }
}

/// 隠れ層: 重みは 2^WEIGHT_SCALE_BITS 倍、和を右シフトして活性化スケールに戻す
const HIDDEN_SCALE: QuantScale = QuantScale {
    weight: (1i32 << WEIGHT_SCALE_BITS) as f32,
    bias: (1i32 << WEIGHT_SCALE_BITS) as f32 * ACTIVATION_SCALE,
};

/// 出力層: 出力 1.0 ↔ 評価値 600 ↔ 整数値 600 * FV_SCALE
const OUTPUT_SCALE: QuantScale = QuantScale {
    weight: PONANZA_CONSTANT as f32 * FV_SCALE as f32 / ACTIVATION_SCALE,
    bias: PONANZA_CONSTANT as f32 * FV_SCALE as f32,
};

/// 0..1 にクリップ
#[inline]
pub fn clipped_relu(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

/// クリップされていない範囲だけ勾配を通す
#[inline]
pub fn clipped_relu_grad(y: f32) -> f32 {
    if y > 0.0 && y < 1.0 { 1.0 } else { 0.0 }
}

#[inline]
fn gaussian<R: Rng>(rng: &mut R, sigma: f32) -> f32 {
    let z: f32 = rng.sample(StandardNormal);
    z * sigma
}

// =============================================================================
// 学習例
// =============================================================================

/// 1局面ぶんの学習例
#[derive(Debug, Clone)]
pub struct Example {
    /// アクティブ特徴量 [手番側, 相手側]
    pub features: [Vec<u32>; 2],
    /// この局面の手番が元の教師局面の手番と同じなら +1、違えば -1
    pub sign: f32,
    /// 勾配に掛ける重み
    pub weight: f32,
    /// 作成時点の量子化ネットワークでの評価値（手番側視点）
    pub discrete_eval: i32,
    pub psv: PackedSfenValue,
}

impl Example {
    pub fn new(
        pos: &Position,
        root_color: Color,
        weight: f32,
        discrete_eval: i32,
        psv: PackedSfenValue,
    ) -> Self {
        let stm = pos.side_to_move();
        let collect = |perspective: Color| -> Vec<u32> {
            HalfKP::collect_active_indices(pos, perspective).iter().map(|&i| i as u32).collect()
        };
        Self {
            features: [collect(stm), collect(!stm)],
            sign: if stm == root_color { 1.0 } else { -1.0 },
            weight,
            discrete_eval,
            psv,
        }
    }
}

/// 学習を止める層
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freeze {
    pub transformer: bool,
    pub hidden1: bool,
    pub hidden2: bool,
    pub output: bool,
}

// =============================================================================
// TrainableAffine
// =============================================================================

/// 学習可能なアフィン変換層
#[derive(Clone)]
pub struct TrainableAffine<const INPUT: usize, const OUTPUT: usize> {
    /// 重み [OUTPUT][INPUT]
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
    /// モーメンタム項
    weight_diffs: Vec<f32>,
    bias_diffs: Vec<f32>,
}

impl<const INPUT: usize, const OUTPUT: usize> TrainableAffine<INPUT, OUTPUT> {
    pub fn new() -> Self {
        Self {
            weights: vec![0.0; OUTPUT * INPUT],
            biases: vec![0.0; OUTPUT],
            weight_diffs: vec![0.0; OUTPUT * INPUT],
            bias_diffs: vec![0.0; OUTPUT],
        }
    }

    /// 重みを N(0, 1/√INPUT) で初期化し、入力が全て 0.5 のとき出力が 0.5 になるようにバイアスを置く
    pub fn init_gaussian<R: Rng>(&mut self, rng: &mut R) {
        let sigma = 1.0 / (INPUT as f32).sqrt();
        for (row, bias) in self.weights.chunks_mut(INPUT).zip(self.biases.iter_mut()) {
            let mut sum = 0.0;
            for w in row.iter_mut() {
                *w = gaussian(rng, sigma);
                sum += *w;
            }
            *bias = 0.5 - 0.5 * sum;
        }
        self.reset_momentum();
    }

    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), INPUT);
        debug_assert_eq!(output.len(), OUTPUT);
        for ((out, row), &bias) in output.iter_mut().zip(self.weights.chunks(INPUT)).zip(&self.biases) {
            *out = bias + row.iter().zip(input).map(|(&w, &x)| w * x).sum::<f32>();
        }
    }

    /// 出力の勾配から入力の勾配を求める
    pub fn backward(&self, output_grad: &[f32], input_grad: &mut [f32]) {
        debug_assert_eq!(output_grad.len(), OUTPUT);
        debug_assert_eq!(input_grad.len(), INPUT);
        input_grad.fill(0.0);
        for (row, &g) in self.weights.chunks(INPUT).zip(output_grad) {
            if g == 0.0 {
                continue;
            }
            for (ig, &w) in input_grad.iter_mut().zip(row) {
                *ig += g * w;
            }
        }
    }

    /// バッチ（入力, 出力勾配）の勾配和でパラメータを更新する
    pub fn update(&mut self, batch: &[(&[f32], &[f32])], learning_rate: f32, momentum: f32) {
        self.weights
            .par_chunks_mut(INPUT)
            .zip(self.weight_diffs.par_chunks_mut(INPUT))
            .enumerate()
            .for_each(|(o, (row, diffs))| {
                for d in diffs.iter_mut() {
                    *d *= momentum;
                }
                for (input, grad) in batch {
                    let g = grad[o];
                    if g == 0.0 {
                        continue;
                    }
                    for (d, &x) in diffs.iter_mut().zip(input.iter()) {
                        *d += g * x;
                    }
                }
                for (w, &d) in row.iter_mut().zip(diffs.iter()) {
                    *w -= learning_rate * d;
                }
            });

        for (o, (b, d)) in self.biases.iter_mut().zip(self.bias_diffs.iter_mut()).enumerate() {
            *d = momentum * *d + batch.iter().map(|(_, grad)| grad[o]).sum::<f32>();
            *b -= learning_rate * *d;
        }
    }

    fn reset_momentum(&mut self) {
        self.weight_diffs.fill(0.0);
        self.bias_diffs.fill(0.0);
    }

    /// 量子化して `target` に書き込む。範囲外の重みは float 側もクリップする
    fn quantize_into(&mut self, target: &mut AffineTransform<INPUT, OUTPUT>, scale: QuantScale) {
        let max_weight = scale.max_weight();
        for o in 0..OUTPUT {
            target.biases[o] = (self.biases[o] * scale.bias).round() as i32;
            for i in 0..INPUT {
                let w = &mut self.weights[o * INPUT + i];
                *w = w.clamp(-max_weight, max_weight);
                *target.weight_mut(o, i) = (*w * scale.weight).round() as i8;
            }
        }
    }

    fn dequantize_from(&mut self, source: &AffineTransform<INPUT, OUTPUT>, scale: QuantScale) {
        for o in 0..OUTPUT {
            self.biases[o] = source.biases[o] as f32 / scale.bias;
            for i in 0..INPUT {
                self.weights[o * INPUT + i] = f32::from(source.weight(o, i)) / scale.weight;
            }
        }
        self.reset_momentum();
    }
}

impl<const INPUT: usize, const OUTPUT: usize> Default for TrainableAffine<INPUT, OUTPUT> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TrainableFeatureTransformer
// =============================================================================

/// 学習可能な Feature Transformer（両視点で重みを共有）
#[derive(Clone)]
pub struct TrainableFeatureTransformer {
    /// 重み [feature][dimension]
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
    bias_diffs: Vec<f32>,
}

impl TrainableFeatureTransformer {
    pub fn new() -> Self {
        Self {
            weights: vec![0.0; HalfKP::DIMENSIONS * TRANSFORMED_FEATURE_DIMENSIONS],
            biases: vec![0.0; TRANSFORMED_FEATURE_DIMENSIONS],
            bias_diffs: vec![0.0; TRANSFORMED_FEATURE_DIMENSIONS],
        }
    }

    /// バイアス 0.5、重み N(0, 0.1/√30)
    pub fn init_gaussian<R: Rng>(&mut self, rng: &mut R) {
        let sigma = 0.1 / (MAX_ACTIVE_FEATURES as f32).sqrt();
        for w in &mut self.weights {
            *w = gaussian(rng, sigma);
        }
        self.biases.fill(0.5);
        self.bias_diffs.fill(0.0);
    }

    /// 順伝播（スパース入力）
    pub fn forward(&self, active: &[u32], output: &mut [f32]) {
        debug_assert_eq!(output.len(), TRANSFORMED_FEATURE_DIMENSIONS);
        output.copy_from_slice(&self.biases);
        for &index in active {
            let offset = index as usize * TRANSFORMED_FEATURE_DIMENSIONS;
            for (out, &w) in output.iter_mut().zip(&self.weights[offset..offset + TRANSFORMED_FEATURE_DIMENSIONS]) {
                *out += w;
            }
        }
    }

    /// バッチ（特徴量, 出力勾配）で更新する
    ///
    /// 重みはモーメンタムを持たず、等価な学習率 `lr / (1 - momentum)` で直接更新する。
    pub fn update(&mut self, batch: &[(&[u32], &[f32])], learning_rate: f32, momentum: f32) {
        for (i, (b, d)) in self.biases.iter_mut().zip(self.bias_diffs.iter_mut()).enumerate() {
            *d = momentum * *d + batch.iter().map(|(_, grad)| grad[i]).sum::<f32>();
            *b -= learning_rate * *d;
        }

        let effective_lr = learning_rate / (1.0 - momentum);
        for (active, grad) in batch {
            for &index in active.iter() {
                let offset = index as usize * TRANSFORMED_FEATURE_DIMENSIONS;
                let column = &mut self.weights[offset..offset + TRANSFORMED_FEATURE_DIMENSIONS];
                for (w, &g) in column.iter_mut().zip(grad.iter()) {
                    *w -= effective_lr * g;
                }
            }
        }
    }

    fn quantize_into(&self, target: &mut FeatureTransformer) {
        let to_i16 = |x: f32| (x * ACTIVATION_SCALE).round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        for (q, &b) in target.biases.iter_mut().zip(&self.biases) {
            *q = to_i16(b);
        }
        for (q, &w) in target.weights.iter_mut().zip(&self.weights) {
            *q = to_i16(w);
        }
    }

    fn dequantize_from(&mut self, source: &FeatureTransformer) {
        for (b, &q) in self.biases.iter_mut().zip(source.biases.iter()) {
            *b = f32::from(q) / ACTIVATION_SCALE;
        }
        for (w, &q) in self.weights.iter_mut().zip(source.weights.iter()) {
            *w = f32::from(q) / ACTIVATION_SCALE;
        }
        self.bias_diffs.fill(0.0);
    }
}

impl Default for TrainableFeatureTransformer {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TrainableNetwork
// =============================================================================

/// 学習可能な NNUE ネットワーク
#[derive(Clone, Default)]
pub struct TrainableNetwork {
    pub feature_transformer: TrainableFeatureTransformer,
    /// 隠れ層1: 512 -> 32
    pub hidden1: TrainableAffine<FT_OUTPUT, HIDDEN1_DIMENSIONS>,
    /// 隠れ層2: 32 -> 32
    pub hidden2: TrainableAffine<HIDDEN1_DIMENSIONS, HIDDEN2_DIMENSIONS>,
    /// 出力層: 32 -> 1（初期値 0）
    pub output: TrainableAffine<HIDDEN2_DIMENSIONS, OUTPUT_DIMENSIONS>,
}

/// 順伝播の中間値
#[derive(Clone)]
pub struct ForwardCache {
    pub ft_relu: [f32; FT_OUTPUT],
    pub h1_relu: [f32; HIDDEN1_DIMENSIONS],
    pub h2_relu: [f32; HIDDEN2_DIMENSIONS],
    pub output: f32,
}

/// 各層の（活性化前の）出力に対する勾配
struct LayerGrads {
    ft: [f32; FT_OUTPUT],
    hidden1: [f32; HIDDEN1_DIMENSIONS],
    hidden2: [f32; HIDDEN2_DIMENSIONS],
    output: f32,
}

/// 1回の更新の統計
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    pub examples: usize,
    /// 量子化評価値と float 評価値の差の絶対値の合計
    pub abs_eval_diff_sum: f64,
}

impl TrainableNetwork {
    /// 乱数で初期化したネットワーク
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut network = Self::default();
        network.feature_transformer.init_gaussian(rng);
        network.hidden1.init_gaussian(rng);
        network.hidden2.init_gaussian(rng);
        network
    }

    /// 量子化済みネットワークから復元する（モーメンタムは 0）
    pub fn from_network(source: &Network) -> Self {
        let mut network = Self::default();
        network.dequantize_from(source);
        network
    }

    pub fn dequantize_from(&mut self, source: &Network) {
        self.feature_transformer.dequantize_from(&source.feature_transformer);
        self.hidden1.dequantize_from(&source.hidden1, HIDDEN_SCALE);
        self.hidden2.dequantize_from(&source.hidden2, HIDDEN_SCALE);
        self.output.dequantize_from(&source.output, OUTPUT_SCALE);
    }

    /// 量子化して `target` を上書きする
    pub fn quantize_into(&mut self, target: &mut Network) {
        self.feature_transformer.quantize_into(&mut target.feature_transformer);
        self.hidden1.quantize_into(&mut target.hidden1, HIDDEN_SCALE);
        self.hidden2.quantize_into(&mut target.hidden2, HIDDEN_SCALE);
        self.output.quantize_into(&mut target.output, OUTPUT_SCALE);
    }

    pub fn quantize(&mut self) -> Network {
        let mut network = Network::new();
        self.quantize_into(&mut network);
        network
    }

    /// 順伝播
    pub fn forward(&self, features: &[Vec<u32>; 2]) -> ForwardCache {
        let mut cache = ForwardCache {
            ft_relu: [0.0; FT_OUTPUT],
            h1_relu: [0.0; HIDDEN1_DIMENSIONS],
            h2_relu: [0.0; HIDDEN2_DIMENSIONS],
            output: 0.0,
        };

        // 手番側が前半
        let (stm_half, other_half) = cache.ft_relu.split_at_mut(TRANSFORMED_FEATURE_DIMENSIONS);
        self.feature_transformer.forward(&features[0], stm_half);
        self.feature_transformer.forward(&features[1], other_half);
        cache.ft_relu.iter_mut().for_each(|v| *v = clipped_relu(*v));

        self.hidden1.forward(&cache.ft_relu, &mut cache.h1_relu);
        cache.h1_relu.iter_mut().for_each(|v| *v = clipped_relu(*v));

        self.hidden2.forward(&cache.h1_relu, &mut cache.h2_relu);
        cache.h2_relu.iter_mut().for_each(|v| *v = clipped_relu(*v));

        let mut out = [0.0f32; OUTPUT_DIMENSIONS];
        self.output.forward(&cache.h2_relu, &mut out);
        cache.output = out[0];
        cache
    }

    /// 評価値（手番側視点、センチポーン相当）
    pub fn evaluate(&self, features: &[Vec<u32>; 2]) -> f32 {
        self.forward(features).output * PONANZA_CONSTANT as f32
    }

    fn backward(&self, cache: &ForwardCache, output_grad: f32) -> LayerGrads {
        let mut grads = LayerGrads {
            ft: [0.0; FT_OUTPUT],
            hidden1: [0.0; HIDDEN1_DIMENSIONS],
            hidden2: [0.0; HIDDEN2_DIMENSIONS],
            output: output_grad,
        };

        self.output.backward(std::slice::from_ref(&grads.output), &mut grads.hidden2);
        for (g, &y) in grads.hidden2.iter_mut().zip(&cache.h2_relu) {
            *g *= clipped_relu_grad(y);
        }

        self.hidden2.backward(&grads.hidden2, &mut grads.hidden1);
        for (g, &y) in grads.hidden1.iter_mut().zip(&cache.h1_relu) {
            *g *= clipped_relu_grad(y);
        }

        self.hidden1.backward(&grads.hidden1, &mut grads.ft);
        for (g, &y) in grads.ft.iter_mut().zip(&cache.ft_relu) {
            *g *= clipped_relu_grad(y);
        }
        grads
    }

    /// ミニバッチ1つぶんの順伝播・逆伝播・更新
    ///
    /// `output_grad(example, output)` は出力（1.0 = 評価値 600）に対する損失の勾配を返す。
    pub fn train_batch<F>(
        &mut self,
        examples: &[Example],
        output_grad: F,
        learning_rate: f32,
        momentum: f32,
        freeze: Freeze,
    ) -> BatchStats
    where
        F: Fn(&Example, f32) -> f32 + Sync,
    {
        let network = &*self;
        let records: Vec<(ForwardCache, LayerGrads)> = examples
            .par_iter()
            .map(|example| {
                let cache = network.forward(&example.features);
                let grad = output_grad(example, cache.output);
                let grads = network.backward(&cache, grad);
                (cache, grads)
            })
            .collect();

        let abs_eval_diff_sum = examples
            .iter()
            .zip(&records)
            .map(|(e, (cache, _))| {
                let shallow = f64::from(cache.output) * PONANZA_CONSTANT;
                (f64::from(e.discrete_eval) - shallow).abs()
            })
            .sum();

        if !freeze.output {
            let batch: Vec<(&[f32], &[f32])> = records
                .iter()
                .map(|(c, g)| (&c.h2_relu[..], std::slice::from_ref(&g.output)))
                .collect();
            self.output.update(&batch, learning_rate, momentum);
        }
        if !freeze.hidden2 {
            let batch: Vec<(&[f32], &[f32])> =
                records.iter().map(|(c, g)| (&c.h1_relu[..], &g.hidden2[..])).collect();
            self.hidden2.update(&batch, learning_rate, momentum);
        }
        if !freeze.hidden1 {
            let batch: Vec<(&[f32], &[f32])> =
                records.iter().map(|(c, g)| (&c.ft_relu[..], &g.hidden1[..])).collect();
            self.hidden1.update(&batch, learning_rate, momentum);
        }
        if !freeze.transformer {
            let batch: Vec<(&[u32], &[f32])> = examples
                .iter()
                .zip(&records)
                .flat_map(|(e, (_, g))| {
                    let (stm, other) = g.ft.split_at(TRANSFORMED_FEATURE_DIMENSIONS);
                    [(&e.features[0][..], stm), (&e.features[1][..], other)]
                })
                .collect();
            self.feature_transformer.update(&batch, learning_rate, momentum);
        }

        BatchStats { examples: examples.len(), abs_eval_diff_sum }
    }
}

//! 損失関数
//!
//! 評価値は `sigmoid(v / 600)` で勝率に変換してから比較する。
//!
//! - `shallow`: 学習中のネットワークの評価値（PV 末端、手番側視点）
//! - `deep`: 教師局面に記録された探索評価値
//! - `result`: 対局結果（+1/0/-1、記録局面の手番側視点）

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::packed_sfen::PackedSfenValue;

/// 評価値と勝率の換算係数
pub const PONANZA_CONSTANT: f64 = 600.0;

/// 交差エントロピーの log(0) 回避用
const EPSILON: f64 = 1e-6;

/// 損失関数の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    /// 探索評価値の勝率と対局結果の混合（λ で重み付け）
    #[default]
    Elmo,
    /// 勝率の二乗誤差
    WinningPercentage,
    /// 勝率の交差エントロピー
    CrossEntropy,
    /// 評価値そのものの差
    CrossEntropyForValue,
}

impl std::str::FromStr for LossFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elmo" => Ok(Self::Elmo),
            "winning_percentage" => Ok(Self::WinningPercentage),
            "cross_entropy" => Ok(Self::CrossEntropy),
            "cross_entropy_for_value" => Ok(Self::CrossEntropyForValue),
            _ => Err(format!("unknown loss function: {s}")),
        }
    }
}

/// 評価値 → 勝率
#[inline]
pub fn winning_percentage(value: f64) -> f64 {
    sigmoid(value / PONANZA_CONSTANT)
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
fn dsigmoid(x: f64) -> f64 {
    let s = sigmoid(x);
    s * (1.0 - s)
}

/// 2値分布 (p, 1-p) に対する (q, 1-q) の交差エントロピー
#[inline]
fn binary_cross_entropy(p: f64, q: f64) -> f64 {
    -p * (q + EPSILON).ln() - (1.0 - p) * (1.0 - q + EPSILON).ln()
}

/// 損失関数とその係数
#[derive(Debug, Clone, Copy)]
pub struct Loss {
    pub function: LossFunction,
    /// 探索評価値側の重み（1 なら結果を使わない）
    pub lambda: f64,
    /// `|deep| >= lambda_limit` のときに使う λ
    pub lambda2: f64,
    pub lambda_limit: i32,
}

impl Default for Loss {
    fn default() -> Self {
        Self { function: LossFunction::Elmo, lambda: 0.33, lambda2: 0.33, lambda_limit: 32000 }
    }
}

impl Loss {
    fn lambda_for(&self, deep: i32) -> f64 {
        if deep.abs() >= self.lambda_limit { self.lambda2 } else { self.lambda }
    }

    /// 勝率のロジット（`shallow / 600`）に対する損失の勾配
    ///
    /// `CrossEntropyForValue` だけは評価値の差をそのまま返す。
    pub fn calc_grad(&self, shallow: f64, psv: &PackedSfenValue) -> f64 {
        let deep = i32::from(psv.score);
        match self.function {
            LossFunction::Elmo => {
                let q = winning_percentage(shallow);
                let p = winning_percentage(f64::from(deep));
                let t = f64::from(psv.game_result + 1) * 0.5;
                let lambda = self.lambda_for(deep);
                lambda * (q - p) + (1.0 - lambda) * (q - t)
            }
            LossFunction::WinningPercentage => {
                let q = winning_percentage(shallow);
                let p = winning_percentage(f64::from(deep));
                (q - p) * dsigmoid(shallow / PONANZA_CONSTANT)
            }
            LossFunction::CrossEntropy => {
                winning_percentage(shallow) - winning_percentage(f64::from(deep))
            }
            LossFunction::CrossEntropyForValue => shallow - f64::from(deep),
        }
    }

    /// 検証・進捗表示用の交差エントロピー
    pub fn cross_entropy(&self, shallow: i32, psv: &PackedSfenValue) -> CrossEntropy {
        let deep = i32::from(psv.score);
        let p = winning_percentage(f64::from(deep));
        let q = winning_percentage(f64::from(shallow));
        let t = f64::from(psv.game_result + 1) * 0.5;
        let lambda = self.lambda_for(deep);
        let m = (1.0 - lambda) * t + lambda * p;

        CrossEntropy {
            cross_entropy_eval: binary_cross_entropy(p, q),
            cross_entropy_win: binary_cross_entropy(t, q),
            cross_entropy: binary_cross_entropy(m, q),
            entropy_eval: binary_cross_entropy(p, p),
            entropy_win: binary_cross_entropy(t, t),
            entropy: binary_cross_entropy(m, m),
            norm: f64::from(shallow.abs()),
            count: 1,
        }
    }
}

/// 交差エントロピーの集計
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrossEntropy {
    pub cross_entropy_eval: f64,
    pub cross_entropy_win: f64,
    pub cross_entropy: f64,
    pub entropy_eval: f64,
    pub entropy_win: f64,
    pub entropy: f64,
    /// `|shallow|` の合計
    pub norm: f64,
    pub count: u64,
}

impl CrossEntropy {
    /// 1局面あたりの平均
    pub fn mean(&self) -> Self {
        if self.count == 0 {
            return *self;
        }
        let n = self.count as f64;
        Self {
            cross_entropy_eval: self.cross_entropy_eval / n,
            cross_entropy_win: self.cross_entropy_win / n,
            cross_entropy: self.cross_entropy / n,
            entropy_eval: self.entropy_eval / n,
            entropy_win: self.entropy_win / n,
            entropy: self.entropy / n,
            norm: self.norm / n,
            count: self.count,
        }
    }

    /// newbob の判定に使う損失（`cross_entropy - entropy` の平均）
    pub fn loss(&self) -> f64 {
        let mean = self.mean();
        mean.cross_entropy - mean.entropy
    }
}

impl AddAssign for CrossEntropy {
    fn add_assign(&mut self, rhs: Self) {
        self.cross_entropy_eval += rhs.cross_entropy_eval;
        self.cross_entropy_win += rhs.cross_entropy_win;
        self.cross_entropy += rhs.cross_entropy;
        self.entropy_eval += rhs.entropy_eval;
        self.entropy_win += rhs.entropy_win;
        self.entropy += rhs.entropy;
        self.norm += rhs.norm;
        self.count += rhs.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psv(score: i16, result: i8) -> PackedSfenValue {
        PackedSfenValue { score, game_result: result, ..Default::default() }
    }

    #[test]
    fn test_winning_percentage() {
        assert!((winning_percentage(0.0) - 0.5).abs() < 1e-12);
        assert!(winning_percentage(600.0) > 0.73 && winning_percentage(600.0) < 0.74);
        let sum = winning_percentage(250.0) + winning_percentage(-250.0);
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_elmo_grad_lambda_one_ignores_result() {
        let loss = Loss { lambda: 1.0, lambda2: 1.0, ..Default::default() };
        let g_win = loss.calc_grad(100.0, &psv(100, 1));
        let g_loss = loss.calc_grad(100.0, &psv(100, -1));
        assert!(g_win.abs() < 1e-12);
        assert!(g_loss.abs() < 1e-12);
    }

    #[test]
    fn test_elmo_grad_lambda_zero_uses_result() {
        let loss = Loss { lambda: 0.0, lambda2: 0.0, ..Default::default() };
        // 勝った局面で評価値 0 → 勝率を上げる向き（勾配は負）
        let g = loss.calc_grad(0.0, &psv(0, 1));
        assert!((g - (0.5 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_lambda2_above_limit() {
        let loss = Loss { lambda: 1.0, lambda2: 0.0, lambda_limit: 1000, ..Default::default() };
        // |deep| < limit: λ=1 → q-p
        let g = loss.calc_grad(0.0, &psv(999, -1));
        assert!((g - (0.5 - winning_percentage(999.0))).abs() < 1e-12);
        // |deep| >= limit: λ=0 → q-t
        let g = loss.calc_grad(0.0, &psv(-1000, -1));
        assert!((g - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_other_grads() {
        let p = psv(300, 0);
        let ce = Loss { function: LossFunction::CrossEntropy, ..Default::default() };
        assert!(ce.calc_grad(300.0, &p).abs() < 1e-12);
        assert!(ce.calc_grad(0.0, &p) < 0.0);

        let wp = Loss { function: LossFunction::WinningPercentage, ..Default::default() };
        assert!(wp.calc_grad(600.0, &p) > 0.0);

        let cv = Loss { function: LossFunction::CrossEntropyForValue, ..Default::default() };
        assert!((cv.calc_grad(250.0, &p) - (-50.0)).abs() < 1e-12);
    }

    #[test]
    fn test_cross_entropy_is_minimal_at_target() {
        let loss = Loss { lambda: 1.0, lambda2: 1.0, ..Default::default() };
        let target = psv(200, 0);
        let at = loss.cross_entropy(200, &target);
        let off = loss.cross_entropy(-200, &target);
        assert!(at.cross_entropy_eval < off.cross_entropy_eval);
        // 一致していれば交差エントロピー = エントロピー（ε の分だけずれる）
        assert!((at.cross_entropy - at.entropy).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_accumulate_and_mean() {
        let loss = Loss::default();
        let mut sum = CrossEntropy::default();
        sum += loss.cross_entropy(100, &psv(50, 1));
        sum += loss.cross_entropy(-100, &psv(-50, -1));
        assert_eq!(sum.count, 2);
        let mean = sum.mean();
        assert!((mean.norm - 100.0).abs() < 1e-12);
        assert!(sum.loss().is_finite());
    }

    #[test]
    fn test_loss_function_names() {
        assert_eq!("elmo".parse::<LossFunction>().unwrap(), LossFunction::Elmo);
        assert_eq!(
            "cross_entropy_for_value".parse::<LossFunction>().unwrap(),
            LossFunction::CrossEntropyForValue
        );
        assert!("mse".parse::<LossFunction>().is_err());
        let toml_value: LossFunction =
            serde_json::from_str("\"winning_percentage\"").unwrap();
        assert_eq!(toml_value, LossFunction::WinningPercentage);
    }
}

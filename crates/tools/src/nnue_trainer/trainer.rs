//! 学習率のスケジューリング
//!
//! - `LearningRateScheduler`: eta1 → eta2 → eta3 をエポックに応じて線形補間
//! - `NewbobState`: 保存ごとの検証損失で学習率スケールを減衰させ、最良モデルへ戻す

use std::path::{Path, PathBuf};

/// 学習率スケジューラ
#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    eta1: f64,
    eta2: f64,
    eta3: f64,
    eta1_epoch: u64,
    eta2_epoch: u64,
}

impl LearningRateScheduler {
    /// - `eta1_epoch`: eta1→eta2 遷移完了エポック（0 なら eta1 固定）
    /// - `eta2_epoch`: eta2→eta3 遷移完了エポック（0 なら eta2 固定）
    pub fn new(eta1: f64, eta2: f64, eta3: f64, eta1_epoch: u64, eta2_epoch: u64) -> Self {
        if eta1_epoch > 0 && eta2_epoch > 0 && eta1_epoch > eta2_epoch {
            log::warn!(
                "eta1_epoch ({eta1_epoch}) > eta2_epoch ({eta2_epoch}); eta3 is used from epoch {eta1_epoch}"
            );
        }
        Self { eta1, eta2, eta3, eta1_epoch, eta2_epoch }
    }

    pub fn constant(eta: f64) -> Self {
        Self::new(eta, eta, eta, 0, 0)
    }

    /// エポックに応じた学習率
    ///
    /// - epoch < eta1_epoch: eta1 → eta2 を線形補間
    /// - eta1_epoch <= epoch < eta2_epoch: eta2 → eta3 を線形補間
    /// - epoch >= eta2_epoch: eta3
    pub fn get_lr(&self, epoch: u64) -> f64 {
        if self.eta1_epoch == 0 {
            self.eta1
        } else if epoch < self.eta1_epoch {
            let t = epoch as f64 / self.eta1_epoch as f64;
            self.eta1 + (self.eta2 - self.eta1) * t
        } else if self.eta2_epoch == 0 {
            self.eta2
        } else if epoch < self.eta2_epoch {
            let t = (epoch - self.eta1_epoch) as f64 / (self.eta2_epoch - self.eta1_epoch) as f64;
            self.eta2 + (self.eta3 - self.eta2) * t
        } else {
            self.eta3
        }
    }
}

/// newbob の判定結果
#[derive(Debug, Clone, PartialEq)]
pub struct NewbobDecision {
    /// 損失が改善したか
    pub accepted: bool,
    /// 戻すべき最良モデルのディレクトリ
    pub restore_from: Option<PathBuf>,
    /// 試行回数が尽きた
    pub converged: bool,
}

impl NewbobDecision {
    fn accepted() -> Self {
        Self { accepted: true, restore_from: None, converged: false }
    }
}

/// newbob スケジューラの状態
///
/// - 検証損失が改善 → best 更新、試行回数リセット
/// - 改善しない → 最良モデルへ戻し、試行回数が残っていれば学習率スケールを減衰
/// - 試行回数が 0 になったら収束（戻した後に停止する）
#[derive(Debug, Clone)]
pub struct NewbobState {
    scale: f64,
    decay: f64,
    max_trials: u32,
    trials_left: u32,
    best_loss: f64,
    best_model_dir: Option<PathBuf>,
}

impl NewbobState {
    pub fn new(decay: f64, num_trials: u32) -> Self {
        Self {
            scale: 1.0,
            decay,
            max_trials: num_trials,
            trials_left: num_trials,
            best_loss: f64::INFINITY,
            best_model_dir: None,
        }
    }

    /// decay = 1.0 なら無効
    pub fn is_enabled(&self) -> bool {
        self.decay != 1.0
    }

    /// 現在の学習率スケール
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_model_dir(&self) -> Option<&Path> {
        self.best_model_dir.as_deref()
    }

    /// 学習前の検証損失を基準にする
    pub fn set_initial_loss(&mut self, loss: f64) {
        log::info!("initial loss: {loss}");
        self.best_loss = loss;
    }

    /// 保存直後の検証損失で判定する
    pub fn update(&mut self, latest_loss: f64, saved_dir: &Path) -> NewbobDecision {
        if !self.is_enabled() {
            return NewbobDecision::accepted();
        }

        log::info!("loss: {latest_loss}");
        if latest_loss < self.best_loss {
            log::info!(" < best ({}), accepted", self.best_loss);
            self.best_loss = latest_loss;
            self.best_model_dir = Some(saved_dir.to_path_buf());
            self.trials_left = self.max_trials;
            return NewbobDecision::accepted();
        }

        log::info!(" >= best ({}), rejected", self.best_loss);
        let restore_from = self.best_model_dir.clone();
        if restore_from.is_none() {
            log::warn!("no improvement from initial model");
        }

        self.trials_left = self.trials_left.saturating_sub(1);
        if self.trials_left > 0 {
            log::info!("reducing learning rate scale from {} to {}", self.scale, self.scale * self.decay);
            self.scale *= self.decay;
        }

        let converged = self.trials_left == 0;
        if converged {
            log::info!("converged");
        }
        NewbobDecision { accepted: false, restore_from, converged }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lr_scheduler_constant() {
        let scheduler = LearningRateScheduler::constant(0.001);
        assert!((scheduler.get_lr(0) - 0.001).abs() < 1e-12);
        assert!((scheduler.get_lr(50) - 0.001).abs() < 1e-12);
        assert!((scheduler.get_lr(100) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_lr_scheduler_two_phase() {
        let scheduler = LearningRateScheduler::new(0.01, 0.001, 0.001, 100, 0);
        assert!((scheduler.get_lr(0) - 0.01).abs() < 1e-9);
        let expected = 0.01 + (0.001 - 0.01) * 0.5;
        assert!((scheduler.get_lr(50) - expected).abs() < 1e-9);
        assert!((scheduler.get_lr(100) - 0.001).abs() < 1e-9);
        // eta2_epoch == 0 なので eta2 のまま
        assert!((scheduler.get_lr(200) - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_lr_scheduler_three_phase() {
        let scheduler = LearningRateScheduler::new(0.01, 0.001, 0.0001, 100, 200);
        assert!((scheduler.get_lr(0) - 0.01).abs() < 1e-9);
        assert!((scheduler.get_lr(100) - 0.001).abs() < 1e-9);
        let expected = 0.001 + (0.0001 - 0.001) * 0.5;
        assert!((scheduler.get_lr(150) - expected).abs() < 1e-9);
        assert!((scheduler.get_lr(200) - 0.0001).abs() < 1e-9);
        assert!((scheduler.get_lr(300) - 0.0001).abs() < 1e-9);
    }

    #[test]
    fn test_newbob_disabled() {
        let mut newbob = NewbobState::new(1.0, 2);
        assert!(!newbob.is_enabled());
        let decision = newbob.update(1.0, Path::new("evalsave/0"));
        assert!(decision.accepted);
        assert!(!decision.converged);
        assert_eq!(decision.restore_from, None);
    }

    #[test]
    fn test_newbob_improvement() {
        let mut newbob = NewbobState::new(0.5, 3);
        newbob.set_initial_loss(1.0);

        let decision = newbob.update(0.5, Path::new("evalsave/0"));
        assert!(decision.accepted);
        assert_eq!(newbob.best_model_dir(), Some(Path::new("evalsave/0")));

        let decision = newbob.update(0.4, Path::new("evalsave/1"));
        assert!(decision.accepted);
        assert_eq!(newbob.best_model_dir(), Some(Path::new("evalsave/1")));
        assert!((newbob.scale() - 1.0).abs() < 1e-12);
        assert!((newbob.best_loss() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_newbob_rejection_without_best_model() {
        let mut newbob = NewbobState::new(0.5, 2);
        newbob.set_initial_loss(0.1);
        let decision = newbob.update(0.2, Path::new("evalsave/0"));
        assert!(!decision.accepted);
        assert_eq!(decision.restore_from, None);
        assert!((newbob.scale() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_newbob_restores_before_convergence() {
        let mut newbob = NewbobState::new(0.5, 2);
        newbob.set_initial_loss(1.0);
        newbob.update(0.5, Path::new("evalsave/0"));

        // 1回目の悪化: 戻して減衰
        let decision = newbob.update(0.6, Path::new("evalsave/1"));
        assert!(!decision.accepted);
        assert!(!decision.converged);
        assert_eq!(decision.restore_from.as_deref(), Some(Path::new("evalsave/0")));
        assert!((newbob.scale() - 0.5).abs() < 1e-12);

        // 2回目の悪化: 収束だが最良モデルへの復元も指示される
        let decision = newbob.update(0.7, Path::new("evalsave/2"));
        assert!(decision.converged);
        assert_eq!(decision.restore_from.as_deref(), Some(Path::new("evalsave/0")));
        assert!((newbob.scale() - 0.5).abs() < 1e-12);
    }
}

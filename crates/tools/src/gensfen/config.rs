//! gensfen の設定

use std::path::{Path, PathBuf};

use rand::Rng;
use rchess_core::types::Value;
use serde::{Deserialize, Serialize};

/// 教師局面生成の設定
///
/// 既定値は TOML 設定ファイルと CLI の双方で上書きできる。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GensfenConfig {
    /// 探索深さの下限
    pub depth: i32,
    /// 探索深さの上限（未指定なら `depth`）
    pub depth2: Option<i32>,
    /// 書き出す局面数
    #[serde(rename = "loop")]
    pub loop_count: u64,
    /// この絶対値以上の評価値で対局を打ち切る（`mate_in(2)` が上限）
    pub eval_limit: i32,
    /// ランダム手を指す手数の範囲（1 始まり）。-1 なら開始直後から連続で指す
    pub random_move_minply: i32,
    pub random_move_maxply: i32,
    /// ランダム手の回数
    pub random_move_count: i32,
    /// 1/N の確率で玉の手を優先する（0 なら無効）
    pub random_move_like_apery: u32,
    /// ランダム手を MultiPV の上位から選ぶときの候補数（0 なら合法手から一様）
    pub random_multi_pv: usize,
    /// MultiPV 候補として許す最善手との評価値差
    pub random_multi_pv_diff: i32,
    /// MultiPV 探索の深さ（未指定なら `depth`）
    pub random_multi_pv_depth: Option<i32>,
    /// この手数（1 始まり）より前の局面は書き出さない
    pub write_minply: i32,
    /// この手数に達したら対局を打ち切る（何も書き出さない）
    pub write_maxply: i32,
    /// 出力ファイル名
    pub output_file_name: PathBuf,
    /// この局面数ごとに出力ファイルを切り替える
    pub save_every: u64,
    /// 出力ファイル名に乱数の 16進サフィックスを付ける
    pub random_file_name: bool,
    /// ワーカースレッド数（0 なら論理コア数）
    pub threads: usize,
    /// 乱数シード（未指定なら OS の乱数）
    pub seed: Option<u64>,
    /// 重複除去テーブルのエントリ数（2 の冪に切り上げ）
    pub hash_size: usize,
    /// NNUE 評価関数ファイル（未指定なら手作り評価）
    pub eval_file: Option<PathBuf>,
}

impl Default for GensfenConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            depth2: None,
            loop_count: 8_000_000_000,
            eval_limit: 3000,
            random_move_minply: 1,
            random_move_maxply: 24,
            random_move_count: 5,
            random_move_like_apery: 0,
            random_multi_pv: 0,
            random_multi_pv_diff: 32000,
            random_multi_pv_depth: None,
            write_minply: 16,
            write_maxply: 400,
            output_file_name: PathBuf::from("generated_kifu.bin"),
            save_every: u64::MAX,
            random_file_name: false,
            threads: 0,
            seed: None,
            hash_size: 64 * 1024 * 1024,
            eval_file: None,
        }
    }
}

impl GensfenConfig {
    /// 探索深さの範囲 `[depth, depth2]`
    pub fn depth_range(&self) -> (i32, i32) {
        let depth2 = self.depth2.unwrap_or(self.depth).max(self.depth);
        (self.depth, depth2)
    }

    pub fn multi_pv_depth(&self) -> i32 {
        self.random_multi_pv_depth.unwrap_or(self.depth)
    }

    /// 実際に使う打ち切り評価値（詰みスコアを超えない）
    pub fn effective_eval_limit(&self) -> i32 {
        self.eval_limit.min(Value::mate_in(2).raw())
    }

    pub fn thread_count(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }

    /// 出力ファイルのパス（`random_file_name` なら 16進サフィックス付き）
    pub fn resolve_output_path<R: Rng>(&self, rng: &mut R) -> PathBuf {
        if !self.random_file_name {
            return self.output_file_name.clone();
        }
        let suffix: u64 = rng.random();
        append_to_stem(&self.output_file_name, &format!("{suffix:016x}"))
    }
}

/// `dir/name.ext` → `dir/name_{tag}.ext`
pub fn append_to_stem(path: &Path, tag: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{tag}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{tag}"),
    };
    path.with_file_name(name)
}

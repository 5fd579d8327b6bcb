//! NNUE の自己診断
//!
//! - `check_features`: ランダム対局で差分特徴量と差分更新の評価値が全計算と一致するか調べる
//!   （差分特徴量は `FeatureSet` で選んだ特徴量で検証する）
//! - `read_network_info`: 評価関数ファイルのヘッダを読む

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::Rng;
use rchess_core::movegen::generate_legal;
use rchess_core::nnue::features::{
    EnPassant, Feature, HalfKP, HalfRelativeKPEnemy, HalfRelativeKPFriend, P,
};
use rchess_core::nnue::{Network, NetworkHeader, architecture_string, file_hash};
use rchess_core::position::Position;
use rchess_core::types::Color;

/// ランダム対局1局の最大手数
const MAX_GAME_PLY: i32 = 300;

/// 診断結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureCheckReport {
    pub games: u64,
    pub moves: u64,
    /// 差分で求めた特徴量と全列挙の比較回数
    pub delta_checks: u64,
    /// 玉移動などで全計算になった回数
    pub refreshes: u64,
    pub max_active: usize,
}

/// 差分を検証する入力特徴量
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureSet {
    #[default]
    HalfKp,
    HalfRelativeKpFriend,
    HalfRelativeKpEnemy,
    P,
    EnPassant,
}

/// ランダム対局で特徴量の差分と評価値の差分更新を検証する
///
/// 不一致を見つけた時点で局面と指し手を添えてエラーを返す。
pub fn check_features<R: Rng>(
    network: &Network,
    feature_set: FeatureSet,
    games: u64,
    rng: &mut R,
) -> Result<FeatureCheckReport> {
    match feature_set {
        FeatureSet::HalfKp => check_feature::<HalfKP, R>(network, games, rng),
        FeatureSet::HalfRelativeKpFriend => {
            check_feature::<HalfRelativeKPFriend, R>(network, games, rng)
        }
        FeatureSet::HalfRelativeKpEnemy => {
            check_feature::<HalfRelativeKPEnemy, R>(network, games, rng)
        }
        FeatureSet::P => check_feature::<P, R>(network, games, rng),
        FeatureSet::EnPassant => check_feature::<EnPassant, R>(network, games, rng),
    }
}

fn check_feature<F: Feature, R: Rng>(
    network: &Network,
    games: u64,
    rng: &mut R,
) -> Result<FeatureCheckReport> {
    let mut report = FeatureCheckReport::default();
    let mut fresh = Position::new();

    for _ in 0..games {
        let mut pos = Position::startpos();
        network.evaluate(&mut pos);

        while pos.game_ply() < MAX_GAME_PLY {
            let moves = generate_legal(&pos);
            if moves.is_empty() {
                break;
            }
            let m = moves[rng.random_range(0..moves.len())];
            let before: [Vec<usize>; 2] = [Color::White, Color::Black]
                .map(|c| F::collect_active_indices(&pos, c).as_slice().to_vec());
            let fen_before = pos.fen();
            let uci = pos.move_to_uci(m);

            pos.do_move(m);
            report.moves += 1;

            for (i, perspective) in [Color::White, Color::Black].into_iter().enumerate() {
                let active = F::collect_active_indices(&pos, perspective);
                report.max_active = report.max_active.max(active.len());
                if let Some(&bad) = active.iter().find(|&&index| index >= F::DIMENSIONS) {
                    bail!("feature index {bad} out of range after {uci} in {fen_before}");
                }

                let dirty = &pos.state().dirty_piece;
                if F::needs_refresh(dirty, perspective) {
                    report.refreshes += 1;
                    continue;
                }
                let king_sq = F::king_square(&pos, perspective);
                let (removed, added) = F::collect_changed_indices(dirty, perspective, king_sq);

                let mut expected = before[i].clone();
                for r in removed.iter() {
                    let Some(at) = expected.iter().position(|x| x == r) else {
                        bail!("removed feature {r} was not active before {uci} in {fen_before}");
                    };
                    expected.swap_remove(at);
                }
                expected.extend(added.iter().copied());
                expected.sort_unstable();
                let mut actual = active.as_slice().to_vec();
                actual.sort_unstable();
                if expected != actual {
                    bail!(
                        "{} delta mismatch for {perspective:?} after {uci} in {fen_before}: \
                         expected {expected:?}, actual {actual:?}",
                        F::NAME
                    );
                }
                report.delta_checks += 1;
            }

            let incremental = network.evaluate(&mut pos);
            let fen = pos.fen();
            fresh.set_fen(&fen).with_context(|| format!("invalid fen: {fen}"))?;
            let full = network.evaluate_full(&mut fresh);
            if incremental != full {
                bail!(
                    "accumulator mismatch after {uci} in {fen_before}: incremental {} full {}",
                    incremental.raw(),
                    full.raw()
                );
            }
        }
        report.games += 1;
    }

    log::info!(
        "test_features({}): {} games, {} moves, {} delta checks, {} refreshes, max active {}",
        F::NAME,
        report.games,
        report.moves,
        report.delta_checks,
        report.refreshes,
        report.max_active
    );
    Ok(report)
}

/// 評価関数ファイルのヘッダ情報
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub header: NetworkHeader,
    pub hash_matches: bool,
    pub architecture_matches: bool,
}

pub fn read_network_info(path: &Path) -> Result<NetworkInfo> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let header = NetworkHeader::read(&mut BufReader::new(file))
        .with_context(|| format!("failed to read header of {}", path.display()))?;
    Ok(NetworkInfo {
        hash_matches: header.hash == file_hash(),
        architecture_matches: header.architecture == architecture_string(),
        header,
    })
}

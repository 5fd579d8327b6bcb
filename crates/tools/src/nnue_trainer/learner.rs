//! 学習ループ
//!
//! 読み込みスレッドから受け取った教師局面を学習スレッドが並列に処理する。
//!
//! - 各局面で静止探索の PV を辿り、末端（と途中）の局面を学習例として溜める
//! - `batchsize` 局面ごとにスレッド0が重みを更新し、量子化ネットワークへ書き戻す
//! - `eval_save_interval` ごとに保存して newbob を判定、`loss_output_interval` ごとに検証損失を出す

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, bounded};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rchess_core::eval::Evaluator;
use rchess_core::movegen::{has_legal_moves, is_legal_move};
use rchess_core::nnue::Network;
use rchess_core::position::Position;
use rchess_core::search::{qsearch_pv, search};
use rchess_core::types::Color;

use super::config::LearnConfig;
use super::loss::{CrossEntropy, Loss, PONANZA_CONSTANT};
use super::network::{BatchStats, Example, Freeze, TrainableNetwork};
use super::reader::{ReaderOptions, position_keys, read_sfens, read_validation_set};
use super::trainer::{LearningRateScheduler, NewbobState};
use crate::common::make_rng;
use crate::gensfen::DedupTable;
use crate::packed_sfen::{PackedSfenValue, move_to_move16, unpack_position};

/// 保存するネットワークのファイル名
pub const NETWORK_FILE_NAME: &str = "nn.bin";

/// 学習結果
#[derive(Debug, Clone)]
pub struct LearnSummary {
    /// 読み込みスレッドが流した局面数
    pub sfens_read: u64,
    /// 学習例の数
    pub examples: u64,
    pub epochs: u64,
    pub converged: bool,
    pub final_path: PathBuf,
}

/// 更新スレッドだけが触る状態
struct UpdateState {
    trainable: TrainableNetwork,
    newbob: NewbobState,
    /// 前回保存以降の検証損失
    latest_loss: CrossEntropy,
    save_count: u64,
    loss_count: u64,
    dir_number: u64,
}

/// 学習スレッド間の共有状態
pub struct Learner<'a> {
    config: &'a LearnConfig,
    stop: &'a AtomicBool,
    loss: Loss,
    freeze: Freeze,
    scheduler: LearningRateScheduler,
    /// 探索・評価に使う量子化ネットワーク
    network: RwLock<Network>,
    state: Mutex<UpdateState>,
    examples: Mutex<Vec<Example>>,
    learn_entropy: Mutex<CrossEntropy>,
    validation: Vec<PackedSfenValue>,
    validation_keys: HashSet<u64>,
    dedup: Option<DedupTable>,
    total_done: AtomicU64,
    next_update: AtomicU64,
    epoch: AtomicU64,
    converged: AtomicBool,
    start: Instant,
}

impl<'a> Learner<'a> {
    pub fn new(
        config: &'a LearnConfig,
        stop: &'a AtomicBool,
        trainable: TrainableNetwork,
        network: Network,
        validation: Vec<PackedSfenValue>,
    ) -> Self {
        let validation_keys =
            if config.use_hash_in_training { position_keys(&validation) } else { HashSet::new() };
        let dedup = config
            .skip_duplicated_positions_in_training
            .then(|| DedupTable::new(config.hash_size));
        Self {
            config,
            stop,
            loss: config.loss(),
            freeze: config.freeze(),
            scheduler: config.scheduler(),
            network: RwLock::new(network),
            state: Mutex::new(UpdateState {
                trainable,
                newbob: NewbobState::new(config.newbob_decay, config.newbob_num_trials),
                latest_loss: CrossEntropy::default(),
                save_count: 0,
                loss_count: 0,
                dir_number: 0,
            }),
            examples: Mutex::new(Vec::new()),
            learn_entropy: Mutex::new(CrossEntropy::default()),
            validation,
            validation_keys,
            dedup,
            total_done: AtomicU64::new(0),
            next_update: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            converged: AtomicBool::new(false),
            start: Instant::now(),
        }
    }

    // ========== 学習スレッド ==========

    /// 1スレッド分の学習ループ。チャネルが空になるか停止要求で抜ける
    pub fn worker(
        &self,
        thread_id: usize,
        rx: Receiver<Vec<PackedSfenValue>>,
        mut rng: ChaCha8Rng,
    ) -> Result<()> {
        let mut pos = Position::new();
        let mut examples = Vec::new();

        while let Ok(batch) = rx.recv() {
            for psv in &batch {
                if self.stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                if thread_id == 0 && self.maybe_update(&mut rng)? {
                    return Ok(());
                }

                examples.clear();
                let mut entropy = CrossEntropy::default();
                if self.process_record(&mut pos, psv, &mut rng, &mut examples, &mut entropy) {
                    let n = examples.len() as u64;
                    self.examples.lock().append(&mut examples);
                    *self.learn_entropy.lock() += entropy;
                    self.total_done.fetch_add(n, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// 1局面から学習例を作る。使わない局面なら `false`
    fn process_record<R: Rng>(
        &self,
        pos: &mut Position,
        psv: &PackedSfenValue,
        rng: &mut R,
        examples: &mut Vec<Example>,
        entropy: &mut CrossEntropy,
    ) -> bool {
        let config = self.config;
        if i32::from(psv.score).abs() > config.eval_limit {
            return false;
        }
        if !config.use_draw_in_training && psv.game_result == 0 {
            return false;
        }
        if u32::from(psv.game_ply) < rng.random_range(0..config.reduction_gameply.max(1)) {
            return false;
        }

        let mirror = rng.random_range(0..100) < config.mirror_percentage;
        if let Err(e) = unpack_position(pos, &psv.sfen, mirror) {
            log::warn!("failed to decode a training record: {e}");
            return false;
        }

        let key = pos.key();
        if self.validation_keys.contains(&key) {
            return false;
        }
        if let Some(dedup) = &self.dedup
            && !dedup.check_and_insert(key)
        {
            return false;
        }
        if !has_legal_moves(pos) {
            return false;
        }

        let network = self.network.read();
        let evaluator: &dyn Evaluator = &*network;
        let root_color = pos.side_to_move();
        let (_, pv) = qsearch_pv(pos, evaluator);

        let discount = config.discount_rate as f32;
        for &m in &pv {
            if !is_legal_move(pos, m) {
                log::warn!(
                    "illegal move {} in qsearch PV at {}, record skipped",
                    pos.move_to_uci(m),
                    pos.fen()
                );
                examples.clear();
                *entropy = CrossEntropy::default();
                return false;
            }
            if discount != 0.0 {
                self.add_example(pos, root_color, discount, psv, &network, examples, entropy);
            }
            pos.do_move(m);
        }
        self.add_example(pos, root_color, 1.0, psv, &network, examples, entropy);
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn add_example(
        &self,
        pos: &mut Position,
        root_color: Color,
        weight: f32,
        psv: &PackedSfenValue,
        network: &Network,
        examples: &mut Vec<Example>,
        entropy: &mut CrossEntropy,
    ) {
        let eval = network.evaluate(pos).raw();
        let shallow = if pos.side_to_move() == root_color { eval } else { -eval };
        *entropy += self.loss.cross_entropy(shallow, psv);
        examples.push(Example::new(pos, root_color, weight, eval, *psv));
    }

    // ========== 重みの更新 ==========

    /// 更新のタイミングなら重みを更新する。収束したら `true`
    fn maybe_update<R: Rng>(&self, rng: &mut R) -> Result<bool> {
        let done = self.total_done.load(Ordering::Relaxed);
        let next = self.next_update.load(Ordering::Relaxed);
        if next > done {
            return Ok(false);
        }

        // 初回はしきい値を決めるだけ
        if next != 0 {
            let mut state = self.state.lock();
            self.update_parameters(&mut state, rng);
            let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;

            let mini_batch = self.config.mini_batch_size;
            state.save_count += 1;
            if state.save_count * mini_batch >= self.config.eval_save_interval {
                state.save_count = 0;
                if self.save(&mut state, false)? {
                    self.converged.store(true, Ordering::Relaxed);
                    self.stop.store(true, Ordering::Relaxed);
                    return Ok(true);
                }
            }

            state.loss_count += 1;
            if state.loss_count * mini_batch >= self.config.loss_output_interval {
                state.loss_count = 0;
                let loss = self.calc_loss(done, epoch, &state);
                state.latest_loss += loss;
            }
        }

        self.next_update.fetch_add(self.config.mini_batch_size, Ordering::Relaxed);
        Ok(false)
    }

    /// 溜まった学習例を `nn_batch_size` ずつ逆伝播し、量子化ネットワークを更新する
    fn update_parameters<R: Rng>(&self, state: &mut UpdateState, rng: &mut R) {
        let epoch = self.epoch.load(Ordering::Relaxed);
        let batch_size = self.config.nn_batch_size.max(1);
        let eta = self.scheduler.get_lr(epoch) * state.newbob.scale();
        let learning_rate = (eta / batch_size as f64) as f32;
        let momentum = self.config.momentum as f32;
        let loss = self.loss;

        let mut examples = std::mem::take(&mut *self.examples.lock());
        examples.shuffle(rng);

        let mut stats = BatchStats::default();
        while examples.len() >= batch_size {
            let batch = examples.split_off(examples.len() - batch_size);
            let s = state.trainable.train_batch(
                &batch,
                |e, output| {
                    let shallow = f64::from(e.sign * output) * PONANZA_CONSTANT;
                    let grad = f64::from(e.sign) * loss.calc_grad(shallow, &e.psv);
                    (grad * f64::from(e.weight)) as f32
                },
                learning_rate,
                momentum,
                self.freeze,
            );
            stats.examples += s.examples;
            stats.abs_eval_diff_sum += s.abs_eval_diff_sum;
        }
        if !examples.is_empty() {
            self.examples.lock().append(&mut examples);
        }

        let mut network = self.network.write();
        state.trainable.quantize_into(&mut network);

        if stats.examples > 0 {
            log::debug!(
                "epoch {epoch}: {} examples, eta {eta}, mean |quantized - float| = {:.3}",
                stats.examples,
                stats.abs_eval_diff_sum / stats.examples as f64
            );
        }
    }

    // ========== 保存 ==========

    /// 現在のネットワークを保存する。newbob が収束したら `true`
    fn save(&self, state: &mut UpdateState, is_final: bool) -> Result<bool> {
        let output_dir = &self.config.output_dir;
        let dir = if self.config.save_only_once {
            output_dir.clone()
        } else if is_final {
            output_dir.join("final")
        } else {
            let dir = output_dir.join(state.dir_number.to_string());
            state.dir_number += 1;
            dir
        };

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(NETWORK_FILE_NAME);
        self.network
            .read()
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        log::info!("saved evaluation function to {}", path.display());

        if self.config.save_only_once || is_final {
            return Ok(is_final);
        }
        if !state.newbob.is_enabled() || state.latest_loss.count == 0 {
            return Ok(false);
        }

        let latest_loss = std::mem::take(&mut state.latest_loss).loss();
        let decision = state.newbob.update(latest_loss, &dir);
        if let Some(best) = decision.restore_from {
            let path = best.join(NETWORK_FILE_NAME);
            let network = Network::load(&path)
                .with_context(|| format!("failed to restore {}", path.display()))?;
            state.trainable.dequantize_from(&network);
            *self.network.write() = network;
            log::info!("restored parameters from {}", path.display());
        }
        Ok(decision.converged)
    }

    // ========== 検証 ==========

    /// 検証局面での損失と指し手一致率を出す。交差エントロピーの合計を返す
    fn calc_loss(&self, done: u64, epoch: u64, state: &UpdateState) -> CrossEntropy {
        let network = self.network.read();
        let net: &Network = &network;
        let evaluator: &dyn Evaluator = net;

        let (test, move_hits) = self
            .validation
            .par_iter()
            .map_init(Position::new, |pos, psv| {
                if unpack_position(pos, &psv.sfen, false).is_err() {
                    return (CrossEntropy::default(), 0u64);
                }
                let root_color = pos.side_to_move();
                let (_, pv) = qsearch_pv(pos, evaluator);
                for &m in &pv {
                    pos.do_move(m);
                }
                let eval = net.evaluate(pos).raw();
                let shallow = if pos.side_to_move() == root_color { eval } else { -eval };
                for &m in pv.iter().rev() {
                    pos.undo_move(m);
                }

                let entropy = self.loss.cross_entropy(shallow, psv);
                let hit = search(pos, evaluator, 1, 1)
                    .first()
                    .is_some_and(|rm| move_to_move16(rm.best_move()) == psv.move16);
                (entropy, u64::from(hit))
            })
            .reduce(
                || (CrossEntropy::default(), 0),
                |mut a, b| {
                    a.0 += b.0;
                    a.1 += b.1;
                    a
                },
            );

        let mut startpos = Position::startpos();
        let hirate_eval = net.evaluate(&mut startpos).raw();
        let eta = self.scheduler.get_lr(epoch) * state.newbob.scale();
        log::info!(
            "PROGRESS: {}, {done} sfens, iteration {epoch}, eta = {eta}, hirate eval = {hirate_eval}, elapsed {}s",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.start.elapsed().as_secs()
        );

        if test.count > 0 {
            let mean = test.mean();
            log::info!(
                "test_cross_entropy_eval = {:.6}, test_cross_entropy_win = {:.6}, test_entropy_eval = {:.6}, test_entropy_win = {:.6}, test_cross_entropy = {:.6}, test_entropy = {:.6}, norm = {:.3}, move accuracy = {:.2}%",
                mean.cross_entropy_eval,
                mean.cross_entropy_win,
                mean.entropy_eval,
                mean.entropy_win,
                mean.cross_entropy,
                mean.entropy,
                mean.norm,
                move_hits as f64 * 100.0 / test.count as f64
            );
        } else {
            log::info!("no validation positions");
        }

        let learn = std::mem::take(&mut *self.learn_entropy.lock());
        if learn.count > 0 {
            let mean = learn.mean();
            log::info!(
                "learn_cross_entropy_eval = {:.6}, learn_cross_entropy_win = {:.6}, learn_entropy_eval = {:.6}, learn_entropy_win = {:.6}, learn_cross_entropy = {:.6}, learn_entropy = {:.6}",
                mean.cross_entropy_eval,
                mean.cross_entropy_win,
                mean.entropy_eval,
                mean.entropy_win,
                mean.cross_entropy,
                mean.entropy
            );
        }
        test
    }

    /// 学習前の検証損失を newbob の基準にする
    fn init_newbob(&self) {
        let mut state = self.state.lock();
        if !state.newbob.is_enabled() {
            return;
        }
        let loss = self.calc_loss(0, 0, &state);
        state.newbob.set_initial_loss(loss.loss());
    }

    /// 最終保存
    fn finish(&self) -> Result<PathBuf> {
        let mut state = self.state.lock();
        self.save(&mut state, true)?;
        let dir = if self.config.save_only_once {
            self.config.output_dir.clone()
        } else {
            self.config.output_dir.join("final")
        };
        Ok(dir.join(NETWORK_FILE_NAME))
    }
}

/// 教師局面から評価関数を学習する
pub fn run_learn(config: &LearnConfig, stop: &AtomicBool) -> Result<LearnSummary> {
    config.validate()?;
    let files = config.resolve_files()?;
    log::info!("{} input files", files.len());
    for f in &files {
        log::debug!("  {}", f.display());
    }

    let validation = read_validation_set(
        config.validation_set_file_name.as_deref(),
        &files,
        config.eval_limit,
        config.use_draw_in_validation,
    )?;

    let (trainable, network) = match &config.resume {
        Some(path) => {
            let network = Network::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            (TrainableNetwork::from_network(&network), network)
        }
        None => {
            log::info!("initializing parameters with random values");
            let mut rng = make_rng(config.seed, u64::MAX);
            let mut trainable = TrainableNetwork::random(&mut rng);
            let network = trainable.quantize();
            (trainable, network)
        }
    };

    let threads = config.thread_count();
    let learner = Learner::new(config, stop, trainable, network, validation.records);
    learner.init_newbob();

    let options = ReaderOptions {
        files,
        loop_count: config.loop_count,
        read_size: config.sfen_read_size.max(1),
        batch_size: config.thread_buffer_size.max(1),
        shuffle: !config.no_shuffle,
        skip: validation.taken_from_input,
    };
    let capacity = (options.read_size / options.batch_size).max(threads);
    let (tx, rx) = bounded(capacity);

    log::info!(
        "learn: {threads} threads, mini batch {}, nn batch {}, loss {:?}",
        config.mini_batch_size,
        config.nn_batch_size,
        config.loss
    );

    let sfens_read = std::thread::scope(|s| -> Result<u64> {
        let options = &options;
        let reader = s.spawn(move || {
            let mut rng = make_rng(config.seed, threads as u64);
            read_sfens(options, &mut rng, tx, stop)
        });

        let learner = &learner;
        let workers: Vec<_> = (0..threads)
            .map(|thread_id| {
                let rx = rx.clone();
                let rng = make_rng(config.seed, thread_id as u64);
                s.spawn(move || {
                    let result = learner.worker(thread_id, rx, rng);
                    if result.is_err() {
                        stop.store(true, Ordering::Relaxed);
                    }
                    result
                })
            })
            .collect();
        drop(rx);

        for worker in workers {
            worker.join().map_err(|_| anyhow!("learner thread panicked"))??;
        }
        reader.join().map_err(|_| anyhow!("reader thread panicked"))?
    })?;

    let final_path = learner.finish()?;
    Ok(LearnSummary {
        sfens_read,
        examples: learner.total_done.load(Ordering::Relaxed),
        epochs: learner.epoch.load(Ordering::Relaxed),
        converged: learner.converged.load(Ordering::Relaxed),
        final_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::write_all_records;
    use rand::SeedableRng;
    use rchess_core::eval::ClassicalEvaluator;
    use rchess_core::movegen::generate_legal;
    use rchess_core::types::Move;
    use std::path::Path;

    /// ランダムな対局から教師局面を作る
    fn write_training_data(path: &Path, n: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut records = Vec::with_capacity(n);
        let mut pos = Position::startpos();
        while records.len() < n {
            let moves = generate_legal(&pos);
            if moves.is_empty() || pos.game_ply() > 60 {
                pos = Position::startpos();
                continue;
            }
            let m = moves[rng.random_range(0..moves.len())];
            let score = ClassicalEvaluator.evaluate(&mut pos).raw().clamp(-3000, 3000) as i16;
            let ply = (pos.game_ply() + 1) as u16;
            let mut psv = PackedSfenValue::from_position(&pos, score, m, ply);
            psv.game_result = if records.len() % 3 == 0 { -1 } else { 1 };
            records.push(psv);
            pos.do_move(m);
        }
        write_all_records(path, &records).unwrap();
    }

    fn zero_learner<'a>(config: &'a LearnConfig, stop: &'a AtomicBool) -> Learner<'a> {
        let mut trainable = TrainableNetwork::default();
        let network = trainable.quantize();
        Learner::new(config, stop, trainable, network, Vec::new())
    }

    #[test]
    fn test_process_record_filters() {
        let config = LearnConfig { eval_limit: 1000, hash_size: 1 << 12, ..Default::default() };
        let stop = AtomicBool::new(false);
        let learner = zero_learner(&config, &stop);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut pos = Position::new();
        let mut examples = Vec::new();
        let mut entropy = CrossEntropy::default();

        let mut start = Position::startpos();
        start.do_move(start.move_from_uci("e2e4").unwrap());
        let base = PackedSfenValue { game_result: 1, ..PackedSfenValue::from_position(&start, 30, Move::NONE, 2) };

        // 評価値の上限
        let psv = PackedSfenValue { score: 1001, ..base };
        assert!(!learner.process_record(&mut pos, &psv, &mut rng, &mut examples, &mut entropy));
        // 引き分け
        let psv = PackedSfenValue { game_result: 0, ..base };
        assert!(!learner.process_record(&mut pos, &psv, &mut rng, &mut examples, &mut entropy));

        assert!(learner.process_record(&mut pos, &base, &mut rng, &mut examples, &mut entropy));
        assert_eq!(examples.len(), 1);
        assert_eq!(entropy.count, 1);

        // 同じ局面は重複として捨てる
        examples.clear();
        assert!(!learner.process_record(&mut pos, &base, &mut rng, &mut examples, &mut entropy));
    }

    #[test]
    fn test_validation_positions_are_excluded() {
        let config = LearnConfig { skip_duplicated_positions_in_training: false, ..Default::default() };
        let stop = AtomicBool::new(false);
        let start = Position::startpos();
        let psv = PackedSfenValue {
            game_result: -1,
            ..PackedSfenValue::from_position(&start, 0, Move::NONE, 1)
        };

        let mut trainable = TrainableNetwork::default();
        let network = trainable.quantize();
        let learner = Learner::new(&config, &stop, trainable, network, vec![psv]);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut pos = Position::new();
        let mut examples = Vec::new();
        let mut entropy = CrossEntropy::default();
        assert!(!learner.process_record(&mut pos, &psv, &mut rng, &mut examples, &mut entropy));
    }

    #[test]
    fn test_learn_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.bin");
        let validation = dir.path().join("val.bin");
        write_training_data(&data, 400);
        write_training_data(&validation, 50);

        let config = LearnConfig {
            files: vec![data],
            validation_set_file_name: Some(validation),
            use_hash_in_training: false,
            mini_batch_size: 50,
            nn_batch_size: 10,
            eval_save_interval: 100,
            loss_output_interval: 50,
            sfen_read_size: 100,
            thread_buffer_size: 10,
            hash_size: 1 << 16,
            threads: 1,
            seed: Some(5),
            output_dir: dir.path().join("evalsave"),
            ..Default::default()
        };
        let stop = AtomicBool::new(false);
        let summary = run_learn(&config, &stop).unwrap();

        assert_eq!(summary.sfens_read, 400);
        assert!(summary.examples >= 150);
        assert!(summary.epochs >= 2);
        assert!(!summary.converged);
        assert_eq!(summary.final_path, config.output_dir.join("final").join(NETWORK_FILE_NAME));
        assert!(config.output_dir.join("0").join(NETWORK_FILE_NAME).exists());
        Network::load(&summary.final_path).unwrap();
    }

    #[test]
    fn test_save_only_once_writes_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.bin");
        write_training_data(&data, 100);

        let config = LearnConfig {
            files: vec![data.clone()],
            validation_set_file_name: Some(data),
            use_hash_in_training: false,
            save_only_once: true,
            mini_batch_size: 20,
            nn_batch_size: 10,
            eval_save_interval: 20,
            newbob_decay: 0.5,
            threads: 2,
            seed: Some(6),
            hash_size: 1 << 12,
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let stop = AtomicBool::new(false);
        let summary = run_learn(&config, &stop).unwrap();
        assert_eq!(summary.final_path, config.output_dir.join(NETWORK_FILE_NAME));
        assert!(summary.final_path.exists());
        assert!(!config.output_dir.join("final").exists());
    }

    #[test]
    fn test_stop_flag_ends_learning() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.bin");
        write_training_data(&data, 50);

        let config = LearnConfig {
            files: vec![data],
            threads: 1,
            seed: Some(7),
            hash_size: 1 << 12,
            output_dir: dir.path().join("evalsave"),
            ..Default::default()
        };
        let stop = AtomicBool::new(true);
        let summary = run_learn(&config, &stop).unwrap();
        assert_eq!(summary.examples, 0);
        assert!(summary.final_path.exists());
    }

    #[test]
    fn test_run_learn_rejects_unit_momentum() {
        let dir = tempfile::tempdir().unwrap();
        let config = LearnConfig {
            momentum: 1.0,
            output_dir: dir.path().join("evalsave"),
            ..Default::default()
        };
        let stop = AtomicBool::new(false);
        assert!(run_learn(&config, &stop).is_err());
        assert!(!dir.path().join("evalsave").exists());
    }
}

//! NNUE ネットワーク全体の構造と評価関数
//!
//! ```text
//! HalfKP(Friend)[41024->256x2]
//!   → InputSlice[512(0:512)]
//!   → AffineTransform[32<-512] → ClippedReLU[32]
//!   → AffineTransform[32<-32]  → ClippedReLU[32]
//!   → AffineTransform[1<-32]
//! ```
//!
//! ファイル形式（リトルエンディアン）:
//! バージョン, 構造ハッシュ, アーキテクチャ文字列長, アーキテクチャ文字列,
//! Feature Transformer ハッシュ + パラメータ, ネットワークハッシュ + 各層パラメータ

use super::constants::{
    FV_SCALE, HIDDEN1_DIMENSIONS, HIDDEN2_DIMENSIONS, MAX_ARCH_LEN, NNUE_VERSION,
    OUTPUT_DIMENSIONS,
};
use super::feature_transformer::{self, FeatureTransformer};
use super::layers::{AffineTransform, ClippedReLU, InputSlice, Layer};
use crate::eval::Evaluator;
use crate::position::Position;
use crate::types::Value;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const INPUT_DIMENSIONS: usize = feature_transformer::OUTPUT_DIMENSIONS;

pub type InputLayer = InputSlice<INPUT_DIMENSIONS, 0>;
pub type Hidden1 = AffineTransform<INPUT_DIMENSIONS, HIDDEN1_DIMENSIONS>;
pub type Hidden1Activation = ClippedReLU<HIDDEN1_DIMENSIONS>;
pub type Hidden2 = AffineTransform<HIDDEN1_DIMENSIONS, HIDDEN2_DIMENSIONS>;
pub type Hidden2Activation = ClippedReLU<HIDDEN2_DIMENSIONS>;
pub type OutputLayer = AffineTransform<HIDDEN2_DIMENSIONS, OUTPUT_DIMENSIONS>;

/// 評価関数ファイル読み込みのエラー
#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unsupported NNUE version: {0:#010x}")]
    BadVersion(u32),
    #[error("{section} hash mismatch: expected {expected:#010x}, found {found:#010x}")]
    HashMismatch {
        section: &'static str,
        expected: u32,
        found: u32,
    },
    #[error("architecture string too long: {0} bytes")]
    ArchitectureTooLong(usize),
    #[error("architecture string is not valid UTF-8")]
    ArchitectureEncoding,
    #[error("unexpected trailing data after network parameters")]
    TrailingData,
}

pub type Result<T> = std::result::Result<T, NetworkError>;

/// 出力層より下の構造ハッシュ
pub fn network_hash() -> u32 {
    let h = InputLayer::HASH;
    let h = Hidden1::hash_value(h);
    let h = Hidden1Activation::hash_value(h);
    let h = Hidden2::hash_value(h);
    let h = Hidden2Activation::hash_value(h);
    OutputLayer::hash_value(h)
}

/// ファイル先頭に書かれる構造ハッシュ
pub fn file_hash() -> u32 {
    FeatureTransformer::HASH ^ network_hash()
}

/// ネットワーク部分の構造文字列
pub fn network_structure() -> String {
    let s = InputLayer::structure();
    let s = Hidden1::structure_string(&s);
    let s = Hidden1Activation::structure_string(&s);
    let s = Hidden2::structure_string(&s);
    let s = Hidden2Activation::structure_string(&s);
    OutputLayer::structure_string(&s)
}

/// アーキテクチャ文字列
pub fn architecture_string() -> String {
    format!("Features={},Network={}", FeatureTransformer::structure(), network_structure())
}

/// ファイルヘッダ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHeader {
    pub version: u32,
    pub hash: u32,
    pub architecture: String,
}

impl NetworkHeader {
    /// ヘッダを読む（バージョンとハッシュは検証しない）
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let version = read_u32(reader)?;
        let hash = read_u32(reader)?;
        let len = read_u32(reader)? as usize;
        if len > MAX_ARCH_LEN {
            return Err(NetworkError::ArchitectureTooLong(len));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        let architecture = String::from_utf8(buf).map_err(|_| NetworkError::ArchitectureEncoding)?;
        Ok(Self { version, hash, architecture })
    }

    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.hash.to_le_bytes())?;
        writer.write_all(&(self.architecture.len() as u32).to_le_bytes())?;
        writer.write_all(self.architecture.as_bytes())
    }
}

/// 量子化済み NNUE ネットワーク
#[derive(Clone, Default)]
pub struct Network {
    pub feature_transformer: FeatureTransformer,
    pub hidden1: Hidden1,
    pub hidden2: Hidden2,
    pub output: OutputLayer,
}

impl Network {
    /// ゼロ初期化
    pub fn new() -> Self {
        Self::default()
    }

    /// ファイルから読み込み
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let network = Self::read(&mut reader)?;
        log::info!("loaded NNUE network: {}", path.display());
        Ok(network)
    }

    /// ストリームから読み込み
    ///
    /// バージョン・構造ハッシュ・各セクションのハッシュが一致しない場合はエラー。
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let header = NetworkHeader::read(reader)?;
        if header.version != NNUE_VERSION {
            return Err(NetworkError::BadVersion(header.version));
        }
        check_hash("file", file_hash(), header.hash)?;
        if header.architecture != architecture_string() {
            log::debug!("architecture string differs: {}", header.architecture);
        }

        let mut network = Self::new();
        check_hash("feature transformer", FeatureTransformer::HASH, read_u32(reader)?)?;
        network.feature_transformer.read_parameters(reader)?;

        check_hash("network", network_hash(), read_u32(reader)?)?;
        network.hidden1.read_parameters(reader)?;
        network.hidden2.read_parameters(reader)?;
        network.output.read_parameters(reader)?;

        let mut extra = [0u8; 1];
        if reader.read(&mut extra)? != 0 {
            return Err(NetworkError::TrailingData);
        }
        Ok(network)
    }

    /// ファイルへ保存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// ストリームへ書き出し
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        NetworkHeader {
            version: NNUE_VERSION,
            hash: file_hash(),
            architecture: architecture_string(),
        }
        .write(writer)?;
        writer.write_all(&FeatureTransformer::HASH.to_le_bytes())?;
        self.feature_transformer.write_parameters(writer)?;
        writer.write_all(&network_hash().to_le_bytes())?;
        self.hidden1.write_parameters(writer)?;
        self.hidden2.write_parameters(writer)?;
        self.output.write_parameters(writer)
    }

    /// 変換済み入力から出力層の値（FV_SCALE で割る前）を求める
    pub fn propagate(&self, transformed: &[u8; INPUT_DIMENSIONS]) -> i32 {
        let input = InputLayer::propagate(transformed);

        let mut h1 = [0i32; HIDDEN1_DIMENSIONS];
        self.hidden1.propagate(input, &mut h1);
        let mut a1 = [0u8; HIDDEN1_DIMENSIONS];
        Hidden1Activation::propagate(&h1, &mut a1);

        let mut h2 = [0i32; HIDDEN2_DIMENSIONS];
        self.hidden2.propagate(&a1, &mut h2);
        let mut a2 = [0u8; HIDDEN2_DIMENSIONS];
        Hidden2Activation::propagate(&h2, &mut a2);

        let mut out = [0i32; OUTPUT_DIMENSIONS];
        self.output.propagate(&a2, &mut out);
        out[0]
    }

    /// 局面を評価（手番側視点）
    ///
    /// 計算結果は StateInfo の Accumulator にキャッシュされる。
    pub fn evaluate(&self, pos: &mut Position) -> Value {
        let cached = &pos.state().accumulator;
        if cached.computed_accumulation && cached.computed_score {
            return cached.score;
        }

        let mut transformed = [0u8; INPUT_DIMENSIONS];
        self.feature_transformer.transform(pos, &mut transformed);
        let score = Value::new(self.propagate(&transformed) / FV_SCALE);

        let accumulator = &mut pos.state_mut().accumulator;
        accumulator.score = score;
        accumulator.computed_score = true;
        score
    }

    /// キャッシュを使わず全計算で評価（検証用）
    pub fn evaluate_full(&self, pos: &mut Position) -> Value {
        self.feature_transformer.refresh_accumulator(pos);
        self.evaluate(pos)
    }
}

impl Evaluator for Network {
    fn evaluate(&self, pos: &mut Position) -> Value {
        Network::evaluate(self, pos)
    }
}

fn check_hash(section: &'static str, expected: u32, found: u32) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(NetworkError::HashMismatch { section, expected, found })
    }
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn random_network(seed: u64) -> Network {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut net = Network::new();
        for b in net.feature_transformer.biases.iter_mut() {
            *b = rng.random_range(0..32);
        }
        for w in net.feature_transformer.weights.iter_mut() {
            *w = rng.random_range(-8..8);
        }
        for w in net.hidden1.weights.iter_mut() {
            *w = rng.random_range(-16..16);
        }
        for w in net.hidden2.weights.iter_mut() {
            *w = rng.random_range(-16..16);
        }
        for w in net.output.weights.iter_mut() {
            *w = rng.random_range(-16..16);
        }
        net.output.biases[0] = 1234;
        net
    }

    #[test]
    fn test_architecture_string() {
        assert_eq!(
            architecture_string(),
            "Features=HalfKP(Friend)[41024->256x2],Network=AffineTransform[1<-32](ClippedReLU[32](\
             AffineTransform[32<-32](ClippedReLU[32](AffineTransform[32<-512](InputSlice[512(0:512)])))))"
        );
    }

    #[test]
    fn test_save_load_roundtrip() {
        let net = random_network(11);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nn.bin");
        net.save(&path).unwrap();

        let loaded = Network::load(&path).unwrap();
        assert_eq!(loaded.feature_transformer.weights, net.feature_transformer.weights);
        assert_eq!(loaded.hidden1.weights, net.hidden1.weights);
        assert_eq!(loaded.output.biases, net.output.biases);

        let mut a = Position::startpos();
        let mut b = Position::startpos();
        assert_eq!(net.evaluate(&mut a), loaded.evaluate(&mut b));
    }

    #[test]
    fn test_load_rejects_hash_mismatch() {
        let net = Network::new();
        let mut buf = Vec::new();
        net.write(&mut buf).unwrap();
        // 構造ハッシュを壊す
        buf[4] ^= 0xFF;
        let err = Network::read(&mut buf.as_slice()).err();
        assert!(matches!(err, Some(NetworkError::HashMismatch { section: "file", .. })));
    }

    #[test]
    fn test_load_rejects_bad_version() {
        let net = Network::new();
        let mut buf = Vec::new();
        net.write(&mut buf).unwrap();
        buf[0] ^= 0x01;
        assert!(matches!(Network::read(&mut buf.as_slice()), Err(NetworkError::BadVersion(_))));
    }

    #[test]
    fn test_load_rejects_truncated_and_trailing() {
        let net = Network::new();
        let mut buf = Vec::new();
        net.write(&mut buf).unwrap();

        let truncated = &buf[..buf.len() - 1];
        assert!(matches!(Network::read(&mut &truncated[..]), Err(NetworkError::Io(_))));

        buf.push(0);
        assert!(matches!(Network::read(&mut buf.as_slice()), Err(NetworkError::TrailingData)));
    }

    #[test]
    fn test_header_info() {
        let mut buf = Vec::new();
        Network::new().write(&mut buf).unwrap();
        let header = NetworkHeader::read(&mut buf.as_slice()).unwrap();
        assert_eq!(header.version, NNUE_VERSION);
        assert_eq!(header.hash, file_hash());
        assert_eq!(header.architecture, architecture_string());
    }

    #[test]
    fn test_evaluate_caches_score() {
        let net = random_network(5);
        let mut pos = Position::startpos();
        let v = net.evaluate(&mut pos);
        assert!(pos.state().accumulator.computed_score);
        assert_eq!(pos.state().accumulator.score, v);

        // 差分更新後の評価値は全計算と一致する
        for uci in ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4"] {
            let m = pos.move_from_uci(uci).unwrap();
            pos.do_move(m);
            let incremental = net.evaluate(&mut pos);
            let mut fresh = Position::new();
            fresh.set_fen(&pos.fen()).unwrap();
            assert_eq!(incremental, net.evaluate(&mut fresh));
        }
    }

    #[test]
    fn test_side_to_move_symmetry() {
        // 180度回転して色を入れ替えた局面は手番側視点で同じ評価になる
        let net = random_network(9);
        let mut w = Position::new();
        w.set_fen("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w - - 2 3").unwrap();
        let mut b = Position::new();
        b.set_fen("r1bkqbnr/ppp1pppp/2n5/3p4/3P4/5N2/PPP1PPPP/RNBKQB1R b - - 2 3").unwrap();
        assert_eq!(net.evaluate(&mut w), net.evaluate(&mut b));
    }
}

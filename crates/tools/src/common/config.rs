//! 設定ファイル・ロガー・乱数の共通処理

use std::path::Path;

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// TOML 設定ファイルを読み込む。`None` なら既定値
pub fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

/// 実際に使う設定をログに出す
pub fn log_config<T: Serialize>(name: &str, config: &T) {
    match serde_json::to_string_pretty(config) {
        Ok(json) => log::info!("{name} config:\n{json}"),
        Err(e) => log::warn!("failed to serialize {name} config: {e}"),
    }
}

/// env_logger を既定レベル info で初期化（RUST_LOG で上書き可）
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
}

/// ワーカーごとの乱数生成器
///
/// シード指定時は `seed + stream` で決定的に、未指定なら OS の乱数で初期化する。
pub fn make_rng(seed: Option<u64>, stream: u64) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s.wrapping_add(stream)),
        None => ChaCha8Rng::from_os_rng(),
    }
}

/// CLI で明示された値だけを設定に上書きする
///
/// ```ignore
/// apply_overrides!(config, cli; depth, depth2, eval_limit);
/// ```
#[macro_export]
macro_rules! apply_overrides {
    ($config:expr, $cli:expr; $($field:ident),* $(,)?) => {
        $(
            if let Some(v) = $cli.$field.clone() {
                $config.$field = v;
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        depth: i32,
        name: String,
    }

    #[test]
    fn test_load_config_default_and_file() {
        let cfg: Sample = load_config(None).unwrap();
        assert_eq!(cfg, Sample::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "depth = 7\n").unwrap();
        let cfg: Sample = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.depth, 7);
        assert_eq!(cfg.name, "");
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "depth = \"x\"\n").unwrap();
        assert!(load_config::<Sample>(Some(&path)).is_err());
    }

    #[test]
    fn test_make_rng_is_deterministic_with_seed() {
        let a: u64 = make_rng(Some(1), 3).random();
        let b: u64 = make_rng(Some(1), 3).random();
        let c: u64 = make_rng(Some(1), 4).random();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_apply_overrides() {
        struct Cli {
            depth: Option<i32>,
            name: Option<String>,
        }
        let mut cfg = Sample { depth: 1, name: "a".into() };
        let cli = Cli { depth: Some(5), name: None };
        apply_overrides!(cfg, cli; depth, name);
        assert_eq!(cfg.depth, 5);
        assert_eq!(cfg.name, "a");
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use thiserror::Error;

use crate::cli::Cli;
use crate::net_utils::privilege;

/// テストファイルのデフォルトのパス
pub(crate) const DEFAULT_TESTS: &str = "./tests.conchk";

/// 同時に実行するプローブ数のデフォルト
pub(crate) const DEFAULT_MAX_STREAMS: u32 = 8;

/// 接続とICMP待ちのタイムアウトのデフォルト
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ConfigError {
    #[error("Failed to load {0}. error: {1}")]
    LoadFileError(PathBuf, io::ErrorKind),
    #[error(transparent)]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid timeout '{0}': {1}")]
    InvalidTimeout(String, String),
    #[error("Invalid max streams {0}: must be at least 1")]
    InvalidMaxStreams(u32),
}

/// TOML形式の設定ファイル
///
/// 全ての項目は省略可能
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// テストファイルのパス
    pub(crate) tests: Option<PathBuf>,

    /// 結果を書き出すファイルのパス
    pub(crate) output: Option<PathBuf>,

    /// テストを選択するためのホスト名
    pub(crate) host: Option<String>,

    /// 同時に実行するプローブ数
    pub(crate) max_streams: Option<u32>,

    /// タイムアウト(`5s`, `500ms`など)
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub(crate) timeout: Option<humantime::Duration>,
}

impl Config {
    pub(crate) fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFileError(path.to_path_buf(), e.kind()))?;
        toml::from_str(&content).map_err(ConfigError::TomlParseError)
    }
}

/// コマンドライン引数、設定ファイル、デフォルト値を合わせた最終的な設定
///
/// コマンドライン引数 > 設定ファイル > デフォルト値の順に優先される
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) tests: PathBuf,
    pub(crate) output: Option<PathBuf>,
    pub(crate) host: String,
    pub(crate) max_streams: u32,
    pub(crate) timeout: Duration,
}

impl Settings {
    pub(crate) fn resolve(cli: &Cli, config: Config) -> Result<Self, ConfigError> {
        let timeout = match &cli.timeout {
            Some(literal) => humantime::parse_duration(literal)
                .map_err(|e| ConfigError::InvalidTimeout(literal.clone(), e.to_string()))?,
            None => config.timeout.map_or(DEFAULT_TIMEOUT, Into::into),
        };

        let max_streams = cli
            .max_streams
            .or(config.max_streams)
            .unwrap_or(DEFAULT_MAX_STREAMS);
        if max_streams == 0 {
            return Err(ConfigError::InvalidMaxStreams(max_streams));
        }

        let host = cli
            .host
            .clone()
            .or(config.host)
            .unwrap_or_else(privilege::hostname);

        Ok(Self {
            tests: cli
                .tests
                .clone()
                .or(config.tests)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TESTS)),
            output: cli.output.clone().or(config.output),
            host,
            max_streams,
            timeout,
        })
    }

    pub(crate) fn run_context(&self, privileged: bool) -> RunContext {
        RunContext {
            timeout: self.timeout,
            max_streams: self.max_streams,
            privileged,
        }
    }
}

/// 1回の実行で全てのコンポーネントが共有する設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub timeout: Duration,
    pub max_streams: u32,

    /// rawソケットを開けるか
    /// falseの場合はICMPの監視を行わない
    pub privileged: bool,
}

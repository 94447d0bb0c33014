use std::path::PathBuf;

use clap::Parser;

/// テストファイルに記述された疎通確認を、このホストから実行する
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[clap(version)]
pub(crate) struct Cli {
    /// テストファイルのパス [default: ./tests.conchk]
    #[clap(long, short = 'T')]
    pub(crate) tests: Option<PathBuf>,

    /// 結果を書き出すCSVファイルのパス
    #[clap(long = "outputcsv", short = 'O')]
    pub(crate) output: Option<PathBuf>,

    /// テストを選択するためのホスト名 [default: システムのホスト名]
    #[clap(long, short = 'H')]
    pub(crate) host: Option<String>,

    /// 同時に実行するプローブ数 [default: 8]
    #[clap(long = "maxstreams")]
    pub(crate) max_streams: Option<u32>,

    /// 接続とICMP待ちのタイムアウト [default: 5s]
    #[clap(long)]
    pub(crate) timeout: Option<String>,

    /// デバッグログを出力する
    #[clap(long, short)]
    pub(crate) debug: bool,

    /// 設定ファイルのパス
    #[clap(long, short)]
    pub(crate) config: Option<PathBuf>,
}

impl Cli {
    pub(crate) fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

use std::fmt::{self, Display};
use std::net::SocketAddr;

use thiserror::Error;

use crate::core::probe_worker::ProbeError;

/// テストファイル1行に必要な最小フィールド数
pub(crate) const MIN_FIELDS: usize = 9;

/// 疎通確認で送信するペイロード
pub(crate) const PROBE_PAYLOAD: &[u8] = b"conchk test packet";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ModelError {
    #[error("Expected at least 9 fields, but got {0}")]
    TooFewFields(usize),
    #[error("Invalid local address on test: {0}")]
    InvalidLocalAddress(String),
    #[error("Cannot execute test w/o root access: {0}")]
    PrivilegedPort(String),
}

/// トランスポート層のプロトコル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transport {
    Tcp,
    Udp,
}

impl Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

/// アドレスファミリー
///
/// `tcp`/`udp`のように末尾に数字がない場合は`Any`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    pub(crate) fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Family::V4,
            SocketAddr::V6(_) => Family::V6,
        }
    }

    pub(crate) fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Any => write!(f, "IP"),
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// ネットワーク指定（`tcp`, `udp4`, `tcp6:foo`など）を解釈したもの
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Network {
    pub(crate) transport: Transport,
    pub(crate) family: Family,
}

impl Network {
    /// `:`以降の接尾辞を取り除いたトークン
    pub(crate) fn token(network: &str) -> &str {
        match network.rfind(':') {
            Some(i) => &network[..i],
            None => network,
        }
    }

    pub(crate) fn parse(network: &str) -> Result<Self, ProbeError> {
        let token = Self::token(network);
        let (transport, family) = match token {
            "tcp" => (Transport::Tcp, Family::Any),
            "tcp4" => (Transport::Tcp, Family::V4),
            "tcp6" => (Transport::Tcp, Family::V6),
            "udp" => (Transport::Udp, Family::Any),
            "udp4" => (Transport::Udp, Family::V4),
            "udp6" => (Transport::Udp, Family::V6),
            other => return Err(ProbeError::ProtocolUnimplemented(other.to_string())),
        };
        Ok(Self { transport, family })
    }
}

/// 宛先アドレスからホスト部分とポート範囲を取り出す
///
/// `host`、`host:port`、`host:start-end`を受け付ける。
/// ポートがない場合や解釈できない場合は`(元の文字列, 0, 0)`を返す。
pub(crate) fn find_dest_range(addr: &str) -> (&str, u16, u16) {
    let Some(colon) = addr.rfind(':') else {
        return (addr, 0, 0);
    };
    let ports = &addr[colon + 1..];
    let parsed = match ports.rfind('-') {
        None => ports.parse::<u16>().ok().map(|port| (port, port)),
        Some(hyphen) => ports[..hyphen]
            .parse::<u16>()
            .ok()
            .zip(ports[hyphen + 1..].parse::<u16>().ok()),
    };

    match parsed {
        Some((start, end)) if start <= end => (&addr[..colon], start, end),
        _ => (addr, 0, 0),
    }
}

/// 角括弧で囲まれたIPv6リテラルを含むか
pub(crate) fn is_v6(addr: &str) -> bool {
    addr.contains('[')
}

/// 1回のプローブの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProbeOutcome {
    /// 接続成功、またはUDPでICMPエラーが返らなかった
    Passed,

    /// 宛先に拒否された（TCP RSTまたはICMP Destination Unreachable）
    Refused(String),

    /// それ以外の失敗
    Failed(ProbeError),
}

/// 1つの具体的な宛先に対するテスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubTest {
    /// `<親のref>.<n>`
    /// ポート範囲指定の場合のみ
    pub(crate) sub_ref: Option<String>,

    pub(crate) local_addr: String,
    pub(crate) remote_addr: String,
    pub(crate) network: String,
    pub(crate) ipv6: bool,

    /// bind後に実際に使われたローカルアドレス
    pub(crate) local_used: Option<SocketAddr>,

    /// connect後に実際に使われたリモートアドレス
    pub(crate) remote_used: Option<SocketAddr>,

    /// 未実行の場合は`None`
    pub(crate) outcome: Option<ProbeOutcome>,
}

impl SubTest {
    pub(crate) fn passed(&self) -> bool {
        matches!(self.outcome, Some(ProbeOutcome::Passed))
    }

    pub(crate) fn refused(&self) -> bool {
        matches!(self.outcome, Some(ProbeOutcome::Refused(_)))
    }

    /// 拒否された理由
    pub(crate) fn refusal(&self) -> Option<&str> {
        match &self.outcome {
            Some(ProbeOutcome::Refused(reason)) => Some(reason.as_str()),
            _ => None,
        }
    }

    /// 拒否はエラーではないため空になる
    pub(crate) fn error_text(&self) -> String {
        match &self.outcome {
            Some(ProbeOutcome::Failed(e)) => e.to_string(),
            Some(ProbeOutcome::Passed | ProbeOutcome::Refused(_)) | None => String::new(),
        }
    }

    fn status(&self) -> &'static str {
        match &self.outcome {
            None => "PENDING",
            Some(ProbeOutcome::Passed) => "PASSED",
            Some(ProbeOutcome::Refused(_)) => "REFUSED",
            Some(ProbeOutcome::Failed(_)) => "FAILED",
        }
    }
}

impl Display for SubTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = |addr: Option<SocketAddr>| addr.map(|a| a.to_string()).unwrap_or_default();
        write!(
            f,
            "{:<6} {} --> {} {}",
            self.sub_ref.as_deref().unwrap_or_default(),
            addr(self.local_used),
            addr(self.remote_used),
            self.status()
        )?;
        if let Some(reason) = self.refusal() {
            write!(f, " ({reason})")?;
        }
        let error = self.error_text();
        if !error.is_empty() {
            write!(f, " ERROR INFO: {error}")?;
        }
        Ok(())
    }
}

/// テスト定義全体の判定結果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Verdict {
    pub(crate) passed: bool,
    pub(crate) error: String,
}

/// テストファイル1行分のテスト定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestDefinition {
    pub(crate) reference: String,
    pub(crate) description: String,
    pub(crate) local_host: String,
    pub(crate) local_addr: String,
    pub(crate) local_desc: String,
    pub(crate) remote_host: String,
    pub(crate) remote_addr: String,
    pub(crate) remote_desc: String,
    pub(crate) network: String,

    /// AF_INET6ソケットでテストするか
    pub(crate) ipv6: bool,

    /// このホストで実行すべきテストか
    pub(crate) attempt: bool,

    /// 全てのSubTest完了後に一度だけ設定される
    pub(crate) verdict: Option<Verdict>,

    /// 常に1つ以上
    pub(crate) sub_tests: Vec<SubTest>,
}

impl TestDefinition {
    pub(crate) fn from_record<S: AsRef<str>>(fields: &[S], my_host: &str) -> Result<Self, ModelError> {
        if fields.len() < MIN_FIELDS {
            return Err(ModelError::TooFewFields(fields.len()));
        }
        let field = |i: usize| fields[i].as_ref().trim().to_string();

        let mut local_addr = field(3);
        if !local_addr.is_empty() && !local_addr.contains(':') {
            local_addr.push_str(":0");
        }
        let local_host = field(2);
        let remote_addr = field(6);
        let network = field(8);
        let ipv6 = is_v6(&remote_addr) || Network::token(&network).ends_with('6');

        let mut definition = Self {
            reference: field(0),
            description: field(1),
            attempt: local_host == my_host,
            local_host,
            local_addr,
            local_desc: field(4),
            remote_host: field(5),
            remote_addr,
            remote_desc: field(7),
            network,
            ipv6,
            verdict: None,
            sub_tests: Vec::new(),
        };
        definition.sub_tests = definition.expand();
        Ok(definition)
    }

    /// 宛先のポート範囲を1ポート1つのSubTestに展開する
    fn expand(&self) -> Vec<SubTest> {
        let (host, start, end) = find_dest_range(&self.remote_addr);
        let sub_test = |sub_ref: Option<String>, remote_addr: String| SubTest {
            sub_ref,
            local_addr: self.local_addr.clone(),
            remote_addr,
            network: self.network.clone(),
            ipv6: self.ipv6,
            local_used: None,
            remote_used: None,
            outcome: None,
        };

        if start == 0 && end == 0 {
            return vec![sub_test(None, self.remote_addr.clone())];
        }
        (start..=end)
            .enumerate()
            .map(|(i, port)| {
                let sub_ref = (start != end).then(|| format!("{}.{}", self.reference, i + 1));
                sub_test(sub_ref, format!("{host}:{port}"))
            })
            .collect()
    }

    pub(crate) fn status(&self) -> &'static str {
        match &self.verdict {
            None => "PENDING",
            Some(Verdict { passed: true, .. }) => "PASSED",
            Some(_) => "FAILED",
        }
    }

    pub(crate) fn passed(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.passed)
    }

    pub(crate) fn error(&self) -> &str {
        self.verdict.as_ref().map(|v| v.error.as_str()).unwrap_or_default()
    }

    /// 出力用の11列のレコード
    pub(crate) fn to_record(&self) -> Vec<String> {
        vec![
            self.reference.clone(),
            self.description.clone(),
            self.local_host.clone(),
            self.local_addr.clone(),
            self.local_desc.clone(),
            self.remote_host.clone(),
            self.remote_addr.clone(),
            self.remote_desc.clone(),
            self.network.clone(),
            self.status().to_string(),
            self.error().to_string(),
        ]
    }

    /// root権限なしで実行できるかを確認する
    ///
    /// ローカルポートが解釈できない場合と、1024未満の特権ポートを指定している場合はエラー
    pub(crate) fn check_unprivileged(&self) -> Result<(), ModelError> {
        if !self.attempt || self.local_addr.is_empty() {
            return Ok(());
        }
        let port = self
            .local_addr
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<u16>().ok())
            .ok_or_else(|| ModelError::InvalidLocalAddress(self.to_string()))?;
        if (1..1024).contains(&port) {
            return Err(ModelError::PrivilegedPort(self.to_string()));
        }
        Ok(())
    }
}

impl Display for TestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = match self.local_addr.as_str() {
            "" => "#any#",
            addr => addr,
        };
        write!(
            f,
            "{}: {:<5} '{:<60}' {} {} --> {}",
            self.status(),
            self.reference,
            self.description,
            self.network,
            local,
            self.remote_addr
        )?;
        if self.ipv6 {
            write!(f, " [on AF_INET6 socket]")?;
        }
        let error = self.error();
        if !error.is_empty() {
            write!(f, " ERROR INFO: {error}")?;
        }
        Ok(())
    }
}

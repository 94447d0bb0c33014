use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use log::{debug, warn};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, UdpSocket};
use tokio::time::{sleep, timeout};

use crate::config::RunContext;
use crate::core::icmp_publisher::{PublisherHandle, Subscription};
use crate::model::{Family, Network, PROBE_PAYLOAD, ProbeOutcome, SubTest, Transport};
use crate::net_utils::resolve;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("{0} Resolve error: {1}")]
    Resolve(Transport, String),
    #[error("Connect error: {0}")]
    Connect(String),
    #[error("UDP Dial error: {0}")]
    Dial(String),
    #[error("{0} Write error: {1}")]
    Write(Transport, String),
    #[error("Protocol {0} not yet implemented")]
    ProtocolUnimplemented(String),
    #[error("{0}")]
    Icmp(String),
    #[error("Probe aborted: {0}")]
    Aborted(String),
}

/// 1つのSubTestを実行するワーカー
///
/// 全てのプローブで共有される。`publisher`はroot権限で実行している場合のみ存在する。
pub struct ProbeWorker {
    ctx: RunContext,
    publisher: Option<PublisherHandle>,
}

impl ProbeWorker {
    pub fn new(ctx: RunContext, publisher: Option<PublisherHandle>) -> Self {
        Self { ctx, publisher }
    }

    /// SubTestを実行し、結果を書き込んで返す
    pub async fn run(&self, mut sub_test: SubTest) -> SubTest {
        let outcome = match Network::parse(&sub_test.network) {
            Ok(network) => match network.transport {
                Transport::Tcp => self.probe_tcp(network, &mut sub_test).await,
                Transport::Udp => self.probe_udp(network, &mut sub_test).await,
            },
            Err(e) => Err(e),
        };
        sub_test.outcome = Some(outcome.unwrap_or_else(ProbeOutcome::Failed));
        debug!("Completed: {sub_test}");
        sub_test
    }

    async fn probe_tcp(
        &self,
        network: Network,
        sub_test: &mut SubTest,
    ) -> Result<ProbeOutcome, ProbeError> {
        debug!("Doing TCP test to {}", sub_test.remote_addr);
        let local = resolve::resolve_local(&sub_test.local_addr, network.family)
            .await
            .map_err(|e| ProbeError::Resolve(Transport::Tcp, e.to_string()))?;
        let family = local.as_ref().map_or(network.family, Family::of);
        let remote = resolve::resolve(&sub_test.remote_addr, family)
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let socket = match remote {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| ProbeError::Connect(e.to_string()))?;
        if let Some(local) = local {
            socket
                .bind(local)
                .map_err(|e| ProbeError::Connect(format!("bind {local}: {e}")))?;
        }

        let mut stream = match timeout(self.ctx.timeout, socket.connect(remote)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!("Got TCP connection refused from {remote}");
                return Ok(ProbeOutcome::Refused("connection refused".to_string()));
            }
            Ok(Err(e)) => return Err(ProbeError::Connect(format!("dial {remote}: {e}"))),
            Err(_) => return Err(ProbeError::Connect(format!("dial {remote}: i/o timeout"))),
        };
        sub_test.local_used = stream.local_addr().ok();
        sub_test.remote_used = stream.peer_addr().ok();

        stream
            .write_all(PROBE_PAYLOAD)
            .await
            .map_err(|e| ProbeError::Write(Transport::Tcp, e.to_string()))?;
        let _ = stream.shutdown().await;

        Ok(ProbeOutcome::Passed)
    }

    async fn probe_udp(
        &self,
        network: Network,
        sub_test: &mut SubTest,
    ) -> Result<ProbeOutcome, ProbeError> {
        debug!("Doing UDP test to {}", sub_test.remote_addr);
        // 送信より前に購読しておかないとICMPを取りこぼす
        let mut subscription = match &self.publisher {
            Some(publisher) => match publisher.subscribe().await {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    warn!("Cannot watch ICMP for {}: {e}", sub_test.remote_addr);
                    None
                }
            },
            None => None,
        };

        let local = resolve::resolve_local(&sub_test.local_addr, network.family)
            .await
            .map_err(|e| ProbeError::Resolve(Transport::Udp, e.to_string()))?;
        let family = local.as_ref().map_or(network.family, Family::of);
        let remote = resolve::resolve(&sub_test.remote_addr, family)
            .await
            .map_err(|e| ProbeError::Dial(e.to_string()))?;

        let bind_addr = local.unwrap_or_else(|| unspecified(&remote));
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ProbeError::Dial(format!("bind {bind_addr}: {e}")))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| ProbeError::Dial(format!("dial {remote}: {e}")))?;
        sub_test.local_used = socket.local_addr().ok();
        sub_test.remote_used = socket.peer_addr().ok();

        socket
            .send(PROBE_PAYLOAD)
            .await
            .map_err(|e| ProbeError::Write(Transport::Udp, e.to_string()))?;
        drop(socket);

        match subscription.as_mut() {
            Some(subscription) => self.wait_for_icmp(sub_test, subscription).await,
            None => Ok(ProbeOutcome::Passed),
        }
    }

    /// タイムアウトまでICMPエラーを待つ
    ///
    /// 一致するICMPが届かずにタイムアウトした場合は成功
    async fn wait_for_icmp(
        &self,
        sub_test: &SubTest,
        subscription: &mut Subscription,
    ) -> Result<ProbeOutcome, ProbeError> {
        let (Some(local), Some(remote)) = (sub_test.local_used, sub_test.remote_used) else {
            return Ok(ProbeOutcome::Passed);
        };
        let network = Network::token(&sub_test.network);

        let deadline = sleep(self.ctx.timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("No ICMP for {local} --> {remote} within timeout");
                    return Ok(ProbeOutcome::Passed);
                }
                msg = subscription.recv() => match msg {
                    Some(msg) if msg.correlates_with(local, remote, network) => {
                        debug!("ICMP {} (code {}) matched {local} --> {remote}", msg.msg_type, msg.code);
                        return match msg.is_unreachable() {
                            true => Ok(ProbeOutcome::Refused(msg.description)),
                            false => Err(ProbeError::Icmp(msg.description)),
                        };
                    }
                    Some(_) => {}
                    None => {
                        // Publisherが停止した
                        (&mut deadline).await;
                        return Ok(ProbeOutcome::Passed);
                    }
                },
            }
        }
    }
}

fn unspecified(remote: &SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tcpip::icmp::MessageType;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::core::icmp_message::IcmpMessage;
    use crate::core::icmp_message::tests::{icmpv4_error, udp_local, udp_remote};
    use crate::core::icmp_publisher::IcmpPublisher;

    fn ctx(timeout: Duration) -> RunContext {
        RunContext {
            timeout,
            max_streams: 4,
            privileged: false,
        }
    }

    fn sub_test(local_addr: &str, remote_addr: &str, network: &str) -> SubTest {
        SubTest {
            sub_ref: None,
            local_addr: local_addr.to_string(),
            remote_addr: remote_addr.to_string(),
            network: network.to_string(),
            ipv6: false,
            local_used: None,
            remote_used: None,
            outcome: None,
        }
    }

    #[tokio::test]
    async fn test_probe_tcp() {
        let worker = ProbeWorker::new(ctx(Duration::from_secs(2)), None);

        // [正常系] 待ち受けているポートへの接続
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let result = worker
            .run(sub_test("", &addr.to_string(), "tcp4"))
            .await;
        assert_eq!(result.outcome, Some(ProbeOutcome::Passed));
        assert_eq!(result.remote_used, Some(addr));
        assert!(result.local_used.is_some());

        // [正常系] 待ち受けていないポートは拒否
        drop(listener);
        let result = worker
            .run(sub_test("", &addr.to_string(), "tcp"))
            .await;
        assert!(result.refused());
        assert_eq!(result.refusal(), Some("connection refused"));
        assert_eq!(result.error_text(), "");
    }

    #[tokio::test]
    async fn test_probe_tcp_errors() {
        let worker = ProbeWorker::new(ctx(Duration::from_secs(2)), None);

        // [異常系] ローカルアドレスが解釈できない
        let result = worker
            .run(sub_test("127.0.0.1:local", "127.0.0.1:80", "tcp"))
            .await;
        assert!(matches!(
            result.outcome,
            Some(ProbeOutcome::Failed(ProbeError::Resolve(Transport::Tcp, _)))
        ));
        assert!(result.error_text().starts_with("TCP Resolve error: "));

        // [異常系] 宛先にポートがない
        let result = worker.run(sub_test("", "127.0.0.1", "tcp")).await;
        assert!(matches!(
            result.outcome,
            Some(ProbeOutcome::Failed(ProbeError::Connect(_)))
        ));

        // [異常系] 未実装のプロトコル
        let result = worker.run(sub_test("", "127.0.0.1", "ip4:icmp")).await;
        assert_eq!(
            result.outcome,
            Some(ProbeOutcome::Failed(ProbeError::ProtocolUnimplemented(
                "ip4".to_string()
            )))
        );
        assert_eq!(result.error_text(), "Protocol ip4 not yet implemented");
    }

    #[tokio::test]
    async fn test_probe_udp_without_privilege() {
        // [正常系] ICMPを待たずに成功
        let worker = ProbeWorker::new(ctx(Duration::from_secs(5)), None);
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();

        let result = timeout(
            Duration::from_secs(1),
            worker.run(sub_test("127.0.0.1:0", &addr.to_string(), "udp4")),
        )
        .await
        .unwrap();
        assert_eq!(result.outcome, Some(ProbeOutcome::Passed));
        assert_eq!(result.remote_used, Some(addr));

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], PROBE_PAYLOAD);

        // [異常系] ファミリーが一致しない
        let result = worker
            .run(sub_test("", &addr.to_string(), "udp6"))
            .await;
        assert!(matches!(
            result.outcome,
            Some(ProbeOutcome::Failed(ProbeError::Dial(_)))
        ));
    }

    #[tokio::test]
    async fn test_udp_with_icmp_watch() {
        let token = CancellationToken::new();
        let (publisher, handle, _ingest) = IcmpPublisher::new(token.clone());
        tokio::spawn(publisher.run());
        let wait = Duration::from_millis(200);
        let worker = ProbeWorker::new(ctx(wait), Some(handle.clone()));
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();

        // [正常系] ICMPが届かなければタイムアウトまで待って成功
        let started = Instant::now();
        let result = worker
            .run(sub_test("", &addr.to_string(), "udp4"))
            .await;
        assert!(started.elapsed() >= wait);
        assert_eq!(result.outcome, Some(ProbeOutcome::Passed));
        assert_eq!(result.remote_used, Some(addr));
        assert!(result.local_used.is_some());

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], PROBE_PAYLOAD);

        // [正常系] プローブ終了後に購読が解除されている
        assert_eq!(handle.subscriber_count().await, Ok(0));

        token.cancel();
    }

    fn probed_sub_test() -> SubTest {
        let mut sub_test = sub_test("", "192.0.2.10:53", "udp4");
        sub_test.local_used = Some(udp_local());
        sub_test.remote_used = Some(udp_remote());
        sub_test
    }

    #[tokio::test]
    async fn test_wait_for_icmp() {
        let token = CancellationToken::new();
        let (publisher, handle, ingest) = IcmpPublisher::new(token.clone());
        tokio::spawn(publisher.run());
        let worker = ProbeWorker::new(ctx(Duration::from_millis(200)), Some(handle.clone()));

        // [正常系] 一致するDestination Unreachableは拒否
        let mut subscription = handle.subscribe().await.unwrap();
        let msg = IcmpMessage::from_icmpv4(&icmpv4_error(3, 3)).unwrap();
        ingest.send(msg.clone()).await.unwrap();
        let outcome = worker
            .wait_for_icmp(&probed_sub_test(), &mut subscription)
            .await;
        assert_eq!(outcome, Ok(ProbeOutcome::Refused(msg.description)));

        // [異常系] 一致するTime ExceededはICMPエラー
        let msg = IcmpMessage::from_icmpv4(&icmpv4_error(11, 0)).unwrap();
        assert_eq!(msg.msg_type, MessageType::TimeExceeded);
        ingest.send(msg).await.unwrap();
        let outcome = worker
            .wait_for_icmp(&probed_sub_test(), &mut subscription)
            .await;
        assert_eq!(
            outcome,
            Err(ProbeError::Icmp(
                "Time-to-live exceeded in transit".to_string()
            ))
        );

        // [正常系] 一致しないICMPは無視してタイムアウトで成功
        let msg = IcmpMessage::from_icmpv4(&icmpv4_error(3, 3)).unwrap();
        ingest.send(msg).await.unwrap();
        let mut other = probed_sub_test();
        other.network = "tcp4".to_string();
        let outcome = worker.wait_for_icmp(&other, &mut subscription).await;
        assert_eq!(outcome, Ok(ProbeOutcome::Passed));

        token.cancel();
    }
}

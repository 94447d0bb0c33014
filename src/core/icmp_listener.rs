use std::io::{self, Read};

use log::{debug, info};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::icmp_message::{IcmpMessage, IcmpVersion};

/// 受信バッファのサイズ
/// IPヘッダー + ICMPヘッダー + 元のIPヘッダー(最大60バイト) + 8バイトが収まれば十分
const RECV_BUFFER_SIZE: usize = 512;

#[derive(Debug, Error)]
pub enum IcmpListenerError {
    #[error("Failed to open raw {0:?} ICMP socket: {1}")]
    Socket(IcmpVersion, #[source] io::Error),
    #[error("Failed to read from raw {0:?} ICMP socket: {1}")]
    Read(IcmpVersion, #[source] io::Error),
    #[error("ICMP ingestion channel closed")]
    ChannelClosed,
}

/// rawソケットでICMPを受信し、Publisherへ送るリスナー
///
/// アドレスファミリーごとに1つ起動する
pub struct IcmpListener {
    token: CancellationToken,
    version: IcmpVersion,
    socket: AsyncFd<Socket>,
    tx: mpsc::Sender<IcmpMessage>,
}

impl IcmpListener {
    /// rawソケットを開く
    ///
    /// root権限が必要。tokioのランタイム内で呼び出すこと。
    pub fn new(
        token: CancellationToken,
        version: IcmpVersion,
        tx: mpsc::Sender<IcmpMessage>,
    ) -> Result<Self, IcmpListenerError> {
        let (domain, protocol) = match version {
            IcmpVersion::V4 => (Domain::IPV4, Protocol::ICMPV4),
            IcmpVersion::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };
        let socket = Socket::new(domain, Type::RAW, Some(protocol))
            .and_then(|socket| {
                socket.set_nonblocking(true)?;
                Ok(socket)
            })
            .and_then(AsyncFd::new)
            .map_err(|e| IcmpListenerError::Socket(version, e))?;

        Ok(Self {
            token,
            version,
            socket,
            tx,
        })
    }

    pub async fn run(self) -> Result<(), IcmpListenerError> {
        info!("Starting {:?} ICMP Listener", self.version);
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let len = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("{:?} ICMP Listener is stopping", self.version);
                    return Ok(());
                }
                len = self.recv(&mut buf) => len.map_err(|e| IcmpListenerError::Read(self.version, e))?,
            };

            match IcmpMessage::parse(self.version, &buf[..len]) {
                Ok(msg) => {
                    debug!("{:?} ICMP Listener: received {msg:?}", self.version);
                    self.tx
                        .send(msg)
                        .await
                        .map_err(|_| IcmpListenerError::ChannelClosed)?;
                }
                Err(e) => debug!("{:?} ICMP Listener: failed to parse: {e}", self.version),
            }
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.socket.readable().await?;
            match guard.try_io(|inner| {
                let mut socket = inner.get_ref();
                socket.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_icmp_listener_new() {
        // root権限の有無によって結果が変わるため、どちらの場合も許容する
        let (tx, _rx) = mpsc::channel(1);
        match IcmpListener::new(CancellationToken::new(), IcmpVersion::V4, tx) {
            Ok(listener) => assert_eq!(listener.version, IcmpVersion::V4),
            Err(e) => assert!(matches!(e, IcmpListenerError::Socket(IcmpVersion::V4, _))),
        }
    }

    #[tokio::test]
    async fn test_icmp_listener_stops_on_cancel() {
        // [正常系] キャンセルで終了する
        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let Ok(listener) = IcmpListener::new(token.clone(), IcmpVersion::V4, tx) else {
            return;
        };
        token.cancel();
        assert!(listener.run().await.is_ok());
    }

    #[test]
    fn test_icmp_listener_error_display() {
        let error = IcmpListenerError::Socket(
            IcmpVersion::V6,
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(
            error
                .to_string()
                .starts_with("Failed to open raw V6 ICMP socket:")
        );
        assert_eq!(
            IcmpListenerError::ChannelClosed.to_string(),
            "ICMP ingestion channel closed"
        );
    }
}

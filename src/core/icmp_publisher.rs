use fxhash::FxHashMap;
use log::{debug, info};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::icmp_message::IcmpMessage;

/// 購読者ごとのバッファの深さ
pub const SUBSCRIBER_DEPTH: usize = 10;

/// リスナーから受け取るICMPメッセージのバッファの深さ
const INGEST_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IcmpPublisherError {
    #[error("ICMP publisher has stopped")]
    Stopped,
}

enum Command {
    Subscribe(oneshot::Sender<(u64, mpsc::Receiver<IcmpMessage>)>),
    Unsubscribe(u64),
    #[cfg(test)]
    Count(oneshot::Sender<usize>),
}

/// ICMPメッセージを購読者に配信するイベントループ
///
/// 購読者の集合はこのループだけが所有し、購読・解除・配信は全てループ内で直列に処理される
pub struct IcmpPublisher {
    token: CancellationToken,
    subscribers: FxHashMap<u64, mpsc::Sender<IcmpMessage>>,
    next_id: u64,
    command_rx: mpsc::UnboundedReceiver<Command>,
    ingest_rx: mpsc::Receiver<IcmpMessage>,
}

/// 購読を要求するためのハンドル
#[derive(Debug, Clone)]
pub struct PublisherHandle {
    command_tx: mpsc::UnboundedSender<Command>,
}

/// 1つのプローブの購読
///
/// dropされると購読を解除する
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<IcmpMessage>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl IcmpPublisher {
    /// Publisherと購読用ハンドル、リスナーが使う送信チャネルを作成する
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        token: CancellationToken,
    ) -> (Self, PublisherHandle, mpsc::Sender<IcmpMessage>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (ingest_tx, ingest_rx) = mpsc::channel(INGEST_DEPTH);

        let publisher = Self {
            token,
            subscribers: FxHashMap::default(),
            next_id: 0,
            command_rx,
            ingest_rx,
        };
        (publisher, PublisherHandle { command_tx }, ingest_tx)
    }

    pub async fn run(mut self) {
        info!("Starting ICMP Publisher");
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("ICMP Publisher is stopping");
                    break;
                }
                Some(command) = self.command_rx.recv() => self.handle_command(command),
                msg = self.ingest_rx.recv() => match msg {
                    Some(msg) => {
                        let delivered = self.publish(&msg);
                        debug!("ICMP Publisher: {} delivered to {delivered} subscribers", msg.description);
                    }
                    None => {
                        debug!("ICMP Publisher: all listeners have stopped");
                        break;
                    }
                },
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe(reply) => {
                let (id, rx) = self.register();
                if reply.send((id, rx)).is_err() {
                    // 要求元が既にいない
                    self.deregister(id);
                }
            }
            Command::Unsubscribe(id) => self.deregister(id),
            #[cfg(test)]
            Command::Count(reply) => {
                let _ = reply.send(self.subscribers.len());
            }
        }
    }

    fn register(&mut self) -> (u64, mpsc::Receiver<IcmpMessage>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_DEPTH);
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    fn deregister(&mut self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// 全ての購読者にノンブロッキングで送信する
    ///
    /// バッファが埋まっている購読者には届けない。送信できた数を返す。
    fn publish(&mut self, msg: &IcmpMessage) -> usize {
        let mut delivered = 0;
        self.subscribers
            .retain(|_, tx| match tx.try_send(msg.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
        delivered
    }
}

impl PublisherHandle {
    pub async fn subscribe(&self) -> Result<Subscription, IcmpPublisherError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Subscribe(reply_tx))
            .map_err(|_| IcmpPublisherError::Stopped)?;
        let (id, rx) = reply_rx.await.map_err(|_| IcmpPublisherError::Stopped)?;
        Ok(Subscription {
            id,
            rx,
            command_tx: self.command_tx.clone(),
        })
    }

    /// 現在の購読者数
    ///
    /// 先に送られた購読解除が処理された後の数を返す
    #[cfg(test)]
    pub async fn subscriber_count(&self) -> Result<usize, IcmpPublisherError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Count(reply_tx))
            .map_err(|_| IcmpPublisherError::Stopped)?;
        reply_rx.await.map_err(|_| IcmpPublisherError::Stopped)
    }
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<IcmpMessage> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.command_tx.send(Command::Unsubscribe(self.id));
    }
}

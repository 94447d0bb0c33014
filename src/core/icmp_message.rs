use std::net::SocketAddr;

use tcpip::TryFromBytes;
use tcpip::icmp::{ICMPError, ICMPMessage, MessageType};
use tcpip::ipv4::{IPv4Error, IPv4Packet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IcmpParseError {
    #[error(transparent)]
    InvalidIPv4Packet(#[from] IPv4Error),
    #[error(transparent)]
    InvalidICMPMessage(#[from] ICMPError),
    #[error("Not a useful ICMPv4 message: {0}")]
    NotUseful(MessageType),
    #[error("Unparsable ICMP message")]
    Unparsable,
}

/// ICMPを受信するソケットのアドレスファミリー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpVersion {
    V4,
    V6,
}

/// ICMPエラーに埋め込まれた元パケットのアドレスとプロトコル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPacket {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub protocol: String,
}

/// 受信したICMPメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpMessage {
    pub msg_type: MessageType,
    pub code: u8,
    pub description: String,

    /// エラーメッセージの場合のみ
    pub original: Option<OriginalPacket>,
}

impl IcmpMessage {
    /// rawソケットから読み取ったデータグラムを解釈する
    ///
    /// IPv4のrawソケットはIPヘッダー付きで届くため、先に外側のヘッダーを取り除く
    pub fn parse(version: IcmpVersion, datagram: &[u8]) -> Result<Self, IcmpParseError> {
        match version {
            IcmpVersion::V4 => {
                let packet = IPv4Packet::try_from_bytes(datagram)?;
                Self::from_icmpv4(&packet.payload)
            }
            IcmpVersion::V6 => Err(IcmpParseError::Unparsable),
        }
    }

    pub fn from_icmpv4(bytes: &[u8]) -> Result<Self, IcmpParseError> {
        let message = ICMPMessage::try_from_bytes(bytes)?;
        if let ICMPMessage::Echo(_) = message {
            return Err(IcmpParseError::NotUseful(MessageType::Echo));
        }

        // ポートを持たないプロトコルの元パケットはプローブと照合できない
        let original = message
            .original_datagram()
            .filter(|original| original.protocol().has_ports())
            .map(|original| OriginalPacket {
                local: original.source().into(),
                remote: original.destination().into(),
                protocol: original.protocol().to_string(),
            });
        Ok(Self {
            msg_type: message.message_type(),
            code: message.code(),
            description: message.description(),
            original,
        })
    }

    pub fn is_unreachable(&self) -> bool {
        self.msg_type == MessageType::DestinationUnreachable
    }

    /// 指定したプローブが引き起こしたICMPエラーか
    ///
    /// 元パケットの送信元/宛先が実際に使ったアドレスと一致し、
    /// プロトコル名がネットワーク指定の先頭と大文字小文字を区別せず一致する場合に真
    pub fn correlates_with(&self, local: SocketAddr, remote: SocketAddr, network: &str) -> bool {
        let Some(original) = &self.original else {
            return false;
        };
        if original.local != local || original.remote != remote || original.protocol.is_empty() {
            return false;
        }
        network
            .get(..original.protocol.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&original.protocol))
    }
}

use std::fmt::{self, Display};

use thiserror::Error;

use crate::TryFromBytes;
use crate::icmp::MessageType;
use crate::icmp::message::{ICMP_HEADER_LENGTH, Message, OriginalDatagram, OriginalDatagramError};

/// Destination Unreachableメッセージのコード
///
/// RFC 792およびRFC 1812で定義されたDestination Unreachableの詳細コード
/// 未定義のコードも[`DestinationUnreachableCode::Other`]として受け入れる
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationUnreachableCode {
    /// ネットワーク到達不可
    NetworkUnreachable,

    /// ホスト到達不可
    HostUnreachable,

    /// プロトコル到達不可
    ProtocolUnreachable,

    /// ポート到達不可
    PortUnreachable,

    /// フラグメンテーション必要だがDF bit設定済み
    FragmentationNeededAndDFSet,

    /// ソースルート失敗
    SourceRouteFailed,

    /// 宛先ネットワーク不明
    DestinationNetworkUnknown,

    /// 宛先ホスト不明
    DestinationHostUnknown,

    /// 送信元ホスト孤立
    SourceHostIsolated,

    /// 宛先ネットワークへの通信が管理上禁止
    NetworkAdministrativelyProhibited,

    /// 宛先ホストへの通信が管理上禁止
    HostAdministrativelyProhibited,

    /// 指定のToSではネットワーク到達不可
    NetworkUnreachableForTos,

    /// 指定のToSではホスト到達不可
    HostUnreachableForTos,

    /// フィルタリングにより通信が管理上禁止
    CommunicationAdministrativelyProhibited,

    /// ホスト優先度違反
    HostPrecedenceViolation,

    /// 優先度カットオフ
    PrecedenceCutoffInEffect,

    /// 未定義のコード
    Other(u8),
}

impl Display for DestinationUnreachableCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DestinationUnreachableCode::NetworkUnreachable => "Network unreachable",
            DestinationUnreachableCode::HostUnreachable => "Host unreachable",
            DestinationUnreachableCode::ProtocolUnreachable => {
                "Protocol unreachable (the transport protocol is not supported by the destination)"
            }
            DestinationUnreachableCode::PortUnreachable => {
                "Port unreachable (nothing is listening on the destination port)"
            }
            DestinationUnreachableCode::FragmentationNeededAndDFSet => {
                "Fragmentation needed but the don't fragment (DF) flag is set"
            }
            DestinationUnreachableCode::SourceRouteFailed => "Source route failed",
            DestinationUnreachableCode::DestinationNetworkUnknown => "Destination network unknown",
            DestinationUnreachableCode::DestinationHostUnknown => "Destination host unknown",
            DestinationUnreachableCode::SourceHostIsolated => "Source host isolated",
            DestinationUnreachableCode::NetworkAdministrativelyProhibited => {
                "Destination network administratively prohibited"
            }
            DestinationUnreachableCode::HostAdministrativelyProhibited => {
                "Destination host administratively prohibited"
            }
            DestinationUnreachableCode::NetworkUnreachableForTos => {
                "Network unreachable for type of service"
            }
            DestinationUnreachableCode::HostUnreachableForTos => {
                "Host unreachable for type of service"
            }
            DestinationUnreachableCode::CommunicationAdministrativelyProhibited => {
                "Communication administratively prohibited (filtered on the path)"
            }
            DestinationUnreachableCode::HostPrecedenceViolation => "Host precedence violation",
            DestinationUnreachableCode::PrecedenceCutoffInEffect => "Precedence cutoff in effect",
            DestinationUnreachableCode::Other(code) => {
                return write!(f, "Destination unreachable (code {code})");
            }
        };
        write!(f, "{text}")
    }
}

impl From<u8> for DestinationUnreachableCode {
    fn from(value: u8) -> Self {
        match value {
            0 => DestinationUnreachableCode::NetworkUnreachable,
            1 => DestinationUnreachableCode::HostUnreachable,
            2 => DestinationUnreachableCode::ProtocolUnreachable,
            3 => DestinationUnreachableCode::PortUnreachable,
            4 => DestinationUnreachableCode::FragmentationNeededAndDFSet,
            5 => DestinationUnreachableCode::SourceRouteFailed,
            6 => DestinationUnreachableCode::DestinationNetworkUnknown,
            7 => DestinationUnreachableCode::DestinationHostUnknown,
            8 => DestinationUnreachableCode::SourceHostIsolated,
            9 => DestinationUnreachableCode::NetworkAdministrativelyProhibited,
            10 => DestinationUnreachableCode::HostAdministrativelyProhibited,
            11 => DestinationUnreachableCode::NetworkUnreachableForTos,
            12 => DestinationUnreachableCode::HostUnreachableForTos,
            13 => DestinationUnreachableCode::CommunicationAdministrativelyProhibited,
            14 => DestinationUnreachableCode::HostPrecedenceViolation,
            15 => DestinationUnreachableCode::PrecedenceCutoffInEffect,
            value => DestinationUnreachableCode::Other(value),
        }
    }
}

impl From<DestinationUnreachableCode> for u8 {
    fn from(value: DestinationUnreachableCode) -> Self {
        match value {
            DestinationUnreachableCode::NetworkUnreachable => 0,
            DestinationUnreachableCode::HostUnreachable => 1,
            DestinationUnreachableCode::ProtocolUnreachable => 2,
            DestinationUnreachableCode::PortUnreachable => 3,
            DestinationUnreachableCode::FragmentationNeededAndDFSet => 4,
            DestinationUnreachableCode::SourceRouteFailed => 5,
            DestinationUnreachableCode::DestinationNetworkUnknown => 6,
            DestinationUnreachableCode::DestinationHostUnknown => 7,
            DestinationUnreachableCode::SourceHostIsolated => 8,
            DestinationUnreachableCode::NetworkAdministrativelyProhibited => 9,
            DestinationUnreachableCode::HostAdministrativelyProhibited => 10,
            DestinationUnreachableCode::NetworkUnreachableForTos => 11,
            DestinationUnreachableCode::HostUnreachableForTos => 12,
            DestinationUnreachableCode::CommunicationAdministrativelyProhibited => 13,
            DestinationUnreachableCode::HostPrecedenceViolation => 14,
            DestinationUnreachableCode::PrecedenceCutoffInEffect => 15,
            DestinationUnreachableCode::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationUnreachableMessageError {
    #[error("Invalid destination unreachable message type. Expected 3, but got {0}.")]
    InvalidMessageType(u8),
    #[error(
        "Invalid destination unreachable message length. Expected at least 8 bytes, but got {0} bytes."
    )]
    InvalidMessageLength(usize),
    #[error(transparent)]
    InvalidOriginalDatagram(#[from] OriginalDatagramError),
}

/// Destination Unreachable メッセージ
///
/// RFC 792で定義されたDestination Unreachable (Type 3) のメッセージ構造
/// パケットが宛先に到達できない場合に送信される
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationUnreachableMessage {
    /// Code
    /// Destination Unreachableの詳細な理由を示すコード
    pub code: DestinationUnreachableCode,

    /// Checksum
    pub checksum: u16,

    /// Next Hop MTU
    /// [`DestinationUnreachableCode::FragmentationNeededAndDFSet`]の場合のみ
    pub next_hop_mtu: Option<u16>,

    /// Original Datagram
    /// 元のIPヘッダー + 最初の64ビットのデータ
    pub original_datagram: OriginalDatagram,
}

impl TryFromBytes for DestinationUnreachableMessage {
    type Error = DestinationUnreachableMessageError;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, Self::Error> {
        let bytes = value.as_ref();
        if bytes.len() < ICMP_HEADER_LENGTH {
            return Err(DestinationUnreachableMessageError::InvalidMessageLength(
                bytes.len(),
            ));
        }
        if bytes[0] != u8::from(MessageType::DestinationUnreachable) {
            return Err(DestinationUnreachableMessageError::InvalidMessageType(
                bytes[0],
            ));
        }

        let code = DestinationUnreachableCode::from(bytes[1]);
        let checksum = u16::from_be_bytes([bytes[2], bytes[3]]);
        let next_hop_mtu = match code {
            DestinationUnreachableCode::FragmentationNeededAndDFSet => {
                Some(u16::from_be_bytes([bytes[6], bytes[7]]))
            }
            _ => None,
        };
        let original_datagram = OriginalDatagram::try_from_bytes(&bytes[ICMP_HEADER_LENGTH..])?;

        Ok(Self {
            code,
            checksum,
            next_hop_mtu,
            original_datagram,
        })
    }
}

impl Message for DestinationUnreachableMessage {
    fn msg_type(&self) -> MessageType {
        MessageType::DestinationUnreachable
    }

    fn code(&self) -> u8 {
        self.code.into()
    }

    fn description(&self) -> String {
        self.code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::message::tests::ORIGINAL_UDP_DATAGRAM;
    use crate::ipv4::Protocol;

    fn message_bytes(code: u8) -> Vec<u8> {
        let mut bytes = vec![0x03, code, 0x00, 0x00, 0x00, 0x00, 0x05, 0xdc];
        bytes.extend_from_slice(&ORIGINAL_UDP_DATAGRAM);
        bytes
    }

    #[test]
    fn test_destination_unreachable_from_bytes() {
        // [正常系] Port Unreachable
        let msg = DestinationUnreachableMessage::try_from_bytes(message_bytes(3)).unwrap();
        assert_eq!(msg.code, DestinationUnreachableCode::PortUnreachable);
        assert_eq!(msg.next_hop_mtu, None);
        assert_eq!(msg.original_datagram.protocol(), Protocol::UDP);
        assert_eq!(msg.original_datagram.ports(), (40000, 53));
        assert_eq!(msg.msg_type(), MessageType::DestinationUnreachable);
        assert_eq!(msg.code(), 3);

        // [正常系] Fragmentation NeededはNext Hop MTUを持つ
        let msg = DestinationUnreachableMessage::try_from_bytes(message_bytes(4)).unwrap();
        assert_eq!(msg.next_hop_mtu, Some(1500));

        // [正常系] RFC 1812で追加されたコード
        let msg = DestinationUnreachableMessage::try_from_bytes(message_bytes(13)).unwrap();
        assert_eq!(
            msg.code,
            DestinationUnreachableCode::CommunicationAdministrativelyProhibited
        );

        // [正常系] 未定義のコードも元データグラムごと受け入れる
        let msg = DestinationUnreachableMessage::try_from_bytes(message_bytes(16)).unwrap();
        assert_eq!(msg.code, DestinationUnreachableCode::Other(16));
        assert_eq!(msg.code(), 16);
        assert_eq!(msg.description(), "Destination unreachable (code 16)");
        assert_eq!(msg.original_datagram.ports(), (40000, 53));
    }

    #[test]
    fn test_destination_unreachable_from_invalid_bytes() {
        // [異常系] 8バイト未満
        let result = DestinationUnreachableMessage::try_from_bytes([0x03u8, 0x03, 0x00]);
        assert_eq!(
            result,
            Err(DestinationUnreachableMessageError::InvalidMessageLength(3))
        );

        // [異常系] タイプ不一致
        let mut bytes = message_bytes(3);
        bytes[0] = 11;
        let result = DestinationUnreachableMessage::try_from_bytes(&bytes);
        assert_eq!(
            result,
            Err(DestinationUnreachableMessageError::InvalidMessageType(11))
        );

        // [異常系] 元データグラムが短すぎる
        let bytes = message_bytes(3);
        let result = DestinationUnreachableMessage::try_from_bytes(&bytes[..20]);
        assert!(matches!(
            result,
            Err(DestinationUnreachableMessageError::InvalidOriginalDatagram(_))
        ));
    }

    #[test]
    fn test_destination_unreachable_code_display() {
        assert_eq!(
            DestinationUnreachableCode::NetworkUnreachable.to_string(),
            "Network unreachable"
        );
        assert_eq!(
            DestinationUnreachableCode::PrecedenceCutoffInEffect.to_string(),
            "Precedence cutoff in effect"
        );
        assert_eq!(u8::from(DestinationUnreachableCode::PortUnreachable), 3);
        assert_eq!(
            DestinationUnreachableCode::from(15),
            DestinationUnreachableCode::PrecedenceCutoffInEffect
        );
        assert_eq!(u8::from(DestinationUnreachableCode::from(200)), 200);
    }
}

pub mod destination_unreachable;
pub mod echo;
pub mod parameter_problem;
pub mod time_exceeded;

use std::net::SocketAddrV4;

use thiserror::Error;

pub use self::destination_unreachable::{
    DestinationUnreachableMessage, DestinationUnreachableMessageError,
};
pub use self::echo::{EchoMessage, EchoMessageError};
pub use self::parameter_problem::{ParameterProblemMessage, ParameterProblemMessageError};
pub use self::time_exceeded::{TimeExceededMessage, TimeExceededMessageError};
use crate::TryFromBytes;
use crate::icmp::MessageType;
use crate::ipv4::{IPv4Error, IPv4Packet, MIN_HEADER_LENGTH, Protocol};

/// ICMPヘッダーの長さ（Type, Code, Checksum, 4バイトのタイプ依存フィールド）
pub const ICMP_HEADER_LENGTH: usize = 8;

/// 元データグラムから読み取るトランスポートヘッダーの最小長（送信元/宛先ポート）
const MIN_TRANSPORT_LENGTH: usize = 4;

/// ICMPメッセージの共通インターフェース
///
/// [`crate::icmp::ICMPMessage`]はこのトレイトを通して各メッセージに処理を委譲する
pub trait Message {
    /// メッセージタイプを取得
    fn msg_type(&self) -> MessageType;

    /// メッセージコードを取得
    fn code(&self) -> u8;

    /// 人が読むための説明文
    fn description(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginalDatagramError {
    #[error(
        "Original datagram is too short. Expected at least {0} bytes, but got {1} bytes."
    )]
    TooShort(usize, usize),
    #[error(transparent)]
    InvalidHeader(#[from] IPv4Error),
}

/// ICMPエラーメッセージに埋め込まれた元のデータグラム
///
/// 元のIPv4ヘッダーと、それに続くトランスポートヘッダーの先頭部分を保持する。
/// ルーターが返すのは最低でもIPヘッダー + 64ビットのため、ポート番号までは必ず読める。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalDatagram {
    /// 元のIPv4ヘッダー
    /// payloadにはトランスポートヘッダーの先頭部分が入る
    pub header: IPv4Packet,
}

impl OriginalDatagram {
    /// 元のパケットの上位プロトコル
    pub fn protocol(&self) -> Protocol {
        self.header.protocol
    }

    /// 元のトランスポートヘッダーの(送信元ポート, 宛先ポート)
    ///
    /// TCP/UDP/SCTPの場合のみ意味を持つ
    pub fn ports(&self) -> (u16, u16) {
        let data = &self.header.payload;
        (
            u16::from_be_bytes([data[0], data[1]]),
            u16::from_be_bytes([data[2], data[3]]),
        )
    }

    /// 元のパケットの送信元ソケットアドレス
    pub fn source(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.header.src, self.ports().0)
    }

    /// 元のパケットの宛先ソケットアドレス
    pub fn destination(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.header.dst, self.ports().1)
    }
}

impl TryFromBytes for OriginalDatagram {
    type Error = OriginalDatagramError;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, Self::Error> {
        let bytes = value.as_ref();
        if bytes.len() < MIN_HEADER_LENGTH + MIN_TRANSPORT_LENGTH {
            return Err(OriginalDatagramError::TooShort(
                MIN_HEADER_LENGTH + MIN_TRANSPORT_LENGTH,
                bytes.len(),
            ));
        }
        let header = IPv4Packet::try_from_bytes(bytes)?;
        if header.payload.len() < MIN_TRANSPORT_LENGTH {
            // オプション付きヘッダーの後ろにポートが収まっていない
            return Err(OriginalDatagramError::TooShort(
                header.header_len() + MIN_TRANSPORT_LENGTH,
                bytes.len(),
            ));
        }

        Ok(Self { header })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    /// 10.0.0.1:40000 -> 192.0.2.10:53 のUDPパケット（IPヘッダー + UDPヘッダー）
    pub(crate) const ORIGINAL_UDP_DATAGRAM: [u8; 28] = [
        0x45, 0x00, 0x00, 0x2e, // Version/IHL, ToS, Total Length
        0x00, 0x01, 0x40, 0x00, // Identification, Flags/Fragment Offset
        0x40, 0x11, 0x00, 0x00, // TTL, Protocol (UDP), Checksum
        0x0a, 0x00, 0x00, 0x01, // Source Address
        0xc0, 0x00, 0x02, 0x0a, // Destination Address
        0x9c, 0x40, // Source Port (40000)
        0x00, 0x35, // Destination Port (53)
        0x00, 0x1a, 0x00, 0x00, // Length, Checksum
    ];

    #[test]
    fn test_original_datagram_from_bytes() {
        // [正常系] UDPデータグラムからアドレスとポートを取得
        let datagram = OriginalDatagram::try_from_bytes(ORIGINAL_UDP_DATAGRAM).unwrap();
        assert_eq!(datagram.protocol(), Protocol::UDP);
        assert_eq!(datagram.ports(), (40000, 53));
        assert_eq!(
            datagram.source(),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 40000)
        );
        assert_eq!(
            datagram.destination(),
            SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 10), 53)
        );
    }

    #[test]
    fn test_original_datagram_too_short() {
        // [異常系] IPヘッダー + 4バイトに満たない
        let result = OriginalDatagram::try_from_bytes(&ORIGINAL_UDP_DATAGRAM[..23]);
        assert_eq!(result, Err(OriginalDatagramError::TooShort(24, 23)));

        // [異常系] オプション付きヘッダーでポートが欠けている
        let mut bytes = ORIGINAL_UDP_DATAGRAM;
        bytes[0] = 0x46;
        let result = OriginalDatagram::try_from_bytes(&bytes[..25]);
        assert_eq!(result, Err(OriginalDatagramError::TooShort(28, 25)));

        // [異常系] 不正なIPヘッダー
        let mut bytes = ORIGINAL_UDP_DATAGRAM;
        bytes[0] = 0x65;
        let result = OriginalDatagram::try_from_bytes(bytes);
        assert!(matches!(
            result,
            Err(OriginalDatagramError::InvalidHeader(
                IPv4Error::InvalidVersion(6)
            ))
        ));
    }
}

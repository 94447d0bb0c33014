mod protocol;

use std::net::Ipv4Addr;

use thiserror::Error;

pub use self::protocol::Protocol;
use crate::TryFromBytes;

/// IPv4ヘッダーの最小長（オプションなし）
pub const MIN_HEADER_LENGTH: usize = 20;

/// IPv4パケット処理に関するエラー
///
/// IPv4パケットのパース・検証で発生する可能性のあるエラーを定義します。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IPv4Error {
    #[error("Invalid IPv4 packet length: must be at least {0} bytes, but got {1} bytes")]
    InvalidPacketLength(usize, usize),

    #[error("Invalid IPv4 Version: must be 4 but {0}")]
    InvalidVersion(u8),

    #[error("Invalid IPv4 Header Length: must be at least 5 (20 bytes) but {0}")]
    InvalidHeaderLength(u8),
}

/// IPv4パケット
///
/// 受信したIPv4パケットのヘッダーとペイロードを表現します。
/// ICMPエラーメッセージに埋め込まれた元データグラムのように、
/// Total Lengthより短く切り詰められたパケットもそのまま扱います。
///
/// 参照:
/// - [RFC 791 - Internet Protocol](https://tools.ietf.org/rfc/rfc791.txt)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IPv4Packet {
    /// IP Headerの長さ
    /// ４Byte単位で表される
    /// 例: 20ByteのIP Headerは5
    pub internet_header_length: u8,

    /// Total Length
    /// 元のIPパケット全体の長さ
    pub total_length: u16,

    /// Time to Live
    pub time_to_live: u8,

    /// Protocol
    /// 上位プロトコル
    pub protocol: Protocol,

    /// Source IP Address
    pub src: Ipv4Addr,

    /// Destination IP Address
    pub dst: Ipv4Addr,

    /// Options
    pub options: Vec<u8>,

    /// Payload
    /// 受信できた範囲のペイロード
    pub payload: Vec<u8>,
}

impl IPv4Packet {
    /// バージョン
    /// 常に4
    pub const VERSION: u8 = 4;

    /// ヘッダー長（バイト単位）
    pub fn header_len(&self) -> usize {
        (self.internet_header_length as usize) * 4
    }
}

impl TryFromBytes for IPv4Packet {
    type Error = IPv4Error;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, IPv4Error> {
        let value = value.as_ref();
        if value.len() < MIN_HEADER_LENGTH {
            return Err(IPv4Error::InvalidPacketLength(
                MIN_HEADER_LENGTH,
                value.len(),
            ));
        }

        let version = value[0] >> 4;
        if version != Self::VERSION {
            return Err(IPv4Error::InvalidVersion(version));
        }
        let ihl = value[0] & 0x0F;
        if ihl < 5 {
            return Err(IPv4Error::InvalidHeaderLength(ihl));
        }
        let header_end = (ihl as usize) * 4;
        if value.len() < header_end {
            // オプション部分まで受信できていない
            return Err(IPv4Error::InvalidPacketLength(header_end, value.len()));
        }

        Ok(Self {
            internet_header_length: ihl,
            total_length: u16::from_be_bytes([value[2], value[3]]),
            time_to_live: value[8],
            protocol: Protocol::from(value[9]),
            src: Ipv4Addr::new(value[12], value[13], value[14], value[15]),
            dst: Ipv4Addr::new(value[16], value[17], value[18], value[19]),
            options: value[MIN_HEADER_LENGTH..header_end].to_vec(),
            payload: value[header_end..].to_vec(),
        })
    }
}

impl TryFrom<&[u8]> for IPv4Packet {
    type Error = IPv4Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UDP_PACKET_BYTES: [u8; 28] = [
        0x45, // Version and IHL
        0x00, // Type of Service
        0x00, 0x2e, // Total Length (46)
        0x12, 0x34, // Identification
        0x40, 0x00, // Flags (DF) and Fragment Offset
        0x40, // Time to Live
        0x11, // Protocol (UDP)
        0x00, 0x00, // Header Checksum
        0xc0, 0xa8, 0x01, 0x01, // Source Address
        0xc0, 0xa8, 0x01, 0x02, // Destination Address
        0xd4, 0x31, // Source Port (54321)
        0x00, 0x35, // Destination Port (53)
        0x00, 0x1a, // Length
        0x00, 0x00, // Checksum
    ];

    #[test]
    fn test_ipv4_packet_from_bytes() {
        // [正常系] 切り詰められたUDPパケットのパース
        let packet = IPv4Packet::try_from_bytes(UDP_PACKET_BYTES).unwrap();
        assert_eq!(packet.internet_header_length, 5);
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.total_length, 46);
        assert_eq!(packet.time_to_live, 64);
        assert_eq!(packet.protocol, Protocol::UDP);
        assert_eq!(packet.src, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(packet.dst, Ipv4Addr::new(192, 168, 1, 2));
        assert!(packet.options.is_empty());
        assert_eq!(packet.payload, UDP_PACKET_BYTES[20..].to_vec());

        // [正常系] TryFrom<&[u8]>経由
        let packet = IPv4Packet::try_from(&UDP_PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.protocol, Protocol::UDP);
    }

    #[test]
    fn test_ipv4_packet_with_options() {
        // [正常系] IHL=6（4バイトのオプション付き）
        let mut bytes = UDP_PACKET_BYTES[..20].to_vec();
        bytes[0] = 0x46;
        bytes.extend_from_slice(&[0x01, 0x01, 0x01, 0x00]);
        bytes.extend_from_slice(&UDP_PACKET_BYTES[20..]);

        let packet = IPv4Packet::try_from_bytes(&bytes).unwrap();
        assert_eq!(packet.header_len(), 24);
        assert_eq!(packet.options, vec![0x01, 0x01, 0x01, 0x00]);
        assert_eq!(packet.payload, UDP_PACKET_BYTES[20..].to_vec());
    }

    #[test]
    fn test_ipv4_packet_from_invalid_bytes() {
        // [異常系] 20バイト未満
        let result = IPv4Packet::try_from_bytes([0x45u8; 19]);
        assert_eq!(result, Err(IPv4Error::InvalidPacketLength(20, 19)));

        // [異常系] バージョンが4以外
        let mut invalid_version = UDP_PACKET_BYTES;
        invalid_version[0] = 0x65;
        let result = IPv4Packet::try_from_bytes(invalid_version);
        assert_eq!(result, Err(IPv4Error::InvalidVersion(6)));

        // [異常系] IHLが5未満
        let mut invalid_ihl = UDP_PACKET_BYTES;
        invalid_ihl[0] = 0x44;
        let result = IPv4Packet::try_from_bytes(invalid_ihl);
        assert_eq!(result, Err(IPv4Error::InvalidHeaderLength(4)));

        // [異常系] IHLが示すヘッダー長に満たない
        let mut truncated = UDP_PACKET_BYTES[..20].to_vec();
        truncated[0] = 0x4f;
        let result = IPv4Packet::try_from_bytes(&truncated);
        assert_eq!(result, Err(IPv4Error::InvalidPacketLength(60, 20)));
    }
}

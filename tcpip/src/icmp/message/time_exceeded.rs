use std::fmt::{self, Display};

use thiserror::Error;

use crate::TryFromBytes;
use crate::icmp::MessageType;
use crate::icmp::message::{ICMP_HEADER_LENGTH, Message, OriginalDatagram, OriginalDatagramError};

/// Time Exceededメッセージのコード
///
/// RFC 792で定義されたTime Exceededの詳細コード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExceededCode {
    /// Time to Live exceeded in Transit
    /// TTL超過（転送中）
    TtlExceeded,

    /// Fragment Reassembly Time Exceeded
    /// フラグメント再構成時間超過
    FragmentReassemblyTimeExceeded,

    /// 未定義のコード
    Other(u8),
}

impl Display for TimeExceededCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeExceededCode::TtlExceeded => write!(f, "Time-to-live exceeded in transit"),
            TimeExceededCode::FragmentReassemblyTimeExceeded => {
                write!(f, "Fragment reassembly time exceeded")
            }
            TimeExceededCode::Other(code) => write!(f, "Time exceeded (code {code})"),
        }
    }
}

impl From<u8> for TimeExceededCode {
    fn from(value: u8) -> Self {
        match value {
            0 => TimeExceededCode::TtlExceeded,
            1 => TimeExceededCode::FragmentReassemblyTimeExceeded,
            value => TimeExceededCode::Other(value),
        }
    }
}

impl From<TimeExceededCode> for u8 {
    fn from(value: TimeExceededCode) -> Self {
        match value {
            TimeExceededCode::TtlExceeded => 0,
            TimeExceededCode::FragmentReassemblyTimeExceeded => 1,
            TimeExceededCode::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeExceededMessageError {
    #[error("Invalid time exceeded message type. Expected 11, but got {0}.")]
    InvalidMessageType(u8),
    #[error("Invalid time exceeded message length. Expected at least 8 bytes, but got {0} bytes.")]
    InvalidMessageLength(usize),
    #[error(transparent)]
    InvalidOriginalDatagram(#[from] OriginalDatagramError),
}

/// Time Exceeded メッセージ
///
/// RFC 792で定義されたTime Exceeded (Type 11) のメッセージ構造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeExceededMessage {
    /// Code
    pub code: TimeExceededCode,

    /// Checksum
    pub checksum: u16,

    /// Original Datagram
    /// 元のIPヘッダー + 最初の64ビットのデータ
    pub original_datagram: OriginalDatagram,
}

impl TryFromBytes for TimeExceededMessage {
    type Error = TimeExceededMessageError;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, Self::Error> {
        let bytes = value.as_ref();
        if bytes.len() < ICMP_HEADER_LENGTH {
            return Err(TimeExceededMessageError::InvalidMessageLength(bytes.len()));
        }
        if bytes[0] != u8::from(MessageType::TimeExceeded) {
            return Err(TimeExceededMessageError::InvalidMessageType(bytes[0]));
        }

        let code = TimeExceededCode::from(bytes[1]);
        let checksum = u16::from_be_bytes([bytes[2], bytes[3]]);
        let original_datagram = OriginalDatagram::try_from_bytes(&bytes[ICMP_HEADER_LENGTH..])?;

        Ok(Self {
            code,
            checksum,
            original_datagram,
        })
    }
}

impl Message for TimeExceededMessage {
    fn msg_type(&self) -> MessageType {
        MessageType::TimeExceeded
    }

    fn code(&self) -> u8 {
        self.code.into()
    }

    fn description(&self) -> String {
        self.code.to_string()
    }
}

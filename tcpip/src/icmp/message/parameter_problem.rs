use std::fmt::{self, Display};

use thiserror::Error;

use crate::TryFromBytes;
use crate::icmp::MessageType;
use crate::icmp::message::{ICMP_HEADER_LENGTH, Message, OriginalDatagram, OriginalDatagramError};

/// Parameter Problemメッセージのコード
///
/// RFC 792およびRFC 1108で定義されたParameter Problemの詳細コード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterProblemCode {
    /// Pointerがエラー位置を示す
    PointerIndicatesError,

    /// 必須オプションの欠落
    MissingRequiredOption,

    /// 長さ不正
    BadLength,

    /// 未定義のコード
    Other(u8),
}

impl Display for ParameterProblemCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterProblemCode::PointerIndicatesError => {
                write!(f, "Pointer indicates the error")
            }
            ParameterProblemCode::MissingRequiredOption => {
                write!(f, "Missing a required option")
            }
            ParameterProblemCode::BadLength => write!(f, "Bad length"),
            ParameterProblemCode::Other(code) => write!(f, "Parameter problem (code {code})"),
        }
    }
}

impl From<u8> for ParameterProblemCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ParameterProblemCode::PointerIndicatesError,
            1 => ParameterProblemCode::MissingRequiredOption,
            2 => ParameterProblemCode::BadLength,
            value => ParameterProblemCode::Other(value),
        }
    }
}

impl From<ParameterProblemCode> for u8 {
    fn from(value: ParameterProblemCode) -> Self {
        match value {
            ParameterProblemCode::PointerIndicatesError => 0,
            ParameterProblemCode::MissingRequiredOption => 1,
            ParameterProblemCode::BadLength => 2,
            ParameterProblemCode::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterProblemMessageError {
    #[error("Invalid parameter problem message type. Expected 12, but got {0}.")]
    InvalidMessageType(u8),
    #[error(
        "Invalid parameter problem message length. Expected at least 8 bytes, but got {0} bytes."
    )]
    InvalidMessageLength(usize),
    #[error(transparent)]
    InvalidOriginalDatagram(#[from] OriginalDatagramError),
}

/// Parameter Problem メッセージ
///
/// RFC 792で定義されたParameter Problem (Type 12) のメッセージ構造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterProblemMessage {
    /// Code
    pub code: ParameterProblemCode,

    /// Checksum
    pub checksum: u16,

    /// Pointer
    /// 問題のあるオクテットの位置（code 0の場合）
    pub pointer: u8,

    /// Original Datagram
    pub original_datagram: OriginalDatagram,
}

impl TryFromBytes for ParameterProblemMessage {
    type Error = ParameterProblemMessageError;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, Self::Error> {
        let bytes = value.as_ref();
        if bytes.len() < ICMP_HEADER_LENGTH {
            return Err(ParameterProblemMessageError::InvalidMessageLength(
                bytes.len(),
            ));
        }
        if bytes[0] != u8::from(MessageType::ParameterProblem) {
            return Err(ParameterProblemMessageError::InvalidMessageType(bytes[0]));
        }

        let code = ParameterProblemCode::from(bytes[1]);
        let checksum = u16::from_be_bytes([bytes[2], bytes[3]]);
        let pointer = bytes[4];
        let original_datagram = OriginalDatagram::try_from_bytes(&bytes[ICMP_HEADER_LENGTH..])?;

        Ok(Self {
            code,
            checksum,
            pointer,
            original_datagram,
        })
    }
}

impl Message for ParameterProblemMessage {
    fn msg_type(&self) -> MessageType {
        MessageType::ParameterProblem
    }

    fn code(&self) -> u8 {
        self.code.into()
    }

    fn description(&self) -> String {
        match self.code {
            ParameterProblemCode::PointerIndicatesError => {
                format!("{} (pointer {})", self.code, self.pointer)
            }
            _ => self.code.to_string(),
        }
    }
}

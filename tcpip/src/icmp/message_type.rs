use std::fmt::{self, Display};

use thiserror::Error;

use crate::TryFromBytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MessageTypeError {
    #[error("Invalid message type value: {0}")]
    InvalidValue(u8),
    #[error("Invalid message type bytes length. Expected 1 byte, but got {0} bytes.")]
    InvalidBytesLength(usize),
}

/// ICMPメッセージタイプ
///
/// RFC 792で定義されたICMPメッセージタイプのうち、受信側で解釈するもの
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Echo Reply
    /// Echoリクエストへの応答
    EchoReply = 0,

    /// Destination Unreachable
    /// 宛先到達不可
    DestinationUnreachable = 3,

    /// Echo
    /// Echoリクエスト
    Echo = 8,

    /// Time Exceeded
    /// TTL超過
    TimeExceeded = 11,

    /// Parameter Problem
    /// パラメータ問題
    ParameterProblem = 12,
}

impl Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::EchoReply => write!(f, "Echo Reply"),
            MessageType::DestinationUnreachable => write!(f, "Destination Unreachable"),
            MessageType::Echo => write!(f, "Echo Request"),
            MessageType::TimeExceeded => write!(f, "Time Exceeded"),
            MessageType::ParameterProblem => write!(f, "Parameter Problem"),
        }
    }
}

impl TryFromBytes for MessageType {
    type Error = MessageTypeError;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, MessageTypeError> {
        let bytes = value.as_ref();
        if bytes.len() != 1 {
            return Err(MessageTypeError::InvalidBytesLength(bytes.len()));
        }

        Self::try_from(bytes[0])
    }
}

impl TryFrom<u8> for MessageType {
    type Error = MessageTypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::EchoReply),
            3 => Ok(MessageType::DestinationUnreachable),
            8 => Ok(MessageType::Echo),
            11 => Ok(MessageType::TimeExceeded),
            12 => Ok(MessageType::ParameterProblem),
            value => Err(MessageTypeError::InvalidValue(value)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

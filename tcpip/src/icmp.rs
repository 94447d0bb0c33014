mod message;
mod message_type;

use thiserror::Error;

pub use self::message::destination_unreachable::DestinationUnreachableCode;
pub use self::message::parameter_problem::ParameterProblemCode;
pub use self::message::time_exceeded::TimeExceededCode;
pub use self::message::{
    DestinationUnreachableMessage, DestinationUnreachableMessageError, EchoMessage,
    EchoMessageError, ICMP_HEADER_LENGTH, OriginalDatagram, OriginalDatagramError,
    ParameterProblemMessage, ParameterProblemMessageError, TimeExceededMessage,
    TimeExceededMessageError,
};
pub use self::message_type::{MessageType, MessageTypeError};
use self::message::Message;
use crate::TryFromBytes;

/// ICMPメッセージ処理に関するエラー
///
/// ICMPメッセージのパース・検証で発生する可能性のあるエラーを定義します。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ICMPError {
    #[error("Invalid ICMP packet length. Expected at least {0} bytes, but got {1} bytes.")]
    InvalidPacketLength(usize, usize),
    #[error(transparent)]
    InvalidMessageType(#[from] MessageTypeError),
    #[error(transparent)]
    InvalidEchoMessage(#[from] EchoMessageError),
    #[error(transparent)]
    InvalidDestinationUnreachableMessage(#[from] DestinationUnreachableMessageError),
    #[error(transparent)]
    InvalidTimeExceededMessage(#[from] TimeExceededMessageError),
    #[error(transparent)]
    InvalidParameterProblemMessage(#[from] ParameterProblemMessageError),
}

/// ICMPメッセージ
///
/// Internet Control Message Protocol (ICMP)メッセージを表現します。
/// 各メッセージタイプ固有の構造体を統合するenumです。
///
/// 参照:
/// - [RFC 792 - Internet Control Message Protocol](https://tools.ietf.org/rfc/rfc792.txt)
/// - [IANA ICMP Type Numbers](https://www.iana.org/assignments/icmp-parameters/icmp-parameters.xhtml)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ICMPMessage {
    EchoReply(EchoMessage),
    DestinationUnreachable(DestinationUnreachableMessage),
    Echo(EchoMessage),
    TimeExceeded(TimeExceededMessage),
    ParameterProblem(ParameterProblemMessage),
}

impl ICMPMessage {
    fn as_message(&self) -> &dyn Message {
        match self {
            ICMPMessage::EchoReply(echo) | ICMPMessage::Echo(echo) => echo,
            ICMPMessage::DestinationUnreachable(dest) => dest,
            ICMPMessage::TimeExceeded(time) => time,
            ICMPMessage::ParameterProblem(param) => param,
        }
    }

    /// メッセージタイプ
    pub fn message_type(&self) -> MessageType {
        self.as_message().msg_type()
    }

    /// メッセージコード
    pub fn code(&self) -> u8 {
        self.as_message().code()
    }

    /// エラーメッセージに埋め込まれた元のデータグラム
    ///
    /// Echo Request/Replyの場合は`None`
    pub fn original_datagram(&self) -> Option<&OriginalDatagram> {
        match self {
            ICMPMessage::DestinationUnreachable(dest) => Some(&dest.original_datagram),
            ICMPMessage::TimeExceeded(time) => Some(&time.original_datagram),
            ICMPMessage::ParameterProblem(param) => Some(&param.original_datagram),
            ICMPMessage::EchoReply(_) | ICMPMessage::Echo(_) => None,
        }
    }

    /// 人が読むための説明文
    pub fn description(&self) -> String {
        self.as_message().description()
    }
}

impl TryFromBytes for ICMPMessage {
    type Error = ICMPError;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, Self::Error> {
        let bytes = value.as_ref();
        if bytes.len() < ICMP_HEADER_LENGTH {
            return Err(ICMPError::InvalidPacketLength(
                ICMP_HEADER_LENGTH,
                bytes.len(),
            ));
        }

        let message_type = MessageType::try_from(bytes[0])?;

        match message_type {
            MessageType::Echo => EchoMessage::try_from_bytes(bytes)
                .map(ICMPMessage::Echo)
                .map_err(ICMPError::from),
            MessageType::EchoReply => EchoMessage::try_from_bytes(bytes)
                .map(ICMPMessage::EchoReply)
                .map_err(ICMPError::from),
            MessageType::DestinationUnreachable => {
                DestinationUnreachableMessage::try_from_bytes(bytes)
                    .map(ICMPMessage::DestinationUnreachable)
                    .map_err(ICMPError::from)
            }
            MessageType::TimeExceeded => TimeExceededMessage::try_from_bytes(bytes)
                .map(ICMPMessage::TimeExceeded)
                .map_err(ICMPError::from),
            MessageType::ParameterProblem => ParameterProblemMessage::try_from_bytes(bytes)
                .map(ICMPMessage::ParameterProblem)
                .map_err(ICMPError::from),
        }
    }
}

impl TryFrom<&[u8]> for ICMPMessage {
    type Error = ICMPError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_bytes(value)
    }
}

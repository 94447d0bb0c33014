use thiserror::Error;

use crate::TryFromBytes;
use crate::icmp::MessageType;
use crate::icmp::message::{ICMP_HEADER_LENGTH, Message};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EchoMessageError {
    #[error("Invalid echo message type. Expected 8 or 0, but got {0}.")]
    InvalidMessageType(u8),
    #[error("Invalid echo message length. Expected at least 8 bytes, but got {0} bytes.")]
    InvalidMessageLength(usize),
}

/// Echo Request/Reply メッセージ
///
/// RFC 792で定義されたEcho Request (Type 8) とEcho Reply (Type 0) のメッセージ構造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoMessage {
    /// Is reply
    /// Echo RequestかEcho Replyかを示すフラグ
    pub is_reply: bool,

    /// Checksum
    pub checksum: u16,

    /// Identifier
    /// Echo Request/Replyペアを識別するための識別子
    pub identifier: u16,

    /// Sequence Number
    pub sequence_number: u16,

    /// Data
    /// Echoメッセージのデータ部分（可変長）
    pub data: Vec<u8>,
}

impl TryFromBytes for EchoMessage {
    type Error = EchoMessageError;

    fn try_from_bytes(value: impl AsRef<[u8]>) -> Result<Self, Self::Error> {
        let bytes = value.as_ref();
        if bytes.len() < ICMP_HEADER_LENGTH {
            return Err(EchoMessageError::InvalidMessageLength(bytes.len()));
        }
        let is_reply = match bytes[0] {
            0 => true,  // Echo Reply
            8 => false, // Echo Request
            msg_type => return Err(EchoMessageError::InvalidMessageType(msg_type)),
        };

        Ok(EchoMessage {
            is_reply,
            checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence_number: u16::from_be_bytes([bytes[6], bytes[7]]),
            data: bytes[ICMP_HEADER_LENGTH..].to_vec(),
        })
    }
}

impl Message for EchoMessage {
    fn msg_type(&self) -> MessageType {
        match self.is_reply {
            true => MessageType::EchoReply,
            false => MessageType::Echo,
        }
    }

    fn code(&self) -> u8 {
        0
    }

    fn description(&self) -> String {
        format!("ID {} Sequence {}", self.identifier, self.sequence_number)
    }
}

use std::fmt::{self, Display};

/// IPヘッダーのProtocolフィールド
///
/// 参照:
/// - [IANA Protocol Numbers](https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Internet Control Message
    /// ref: RFC792
    ICMP,

    /// Internet Group Management
    /// ref: RFC1112
    IGMP,

    /// Transmission Control
    /// ref: RFC9293
    TCP,

    /// User Datagram
    /// ref: RFC768
    UDP,

    /// IPv6 encapsulation
    /// ref: RFC2473
    ENCAP,

    /// Open Shortest Path First
    /// ref: RFC1583
    OSPF,

    /// Stream Control Transmission Protocol
    /// ref: RFC9260
    SCTP,

    /// 上記以外のプロトコル番号
    Other(u8),
}

impl Protocol {
    /// トランスポートヘッダーの先頭4バイトが送信元/宛先ポートであるプロトコルか
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::TCP | Protocol::UDP | Protocol::SCTP)
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::ICMP => write!(f, "ICMP"),
            Protocol::IGMP => write!(f, "IGMP"),
            Protocol::TCP => write!(f, "TCP"),
            Protocol::UDP => write!(f, "UDP"),
            Protocol::ENCAP => write!(f, "ENCAP"),
            Protocol::OSPF => write!(f, "OSPF"),
            Protocol::SCTP => write!(f, "SCTP"),
            Protocol::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<u8> for Protocol {
    fn from(value: u8) -> Self {
        match value {
            1 => Protocol::ICMP,
            2 => Protocol::IGMP,
            6 => Protocol::TCP,
            17 => Protocol::UDP,
            41 => Protocol::ENCAP,
            89 => Protocol::OSPF,
            132 => Protocol::SCTP,
            value => Protocol::Other(value),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(value: Protocol) -> Self {
        match value {
            Protocol::ICMP => 1,
            Protocol::IGMP => 2,
            Protocol::TCP => 6,
            Protocol::UDP => 17,
            Protocol::ENCAP => 41,
            Protocol::OSPF => 89,
            Protocol::SCTP => 132,
            Protocol::Other(value) => value,
        }
    }
}

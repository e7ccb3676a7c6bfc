use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpError {
    TooShort,
    BadVersion(u8),
    BadFirstRecord(u8),
    UnknownPacketType(u8),
    Truncated,
    TooManyReportBlocks(usize),
    SdesItemTooShort,
    ReasonTooLong(usize),
}

impl fmt::Display for RtcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RtcpError::*;
        match self {
            TooShort => write!(f, "buffer too short"),
            BadVersion(v) => write!(f, "bad RTCP version: {v}"),
            BadFirstRecord(pt) => {
                write!(f, "compound must start with SR or RR, found pt {pt}")
            }
            UnknownPacketType(pt) => write!(f, "unknown RTCP packet type: {pt}"),
            Truncated => write!(f, "truncated RTCP structure"),
            TooManyReportBlocks(n) => write!(f, "too many report blocks: {n}"),
            SdesItemTooShort => write!(f, "SDES item too short"),
            ReasonTooLong(n) => write!(f, "BYE reason too long: {n}"),
        }
    }
}
impl std::error::Error for RtcpError {}

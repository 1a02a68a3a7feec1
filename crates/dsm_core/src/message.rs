use {
    crate::{BlockId, NodeId},
    core::fmt::{Debug, Formatter},
};

/// Contents of a shared cell.
pub type Value = i32;

/// Size in bytes of one encoded [`Message`].
pub const WIRE_LEN: usize = 16;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u32)]
pub enum MessageKind {
    /// Recipient drops its copy of the block.
    Invalidate = 0,
    /// Recipient replies with a [`MessageKind::FetchRes`] carrying its copy.
    FetchReq = 1,
    /// Carries the requested data; recipient installs it as valid.
    FetchRes = 2,
    /// `src` is now the sole owner of the block.
    WriteClaim = 3,
}

impl MessageKind {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = DecodeError;
    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageKind::Invalidate),
            1 => Ok(MessageKind::FetchReq),
            2 => Ok(MessageKind::FetchRes),
            3 => Ok(MessageKind::WriteClaim),
            code => Err(DecodeError::UnknownKind(code)),
        }
    }
}

/// One coherence message. Every kind carries the same fields; `value` is only meaningful for
/// [`MessageKind::FetchRes`] and is zero otherwise.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Message {
    pub kind: MessageKind,
    pub block: BlockId,
    pub value: Value,
    pub src: NodeId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    #[error("message source must be a NodeID starting at 1")]
    ZeroSource,
    #[error("field {field} does not fit this platform: {raw}")]
    Overflow { field: &'static str, raw: u32 },
}

impl Message {
    pub fn invalidate(block: BlockId, src: NodeId) -> Self {
        Message { kind: MessageKind::Invalidate, block, value: 0, src }
    }

    pub fn fetch_req(block: BlockId, src: NodeId) -> Self {
        Message { kind: MessageKind::FetchReq, block, value: 0, src }
    }

    pub fn fetch_res(block: BlockId, value: Value, src: NodeId) -> Self {
        Message { kind: MessageKind::FetchRes, block, value, src }
    }

    pub fn write_claim(block: BlockId, src: NodeId) -> Self {
        Message { kind: MessageKind::WriteClaim, block, value: 0, src }
    }

    /// Encodes as four little-endian 32-bit fields: kind, block, value, src.
    ///
    /// Block and source IDs above `u32::MAX` are truncated; the engine never creates them since
    /// block and node counts are validated at construction.
    pub fn encode(&self) -> [u8; WIRE_LEN] {
        let mut buf = [0; WIRE_LEN];
        buf[0..4].copy_from_slice(&self.kind.code().to_le_bytes());
        buf[4..8].copy_from_slice(&(self.block.get() as u32).to_le_bytes());
        buf[8..12].copy_from_slice(&self.value.to_le_bytes());
        buf[12..16].copy_from_slice(&(self.src.get() as u32).to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; WIRE_LEN]) -> Result<Self, DecodeError> {
        let word = |i: usize| [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]];
        let kind = MessageKind::try_from(u32::from_le_bytes(word(0)))?;
        let block = widen("block", u32::from_le_bytes(word(4)))?;
        let value = Value::from_le_bytes(word(8));
        let src = widen("src", u32::from_le_bytes(word(12)))?;
        let src = NodeId::new(src).ok_or(DecodeError::ZeroSource)?;
        Ok(Message {
            kind,
            block: BlockId::new(block),
            value,
            src,
        })
    }
}

fn widen(field: &'static str, raw: u32) -> Result<usize, DecodeError> {
    usize::try_from(raw).map_err(|_| DecodeError::Overflow { field, raw })
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            MessageKind::FetchRes => write!(
                f,
                "{:?}({:?}={}, {})",
                self.kind, self.block, self.value, self.src
            ),
            kind => write!(f, "{:?}({:?}, {})", kind, self.block, self.src),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn node(n: usize) -> NodeId {
        NodeId::new(n).unwrap()
    }

    #[test]
    fn encodes_little_endian_fields_in_order() {
        let msg = Message::fetch_res(BlockId::new(7), -2, node(3));
        assert_eq!(
            msg.encode(),
            [2, 0, 0, 0, 7, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff, 3, 0, 0, 0]
        );
        assert_eq!(Message::decode(&msg.encode()), Ok(msg));
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut buf = Message::invalidate(BlockId::new(0), node(1)).encode();
        buf[0] = 9;
        assert_eq!(Message::decode(&buf), Err(DecodeError::UnknownKind(9)));
    }

    #[test]
    fn rejects_zero_source() {
        let mut buf = Message::write_claim(BlockId::new(1), node(2)).encode();
        buf[12] = 0;
        assert_eq!(Message::decode(&buf), Err(DecodeError::ZeroSource));
    }

    #[test]
    fn can_debug() {
        assert_eq!(
            format!("{:?}", Message::fetch_req(BlockId::new(4), node(2))),
            "FetchReq(#4, Node2)"
        );
        assert_eq!(
            format!("{:?}", Message::fetch_res(BlockId::new(4), 42, node(1))),
            "FetchRes(#4=42, Node1)"
        );
    }
}

use core::{
    fmt::{Debug, Display, Formatter},
    num::NonZeroUsize,
    ops::{Index, IndexMut},
};

/// Identifies a participant. NodeIDs are 1-based; the matching table slot is `id - 1`.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(NonZeroUsize);

impl NodeId {
    /// Returns `None` for 0, which is never a valid NodeID.
    pub const fn new(n: usize) -> Option<Self> {
        match NonZeroUsize::new(n) {
            Some(n) => Some(NodeId(n)),
            None => None,
        }
    }

    /// The NodeID owning table slot `index`.
    pub const fn from_index(index: usize) -> Self {
        match NonZeroUsize::new(index.wrapping_add(1)) {
            Some(n) => NodeId(n),
            None => panic!("NodeId index overflow"),
        }
    }

    pub const fn get(self) -> usize {
        self.0.get()
    }

    pub const fn index(self) -> usize {
        self.0.get() - 1
    }

    /// Every NodeID in a cluster of `num_nodes`, lowest first.
    pub fn all(num_nodes: usize) -> impl Iterator<Item = NodeId> + Clone {
        (0..num_nodes).map(NodeId::from_index)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str("Node")?;
        Display::fmt(&self.0, f)
    }
}

impl From<NodeId> for usize {
    fn from(id: NodeId) -> Self {
        id.get()
    }
}

impl TryFrom<usize> for NodeId {
    type Error = ZeroNodeId;
    fn try_from(n: usize) -> Result<Self, Self::Error> {
        NodeId::new(n).ok_or(ZeroNodeId)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("NodeIDs start at 1")]
pub struct ZeroNodeId;

/// Identifies a shared cell in the fixed block address space.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct BlockId(usize);

impl BlockId {
    pub const fn new(n: usize) -> Self {
        BlockId(n)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl Debug for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str("#")?;
        Display::fmt(&self.0, f)
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<usize> for BlockId {
    fn from(n: usize) -> Self {
        BlockId(n)
    }
}

impl From<BlockId> for usize {
    fn from(block: BlockId) -> Self {
        block.0
    }
}

impl<T> Index<NodeId> for [T] {
    type Output = T;
    fn index(&self, id: NodeId) -> &Self::Output {
        self.index(id.index())
    }
}

impl<T> IndexMut<NodeId> for [T] {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        self.index_mut(id.index())
    }
}

impl<T> Index<NodeId> for Vec<T> {
    type Output = T;
    fn index(&self, id: NodeId) -> &Self::Output {
        self.index(id.index())
    }
}

impl<T> IndexMut<NodeId> for Vec<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        self.index_mut(id.index())
    }
}

impl<T> Index<BlockId> for [T] {
    type Output = T;
    fn index(&self, block: BlockId) -> &Self::Output {
        self.index(block.0)
    }
}

impl<T> IndexMut<BlockId> for [T] {
    fn index_mut(&mut self, block: BlockId) -> &mut Self::Output {
        self.index_mut(block.0)
    }
}

impl<T> Index<BlockId> for Vec<T> {
    type Output = T;
    fn index(&self, block: BlockId) -> &Self::Output {
        self.index(block.0)
    }
}

impl<T> IndexMut<BlockId> for Vec<T> {
    fn index_mut(&mut self, block: BlockId) -> &mut Self::Output {
        self.index_mut(block.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let n = usize::deserialize(deserializer)?;
        NodeId::new(n).ok_or_else(|| serde::de::Error::custom(ZeroNodeId))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.get().serialize(serializer)
    }
}

use {
    crate::{BlockId, Value},
    core::fmt::{Display, Formatter},
};

/// One scripted unit of work for a node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Operation {
    Read { block: BlockId },
    Write { block: BlockId, value: Value },
}

impl Operation {
    pub fn block(&self) -> BlockId {
        match *self {
            Operation::Read { block } | Operation::Write { block, .. } => block,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Read { .. } => "READ",
            Operation::Write { .. } => "WRITE",
        }
    }
}

/// Renders the script form, `R <block>` or `W <block> <value>`.
impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Operation::Read { block } => write!(f, "R {block}"),
            Operation::Write { block, value } => write!(f, "W {block} {value}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn displays_script_form() {
        let read = Operation::Read { block: BlockId::new(3) };
        let write = Operation::Write { block: BlockId::new(0), value: 42 };
        assert_eq!(read.to_string(), "R 3");
        assert_eq!(write.to_string(), "W 0 42");
        assert_eq!(write.block(), BlockId::new(0));
        assert_eq!(read.verb(), "READ");
    }
}

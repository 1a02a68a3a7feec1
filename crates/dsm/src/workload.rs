use {
    crate::WorkloadError,
    dsm_core::{BlockId, Operation, Value},
    std::path::Path,
};

/// The scripted operations for one node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Workload {
    ops: Vec<Operation>,
}

impl Workload {
    pub fn new(ops: Vec<Operation>) -> Self {
        Workload { ops }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkloadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorkloadError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses `R <block>` and `W <block> <value>` commands. Tokens are whitespace separated, so
    /// line breaks carry no meaning.
    pub fn parse(text: &str) -> Result<Self, WorkloadError> {
        let mut tokens = text.split_whitespace().enumerate().map(|(i, t)| (i + 1, t));
        let mut ops = Vec::new();
        while let Some((position, token)) = tokens.next() {
            let op = match token {
                "R" | "r" => 'R',
                "W" | "w" => 'W',
                _ => {
                    return Err(WorkloadError::UnknownOp {
                        position,
                        token: token.to_owned(),
                    })
                }
            };
            let block = BlockId::new(operand(&mut tokens, position, op, "block")?);
            ops.push(match op {
                'R' => Operation::Read { block },
                _ => Operation::Write {
                    block,
                    value: operand::<Value>(&mut tokens, position, op, "value")?,
                },
            });
        }
        Ok(Workload { ops })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn operand<'a, T: std::str::FromStr>(
    tokens: &mut impl Iterator<Item = (usize, &'a str)>,
    op_position: usize,
    op: char,
    expected: &'static str,
) -> Result<T, WorkloadError> {
    let (position, token) = tokens.next().ok_or(WorkloadError::MissingOperand {
        position: op_position,
        op,
        expected,
    })?;
    token.parse().map_err(|_| WorkloadError::BadOperand {
        position,
        token: token.to_owned(),
        expected,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_reads_and_writes() {
        let workload = Workload::parse("R 0\nW 3 42\nw 1 -7 r 2\n").unwrap();
        assert_eq!(
            workload.operations(),
            &[
                Operation::Read { block: BlockId::new(0) },
                Operation::Write { block: BlockId::new(3), value: 42 },
                Operation::Write { block: BlockId::new(1), value: -7 },
                Operation::Read { block: BlockId::new(2) },
            ]
        );
        assert!(Workload::parse("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn reports_bad_tokens() {
        assert!(matches!(
            Workload::parse("R 0 X 1"),
            Err(WorkloadError::UnknownOp { position: 3, .. })
        ));
        assert!(matches!(
            Workload::parse("W 1"),
            Err(WorkloadError::MissingOperand { position: 1, expected: "value", .. })
        ));
        assert!(matches!(
            Workload::parse("R -1"),
            Err(WorkloadError::BadOperand { position: 2, expected: "block", .. })
        ));
        assert!(matches!(
            Workload::parse("W 0 many"),
            Err(WorkloadError::BadOperand { position: 3, .. })
        ));
    }
}

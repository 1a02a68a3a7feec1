use {
    crate::{CoherenceError, Engine},
    dsm_core::{NodeId, Operation, Value},
    std::{
        fmt::{self, Display, Formatter},
        thread,
    },
    tracing::{info, warn},
};

/// How one scripted operation ended. A success carries the value read or written.
#[derive(Debug)]
pub struct OperationReport {
    pub node: NodeId,
    pub index: usize,
    pub op: Operation,
    pub outcome: Result<Value, CoherenceError>,
}

impl OperationReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// `Node<id> READ <block> = <value>` for a commit, the error otherwise.
impl Display for OperationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(value) => write!(
                f,
                "{} {} {} = {}",
                self.node,
                self.op.verb(),
                self.op.block(),
                value
            ),
            Err(err) => write!(
                f,
                "{} {} {} failed: {}",
                self.node,
                self.op.verb(),
                self.op.block(),
                err
            ),
        }
    }
}

/// Runs every operation on its own thread and waits for all of them.
///
/// Operations race one another; only completion is guaranteed, not script order. `on_commit`
/// fires from the operation's thread as soon as it finishes. The returned reports are in script
/// order. An operation whose thread cannot be spawned fails with [`CoherenceError::Spawn`]. A
/// panic in an operation thread is propagated once every thread has been joined.
pub fn run_workload<F>(engine: &Engine, ops: &[Operation], on_commit: F) -> Vec<OperationReport>
where
    F: Fn(&OperationReport) + Sync,
{
    run_on_threads(engine, ops, on_commit, |index| {
        thread::Builder::new().name(format!("op-{}-{}", engine.id().get(), index))
    })
}

fn run_on_threads<F, B>(
    engine: &Engine,
    ops: &[Operation],
    on_commit: F,
    builder: B,
) -> Vec<OperationReport>
where
    F: Fn(&OperationReport) + Sync,
    B: Fn(usize) -> thread::Builder,
{
    let finish = |index, op, outcome| {
        let report = OperationReport {
            node: engine.id(),
            index,
            op,
            outcome,
        };
        match &report.outcome {
            Ok(_) => info!(id = ?report.node, index, %op, "Committed."),
            Err(err) => warn!(id = ?report.node, index, %op, %err, "Operation failed."),
        }
        on_commit(&report);
        report
    };
    let finish = &finish;
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = ops
            .iter()
            .copied()
            .enumerate()
            .map(|(index, op)| {
                let spawned = builder(index).spawn_scoped(s, move || {
                    let outcome = match op {
                        Operation::Read { block } => engine.read(block),
                        Operation::Write { block, value } => {
                            engine.write(block, value).map(|()| value)
                        }
                    };
                    finish(index, op, outcome)
                });
                (index, op, spawned)
            })
            .collect();
        handles
            .into_iter()
            .map(|(index, op, spawned)| match spawned {
                Ok(handle) => handle.join(),
                Err(err) => Ok(finish(index, op, Err(CoherenceError::Spawn(err)))),
            })
            .collect()
    });
    results
        .into_iter()
        .map(|result| result.unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
        .collect()
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{transport::mesh, EngineConfig},
        dsm_core::BlockId,
        std::sync::Mutex,
    };

    #[test]
    fn unspawnable_operations_fail_alone() {
        let endpoint = mesh(1).pop().unwrap();
        let engine = Engine::new(endpoint.id, EngineConfig::new(1, 2), endpoint.outbound).unwrap();
        let ops = [
            Operation::Write {
                block: BlockId::new(0),
                value: 7,
            },
            Operation::Read {
                block: BlockId::new(1),
            },
        ];
        let committed = Mutex::new(Vec::new());
        let reports = run_on_threads(
            &engine,
            &ops,
            |report| committed.lock().unwrap().push(report.index),
            // No address space can hold this stack.
            |index| match index {
                0 => thread::Builder::new(),
                _ => thread::Builder::new().stack_size(1 << 62),
            },
        );
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].outcome.as_ref().unwrap(), &7);
        assert!(matches!(reports[1].outcome, Err(CoherenceError::Spawn(_))));
        let mut committed = committed.into_inner().unwrap();
        committed.sort();
        assert_eq!(committed, vec![0, 1]);
    }
}

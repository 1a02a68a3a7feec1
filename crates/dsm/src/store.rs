use {
    crate::EngineConfig,
    dsm_core::{BlockId, NodeId, Value},
    std::{
        collections::BTreeSet,
        sync::{Condvar, Mutex, MutexGuard, PoisonError},
        time::Instant,
    },
};

/// Whether this node holds a coherent, readable copy of a block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CacheLine {
    pub valid: bool,
    pub data: Value,
}

/// This node's view of who owns a block. Views on different nodes converge once every
/// `WRITE_CLAIM` for the block has been delivered.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DirectoryEntry {
    pub owner: NodeId,
    pub sharers: BTreeSet<NodeId>,
}

struct Tables {
    cache: Vec<CacheLine>,
    directory: Vec<DirectoryEntry>,
}

/// The cache and directory tables of one node behind a single lock.
///
/// Nothing outside this module touches the tables; every access goes through a [`StateGuard`],
/// so a check such as [`StateGuard::is_valid`] and the read that depends on it happen under the
/// same acquisition.
pub(crate) struct Store {
    tables: Mutex<Tables>,
    changed: Condvar,
}

impl Store {
    /// Every directory entry names the block's home node with no sharers. The home node's lines
    /// start valid holding `0`; every other line starts invalid.
    pub(crate) fn new(id: NodeId, config: &EngineConfig) -> Self {
        let (cache, directory) = (0..config.num_blocks())
            .map(BlockId::new)
            .map(|block| {
                let owner = config.home_of(block);
                let line = CacheLine {
                    valid: owner == id,
                    data: 0,
                };
                let entry = DirectoryEntry {
                    owner,
                    sharers: BTreeSet::new(),
                };
                (line, entry)
            })
            .unzip();
        Store {
            tables: Mutex::new(Tables { cache, directory }),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> StateGuard<'_> {
        // Each mutation is a single assignment, so a panicking holder cannot leave the tables
        // half-written.
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        StateGuard {
            tables,
            changed: &self.changed,
        }
    }
}

pub(crate) struct StateGuard<'a> {
    tables: MutexGuard<'a, Tables>,
    changed: &'a Condvar,
}

impl<'a> StateGuard<'a> {
    pub(crate) fn is_valid(&self, block: BlockId) -> bool {
        self.tables.cache[block].valid
    }

    /// `None` unless the line is valid.
    pub(crate) fn read_local(&self, block: BlockId) -> Option<Value> {
        let line = self.tables.cache[block];
        line.valid.then_some(line.data)
    }

    pub(crate) fn install(&mut self, block: BlockId, value: Value) {
        self.tables.cache[block] = CacheLine {
            valid: true,
            data: value,
        };
        self.changed.notify_all();
    }

    pub(crate) fn invalidate(&mut self, block: BlockId) {
        self.tables.cache[block].valid = false;
    }

    /// Replaces the owner and resets the sharer set to just the owner.
    pub(crate) fn set_owner(&mut self, block: BlockId, owner: NodeId) {
        let entry = &mut self.tables.directory[block];
        entry.owner = owner;
        entry.sharers.clear();
        entry.sharers.insert(owner);
        self.changed.notify_all();
    }

    pub(crate) fn get_owner(&self, block: BlockId) -> NodeId {
        self.tables.directory[block].owner
    }

    pub(crate) fn add_sharer(&mut self, block: BlockId, sharer: NodeId) {
        self.tables.directory[block].sharers.insert(sharer);
    }

    pub(crate) fn cache_line(&self, block: BlockId) -> CacheLine {
        self.tables.cache[block]
    }

    pub(crate) fn directory_entry(&self, block: BlockId) -> DirectoryEntry {
        self.tables.directory[block].clone()
    }

    /// Releases the lock until the line for `block` is filled, its owner stops being `owner`,
    /// or `deadline` passes. Returns the reacquired guard.
    pub(crate) fn wait_for_change(self, block: BlockId, owner: NodeId, deadline: Instant) -> Self {
        let changed = self.changed;
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (tables, _timed_out) = changed
            .wait_timeout_while(self.tables, timeout, |tables| {
                !tables.cache[block].valid && tables.directory[block].owner == owner
            })
            .unwrap_or_else(PoisonError::into_inner);
        StateGuard { tables, changed }
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::HomePolicy, std::time::Duration};

    fn node(n: usize) -> NodeId {
        NodeId::new(n).unwrap()
    }

    #[test]
    fn starts_with_home_owned_lines() {
        let config = EngineConfig::new(2, 3).home(HomePolicy::Interleaved);
        let home = Store::new(node(1), &config);
        let state = home.lock();
        assert_eq!(state.get_owner(BlockId::new(0)), node(1));
        assert_eq!(state.get_owner(BlockId::new(1)), node(2));
        assert_eq!(state.read_local(BlockId::new(0)), Some(0));
        assert!(!state.is_valid(BlockId::new(1)));
        assert!(state.directory_entry(BlockId::new(2)).sharers.is_empty());
    }

    #[test]
    fn can_install_and_invalidate() {
        let store = Store::new(node(2), &EngineConfig::new(2, 1));
        let mut state = store.lock();
        assert_eq!(state.read_local(BlockId::new(0)), None);
        state.install(BlockId::new(0), 7);
        assert_eq!(state.read_local(BlockId::new(0)), Some(7));
        state.invalidate(BlockId::new(0));
        assert_eq!(
            state.cache_line(BlockId::new(0)),
            CacheLine {
                valid: false,
                data: 7
            }
        );
    }

    #[test]
    fn set_owner_is_idempotent() {
        let store = Store::new(node(1), &EngineConfig::new(3, 1));
        let mut state = store.lock();
        state.add_sharer(BlockId::new(0), node(2));
        state.set_owner(BlockId::new(0), node(3));
        let once = state.directory_entry(BlockId::new(0));
        state.set_owner(BlockId::new(0), node(3));
        assert_eq!(state.directory_entry(BlockId::new(0)), once);
        assert_eq!(once.owner, node(3));
        assert_eq!(once.sharers.into_iter().collect::<Vec<_>>(), vec![node(3)]);
    }

    #[test]
    fn wait_times_out_without_change() {
        let store = Store::new(node(2), &EngineConfig::new(2, 1));
        let start = Instant::now();
        let state = store.lock().wait_for_change(
            BlockId::new(0),
            node(1),
            start + Duration::from_millis(50),
        );
        assert!(!state.is_valid(BlockId::new(0)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn wait_wakes_on_install() {
        let store = Store::new(node(2), &EngineConfig::new(2, 1));
        std::thread::scope(|s| {
            let state = store.lock();
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                store.lock().install(BlockId::new(0), 42);
            });
            let state = state.wait_for_change(
                BlockId::new(0),
                node(1),
                Instant::now() + Duration::from_secs(10),
            );
            assert_eq!(state.read_local(BlockId::new(0)), Some(42));
        });
    }
}

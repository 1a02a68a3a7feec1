use {
    crate::ConfigError,
    dsm_core::{BlockId, NodeId},
    std::{
        fmt::{self, Display, Formatter},
        net::{IpAddr, SocketAddr},
        path::Path,
        str::FromStr,
        time::Duration,
    },
};

/// Addresses of every participant, index `i` belonging to NodeID `i + 1`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterConfig {
    peers: Vec<SocketAddr>,
}

impl ClusterConfig {
    pub fn new(peers: Vec<SocketAddr>) -> Result<Self, ConfigError> {
        if peers.is_empty() {
            return Err(ConfigError::PeerCount { expected: 1, found: 0 });
        }
        Ok(ClusterConfig { peers })
    }

    pub fn load(path: impl AsRef<Path>, expected: Option<usize>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, expected)
    }

    /// Parses whitespace separated `<ip> <port>` pairs. With `expected`, exactly that many
    /// leading pairs are taken and anything after them is ignored.
    pub fn parse(text: &str, expected: Option<usize>) -> Result<Self, ConfigError> {
        let mut peers = Vec::new();
        let mut pending: Option<(usize, IpAddr)> = None;
        'lines: for (i, line) in text.lines().enumerate() {
            for token in line.split_whitespace() {
                if expected.is_some_and(|n| peers.len() == n) {
                    break 'lines;
                }
                let line = i + 1;
                match pending.take() {
                    None => {
                        let ip = token.parse().map_err(|_| ConfigError::Parse {
                            line,
                            reason: format!("{token:?} is not an IP address"),
                        })?;
                        pending = Some((line, ip));
                    }
                    Some((_, ip)) => {
                        let port: u16 = token.parse().map_err(|_| ConfigError::Parse {
                            line,
                            reason: format!("{token:?} is not a port"),
                        })?;
                        peers.push(SocketAddr::new(ip, port));
                    }
                }
            }
        }
        if let Some((line, ip)) = pending {
            return Err(ConfigError::Parse {
                line,
                reason: format!("{ip} has no port"),
            });
        }
        match expected {
            Some(expected) if peers.len() != expected => Err(ConfigError::PeerCount {
                expected,
                found: peers.len(),
            }),
            _ => Self::new(peers),
        }
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    pub fn num_nodes(&self) -> usize {
        self.peers.len()
    }

    pub fn addr(&self, id: NodeId) -> Option<SocketAddr> {
        self.peers.get(id.index()).copied()
    }

    /// Resolves a raw NodeID given on the command line against this cluster.
    pub fn node_id(&self, raw: usize) -> Result<NodeId, ConfigError> {
        NodeId::new(raw)
            .filter(|id| id.index() < self.num_nodes())
            .ok_or(ConfigError::NodeOutOfRange {
                id: raw,
                num_nodes: self.num_nodes(),
            })
    }
}

/// Which node owns a block before anyone writes it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HomePolicy {
    /// Every block is homed at NodeID 1.
    #[default]
    Lowest,
    /// Block `b` is homed at NodeID `(b mod num_nodes) + 1`, or NodeID 1 for an empty cluster.
    Interleaved,
    /// Every block is homed at the given node.
    Fixed(NodeId),
}

impl HomePolicy {
    pub fn home(&self, block: BlockId, num_nodes: usize) -> NodeId {
        match *self {
            HomePolicy::Lowest => NodeId::from_index(0),
            HomePolicy::Interleaved => NodeId::from_index(block.get() % num_nodes.max(1)),
            HomePolicy::Fixed(id) => id,
        }
    }
}

impl FromStr for HomePolicy {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lowest" => Ok(HomePolicy::Lowest),
            "interleaved" => Ok(HomePolicy::Interleaved),
            _ => s
                .strip_prefix("node:")
                .and_then(|n| n.parse().ok())
                .and_then(NodeId::new)
                .map(HomePolicy::Fixed)
                .ok_or_else(|| ConfigError::HomePolicy(s.to_owned())),
        }
    }
}

impl Display for HomePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HomePolicy::Lowest => f.write_str("lowest"),
            HomePolicy::Interleaved => f.write_str("interleaved"),
            HomePolicy::Fixed(id) => write!(f, "node:{}", id.get()),
        }
    }
}

/// Construction parameters for an [`Engine`](crate::Engine).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    num_nodes: usize,
    num_blocks: usize,
    home: HomePolicy,
    fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_nodes: 4,
            num_blocks: 8,
            home: HomePolicy::Lowest,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn new(num_nodes: usize, num_blocks: usize) -> Self {
        EngineConfig {
            num_nodes,
            num_blocks,
            ..Default::default()
        }
    }

    pub fn home(mut self, home: HomePolicy) -> Self {
        self.home = home;
        self
    }

    pub fn fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn home_policy(&self) -> HomePolicy {
        self.home
    }

    pub fn timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn home_of(&self, block: BlockId) -> NodeId {
        self.home.home(block, self.num_nodes)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_nodes == 0 {
            return Err(ConfigError::Engine("num_nodes must be at least 1"));
        }
        if self.num_blocks == 0 {
            return Err(ConfigError::Engine("num_blocks must be at least 1"));
        }
        if u32::try_from(self.num_nodes).is_err() || u32::try_from(self.num_blocks).is_err() {
            return Err(ConfigError::Engine("counts must fit the 32-bit wire format"));
        }
        if let HomePolicy::Fixed(id) = self.home {
            if id.index() >= self.num_nodes {
                return Err(ConfigError::NodeOutOfRange {
                    id: id.get(),
                    num_nodes: self.num_nodes,
                });
            }
        }
        Ok(())
    }
}

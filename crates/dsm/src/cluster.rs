use {
    crate::{transport::mesh, EngineConfig, Error, Node},
    dsm_core::NodeId,
};

/// Every node of a cluster in one process, connected by an in-memory mesh.
pub struct Cluster {
    nodes: Vec<Node>,
}

impl Cluster {
    pub fn start(config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        let nodes = mesh(config.num_nodes())
            .into_iter()
            .map(|endpoint| Node::start(config.clone(), endpoint))
            .collect::<Result<_, _>>()?;
        Ok(Cluster { nodes })
    }

    /// # Panics
    ///
    /// Panics if `id` is not in the cluster.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Disconnects every node, then joins every receiver. Returns how many were joined.
    pub fn shutdown(self) -> std::thread::Result<usize> {
        for node in &self.nodes {
            node.engine().disconnect();
        }
        let mut joined = 0;
        for node in self.nodes {
            joined += node.shutdown()?;
        }
        Ok(joined)
    }
}

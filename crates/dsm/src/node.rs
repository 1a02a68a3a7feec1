use {
    crate::{
        receiver, run_workload, transport::Endpoint, Engine, EngineConfig, Error, OperationReport,
    },
    dsm_core::Operation,
    std::{sync::Arc, thread::JoinHandle},
    tracing::{error, info},
};

/// A running participant: its engine plus one receiver thread per peer.
pub struct Node {
    engine: Arc<Engine>,
    receivers: Vec<JoinHandle<()>>,
}

impl Node {
    /// Builds the engine over `endpoint` and starts receiving from every peer.
    pub fn start(config: EngineConfig, endpoint: Endpoint) -> Result<Self, Error> {
        let Endpoint {
            id,
            outbound,
            inbound,
        } = endpoint;
        let engine = Arc::new(Engine::new(id, config, outbound)?);
        let receivers = receiver::spawn_all(&engine, inbound).map_err(Error::Spawn)?;
        info!(?id, peers = receivers.len(), "Node started.");
        Ok(Node { engine, receivers })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// See [`run_workload`].
    pub fn run<F>(&self, ops: &[Operation], on_commit: F) -> Vec<OperationReport>
    where
        F: Fn(&OperationReport) + Sync,
    {
        run_workload(&self.engine, ops, on_commit)
    }

    /// Stops sending and waits for every receiver loop to see its channel close. Returns how
    /// many receivers were joined.
    ///
    /// Receivers only exit once peers stop sending too, so in-process clusters should disconnect
    /// every node before joining any.
    pub fn shutdown(mut self) -> std::thread::Result<usize> {
        self.engine.disconnect();
        self.join()
    }

    fn join(&mut self) -> std::thread::Result<usize> {
        let count = self.receivers.len();
        for handle in self.receivers.drain(..) {
            if let Err(e) = handle.join() {
                let msg = "Receiver exited due to panic.";
                if let Some(panic) = e.downcast_ref::<&'static str>() {
                    error!(panic, msg);
                } else if let Some(panic) = e.downcast_ref::<String>() {
                    error!(panic, msg);
                } else {
                    error!(msg);
                }
                return Err(e);
            }
        }
        Ok(count)
    }
}

use {
    crate::{transport::Inbound, CoherenceError, Engine, TransportError},
    std::{io, sync::Arc, thread::JoinHandle},
    tracing::{debug, error, info, warn},
};

/// Starts one receiver thread per inbound channel. Each runs until its channel closes.
pub(crate) fn spawn_all(
    engine: &Arc<Engine>,
    inbound: Vec<Inbound>,
) -> io::Result<Vec<JoinHandle<()>>> {
    inbound
        .into_iter()
        .map(|inbound| {
            let engine = Arc::clone(engine);
            std::thread::Builder::new()
                .name(format!("recv-{}-from-{}", engine.id().get(), inbound.peer().get()))
                .spawn(move || run(&engine, inbound))
        })
        .collect()
}

/// Decodes and applies messages from one peer, one at a time. Handler errors are logged and the
/// loop carries on; only a failed channel stops it.
pub(crate) fn run(engine: &Engine, mut inbound: Inbound) {
    let id = engine.id();
    let peer = inbound.peer();
    loop {
        let msg = match inbound.recv() {
            Ok(msg) => msg,
            Err(TransportError::ChannelClosed { .. }) => {
                info!(?id, ?peer, "Channel closed. Receiver exiting.");
                return;
            }
            Err(err) => {
                error!(?id, ?peer, %err, "Channel failed. Receiver exiting.");
                return;
            }
        };
        debug!("{:?} → {}", msg, id);
        match engine.handle(msg) {
            Ok(()) => {}
            Err(err @ CoherenceError::DirectoryInconsistency { .. }) => {
                error!(?id, ?peer, %err, "Unsatisfiable fetch dropped.");
            }
            Err(err) => warn!(?id, ?peer, ?msg, %err, "Unable to apply message. Ignoring."),
        }
    }
}

use {
    crate::{
        transport::{Endpoint, Inbound, Outbound},
        ClusterConfig, TransportError,
    },
    dsm_core::{Message, NodeId, WIRE_LEN},
    std::{net::SocketAddr, time::Duration},
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpListener, TcpStream,
        },
        runtime::Runtime as TokioRuntime,
        sync::mpsc,
        time::{sleep, Instant},
    },
    tracing::{debug, error, info, warn},
};

const DIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Connects one node to every peer over TCP and runs the channel I/O on a tokio runtime.
///
/// Bootstrap: the node listens on its own address, dials every lower NodeID and accepts every
/// higher one. A dialer opens with its NodeID as a 4-byte little-endian handshake, so accept order
/// does not matter. Each connection then gets a writer task that sends whole 16-byte records in
/// queue order and a reader task that decodes them into the node's [`Inbound`] queue.
pub struct TcpRuntime {
    handles_tokio: Vec<tokio::task::JoinHandle<()>>,
    rt: TokioRuntime,
}

impl TcpRuntime {
    /// Blocks until a channel to every peer is established or `connect_timeout` passes.
    pub fn connect(
        id: NodeId,
        cluster: &ClusterConfig,
        connect_timeout: Duration,
    ) -> Result<(Self, Endpoint), TransportError> {
        let rt = TokioRuntime::new()?;
        let own_addr = cluster.addr(id).ok_or(TransportError::UnknownPeer { peer: id })?;
        let streams = rt.block_on(async {
            let listener = TcpListener::bind(own_addr).await?;
            info!(?id, addr = %own_addr, "TCP listener bound.");
            let deadline = Instant::now() + connect_timeout;
            let mut streams = Vec::new();
            for peer in NodeId::all(cluster.num_nodes()).filter(|peer| *peer < id) {
                let addr = cluster
                    .addr(peer)
                    .ok_or(TransportError::UnknownPeer { peer })?;
                streams.push((peer, dial(id, peer, addr, deadline).await?));
            }
            let higher = cluster.num_nodes() - id.get();
            for _ in 0..higher {
                let (peer, stream) = tokio::time::timeout_at(deadline, accept(&listener, cluster))
                    .await
                    .map_err(|_| TransportError::Handshake("timed out waiting for peers".into()))??;
                if peer <= id {
                    return Err(TransportError::Handshake(format!("{peer} dialed {id}")));
                }
                if streams.iter().any(|(known, _)| *known == peer) {
                    return Err(TransportError::Handshake(format!("{peer} connected twice")));
                }
                streams.push((peer, stream));
            }
            Ok::<_, TransportError>(streams)
        })?;

        let mut senders: Vec<Option<_>> = (0..cluster.num_nodes()).map(|_| None).collect();
        let mut inbound = Vec::new();
        let mut handles_tokio = Vec::new();
        for (peer, stream) in streams {
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            let (tx_out, rx_out) = mpsc::unbounded_channel();
            let (tx_in, rx_in) = mpsc::unbounded_channel();
            handles_tokio.push(rt.spawn(write_loop(id, peer, write_half, rx_out)));
            handles_tokio.push(rt.spawn(read_loop(id, peer, read_half, tx_in)));
            senders[peer] = Some(tx_out);
            inbound.push(Inbound::new(peer, rx_in));
        }
        info!(?id, peers = inbound.len(), "Connected to every peer.");
        let endpoint = Endpoint {
            id,
            outbound: Outbound::new(id, senders),
            inbound,
        };
        Ok((TcpRuntime { handles_tokio, rt }, endpoint))
    }

    /// Blocks the calling thread for `linger`, or until Ctrl-C, whichever is first.
    pub fn linger(&self, linger: Duration) {
        self.rt.block_on(async {
            tokio::select! {
                _ = sleep(linger) => debug!(?linger, "Linger elapsed."),
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => info!("Received Ctrl-C, initiating shutdown..."),
                    Err(err) => warn!(%err, "Unable to listen for Ctrl-C."),
                },
            }
        });
    }

    /// Stops every I/O task, which closes every [`Inbound`] queue. Panics in I/O tasks are
    /// propagated.
    pub fn shutdown(mut self) {
        for handle in &self.handles_tokio {
            handle.abort();
        }
        let results = self
            .rt
            .block_on(futures::future::join_all(self.handles_tokio.drain(..)));
        for result in results {
            if let Err(e) = result {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
        self.rt.shutdown_timeout(Duration::from_secs(1));
    }
}

async fn dial(
    id: NodeId,
    peer: NodeId,
    addr: SocketAddr,
    deadline: Instant,
) -> Result<TcpStream, TransportError> {
    loop {
        match TcpStream::connect(addr).await {
            Ok(mut stream) => {
                let handshake = u32::try_from(id.get())
                    .map_err(|_| TransportError::Handshake(format!("{id} does not fit the wire")))?;
                stream.write_all(&handshake.to_le_bytes()).await?;
                info!(?id, ?peer, %addr, "Dialed peer.");
                return Ok(stream);
            }
            Err(err) if Instant::now() < deadline => {
                debug!(?id, ?peer, %addr, %err, "Peer not up yet. Retrying.");
                sleep(DIAL_INTERVAL).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn accept(
    listener: &TcpListener,
    cluster: &ClusterConfig,
) -> Result<(NodeId, TcpStream), TransportError> {
    let (mut stream, addr) = listener.accept().await?;
    let mut handshake = [0; 4];
    stream.read_exact(&mut handshake).await?;
    let raw = u32::from_le_bytes(handshake) as usize;
    let peer = cluster
        .node_id(raw)
        .map_err(|err| TransportError::Handshake(format!("{addr} announced {raw}: {err}")))?;
    info!(?peer, %addr, "Accepted peer.");
    Ok((peer, stream))
}

async fn write_loop(
    id: NodeId,
    peer: NodeId,
    mut socket: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(err) = socket.write_all(&msg.encode()).await {
            error!(?id, ?peer, %err, "Unable to write socket. Closing channel.");
            return;
        }
    }
    if let Err(err) = socket.shutdown().await {
        debug!(?id, ?peer, %err, "Unable to shut down write half.");
    }
    info!(?id, ?peer, "Cleanly closed outbound channel for shutdown.");
}

async fn read_loop(
    id: NodeId,
    peer: NodeId,
    mut socket: OwnedReadHalf,
    tx: mpsc::UnboundedSender<Message>,
) {
    let mut buf = [0; WIRE_LEN];
    loop {
        match socket.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!(?id, ?peer, "Peer closed channel.");
                return;
            }
            Err(err) => {
                error!(?id, ?peer, %err, "Unable to read socket. Closing channel.");
                return;
            }
        }
        let msg = match Message::decode(&buf) {
            Ok(msg) => msg,
            Err(source) => {
                let err = TransportError::Decode { peer, source };
                error!(?id, %err, "Framing lost. Closing channel.");
                return;
            }
        };
        if msg.src != peer {
            warn!(?id, ?peer, ?msg, "Message source does not match channel. Delivering anyway.");
        }
        if tx.send(msg).is_err() {
            info!(?id, ?peer, "Cleanly interrupted reader for shutdown.");
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, dsm_core::BlockId};

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn can_exchange_messages() {
        let peers = (0..3)
            .map(|_| SocketAddr::from(([127, 0, 0, 1], free_port())))
            .collect();
        let cluster = ClusterConfig::new(peers).unwrap();
        let connected: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = NodeId::all(3)
                .map(|id| {
                    let cluster = &cluster;
                    s.spawn(move || TcpRuntime::connect(id, cluster, Duration::from_secs(10)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });
        let (rts, mut endpoints): (Vec<_>, Vec<_>) = connected.into_iter().unzip();
        let msg = Message::fetch_res(BlockId::new(3), 42, NodeId::from_index(2));
        endpoints[2].outbound.send(NodeId::from_index(0), msg).unwrap();
        let from_three = endpoints[0]
            .inbound
            .iter_mut()
            .find(|inbound| inbound.peer() == NodeId::from_index(2))
            .unwrap();
        assert_eq!(from_three.recv().unwrap(), msg);

        for rt in rts {
            rt.shutdown();
        }
        assert!(from_three.recv().is_err());
    }
}

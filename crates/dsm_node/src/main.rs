//! Runs one node of a DSM coherence simulation.
//!
//! ```sh
//! $ cat peers.txt
//! 127.0.0.1 5001
//! 127.0.0.1 5002
//! $ cat node2.txt
//! R 0
//! W 0 42
//! $ dsm_node 2 peers.txt node2.txt
//! Node2 READ 0 = 0
//! Node2 WRITE 0 = 42
//! ```
//!
//! Every node in the peer list must be started; each waits for the others before running its
//! script. Logs go to stderr so stdout carries only the report.

#![deny(unused_must_use)]
#![warn(rust_2018_idioms, unreachable_pub)]

use {
    clap::Parser,
    dsm::{
        ClusterConfig, EngineConfig, Error, HomePolicy, Node, OperationReport, TcpRuntime,
        Workload,
    },
    std::{path::PathBuf, process::ExitCode, time::Duration},
    tracing::{error, info, subscriber::set_global_default},
    tracing_subscriber::filter::EnvFilter,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// This node's NodeID (1-based index into the peer list)
    id: usize,
    /// File of whitespace separated `<ip> <port>` pairs, one per node
    config: PathBuf,
    /// Script of `R <block>` and `W <block> <value>` commands
    workload: PathBuf,
    /// Expected number of nodes; defaults to the length of the peer list
    #[arg(long)]
    nodes: Option<usize>,
    /// Size of the shared block address space
    #[arg(long, default_value_t = 8)]
    blocks: usize,
    /// Initial owner of each block: lowest, interleaved or node:<id>
    #[arg(long, default_value_t = HomePolicy::Lowest)]
    home: HomePolicy,
    /// How long a read waits for a fetch response
    #[arg(long, default_value_t = 5000)]
    fetch_timeout_ms: u64,
    /// How long to wait for every peer to connect
    #[arg(long, default_value_t = 30_000)]
    connect_timeout_ms: u64,
    /// How long to keep serving peers after the script completes
    #[arg(long, default_value_t = 2000)]
    linger_ms: u64,
    /// Print one JSON object per operation instead of text lines
    #[arg(long)]
    json: bool,
    /// Logging level (off, error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = set_global_default(subscriber) {
        eprintln!("Unable to install log subscriber: {err}");
    }
}

fn print_report(report: &OperationReport, json: bool) {
    let Ok(value) = &report.outcome else {
        return;
    };
    if json {
        let line = serde_json::json!({
            "node": report.node,
            "index": report.index,
            "op": report.op,
            "value": value,
        });
        println!("{line}");
    } else {
        println!("{report}");
    }
}

fn run(cli: &Cli) -> Result<Vec<OperationReport>, Error> {
    let cluster = ClusterConfig::load(&cli.config, cli.nodes)?;
    let id = cluster.node_id(cli.id)?;
    let workload = Workload::load(&cli.workload)?;
    let config = EngineConfig::new(cluster.num_nodes(), cli.blocks)
        .home(cli.home)
        .fetch_timeout(Duration::from_millis(cli.fetch_timeout_ms));
    config.validate()?;
    info!(
        ?id,
        nodes = cluster.num_nodes(),
        ops = workload.len(),
        home = %cli.home,
        "DSM node is launching..."
    );

    let (rt, endpoint) =
        TcpRuntime::connect(id, &cluster, Duration::from_millis(cli.connect_timeout_ms))?;
    let node = Node::start(config, endpoint)?;
    let reports = node.run(workload.operations(), |report| print_report(report, cli.json));
    info!(?id, "Workload complete. Serving peers before shutdown.");
    rt.linger(Duration::from_millis(cli.linger_ms));

    node.engine().disconnect();
    rt.shutdown();
    match node.shutdown() {
        Ok(count) => info!(?id, receivers = count, "Shut down cleanly."),
        Err(_) => error!(?id, "Receiver panicked during shutdown."),
    }
    Ok(reports)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(&cli) {
        Ok(reports) => {
            let failed = reports.iter().filter(|report| !report.is_ok()).count();
            if failed == 0 {
                ExitCode::SUCCESS
            } else {
                error!(failed, total = reports.len(), "Some operations failed.");
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!(%err, "Node failed.");
            ExitCode::FAILURE
        }
    }
}

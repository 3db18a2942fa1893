// Path: crates/node/src/bin/bytecave.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

use anyhow::{anyhow, Context, Result};
use bytecave_chain::RestChainClient;
use bytecave_node::{Background, Vault, VaultOptions};
use bytecave_replication::transport::HttpPeerTransport;
use bytecave_types::config::NodeConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "bytecave", about = "ByteCave vault node")]
struct Opts {
    /// Path to the node's TOML configuration.
    #[clap(long, env = "BYTECAVE_CONFIG")]
    config: Option<PathBuf>,
    #[clap(long, env = "BYTECAVE_NODE_ID")]
    node_id: Option<String>,
    #[clap(long, env = "BYTECAVE_NODE_URL")]
    node_url: Option<String>,
    #[clap(long, env = "BYTECAVE_PORT")]
    port: Option<u16>,
    #[clap(long, env = "BYTECAVE_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[clap(long, env = "BYTECAVE_CHAIN_URL")]
    chain_url: Option<String>,
    #[clap(long, env = "BYTECAVE_NODE_SHARDS")]
    node_shards: Option<String>,
    /// Telemetry listen address for /metrics and /healthz.
    #[clap(long, env = "TELEMETRY_ADDR", default_value = "127.0.0.1:9464")]
    telemetry_addr: SocketAddr,
}

fn load_config(opts: &Opts) -> Result<NodeConfig> {
    let mut config: NodeConfig = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config at {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => {
            let node_id = opts
                .node_id
                .clone()
                .ok_or_else(|| anyhow!("--node-id (or BYTECAVE_NODE_ID) is required"))?;
            let node_url = opts
                .node_url
                .clone()
                .ok_or_else(|| anyhow!("--node-url (or BYTECAVE_NODE_URL) is required"))?;
            toml::from_str(&format!(
                "node_id = {node_id:?}\nnode_url = {node_url:?}\n"
            ))?
        }
    };

    if let Some(node_id) = &opts.node_id {
        config.node_id = node_id.clone();
    }
    if let Some(node_url) = &opts.node_url {
        config.node_url = node_url.clone();
    }
    if let Some(port) = opts.port {
        config.port = port;
    }
    if let Some(data_dir) = &opts.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(chain_url) = &opts.chain_url {
        config.chain_url = Some(chain_url.clone());
    }
    if let Some(node_shards) = &opts.node_shards {
        config.node_shards = node_shards.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing first, so startup failures are visible.
    bytecave_telemetry::init::init_tracing()?;
    if let Err(e) = bytecave_telemetry::prometheus::install() {
        tracing::warn!(target: "node", event = "metrics_install_failed", error = %e);
    }

    let opts = Opts::parse();
    tokio::spawn(bytecave_telemetry::http::run_server(opts.telemetry_addr));

    // Fatal init failures exit with code 1 via anyhow.
    let config = load_config(&opts)?;
    let chain_url = config
        .chain_url
        .clone()
        .ok_or_else(|| anyhow!("chain_url is required (set --chain-url or BYTECAVE_CHAIN_URL)"))?;
    let chain_timeout = Duration::from_millis(config.chain_timeout_ms);
    let chain = Arc::new(RestChainClient::new(&chain_url, chain_timeout)?);
    if config.node_public_key.is_empty() {
        tracing::warn!(
            target: "node",
            event = "no_public_key",
            "node_public_key is unset; peers will reject replication pushes from this node"
        );
    }
    let transport = Arc::new(HttpPeerTransport::new(
        Duration::from_millis(config.replication_timeout_ms),
        config.node_public_key.clone(),
    )?);

    let listen: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let vault = Vault::open(
        config,
        chain.clone(),
        chain,
        transport,
        VaultOptions::default(),
    )?;
    let background = Background::spawn(&vault);

    let api: Arc<dyn bytecave_gateway::VaultApi> = vault.clone();
    let router = bytecave_gateway::router(
        api,
        // Base64 inflates payloads by a third; leave room for the envelope.
        (vault.config().max_blob_size() as usize) * 2,
        Duration::from_secs(30),
    );

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(target: "node", event = "listening", addr = %listen);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(target: "node", event = "shutdown", reason = "ctrl-c");
        })
        .await?;

    background.shutdown().await;
    tracing::info!(target: "node", event = "shutdown", reason = "complete");
    Ok(())
}

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use meridian::chain::GenesisParams;
use meridian::config::{Args, NodeConfig, GENESIS_COINBASE};
use meridian::freezer::Freezer;
use meridian::net::bootstrap::bootstrap;
use meridian::net::heartbeat::HeartbeatService;
use meridian::net::server::Server;
use meridian::peer::PeerId;
use meridian::vm::MemoryVm;
use meridian::{Chain, LeaderSchedule, Mempool, Node, Snowball};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meridian=info".parse().unwrap()),
        )
        .init();

    let config: NodeConfig = Args::parse().into();

    if let Err(e) = run(config).await {
        error!(error = %e, "node exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    let freezer = Arc::new(Freezer::open(&config.data_dir));

    let vm = Arc::new(MemoryVm::new(config.chain_id, HashMap::new()));

    let chain = match freezer.get_block_header_by_number(0) {
        Ok(genesis_header) => {
            info!(block_number = genesis_header.block_number, "resuming from existing genesis");
            Arc::new(Chain::open(Arc::clone(&freezer), vm, genesis_header))
        }
        Err(_) => {
            info!("no existing chain found, initializing genesis");
            Arc::new(Chain::genesis(
                Arc::clone(&freezer),
                vm,
                GenesisParams {
                    timestamp: meridian::types::now(),
                    coinbase: GENESIS_COINBASE,
                    slot_size: config.slot_size,
                    epoch_size: config.epoch_size,
                    extra_data: Vec::new(),
                },
            )?)
        }
    };

    let node = Arc::new(Node::new(
        chain,
        Arc::new(Mempool::new(config.tx_expire_time_secs)),
        Arc::new(LeaderSchedule::new()),
        Arc::new(Snowball::new()),
        Arc::clone(&freezer),
        config.external_address.clone(),
        config.port.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));

    let seeds: Vec<PeerId> = config
        .seeds
        .iter()
        .filter_map(|s| {
            let (host, port) = s.split_once(':')?;
            Some(PeerId::new(host.to_string(), port.to_string()))
        })
        .collect();

    {
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            let ctx = node.context_owned();
            if let Err(e) = bootstrap(&ctx, &[], &seeds).await {
                info!(error = %e, "bootstrap did not saturate the peer set");
            }
            node.finish_bootstrapping();
        });
    }

    {
        let mempool = Arc::clone(&node.mempool);
        tokio::spawn(async move {
            mempool.run_expiry_loop().await;
        });
    }

    let heartbeat_service = HeartbeatService::bind(config.port).await?;
    let heartbeat_shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let heartbeat_shutdown = Arc::clone(&heartbeat_shutdown);
        tokio::spawn(async move {
            heartbeat_service.serve(heartbeat_shutdown).await;
        });
    }

    let server = Server::bind(config.port).await?;
    let node_for_ctx = Arc::clone(&node);

    let shutdown = server.shutdown_handle();
    {
        let heartbeat_shutdown = Arc::clone(&heartbeat_shutdown);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
            shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
            heartbeat_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        });
    }

    info!(port = config.port, "meridian node listening");
    server.run(move || node_for_ctx.context_owned()).await;

    Ok(())
}

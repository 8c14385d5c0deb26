//! B is three blocks ahead of A; A requests BLOCK with its head number and
//! imports the returned headers, advancing its canonical head to match
//! B's (§8 scenario 6).

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::address;
use meridian::chain::GenesisParams;
use meridian::freezer::Freezer;
use meridian::net::message::{MessageFlag, MessageType};
use meridian::net::server::Server;
use meridian::peer::PeerId;
use meridian::vm::MemoryVm;
use meridian::{Chain, LeaderSchedule, Mempool, Node, Snowball};

async fn spawn_node(port: u16) -> (Arc<Node>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let freezer = Arc::new(Freezer::open(dir.path()));
    let vm = Arc::new(MemoryVm::new(1, HashMap::new()));
    let chain = Arc::new(
        Chain::genesis(
            Arc::clone(&freezer),
            vm,
            GenesisParams {
                timestamp: 1,
                coinbase: address!("0000000000000000000000000000000000000001"),
                slot_size: 10,
                epoch_size: 10,
                extra_data: vec![],
            },
        )
        .unwrap(),
    );
    let node = Arc::new(Node::new(
        chain,
        Arc::new(Mempool::new(300)),
        Arc::new(LeaderSchedule::new()),
        Arc::new(Snowball::new()),
        freezer,
        "127.0.0.1".to_string(),
        port.to_string(),
        "10001".to_string(),
    ));

    let server = Server::bind(port).await.unwrap();
    let node_for_server = Arc::clone(&node);
    tokio::spawn(async move {
        server.run(move || node_for_server.context_owned()).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (node, dir)
}

#[tokio::test]
async fn catching_up_imports_the_missing_headers() {
    let (node_a, _dir_a) = spawn_node(17201).await;
    let (node_b, _dir_b) = spawn_node(17202).await;

    // B forges three empty blocks, reaching head = 3; A stays at genesis.
    for _ in 0..3 {
        node_b.chain.forge_block(vec![]).await.unwrap();
    }
    assert_eq!(node_b.chain.get_canonical_head().await.block_number, 3);
    assert_eq!(node_a.chain.get_canonical_head().await.block_number, 0);

    let b_id = PeerId::new("127.0.0.1", "17202");
    let best_block = node_a.chain.get_canonical_head().await.block_number;
    let replies = node_a
        .send(
            &b_id,
            MessageType::Request,
            MessageFlag::Block,
            serde_json::json!({"best_block": best_block}),
            true,
        )
        .await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].data["blocks"].as_array().unwrap().len(), 3);
    assert_eq!(node_a.chain.get_canonical_head().await.block_number, 3);
}

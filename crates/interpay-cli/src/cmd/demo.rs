//! `interpay demo`: a merchant and its customers on one loopback network.

use crate::table::{Align, Table};
use crate::ui;
use interpay_types::config::SessionConfig;
use interpay_types::peer::{ConnectionState, PeerRecord};
use interpay_wire::loopback::LoopbackNetwork;
use interpay_wire::node::InterpayNode;
use std::time::Duration;
use tokio::sync::watch;

pub fn cmd_demo(
    config: SessionConfig,
    amount: f64,
    currency: &str,
    customers: usize,
) -> Result<(), String> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create Tokio runtime: {e}"))?;
    rt.block_on(run_demo(config, amount, currency, customers))
}

async fn run_demo(
    config: SessionConfig,
    amount: f64,
    currency: &str,
    customers: usize,
) -> Result<(), String> {
    ui::banner();
    ui::blank();

    let net = LoopbackNetwork::new();
    let wait = Duration::from_secs(config.invite_timeout_secs);

    let merchant_transport = net.endpoint(config.display_name.clone(), config.service_type.clone());
    let merchant = InterpayNode::start(config.clone(), merchant_transport)
        .await
        .map_err(|e| e.to_string())?;
    ui::success(&format!("Merchant '{}' is advertising", config.display_name));

    let mut nodes = Vec::with_capacity(customers);
    for i in 1..=customers {
        let customer_config = SessionConfig {
            display_name: format!("Customer {i}"),
            ..config.clone()
        };
        let transport = net.endpoint(
            customer_config.display_name.clone(),
            customer_config.service_type.clone(),
        );
        let name = customer_config.display_name.clone();
        let node = InterpayNode::start(customer_config, transport)
            .await
            .map_err(|e| e.to_string())?;
        let inbox = node.subscribe_payment_requests();
        ui::success(&format!("{name} joined"));
        nodes.push((name, node, inbox));
    }

    ui::blank();
    ui::section("Connecting");
    let connected = wait_for_peers(merchant.observe_peers(), customers, wait).await;
    print_peers(&connected);
    if connected.len() < customers {
        ui::warn(&format!(
            "Only {} of {customers} customers connected within {}s",
            connected.len(),
            wait.as_secs()
        ));
    }

    ui::blank();
    ui::section("Requesting payment");
    let result = merchant.send_payment_request(amount, currency).await;
    if let Ok(id) = &result {
        ui::kv("Request", &id.to_string());
        for (name, _, inbox) in nodes.iter_mut() {
            match tokio::time::timeout(wait, inbox.recv()).await {
                Ok(Ok(received)) => ui::peer_event(
                    name,
                    &format!("received {} from {}", received.request, received.from.display_name),
                ),
                _ => ui::peer_event(name, "received nothing"),
            }
        }
    }

    let stats = merchant.stats();
    ui::blank();
    ui::kv("Events", &stats.events_applied.to_string());

    merchant.shutdown().await;
    for (_, node, _) in &nodes {
        node.shutdown().await;
    }

    match result {
        Ok(_) => {
            ui::blank();
            ui::hint("RUST_LOG=debug shows every session transition");
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Wait until `want` peers are connected or `wait` elapses, returning the
/// last published snapshot.
async fn wait_for_peers(
    mut peers: watch::Receiver<Vec<PeerRecord>>,
    want: usize,
    wait: Duration,
) -> Vec<PeerRecord> {
    let ready = |records: &Vec<PeerRecord>| {
        records.iter().filter(|r| r.state == ConnectionState::Connected).count() >= want
    };
    let _ = tokio::time::timeout(wait, peers.wait_for(ready)).await;
    let snapshot = peers.borrow().clone();
    snapshot
        .into_iter()
        .filter(|r| r.state == ConnectionState::Connected)
        .collect()
}

fn print_peers(peers: &[PeerRecord]) {
    if peers.is_empty() {
        ui::warn("No customers connected");
        return;
    }
    let mut table = Table::new(&["Peer", "State", "Since"]).align(2, Align::Right);
    for record in peers {
        table.add_row(&[
            record.identity.display_name.clone(),
            record.state.to_string(),
            record.last_updated.format("%H:%M:%S%.3f").to_string(),
        ]);
    }
    table.print();
}

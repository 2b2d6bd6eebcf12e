//! Example: Connect to the relay and print the zones and partitions it reports.
//!
//! Usage: RELAY_HOST=192.168.1.20 RELAY_SECRET=... cargo run --example connect

use std::time::Duration;

use dsc_neo_relay::{RelayConfig, RelayPanel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::builder()
        .host(std::env::var("RELAY_HOST").unwrap_or_else(|_| "192.168.1.20".to_string()))
        .secret(std::env::var("RELAY_SECRET")?)
        .build();

    let mut panel = RelayPanel::new(config)?;
    panel.start();

    if !panel.wait_connected(Duration::from_secs(15)).await {
        println!("Relay not reachable");
        panel.stop().await;
        return Ok(());
    }
    println!("Connected. Collecting state for 10 seconds...");
    tokio::time::sleep(Duration::from_secs(10)).await;

    println!("\n=== Zones ({}) ===", panel.zones().len());
    for zone in panel.zones() {
        println!("  Zone {:3}: {}", zone.id, if zone.open { "open" } else { "closed" });
    }

    println!("\n=== Partitions ({}) ===", panel.partitions().len());
    for part in panel.partitions() {
        println!(
            "  Partition {}: {} ready={} exit_delay={:?} entry_delay={:?}",
            part.id, part.state, part.ready, part.exit_delay_seconds, part.entry_delay_seconds
        );
    }

    panel.stop().await;
    Ok(())
}

//! Example: Arm partition 1 in home mode, wait, then disarm it.
//!
//! Usage: RELAY_SECRET=... ACCESS_CODE=1234 cargo run --example partition_commands

use std::time::Duration;

use dsc_neo_relay::{ArmMode, RelayConfig, RelayPanel, Topic};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::builder()
        .host(std::env::var("RELAY_HOST").unwrap_or_else(|_| "192.168.1.20".to_string()))
        .secret(std::env::var("RELAY_SECRET")?)
        .build();
    let code = std::env::var("ACCESS_CODE")?;

    let mut panel = RelayPanel::new(config)?;
    let state = panel.state();
    let _sub = panel.subscribe(Topic::PartitionUpdate, move |event| {
        println!("{:?}: {:?}", event, state.partition(1).map(|p| p.state));
    });
    panel.start();

    if !panel.wait_connected(Duration::from_secs(15)).await {
        println!("Relay not reachable");
        panel.stop().await;
        return Ok(());
    }

    println!("Arming partition 1 (home)...");
    panel.arm_partition(1, ArmMode::Home, &code).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    println!("Disarming partition 1...");
    panel.disarm_partition(1, &code).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    if let Some(part) = panel.partition(1) {
        println!("Partition 1 is now {}", part.state);
    }

    panel.stop().await;
    Ok(())
}

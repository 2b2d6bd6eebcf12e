//! Example: Print raw and debounced zone changes.

use dsc_neo_relay::{PanelEvent, RelayConfig, RelayPanel, Topic, ZoneSensor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::builder()
        .host(std::env::var("RELAY_HOST").unwrap_or_else(|_| "192.168.1.20".to_string()))
        .secret(std::env::var("RELAY_SECRET")?)
        .build();

    let mut panel = RelayPanel::new(config)?;
    let mut events = panel.events(&[Topic::NewZone, Topic::ZoneUpdate, Topic::ConnectionUpdate]);
    panel.start();

    println!("Listening for zone events (Ctrl+C to stop)...\n");
    let mut sensors: Vec<ZoneSensor> = Vec::new();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(PanelEvent::NewZone { zone_id }) => {
                        println!("Zone {} discovered", zone_id);
                        sensors.push(panel.zone_sensor(zone_id, |id, on| {
                            println!("  Zone {} presented {}", id, if on { "ON" } else { "OFF" });
                        }));
                    }
                    Some(PanelEvent::ZoneUpdate { zone_id }) => {
                        if let Some(zone) = panel.zone(zone_id) {
                            println!("Zone {} raw {}", zone_id, if zone.open { "open" } else { "closed" });
                        }
                    }
                    Some(PanelEvent::ConnectionUpdate { connected }) => {
                        println!("Relay {}", if connected { "connected" } else { "disconnected" });
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    panel.stop().await;
    Ok(())
}

//! Demo CLI: connect to a panel, print its entities, and stream events.
//!
//! Usage:
//!   mode2_monitor --host 192.168.1.50 --port 7700 --installer-code 1234

use std::net::SocketAddr;
use std::time::Duration;

use bosch_alarm_mode2::{Credentials, LoadSelector, Panel, PanelConfig};
use clap::Parser;

#[derive(Parser)]
#[command(name = "mode2_monitor", version, about = "Bosch Mode 2 panel monitor")]
struct Args {
    /// Panel host or address
    #[arg(long)]
    host: String,

    /// Panel automation port
    #[arg(long, default_value_t = 7700)]
    port: u16,

    /// Installer-or-user code (Solution/AMAX panels)
    #[arg(long)]
    installer_code: Option<String>,

    /// Automation-user code (AMAX/B-G panels)
    #[arg(long)]
    automation_code: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let credentials = Credentials {
        installer_or_user_code: args.installer_code,
        automation_code: args.automation_code,
    };
    let config = PanelConfig::new(addr, credentials);

    let panel = Panel::connect(config, LoadSelector::ALL).await?;

    panel
        .with_model(|model| {
            println!("Panel: {:?}", model.info.model.map(|m| m.name()));
            println!("Firmware: {:?}", model.info.firmware_version);
            println!("Areas:");
            for area in model.areas.values() {
                println!("  {:>3} {:<24} {:?}", area.id, area.name, area.status());
            }
            println!("Points:");
            for point in model.points.values() {
                println!("  {:>3} {:<24} {:?}", point.id, point.name, point.status());
            }
        })
        .await;

    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let events = panel.events().await;
        if let Some(latest) = events.last() {
            println!("[{}] #{} {}", latest.timestamp, latest.id, latest.message);
        }
    }
}
